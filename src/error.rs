//! Error types for the vod-dl library.

use std::process::ExitStatus;

use thiserror::Error;

use crate::progress::TaskId;

/// Misuse of the progress ledger.
///
/// These indicate a bug in the caller (a task started twice, an event for a
/// task that was never started or has already finished) and are never
/// recovered from.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// `start` or `already_cached` was called for a task that is already registered.
    #[error("task {0}: cannot start, already started")]
    AlreadyStarted(TaskId),

    /// An event arrived for a task that is not registered.
    #[error("task {id}: cannot {action}, not started")]
    NotStarted {
        /// The offending task.
        id: TaskId,
        /// The event that was rejected.
        action: &'static str,
    },

    /// An event arrived for a task that already ended or was found cached.
    #[error("task {id}: cannot {action}, already finished")]
    AlreadyFinished {
        /// The offending task.
        id: TaskId,
        /// The event that was rejected.
        action: &'static str,
    },
}

/// Errors that can occur while planning, fetching, or assembling a batch.
#[derive(Error, Debug)]
pub enum Error {
    /// A segment could not be fetched within the retry budget.
    #[error("download of {url} failed after {attempts} attempt(s): {reason}")]
    DownloadFailed {
        /// Segment URL.
        url: String,
        /// Number of attempts made.
        attempts: u32,
        /// Last failure seen.
        reason: String,
    },

    /// Progress ledger protocol violation.
    #[error("progress ledger: {0}")]
    Ledger(#[from] LedgerError),

    /// The external muxer exited unsuccessfully.
    #[error("joining files failed ({status}): {stderr}")]
    Muxer {
        /// Exit status of the muxer process.
        status: ExitStatus,
        /// Diagnostic output captured from the muxer.
        stderr: String,
    },

    /// The playlist could not be loaded or parsed.
    #[error("playlist error: {0}")]
    Playlist(String),

    /// Invalid configuration or arguments.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Config file could not be parsed.
    #[error("config file: {0}")]
    Toml(#[from] toml::de::Error),
}

/// A specialized `Result` type for vod-dl operations.
pub type Result<T> = std::result::Result<T, Error>;
