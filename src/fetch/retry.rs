//! Retry policy and failure classification for segment fetches.

use std::io;
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

use crate::config::DownloadConfig;
use crate::error::LedgerError;

/// High-level classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connect or read timed out.
    Timeout,
    /// Server asked us to slow down (429, 503).
    Throttled,
    /// Connection reset, refused, closed early, etc.
    Connection,
    /// Retryable server error.
    Http5xx(u16),
    /// Anything else; not retried.
    Other,
}

impl ErrorKind {
    #[must_use]
    pub const fn is_transient(self) -> bool {
        !matches!(self, Self::Other)
    }
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    NoRetry,
    RetryAfter(Duration),
}

/// Attempt budget with optional capped exponential backoff.
///
/// With a zero `base_delay` (the default) transient failures are retried
/// immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::ZERO,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &DownloadConfig) -> Self {
        Self {
            max_attempts: config.retries.max(1),
            base_delay: Duration::from_millis(config.retry_delay_ms),
            ..Self::default()
        }
    }

    /// Decides whether to try again after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if attempt >= self.max_attempts || !kind.is_transient() {
            return RetryDecision::NoRetry;
        }
        let factor = 1u32 << attempt.saturating_sub(1).min(8);
        RetryDecision::RetryAfter(self.base_delay.saturating_mul(factor).min(self.max_delay))
    }
}

/// Failure of a single fetch attempt.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(StatusCode),

    #[error("body ended after {received} of {expected} bytes")]
    Truncated { expected: u64, received: u64 },

    #[error("storage: {0}")]
    Storage(io::Error),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl FetchError {
    /// Retry classification of this failure.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(e) => classify_transport(e),
            Self::Status(status) => classify_http_status(*status),
            Self::Truncated { .. } => ErrorKind::Connection,
            Self::Storage(e) => classify_io(e),
            Self::Ledger(_) => ErrorKind::Other,
        }
    }
}

/// Classify an HTTP status code for retry decisions.
#[must_use]
pub fn classify_http_status(status: StatusCode) -> ErrorKind {
    match status.as_u16() {
        429 | 503 => ErrorKind::Throttled,
        408 => ErrorKind::Timeout,
        code @ 500..=599 => ErrorKind::Http5xx(code),
        _ => ErrorKind::Other,
    }
}

fn classify_transport(e: &reqwest::Error) -> ErrorKind {
    if e.is_builder() || e.is_redirect() || e.is_decode() {
        ErrorKind::Other
    } else if e.is_timeout() {
        ErrorKind::Timeout
    } else {
        ErrorKind::Connection
    }
}

fn classify_io(e: &io::Error) -> ErrorKind {
    match e.kind() {
        io::ErrorKind::TimedOut => ErrorKind::Timeout,
        io::ErrorKind::Interrupted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::UnexpectedEof => ErrorKind::Connection,
        _ => ErrorKind::Other,
    }
}
