//! vod-dl - A library for downloading time ranges of HLS streams.
//!
//! A batch plans which segments cover the requested range, fetches them with
//! a bounded number of workers (reusing segments already on disk), reports
//! aggregate progress, and hands a playlist of the local files to an external
//! muxer.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vod_dl::{AppConfig, Batch, BatchRequest, FfmpegMuxer, PlaylistClient, TerminalStatus};
//!
//! # async fn example() -> vod_dl::Result<()> {
//! let config = AppConfig::load()?;
//! let http = vod_dl::build_http_client(&config.download)?;
//!
//! let playlist = PlaylistClient::new(http.clone())
//!     .fetch("https://example.com/vod/index.m3u8")
//!     .await?;
//! let request = BatchRequest::new(playlist, "clip.mp4").with_range(Some(60.0), Some(120.0));
//!
//! let muxer = Arc::new(FfmpegMuxer::from_config(&config.muxer));
//! let batch = Batch::new(http, config, muxer, Arc::new(TerminalStatus));
//! let stats = batch.run(&request).await?;
//! println!("Fetched {} segments", stats.segments());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod batch;
pub mod config;
pub mod error;
pub mod fetch;
pub mod format;
pub mod fs;
pub mod muxer;
pub mod planner;
pub mod playlist;
pub mod progress;
pub mod remap;
pub mod stats;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export main types for convenience
pub use batch::{Batch, BatchRequest};
pub use config::{AppConfig, DownloadConfig, MuxerConfig, PathConfig};
pub use error::{Error, LedgerError, Result};
pub use fetch::{FetchJob, FetchOutcome, Fetcher, build_http_client};
pub use format::{format_bytes, format_clock, format_duration, parse_clock};
pub use fs::{FileSystem, TokioFileSystem};
pub use muxer::{FfmpegMuxer, MediaMetadata, Muxer};
pub use planner::{Segment, plan};
pub use playlist::{Playlist, PlaylistClient};
pub use progress::{
    CallbackStatus, DownloadProgress, NoProgress, NoStatus, Progress, ProgressState,
    SharedProgress, StatusSink, TaskId, TerminalStatus,
};
pub use remap::remap;
pub use stats::{BatchStats, SessionStats, SessionStatsBuilder};
