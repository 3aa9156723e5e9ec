//! Configuration types for download operations.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for segment download batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Number of concurrent segment downloads.
    pub workers: usize,
    /// Aggregate throughput cap across all workers, in bytes per second.
    pub rate_limit: Option<u32>,
    /// Maximum number of attempts per segment.
    pub retries: u32,
    /// Base delay between attempts in milliseconds. Zero retries immediately.
    pub retry_delay_ms: u64,
    /// Size of the chunks written to disk and reported as progress.
    pub chunk_size: usize,
    /// Number of throughput samples retained for the speed estimate.
    pub sample_capacity: usize,
    /// Minimum interval between two status renders, in milliseconds.
    pub render_interval_ms: u64,
    /// Keep the downloaded segments after a successful join.
    pub keep_segments: bool,
    /// Overwrite the output file if it exists.
    pub overwrite: bool,
    /// Transport connect timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            workers: 20,
            rate_limit: None,
            retries: 5,
            retry_delay_ms: 0,
            chunk_size: 1024,
            sample_capacity: 100,
            render_interval_ms: 100,
            keep_segments: false,
            overwrite: true,
            connect_timeout_secs: 30,
        }
    }
}

impl DownloadConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of concurrent segment downloads.
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the aggregate rate limit in bytes per second.
    #[must_use]
    pub const fn with_rate_limit(mut self, rate_limit: Option<u32>) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Sets the per-segment attempt budget.
    #[must_use]
    pub const fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the base delay between attempts.
    #[must_use]
    pub const fn with_retry_delay_ms(mut self, delay: u64) -> Self {
        self.retry_delay_ms = delay;
        self
    }

    /// Sets the write/report chunk size.
    #[must_use]
    pub const fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Sets whether downloaded segments survive a successful join.
    #[must_use]
    pub const fn with_keep_segments(mut self, keep: bool) -> Self {
        self.keep_segments = keep;
        self
    }

    /// Minimum interval between two status renders.
    #[must_use]
    pub const fn render_interval(&self) -> Duration {
        Duration::from_millis(self.render_interval_ms)
    }

    /// Checks that the numeric settings are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a count or size is zero.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".into()));
        }
        if self.retries == 0 {
            return Err(Error::Config("retries must be at least 1".into()));
        }
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be at least 1".into()));
        }
        if self.sample_capacity < 2 {
            return Err(Error::Config("sample_capacity must be at least 2".into()));
        }
        if self.rate_limit == Some(0) {
            return Err(Error::Config("rate_limit must be positive".into()));
        }
        Ok(())
    }
}

/// Path configuration for the segment cache and output files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Root directory for downloaded segments.
    pub work_dir: PathBuf,
    /// Directory where joined output files are written.
    pub output_dir: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("vod-dl"),
            output_dir: PathBuf::from("."),
        }
    }
}

/// External muxer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxerConfig {
    /// Muxer executable.
    pub program: PathBuf,
    /// Value written to the `encoded_by` metadata tag.
    pub encoded_by: String,
}

impl Default for MuxerConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            encoded_by: "vod-dl".to_string(),
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Download configuration.
    pub download: DownloadConfig,
    /// Path configuration.
    pub paths: PathConfig,
    /// Muxer configuration.
    pub muxer: MuxerConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Location of the user config file, if a config directory is known.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("vod-dl").join("config.toml"))
    }

    /// Loads configuration from the user config file, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Loads configuration from a specific TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        log::debug!("Loaded config from {}", path.display());
        Self::from_toml_str(&text)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or fails validation.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.download.validate()?;
        Ok(config)
    }
}
