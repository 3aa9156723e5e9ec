//! Bounded-concurrency segment fetching.
//!
//! Each segment is streamed into a `.part` sibling and renamed into place once
//! the body is complete, so a file at the final path is always whole. A file
//! already present at the final path is trusted as-is and never re-fetched.

mod limit;
mod retry;

use std::ffi::OsString;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use futures::{StreamExt, stream};
use reqwest::Url;
use tokio::io::AsyncWriteExt;

use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use crate::fs::{FileSystem, TokioFileSystem};
use crate::progress::{DownloadProgress, TaskId};
use crate::stats::{BatchStats, BatchStatsBuilder};

pub use limit::ByteLimiter;
pub use retry::{ErrorKind, FetchError, RetryDecision, RetryPolicy, classify_http_status};

/// One segment to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchJob {
    /// Progress task id; unique within the batch.
    pub id: TaskId,
    pub url: Url,
    /// Final local path of the segment.
    pub path: PathBuf,
}

/// Result of fetching one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub id: TaskId,
    /// Size of the segment on disk.
    pub bytes: u64,
    /// The segment was already present and not downloaded.
    pub cached: bool,
    /// Attempts used; zero for cached segments.
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Builds the HTTP client used for segment and playlist requests.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn build_http_client(config: &DownloadConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .pool_idle_timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(config.workers)
        .tcp_keepalive(Duration::from_secs(30))
        .build()
}

/// Returns the provisional path a segment is written to before the rename.
#[must_use]
pub fn part_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map_or_else(OsString::new, ToOwned::to_owned);
    name.push(".part");
    path.with_file_name(name)
}

/// Downloads segments with a fixed number of concurrent workers.
pub struct Fetcher<F: FileSystem = TokioFileSystem> {
    http: reqwest::Client,
    config: DownloadConfig,
    policy: RetryPolicy,
    limiter: Option<ByteLimiter>,
    fs: F,
}

impl Fetcher<TokioFileSystem> {
    /// Creates a fetcher backed by the real file system.
    #[must_use]
    pub fn new(http: reqwest::Client, config: DownloadConfig) -> Self {
        Self::with_fs(http, config, TokioFileSystem)
    }
}

impl<F: FileSystem> Fetcher<F> {
    /// Creates a fetcher with a custom file system implementation.
    #[must_use]
    pub fn with_fs(http: reqwest::Client, config: DownloadConfig, fs: F) -> Self {
        let policy = RetryPolicy::from_config(&config);
        let limiter = config
            .rate_limit
            .and_then(NonZeroU32::new)
            .map(|rate| ByteLimiter::new(rate, config.chunk_size));
        Self {
            http,
            config,
            policy,
            limiter,
            fs,
        }
    }

    /// Replaces the retry policy derived from the configuration.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Fetches every job, at most `workers` at a time.
    ///
    /// Jobs may finish in any order. The first segment that exhausts its
    /// retry budget aborts the whole batch; downloads still in flight are
    /// dropped and their `.part` files left on disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DownloadFailed`] for an unrecoverable segment,
    /// [`Error::Ledger`] on a progress protocol violation, or an I/O error if
    /// a segment directory cannot be created.
    pub async fn fetch_all(
        &self,
        jobs: &[FetchJob],
        progress: &dyn DownloadProgress,
    ) -> Result<BatchStats> {
        let mut builder = BatchStatsBuilder::new();
        if jobs.is_empty() {
            return Ok(builder.build());
        }

        log::info!(
            "Fetching {} segment(s) with {} worker(s)",
            jobs.len(),
            self.config.workers
        );

        let mut results = stream::iter(jobs)
            .map(|job| self.fetch(job, progress))
            .buffer_unordered(self.config.workers.max(1));

        while let Some(result) = results.next().await {
            builder.add(&result?);
        }

        Ok(builder.build())
    }

    /// Fetches a single segment, retrying transient failures.
    ///
    /// # Errors
    ///
    /// See [`fetch_all`](Self::fetch_all).
    pub async fn fetch(&self, job: &FetchJob, progress: &dyn DownloadProgress) -> Result<FetchOutcome> {
        let started_at = Instant::now();

        if let Some(size) = self.fs.file_size(&job.path).await {
            log::debug!("Segment {} already present ({size} bytes)", job.path.display());
            progress.on_cached(job.id, size)?;
            return Ok(FetchOutcome {
                id: job.id,
                bytes: size,
                cached: true,
                attempts: 0,
                elapsed: started_at.elapsed(),
            });
        }

        self.ensure_parent_dir(&job.path).await?;

        let mut attempt = 1;
        loop {
            let mut started = false;
            let error = match self.attempt(job, progress, &mut started).await {
                Ok(bytes) => {
                    return Ok(FetchOutcome {
                        id: job.id,
                        bytes,
                        cached: false,
                        attempts: attempt,
                        elapsed: started_at.elapsed(),
                    });
                }
                Err(FetchError::Ledger(e)) => return Err(e.into()),
                Err(e) => e,
            };

            if started {
                progress.on_abort(job.id)?;
            }

            match self.policy.decide(attempt, error.kind()) {
                RetryDecision::NoRetry => {
                    log::error!(
                        "Segment {} failed after {attempt} attempt(s): {error}",
                        job.url
                    );
                    return Err(Error::DownloadFailed {
                        url: job.url.to_string(),
                        attempts: attempt,
                        reason: error.to_string(),
                    });
                }
                RetryDecision::RetryAfter(delay) => {
                    log::warn!(
                        "Segment {} attempt {attempt} failed: {error}; retrying",
                        job.url
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Performs one streamed GET into the `.part` file and renames it into place.
    async fn attempt(
        &self,
        job: &FetchJob,
        progress: &dyn DownloadProgress,
        started: &mut bool,
    ) -> std::result::Result<u64, FetchError> {
        let mut response = self.http.get(job.url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let planned = response.content_length().unwrap_or(0);
        progress.on_start(job.id, planned)?;
        *started = true;

        let part = part_path(&job.path);
        let mut file = self
            .fs
            .create_file(&part)
            .await
            .map_err(FetchError::Storage)?;

        let mut written = 0u64;
        while let Some(bytes) = response.chunk().await? {
            for piece in bytes.chunks(self.config.chunk_size.max(1)) {
                if let Some(limiter) = &self.limiter {
                    limiter.consume(piece.len()).await;
                }
                file.write_all(piece).await.map_err(FetchError::Storage)?;
                let len = piece.len() as u64;
                written += len;
                progress.on_advance(job.id, len)?;
            }
        }
        file.flush().await.map_err(FetchError::Storage)?;
        drop(file);

        if planned > 0 && written < planned {
            return Err(FetchError::Truncated {
                expected: planned,
                received: written,
            });
        }

        self.fs
            .rename_file(&part, &job.path)
            .await
            .map_err(FetchError::Storage)?;
        progress.on_end(job.id)?;
        Ok(written)
    }

    /// Ensures the parent directory exists for a segment path.
    async fn ensure_parent_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.fs.create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use crate::progress::NoProgress;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[test]
    fn part_path_appends_extension() {
        assert_eq!(
            part_path(Path::new("work/00001.ts")),
            PathBuf::from("work/00001.ts.part")
        );
        assert_eq!(part_path(Path::new("a.ts")), PathBuf::from("a.ts.part"));
    }

    #[test]
    fn rate_limit_builds_limiter() {
        let http = reqwest::Client::new();
        let limited = Fetcher::new(http.clone(), DownloadConfig::new().with_rate_limit(Some(4096)));
        assert!(limited.limiter.is_some());
        let open = Fetcher::new(http, DownloadConfig::new());
        assert!(open.limiter.is_none());
        assert_eq!(open.policy.max_attempts, 5);
    }

    // =========================================================================
    // Mock-based cache tests
    // =========================================================================

    /// A mock file system holding only file sizes.
    struct MockFileSystem {
        files: Mutex<HashMap<PathBuf, u64>>,
    }

    impl MockFileSystem {
        fn with_file(path: impl Into<PathBuf>, size: u64) -> Self {
            Self {
                files: Mutex::new(HashMap::from([(path.into(), size)])),
            }
        }
    }

    #[async_trait::async_trait]
    impl FileSystem for MockFileSystem {
        async fn file_size(&self, path: &Path) -> Option<u64> {
            self.files.lock().unwrap().get(path).copied()
        }

        async fn create_dir_all(&self, _path: &Path) -> std::io::Result<()> {
            Ok(())
        }

        async fn create_file(&self, _path: &Path) -> std::io::Result<tokio::fs::File> {
            Err(std::io::Error::new(std::io::ErrorKind::Unsupported, "mock"))
        }

        async fn rename_file(&self, _from: &Path, _to: &Path) -> std::io::Result<()> {
            Ok(())
        }

        async fn remove_dir_all(&self, _path: &Path) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Records cached notifications and rejects everything else.
    #[derive(Default)]
    struct CacheOnly {
        cached: Mutex<Vec<(TaskId, u64)>>,
    }

    impl DownloadProgress for CacheOnly {
        fn on_start(&self, id: TaskId, _planned_size: u64) -> std::result::Result<(), LedgerError> {
            panic!("task {id} unexpectedly started")
        }

        fn on_advance(&self, id: TaskId, _delta: u64) -> std::result::Result<(), LedgerError> {
            panic!("task {id} unexpectedly advanced")
        }

        fn on_cached(&self, id: TaskId, size: u64) -> std::result::Result<(), LedgerError> {
            self.cached.lock().unwrap().push((id, size));
            Ok(())
        }

        fn on_abort(&self, id: TaskId) -> std::result::Result<(), LedgerError> {
            panic!("task {id} unexpectedly aborted")
        }

        fn on_end(&self, id: TaskId) -> std::result::Result<(), LedgerError> {
            panic!("task {id} unexpectedly ended")
        }
    }

    #[tokio::test]
    async fn cached_segment_is_not_requested() {
        let fs = MockFileSystem::with_file("/w/00003.ts", 4242);
        let fetcher = Fetcher::with_fs(reqwest::Client::new(), DownloadConfig::default(), fs);
        // Unroutable URL: any request attempt would fail the test.
        let job = FetchJob {
            id: 3,
            url: Url::parse("http://0.0.0.0:1/never.ts").unwrap(),
            path: PathBuf::from("/w/00003.ts"),
        };
        let progress = CacheOnly::default();

        let outcome = fetcher.fetch(&job, &progress).await.unwrap();

        assert!(outcome.cached);
        assert_eq!(outcome.bytes, 4242);
        assert_eq!(outcome.attempts, 0);
        assert_eq!(*progress.cached.lock().unwrap(), vec![(3, 4242)]);
    }

    #[tokio::test]
    async fn empty_batch_is_ok() {
        let fetcher = Fetcher::new(reqwest::Client::new(), DownloadConfig::default());
        let stats = fetcher.fetch_all(&[], &NoProgress).await.unwrap();
        assert_eq!(stats.segments(), 0);
    }

    #[tokio::test]
    async fn unreachable_host_exhausts_budget() {
        let dir = tempfile::TempDir::new().unwrap();
        let fetcher = Fetcher::new(
            reqwest::Client::new(),
            DownloadConfig::new().with_retries(2),
        );
        // Port 1 on localhost refuses connections.
        let job = FetchJob {
            id: 0,
            url: Url::parse("http://127.0.0.1:1/0.ts").unwrap(),
            path: dir.path().join("00000.ts"),
        };

        let err = fetcher.fetch(&job, &NoProgress).await.unwrap_err();
        match err {
            Error::DownloadFailed { attempts, .. } => assert_eq!(attempts, 2),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!job.path.exists());
    }
}
