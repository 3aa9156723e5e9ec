//! One requested time range, from playlist to joined media file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::Result;
use crate::fetch::{FetchJob, Fetcher};
use crate::fs::{FileSystem, TokioFileSystem};
use crate::muxer::{MediaMetadata, Muxer};
use crate::planner::{Segment, plan};
use crate::playlist::{Playlist, cache_dir_for};
use crate::progress::{Progress, SharedProgress, StatusSink};
use crate::remap::{remap, write_manifest};
use crate::stats::{BatchStats, BatchStatsBuilder};

/// Copy of the playlist as served, kept next to the segments.
pub const ORIGINAL_PLAYLIST: &str = "playlist.m3u8";

/// Playlist rewritten to reference the local segments; handed to the muxer.
pub const LOCAL_PLAYLIST: &str = "playlist_downloaded.m3u8";

/// Local file name of the segment at `position` in the full playlist.
///
/// Every range of a stream shares one segment directory, so the name depends
/// only on the segment itself, never on the range being fetched.
#[must_use]
pub fn segment_file_name(position: usize) -> String {
    format!("{position:05}.ts")
}

/// Maps each segment id to the playlist position of its first occurrence.
fn first_positions(segments: &[Segment]) -> HashMap<&str, usize> {
    let mut positions = HashMap::new();
    for (position, segment) in segments.iter().enumerate() {
        positions.entry(segment.id.as_str()).or_insert(position);
    }
    positions
}

/// What to download and where to put the result.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub playlist: Playlist,
    /// Range start in seconds; `None` means the beginning.
    pub start: Option<f64>,
    /// Range end in seconds (exclusive); `None` means the end.
    pub end: Option<f64>,
    /// Output media file.
    pub target: PathBuf,
    pub metadata: MediaMetadata,
}

impl BatchRequest {
    #[must_use]
    pub fn new(playlist: Playlist, target: impl Into<PathBuf>) -> Self {
        Self {
            playlist,
            start: None,
            end: None,
            target: target.into(),
            metadata: MediaMetadata::default(),
        }
    }

    #[must_use]
    pub fn with_range(mut self, start: Option<f64>, end: Option<f64>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: MediaMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Runs batches: plan, fetch, remap, join.
pub struct Batch {
    config: AppConfig,
    fetcher: Fetcher,
    muxer: Arc<dyn Muxer>,
    status: Arc<dyn StatusSink>,
    fs: TokioFileSystem,
}

impl Batch {
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        config: AppConfig,
        muxer: Arc<dyn Muxer>,
        status: Arc<dyn StatusSink>,
    ) -> Self {
        let fetcher = Fetcher::new(http, config.download.clone());
        Self {
            config,
            fetcher,
            muxer,
            status,
            fs: TokioFileSystem,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Downloads the requested range and joins it into `request.target`.
    ///
    /// An empty range completes immediately without running the muxer. On
    /// failure the segment directory is left as is.
    ///
    /// # Errors
    ///
    /// Returns the first fetch, I/O, or muxer failure.
    pub async fn run(&self, request: &BatchRequest) -> Result<BatchStats> {
        let playlist = &request.playlist;
        let segments = playlist.segments();
        let planned = plan(&segments, request.start, request.end);
        if planned.is_empty() {
            log::info!("Nothing to download for {}", playlist.url());
            self.status.message("Done");
            return Ok(BatchStatsBuilder::new().build());
        }

        let cache_dir = self.prepare_cache_dir(playlist).await?;
        log::info!(
            "Downloading {} segment(s) of {} into {}",
            planned.len(),
            playlist.url(),
            cache_dir.display()
        );

        let positions = first_positions(&segments);
        let mut jobs = Vec::with_capacity(planned.len());
        let mut local_paths = HashMap::with_capacity(planned.len());
        for (index, id) in planned.iter().enumerate() {
            let position = positions.get(id.as_str()).copied().unwrap_or(index);
            let path = cache_dir.join(segment_file_name(position));
            jobs.push(FetchJob {
                id: index,
                url: playlist.segment_url(id)?,
                path: path.clone(),
            });
            local_paths.insert(id.clone(), path);
        }

        let progress = SharedProgress::new(Progress::from_config(
            planned.len(),
            &self.config.download,
            Arc::clone(&self.status),
        ));
        let stats = self.fetcher.fetch_all(&jobs, &progress).await?;
        progress.flush();

        let local = remap(playlist.media(), &planned, &local_paths)?;
        let manifest = cache_dir.join(LOCAL_PLAYLIST);
        write_manifest(&local, &manifest).await?;

        progress.message("Creating video file...");
        self.ensure_parent_dir(&request.target).await?;
        self.muxer
            .join(
                &manifest,
                &request.target,
                &request.metadata,
                self.config.download.overwrite,
            )
            .await?;
        progress.message("Done");

        if self.config.download.keep_segments {
            log::debug!("Keeping segments in {}", cache_dir.display());
        } else {
            self.fs.remove_dir_all(&cache_dir).await?;
            log::debug!("Removed {}", cache_dir.display());
        }

        Ok(stats)
    }

    /// Creates the per-stream segment directory and saves the served playlist in it.
    async fn prepare_cache_dir(&self, playlist: &Playlist) -> Result<PathBuf> {
        let dir = cache_dir_for(&self.config.paths.work_dir, playlist.base_url());
        self.fs.create_dir_all(&dir).await?;
        // The manifest must stay valid wherever the muxer runs from.
        let dir = tokio::fs::canonicalize(&dir).await?;
        tokio::fs::write(dir.join(ORIGINAL_PLAYLIST), playlist.text()).await?;
        Ok(dir)
    }

    async fn ensure_parent_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.fs.create_dir_all(parent).await?;
        }
        Ok(())
    }
}
