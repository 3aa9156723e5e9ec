//! Download statistics for batches and sessions.

use std::time::{Duration, Instant};

use crate::fetch::FetchOutcome;

/// Statistics for one completed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Segments fetched over the network.
    pub segments_downloaded: usize,
    /// Segments satisfied from the local cache.
    pub segments_cached: usize,
    /// Bytes fetched over the network.
    pub bytes_downloaded: u64,
    /// Bytes found in the local cache.
    pub bytes_cached: u64,
    /// Wall time spent fetching.
    pub elapsed: Duration,
    /// Fastest single-segment transfer in bytes per second.
    pub peak_speed: u64,
}

impl BatchStats {
    /// Total segments accounted for.
    #[must_use]
    pub const fn segments(&self) -> usize {
        self.segments_downloaded + self.segments_cached
    }

    /// Average network throughput in bytes per second.
    #[must_use]
    pub fn average_speed(&self) -> u64 {
        bytes_per_sec(self.bytes_downloaded, self.elapsed)
    }
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn bytes_per_sec(bytes: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        (bytes as f64 / secs) as u64
    } else {
        0
    }
}

/// Accumulates fetch outcomes into [`BatchStats`].
pub struct BatchStatsBuilder {
    stats: BatchStats,
    start_time: Instant,
}

impl Default for BatchStatsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchStatsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            stats: BatchStats::default(),
            start_time: Instant::now(),
        }
    }

    /// Records one finished segment.
    pub fn add(&mut self, outcome: &FetchOutcome) {
        if outcome.cached {
            self.stats.segments_cached += 1;
            self.stats.bytes_cached += outcome.bytes;
        } else {
            self.stats.segments_downloaded += 1;
            self.stats.bytes_downloaded += outcome.bytes;
            self.stats.peak_speed = self
                .stats
                .peak_speed
                .max(bytes_per_sec(outcome.bytes, outcome.elapsed));
        }
    }

    #[must_use]
    pub fn build(mut self) -> BatchStats {
        self.stats.elapsed = self.start_time.elapsed();
        self.stats
    }
}

/// Statistics for a whole session of batches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Batches that were joined successfully.
    pub batches_completed: usize,
    /// Batches that ended in an error.
    pub batches_failed: usize,
    pub segments_downloaded: usize,
    pub segments_cached: usize,
    pub bytes_downloaded: u64,
    pub elapsed: Duration,
    /// Peak per-segment speed across all batches.
    pub peak_speed: u64,
}

impl SessionStats {
    /// Average network throughput in bytes per second.
    #[must_use]
    pub fn average_speed(&self) -> u64 {
        bytes_per_sec(self.bytes_downloaded, self.elapsed)
    }
}

/// Builder for accumulating session statistics across batches.
pub struct SessionStatsBuilder {
    stats: SessionStats,
    start_time: Instant,
}

impl Default for SessionStatsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStatsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            stats: SessionStats::default(),
            start_time: Instant::now(),
        }
    }

    /// Records a batch that completed.
    pub fn add_batch(&mut self, batch: &BatchStats) {
        self.stats.batches_completed += 1;
        self.stats.segments_downloaded += batch.segments_downloaded;
        self.stats.segments_cached += batch.segments_cached;
        self.stats.bytes_downloaded += batch.bytes_downloaded;
        self.stats.peak_speed = self.stats.peak_speed.max(batch.peak_speed);
    }

    /// Records a batch that failed.
    pub const fn add_failure(&mut self) {
        self.stats.batches_failed += 1;
    }

    #[must_use]
    pub fn build(mut self) -> SessionStats {
        self.stats.elapsed = self.start_time.elapsed();
        self.stats
    }
}
