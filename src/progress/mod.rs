//! Aggregate progress across all segment downloads of a batch.
//!
//! [`Progress`] owns the task ledger and the throughput sample window. The
//! fetch engine reports lifecycle events through the [`DownloadProgress`]
//! trait; [`SharedProgress`] applies them under a single lock so that
//! concurrent workers never interleave a read-modify-write of the totals.

mod sample;
mod sink;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use console::style;

use crate::config::DownloadConfig;
use crate::error::LedgerError;
use crate::format::{format_bytes, format_clock};

pub use sample::{Sample, SampleWindow};
pub use sink::{CallbackStatus, NoStatus, StatusSink, TerminalStatus};

/// Identifier of one segment download within a batch.
pub type TaskId = usize;

/// Default number of retained throughput samples.
pub const DEFAULT_SAMPLE_CAPACITY: usize = 100;

/// Default minimum interval between renders.
pub const DEFAULT_RENDER_INTERVAL: Duration = Duration::from_millis(100);

/// Per-segment download state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadTask {
    pub id: TaskId,
    /// Expected size in bytes; zero when the server did not announce one.
    pub planned_size: u64,
    pub downloaded: u64,
    /// Set by `end` and `already_cached`; no further events are accepted.
    pub finished: bool,
}

/// Snapshot of the aggregate figures.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressState {
    /// Number of segments planned for the batch.
    pub item_count: usize,
    /// Segments finished or found in the cache.
    pub items_completed: usize,
    /// Sum of `downloaded` over the ledger.
    pub bytes_so_far: u64,
    /// Mean known segment size times `item_count`.
    pub estimated_total: Option<u64>,
    pub percent: Option<u8>,
    /// Bytes per second over the sample window.
    pub speed: Option<f64>,
    /// Seconds remaining at the current speed.
    pub eta: Option<u64>,
}

/// Monotonic time source for samples and render throttling.
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;
}

/// Wall clock anchored at construction.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Hand-driven clock, for deterministic speed and throttle behaviour.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        *lock(&self.now) += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *lock(&self.now)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Progress aggregator for one batch.
pub struct Progress {
    item_count: usize,
    tasks: BTreeMap<TaskId, DownloadTask>,
    items_completed: usize,
    bytes_so_far: u64,
    /// Bytes received over the network; never decreases, feeds the samples.
    transferred: u64,
    estimated_total: Option<u64>,
    percent: Option<u8>,
    speed: Option<f64>,
    eta: Option<u64>,
    samples: SampleWindow,
    clock: Box<dyn Clock>,
    sink: Arc<dyn StatusSink>,
    render_interval: Duration,
    last_render: Option<Duration>,
}

impl Progress {
    /// Creates a tracker for `item_count` segments with default settings.
    #[must_use]
    pub fn new(item_count: usize, sink: Arc<dyn StatusSink>) -> Self {
        Self {
            item_count,
            tasks: BTreeMap::new(),
            items_completed: 0,
            bytes_so_far: 0,
            transferred: 0,
            estimated_total: None,
            percent: None,
            speed: None,
            eta: None,
            samples: SampleWindow::new(DEFAULT_SAMPLE_CAPACITY),
            clock: Box::new(SystemClock::new()),
            sink,
            render_interval: DEFAULT_RENDER_INTERVAL,
            last_render: None,
        }
    }

    /// Creates a tracker using the sample capacity and render interval from `config`.
    #[must_use]
    pub fn from_config(item_count: usize, config: &DownloadConfig, sink: Arc<dyn StatusSink>) -> Self {
        Self::new(item_count, sink)
            .with_sample_capacity(config.sample_capacity)
            .with_render_interval(config.render_interval())
    }

    #[must_use]
    pub fn with_sample_capacity(mut self, capacity: usize) -> Self {
        self.samples = SampleWindow::new(capacity);
        self
    }

    #[must_use]
    pub fn with_render_interval(mut self, interval: Duration) -> Self {
        self.render_interval = interval;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Registers a segment download that has just begun.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::AlreadyStarted`] if `id` is already registered.
    pub fn start(&mut self, id: TaskId, planned_size: u64) -> Result<(), LedgerError> {
        if self.tasks.contains_key(&id) {
            return Err(LedgerError::AlreadyStarted(id));
        }
        self.tasks.insert(
            id,
            DownloadTask {
                id,
                planned_size,
                downloaded: 0,
                finished: false,
            },
        );
        self.calculate_total();
        self.calculate_progress();
        self.render();
        Ok(())
    }

    /// Records `delta` freshly downloaded bytes for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotStarted`] if `id` is unknown, or
    /// [`LedgerError::AlreadyFinished`] if it has already ended.
    pub fn advance(&mut self, id: TaskId, delta: u64) -> Result<(), LedgerError> {
        let task = self.tasks.get_mut(&id).ok_or(LedgerError::NotStarted {
            id,
            action: "advance",
        })?;
        if task.finished {
            return Err(LedgerError::AlreadyFinished {
                id,
                action: "advance",
            });
        }
        task.downloaded += delta;
        self.bytes_so_far += delta;
        self.transferred += delta;
        let timestamp = self.clock.now().as_secs_f64();
        self.samples.push(Sample {
            downloaded: self.transferred,
            timestamp,
        });
        self.calculate_progress();
        self.render();
        Ok(())
    }

    /// Registers a segment satisfied from the local cache.
    ///
    /// No throughput sample is recorded for it.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::AlreadyStarted`] if `id` is already registered.
    pub fn already_cached(&mut self, id: TaskId, size: u64) -> Result<(), LedgerError> {
        if self.tasks.contains_key(&id) {
            return Err(LedgerError::AlreadyStarted(id));
        }
        self.tasks.insert(
            id,
            DownloadTask {
                id,
                planned_size: size,
                downloaded: size,
                finished: true,
            },
        );
        self.bytes_so_far += size;
        self.items_completed += 1;
        self.calculate_total();
        self.calculate_progress();
        self.render();
        Ok(())
    }

    /// Drops a failed attempt from the ledger.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotStarted`] if `id` is unknown, or
    /// [`LedgerError::AlreadyFinished`] if it has already ended.
    pub fn abort(&mut self, id: TaskId) -> Result<(), LedgerError> {
        match self.tasks.get(&id) {
            None => return Err(LedgerError::NotStarted { id, action: "abort" }),
            Some(task) if task.finished => {
                return Err(LedgerError::AlreadyFinished { id, action: "abort" });
            }
            Some(_) => {}
        }
        self.tasks.remove(&id);
        self.bytes_so_far = self.tasks.values().map(|t| t.downloaded).sum();
        self.calculate_total();
        self.calculate_progress();
        self.render();
        Ok(())
    }

    /// Marks `id` as completely downloaded.
    ///
    /// A size mismatch against the planned size is logged, not rejected. A
    /// task started without a planned size adopts its downloaded size.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotStarted`] if `id` is unknown, or
    /// [`LedgerError::AlreadyFinished`] if it has already ended.
    pub fn end(&mut self, id: TaskId) -> Result<(), LedgerError> {
        let task = self
            .tasks
            .get_mut(&id)
            .ok_or(LedgerError::NotStarted { id, action: "end" })?;
        if task.finished {
            return Err(LedgerError::AlreadyFinished { id, action: "end" });
        }
        task.finished = true;
        if task.planned_size == 0 {
            task.planned_size = task.downloaded;
            self.calculate_total();
            self.calculate_progress();
        } else if task.planned_size != task.downloaded {
            log::warn!(
                "Task {id} ended with {}b downloaded, expected {}b",
                task.downloaded,
                task.planned_size
            );
        }
        self.items_completed += 1;
        self.render();
        Ok(())
    }

    /// Current aggregate figures.
    #[must_use]
    pub fn state(&self) -> ProgressState {
        ProgressState {
            item_count: self.item_count,
            items_completed: self.items_completed,
            bytes_so_far: self.bytes_so_far,
            estimated_total: self.estimated_total,
            percent: self.percent,
            speed: self.speed,
            eta: self.eta,
        }
    }

    /// Registered tasks in id order.
    pub fn tasks(&self) -> impl Iterator<Item = &DownloadTask> {
        self.tasks.values()
    }

    #[must_use]
    pub fn task(&self, id: TaskId) -> Option<&DownloadTask> {
        self.tasks.get(&id)
    }

    #[must_use]
    pub const fn samples(&self) -> &SampleWindow {
        &self.samples
    }

    /// Bytes received over the network, excluding cached segments.
    #[must_use]
    pub const fn transferred(&self) -> u64 {
        self.transferred
    }

    /// Renders immediately, bypassing the throttle.
    pub fn flush(&mut self) {
        self.last_render = Some(self.clock.now());
        self.emit();
    }

    /// Sends a free-form status message to the sink.
    pub fn message(&self, text: &str) {
        self.sink.message(text);
    }

    /// The status line as it would currently be rendered.
    #[must_use]
    pub fn status_line(&self) -> String {
        let mut parts = vec![
            format!(
                "Downloaded {}/{} segments",
                self.items_completed, self.item_count
            ),
            style(format!("{}%", self.percent.unwrap_or(0))).blue().to_string(),
        ];
        if let Some(total) = self.estimated_total {
            parts.push(format!("of {}", style(format!("~{}", format_bytes(total))).blue()));
        }
        if let Some(speed) = self.speed.filter(|s| *s > 0.0) {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let speed = speed as u64;
            parts.push(format!("at {}", style(format!("{}/s", format_bytes(speed))).blue()));
        }
        if let Some(eta) = self.eta {
            parts.push(format!("ETA {}", style(format_clock(eta)).blue()));
        }
        parts.join(" ")
    }

    fn calculate_total(&mut self) {
        let known: Vec<u64> = self
            .tasks
            .values()
            .map(|t| t.planned_size)
            .filter(|size| *size > 0)
            .collect();
        self.estimated_total = if known.is_empty() {
            None
        } else {
            let sum: u128 = known.iter().map(|s| u128::from(*s)).sum();
            let total = sum * self.item_count as u128 / known.len() as u128;
            u64::try_from(total).ok().filter(|t| *t > 0)
        };
    }

    fn calculate_progress(&mut self) {
        self.speed = self.samples.speed();
        self.percent = self.estimated_total.map(|total| {
            let pct = u128::from(self.bytes_so_far) * 100 / u128::from(total);
            u8::try_from(pct.min(100)).unwrap_or(100)
        });
        self.eta = match (self.estimated_total, self.speed) {
            (Some(total), Some(speed)) if speed > 0.0 => {
                #[allow(
                    clippy::cast_precision_loss,
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss
                )]
                let eta = (total.saturating_sub(self.bytes_so_far) as f64 / speed) as u64;
                Some(eta)
            }
            _ => None,
        };
    }

    fn render(&mut self) {
        let now = self.clock.now();
        if let Some(last) = self.last_render
            && now.saturating_sub(last) < self.render_interval
        {
            return;
        }
        self.last_render = Some(now);
        self.emit();
    }

    fn emit(&self) {
        let line = self.status_line();
        let plain = console::strip_ansi_codes(&line);
        self.sink.render(&line, &plain);
    }
}

/// Receiver of per-segment lifecycle events from the fetch engine.
pub trait DownloadProgress: Send + Sync {
    /// A download attempt received its response headers.
    ///
    /// # Errors
    ///
    /// Ledger protocol violations.
    fn on_start(&self, id: TaskId, planned_size: u64) -> Result<(), LedgerError>;

    /// Bytes were written for an attempt.
    ///
    /// # Errors
    ///
    /// Ledger protocol violations.
    fn on_advance(&self, id: TaskId, delta: u64) -> Result<(), LedgerError>;

    /// The segment was already on disk.
    ///
    /// # Errors
    ///
    /// Ledger protocol violations.
    fn on_cached(&self, id: TaskId, size: u64) -> Result<(), LedgerError>;

    /// An attempt failed after it was started.
    ///
    /// # Errors
    ///
    /// Ledger protocol violations.
    fn on_abort(&self, id: TaskId) -> Result<(), LedgerError>;

    /// The segment is complete.
    ///
    /// # Errors
    ///
    /// Ledger protocol violations.
    fn on_end(&self, id: TaskId) -> Result<(), LedgerError>;
}

/// A progress receiver that ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl DownloadProgress for NoProgress {
    fn on_start(&self, _id: TaskId, _planned_size: u64) -> Result<(), LedgerError> {
        Ok(())
    }

    fn on_advance(&self, _id: TaskId, _delta: u64) -> Result<(), LedgerError> {
        Ok(())
    }

    fn on_cached(&self, _id: TaskId, _size: u64) -> Result<(), LedgerError> {
        Ok(())
    }

    fn on_abort(&self, _id: TaskId) -> Result<(), LedgerError> {
        Ok(())
    }

    fn on_end(&self, _id: TaskId) -> Result<(), LedgerError> {
        Ok(())
    }
}

/// [`Progress`] behind a mutex, shareable between workers.
#[derive(Clone)]
pub struct SharedProgress {
    inner: Arc<Mutex<Progress>>,
}

impl SharedProgress {
    #[must_use]
    pub fn new(progress: Progress) -> Self {
        Self {
            inner: Arc::new(Mutex::new(progress)),
        }
    }

    /// Snapshot of the aggregate figures.
    #[must_use]
    pub fn state(&self) -> ProgressState {
        lock(&self.inner).state()
    }

    /// Runs `f` with exclusive access to the tracker.
    pub fn with<R>(&self, f: impl FnOnce(&mut Progress) -> R) -> R {
        f(&mut lock(&self.inner))
    }

    pub fn flush(&self) {
        lock(&self.inner).flush();
    }

    pub fn message(&self, text: &str) {
        lock(&self.inner).message(text);
    }
}

impl DownloadProgress for SharedProgress {
    fn on_start(&self, id: TaskId, planned_size: u64) -> Result<(), LedgerError> {
        lock(&self.inner).start(id, planned_size)
    }

    fn on_advance(&self, id: TaskId, delta: u64) -> Result<(), LedgerError> {
        lock(&self.inner).advance(id, delta)
    }

    fn on_cached(&self, id: TaskId, size: u64) -> Result<(), LedgerError> {
        lock(&self.inner).already_cached(id, size)
    }

    fn on_abort(&self, id: TaskId) -> Result<(), LedgerError> {
        lock(&self.inner).abort(id)
    }

    fn on_end(&self, id: TaskId) -> Result<(), LedgerError> {
        lock(&self.inner).end(id)
    }
}
