//! Shared download statistics and progress reporting
//!
//! Workers never render anything. They mutate [`DownloadStats`] through
//! [`SharedStats`] (one lock per stage run), take a [`StatsSnapshot`] while
//! holding it, release the lock and only then publish a [`ProgressUpdate`]
//! on the run's channel. A single [`ProgressAggregator`] drains the channel,
//! so renderers see updates from one task and never need to be re-entrant.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use super::models::SongTask;

/// Percentage reported once the playlist has been resolved
pub const CATALOG_LOADED_PERCENT: f64 = 10.0;
/// Percentage reported after the transcoder probe
pub const CAPABILITY_PERCENT: f64 = 15.0;

/// Minimum interval between two speed samples of the same worker
const SPEED_SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// Sub-range of the overall 0..=100 bar owned by one stage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressRange {
    pub start: f64,
    pub end: f64,
}

impl ProgressRange {
    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Map a completion fraction in 0..=1 into this range
    pub fn at(&self, fraction: f64) -> f64 {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.start + (self.end - self.start) * fraction
    }

    /// Map `done` out of `total` into this range
    pub fn at_count(&self, done: usize, total: usize) -> f64 {
        if total == 0 {
            return self.end;
        }
        self.at(done as f64 / total as f64)
    }
}

/// A task that could not be fetched
#[derive(Debug, Clone, PartialEq)]
pub struct FailedTask {
    pub task: SongTask,
    pub reason: String,
}

/// Statistics of one download stage run
#[derive(Debug, Clone)]
pub struct DownloadStats {
    pub started_at: DateTime<Utc>,
    pub start: Instant,
    /// Number of tasks handed to the stage
    pub total: usize,
    pub total_bytes: u64,
    pub downloaded_bytes: u64,
    /// Bytes per second, from the most recent sample
    pub current_speed: f64,
    pub successful: Vec<SongTask>,
    pub failed: Vec<FailedTask>,
    /// Labels of the tasks transferring right now, keyed by task index
    pub in_progress: HashMap<usize, String>,
    pub completed: usize,
    settled: HashSet<usize>,
}

/// Per-worker byte accounting, owned by the worker and updated under the stats lock
#[derive(Debug, Clone)]
pub struct TransferMeter {
    last_downloaded: u64,
    last_total: u64,
    counted: u64,
    sample_at: Instant,
    sample_bytes: u64,
}

impl TransferMeter {
    pub fn new(now: Instant) -> Self {
        Self {
            last_downloaded: 0,
            last_total: 0,
            counted: 0,
            sample_at: now,
            sample_bytes: 0,
        }
    }
}

impl DownloadStats {
    pub fn new(total: usize) -> Self {
        Self {
            started_at: Utc::now(),
            start: Instant::now(),
            total,
            total_bytes: 0,
            downloaded_bytes: 0,
            current_speed: 0.0,
            successful: Vec::new(),
            failed: Vec::new(),
            in_progress: HashMap::new(),
            completed: 0,
            settled: HashSet::new(),
        }
    }

    /// Mark a task as transferring
    pub fn begin(&mut self, task: &SongTask) {
        if !self.settled.contains(&task.index) {
            self.in_progress.insert(task.index, task.label());
        }
    }

    /// Fold one progress report of a worker into the totals
    ///
    /// `downloaded` is the cumulative byte count the fetch tool reports for the
    /// current file. Only the delta since the worker's previous report is added.
    pub fn apply_transfer(
        &mut self,
        meter: &mut TransferMeter,
        downloaded: u64,
        total: Option<u64>,
        now: Instant,
    ) {
        // A smaller cumulative value means the tool moved on to another stream.
        // The finished stream keeps both its bytes and its size in the totals.
        let delta = if downloaded >= meter.last_downloaded {
            downloaded - meter.last_downloaded
        } else {
            meter.last_total = 0;
            downloaded
        };
        meter.last_downloaded = downloaded;
        meter.counted += delta;
        self.downloaded_bytes += delta;

        if let Some(total) = total {
            if total != meter.last_total {
                self.total_bytes = self.total_bytes.saturating_sub(meter.last_total) + total;
                meter.last_total = total;
            }
        }

        let elapsed = now.saturating_duration_since(meter.sample_at);
        if elapsed >= SPEED_SAMPLE_INTERVAL {
            let bytes = meter.counted - meter.sample_bytes;
            self.current_speed = bytes as f64 / elapsed.as_secs_f64();
            meter.sample_at = now;
            meter.sample_bytes = meter.counted;
        }
    }

    /// Record a successful task. Returns false if the task had already settled.
    pub fn settle_success(&mut self, task: SongTask) -> bool {
        if !self.settled.insert(task.index) {
            return false;
        }
        self.in_progress.remove(&task.index);
        self.successful.push(task);
        self.completed += 1;
        true
    }

    /// Record a failed task. Returns false if the task had already settled.
    pub fn settle_failure(&mut self, task: SongTask, reason: impl Into<String>) -> bool {
        if !self.settled.insert(task.index) {
            return false;
        }
        self.in_progress.remove(&task.index);
        self.failed.push(FailedTask {
            task,
            reason: reason.into(),
        });
        self.completed += 1;
        true
    }

    pub fn is_settled(&self, task: &SongTask) -> bool {
        self.settled.contains(&task.index)
    }

    pub fn completed_fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.completed as f64 / self.total as f64
    }

    /// Remaining time extrapolated from the completed fraction
    pub fn eta(&self, now: Instant) -> Option<Duration> {
        let fraction = self.completed_fraction();
        if self.completed == 0 || fraction <= 0.0 {
            return None;
        }
        let elapsed = now.saturating_duration_since(self.start).as_secs_f64();
        let remaining = (elapsed / fraction - elapsed).max(0.0);
        Some(Duration::from_secs_f64(remaining))
    }

    pub fn snapshot(&self, now: Instant) -> StatsSnapshot {
        StatsSnapshot {
            total: self.total,
            completed: self.completed,
            successful: self.successful.len(),
            failed: self.failed.len(),
            in_progress: self.in_progress.len(),
            total_bytes: self.total_bytes,
            downloaded_bytes: self.downloaded_bytes,
            current_speed: self.current_speed,
            elapsed: now.saturating_duration_since(self.start),
            eta: self.eta(now),
        }
    }
}

/// Point-in-time copy of the counters, safe to hand to renderers
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub total: usize,
    pub completed: usize,
    pub successful: usize,
    pub failed: usize,
    pub in_progress: usize,
    pub total_bytes: u64,
    pub downloaded_bytes: u64,
    pub current_speed: f64,
    pub elapsed: Duration,
    pub eta: Option<Duration>,
}

/// The stats lock: one per stage run, cloned into every worker
#[derive(Debug, Clone)]
pub struct SharedStats {
    inner: Arc<Mutex<DownloadStats>>,
}

impl SharedStats {
    pub fn new(total: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(DownloadStats::new(total))),
        }
    }

    /// Lock the stats. A panicked worker never leaves an update half done,
    /// so a poisoned lock still holds consistent counters.
    pub fn lock(&self) -> MutexGuard<'_, DownloadStats> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` under the lock and return a snapshot taken before releasing it
    pub fn update<R>(&self, f: impl FnOnce(&mut DownloadStats) -> R) -> (R, StatsSnapshot) {
        let mut stats = self.lock();
        let result = f(&mut stats);
        let snapshot = stats.snapshot(Instant::now());
        (result, snapshot)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.lock().snapshot(Instant::now())
    }

    /// Final copy of the stats once all workers are done
    pub fn into_stats(self) -> DownloadStats {
        match Arc::try_unwrap(self.inner) {
            Ok(mutex) => mutex.into_inner().unwrap_or_else(PoisonError::into_inner),
            Err(shared) => shared.lock().unwrap_or_else(PoisonError::into_inner).clone(),
        }
    }
}

/// One progress event
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub message: String,
    pub percent: f64,
    pub stats: Option<StatsSnapshot>,
}

/// Publishing side of the progress channel
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: Option<mpsc::UnboundedSender<ProgressUpdate>>,
}

impl ProgressReporter {
    pub fn new(tx: mpsc::UnboundedSender<ProgressUpdate>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A reporter that drops every update
    #[cfg(test)]
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn send(&self, message: impl Into<String>, percent: f64, stats: Option<StatsSnapshot>) {
        if let Some(tx) = &self.tx {
            // A closed channel just means nobody is watching anymore
            let _ = tx.send(ProgressUpdate {
                message: message.into(),
                percent: percent.clamp(0.0, 100.0),
                stats,
            });
        }
    }
}

/// Single consumer of a run's progress channel
///
/// Events from concurrent workers can arrive out of order, so the reported
/// percentage is clamped to never go backwards.
#[derive(Debug, Default)]
pub struct ProgressAggregator {
    last_percent: f64,
    kind_counts: HashMap<String, usize>,
}

impl ProgressAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&mut self, mut update: ProgressUpdate) -> ProgressUpdate {
        if update.percent < self.last_percent {
            update.percent = self.last_percent;
        }
        self.last_percent = update.percent;
        *self
            .kind_counts
            .entry(message_kind(&update.message).to_string())
            .or_default() += 1;
        update
    }

    pub fn last_percent(&self) -> f64 {
        self.last_percent
    }

    /// Number of updates seen whose message starts with `kind` (e.g. "Found")
    pub fn count(&self, kind: &str) -> usize {
        self.kind_counts.get(kind).copied().unwrap_or(0)
    }

    /// Drain `rx` until every sender is gone, rendering each update
    pub async fn drain<F>(
        mut self,
        mut rx: mpsc::UnboundedReceiver<ProgressUpdate>,
        mut render: F,
    ) -> Self
    where
        F: FnMut(&ProgressUpdate),
    {
        while let Some(update) = rx.recv().await {
            let update = self.accept(update);
            render(&update);
        }
        self
    }
}

fn message_kind(message: &str) -> &str {
    message.split(':').next().unwrap_or(message).trim()
}

/// Format an ETA as minutes and seconds
pub fn format_eta(eta: Option<Duration>) -> String {
    match eta {
        Some(eta) => {
            let secs = eta.as_secs();
            format!("ETA: {}m {}s", secs / 60, secs % 60)
        }
        None => "Calculating...".to_string(),
    }
}

/// Format a bytes-per-second rate in megabits per second
pub fn format_speed(bytes_per_sec: f64) -> String {
    format!("{:.2} Mbps", bytes_per_sec / (1024.0 * 1024.0) * 8.0)
}
