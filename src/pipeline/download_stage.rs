//! Concurrent download of matched tasks
//!
//! Each matched task gets its own spawned worker, bounded by a semaphore.
//! A worker runs the fetch and drains its progress events side by side, folds
//! them into the shared stats and settles the task exactly once. Panics are
//! caught at the join handle and recorded as a failure of that task only.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, info, warn};

use super::capability::Capability;
use super::config::RunContext;
use super::models::SongTask;
use super::naming::output_template;
use super::progress::{
    DownloadStats, ProgressRange, ProgressReporter, SharedStats, StatsSnapshot, TransferMeter,
    format_eta, format_speed,
};
use crate::fetch::{FetchError, FetchEvent, FetchRequest, MediaFetcher};

/// Download every matched task and return the final stats
///
/// Tasks that aren't matched are ignored. Cancellation is checked before
/// each dispatch; workers already running are always awaited.
pub async fn fetch(
    tasks: Vec<SongTask>,
    concurrency_limit: usize,
    capability: &Capability,
    fetcher: Arc<dyn MediaFetcher>,
    reporter: &ProgressReporter,
    ctx: &RunContext,
) -> DownloadStats {
    let tasks: Vec<SongTask> = tasks.into_iter().filter(SongTask::is_matched).collect();
    let total = tasks.len();
    let config = &ctx.config;

    if tasks.is_empty() {
        reporter.send("No songs to download", 100.0, None);
        return DownloadStats::new(0);
    }

    if capability.available {
        info!("Downloading {} songs as {}", total, config.audio_format);
    } else {
        info!("Downloading {} songs in their native format", total);
    }

    let stats = SharedStats::new(total);
    let semaphore = Arc::new(Semaphore::new(concurrency_limit.max(1)));
    let mut handles = Vec::with_capacity(total);

    for (pos, task) in tasks.into_iter().enumerate() {
        if ctx.cancel.is_cancelled() {
            break;
        }
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        // Waiting for a slot can take minutes
        if ctx.cancel.is_cancelled() {
            break;
        }

        let request = build_request(&task, capability, ctx);
        let worker = Worker {
            stats: stats.clone(),
            reporter: reporter.clone(),
            fetcher: fetcher.clone(),
            range: config.download_progress,
            timeout: config.fetch_timeout,
            position: pos + 1,
            total,
        };

        let settle_task = task.clone();
        let handle = tokio::spawn(async move {
            let _permit = permit;
            worker.run(task, request).await;
        });
        handles.push((settle_task, handle));
    }

    if handles.len() < total {
        info!(
            "Download cancelled, {} songs not started",
            total - handles.len()
        );
    }

    let range = config.download_progress;
    for (task, handle) in handles {
        if let Err(e) = handle.await {
            warn!("Download worker for {} died: {}", task.label(), e);
            let label = task.label();
            let (settled, snapshot) =
                stats.update(|stats| stats.settle_failure(task, format!("worker died: {}", e)));
            if settled {
                reporter.send(
                    format!("Error: Could not download {} - worker died", label),
                    range.at(snapshot.completed as f64 / total as f64),
                    Some(snapshot),
                );
            }
        }
    }

    let stats = stats.into_stats();
    info!(
        "Downloads finished: {} successful, {} failed",
        stats.successful.len(),
        stats.failed.len()
    );
    stats
}

fn build_request(task: &SongTask, capability: &Capability, ctx: &RunContext) -> FetchRequest {
    let config = &ctx.config;
    FetchRequest {
        url: task.resolved_url.clone().unwrap_or_default(),
        output_template: output_template(&config.output_dir, &task.entry, config.name_order),
        audio_format: config.audio_format.clone(),
        transcode: capability.available,
        transcoder_path: capability.path.clone(),
        archive: config.archive.clone(),
    }
}

/// One spawned download
struct Worker {
    stats: SharedStats,
    reporter: ProgressReporter,
    fetcher: Arc<dyn MediaFetcher>,
    range: ProgressRange,
    timeout: Duration,
    /// 1-based dispatch position, for messages
    position: usize,
    total: usize,
}

impl Worker {
    async fn run(self, task: SongTask, request: FetchRequest) {
        let label = task.label();
        self.stats.update(|stats| stats.begin(&task));
        debug!("Fetching {} from {}", label, request.url);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let fetcher = self.fetcher.clone();
        let limit = self.timeout;

        // The sender moves into the fetch, so the drain ends when the fetch does
        let fetch = async move {
            match tokio::time::timeout(limit, fetcher.fetch(&request, tx)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout(limit.as_secs())),
            }
        };
        let drain = async {
            let mut meter = TransferMeter::new(Instant::now());
            while let Some(event) = rx.recv().await {
                self.handle_event(&task, &mut meter, event);
            }
        };

        let (result, ()) = tokio::join!(fetch, drain);

        match result {
            Ok(()) => {
                let (settled, snapshot) = self
                    .stats
                    .update(|stats| stats.settle_success(task.clone()));
                if settled {
                    debug!("Downloaded {}", label);
                    self.publish(
                        format!(
                            "Completed: {} ({}/{}) - {}",
                            label,
                            self.position,
                            self.total,
                            format_eta(snapshot.eta)
                        ),
                        0.0,
                        snapshot,
                    );
                }
            }
            Err(e) => self.fail(&task, e.to_string()),
        }
    }

    fn handle_event(&self, task: &SongTask, meter: &mut TransferMeter, event: FetchEvent) {
        let label = task.label();
        match event {
            FetchEvent::Downloading {
                downloaded_bytes,
                total_bytes,
            } => {
                let ((), snapshot) = self.stats.update(|stats| {
                    if !stats.is_settled(task) {
                        stats.apply_transfer(meter, downloaded_bytes, total_bytes, Instant::now());
                    }
                });
                let file_fraction = match total_bytes {
                    Some(total) if total > 0 => (downloaded_bytes as f64 / total as f64).min(1.0),
                    _ => 0.0,
                };
                self.publish(
                    format!(
                        "Downloading: {} ({}/{}) - {} - {}",
                        label,
                        self.position,
                        self.total,
                        format_speed(snapshot.current_speed),
                        format_eta(snapshot.eta)
                    ),
                    file_fraction,
                    snapshot,
                );
            }
            FetchEvent::Finished => {
                let snapshot = self.stats.snapshot();
                self.publish(
                    format!(
                        "Processing: {} ({}/{}) - {}",
                        label,
                        self.position,
                        self.total,
                        format_eta(snapshot.eta)
                    ),
                    1.0,
                    snapshot,
                );
            }
            FetchEvent::Error(message) => self.fail(task, message),
        }
    }

    /// Settle the task as failed, once
    fn fail(&self, task: &SongTask, reason: String) {
        let label = task.label();
        let (settled, snapshot) = self
            .stats
            .update(|stats| stats.settle_failure(task.clone(), reason.clone()));
        if settled {
            warn!("Failed to download {}: {}", label, reason);
            self.publish(
                format!("Error: Could not download {} - {}", label, reason),
                0.0,
                snapshot,
            );
        }
    }

    /// Publish with the stage percentage plus the current file's share
    fn publish(&self, message: String, file_fraction: f64, snapshot: StatsSnapshot) {
        let fraction = (snapshot.completed as f64 + file_fraction) / self.total.max(1) as f64;
        self.reporter
            .send(message, self.range.at(fraction), Some(snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::config::{CancelFlag, NameOrder};
    use crate::pipeline::progress::ProgressUpdate;
    use crate::pipeline::testing::{
        FakeFetcher, FetchBehavior, cancel_after, matched_tasks, test_context,
    };

    fn transcoder() -> Capability {
        Capability::found("/usr/bin/ffmpeg".into())
    }

    fn collect(mut rx: mpsc::UnboundedReceiver<ProgressUpdate>) -> Vec<ProgressUpdate> {
        let mut updates = Vec::new();
        while let Ok(update) = rx.try_recv() {
            updates.push(update);
        }
        updates
    }

    #[tokio::test]
    async fn test_all_succeed_with_bound() {
        let tasks = matched_tasks(5);
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.set_delay(Duration::from_millis(10));

        let stats = fetch(
            tasks,
            2,
            &transcoder(),
            fetcher.clone(),
            &ProgressReporter::disabled(),
            &test_context(),
        )
        .await;

        assert_eq!(stats.successful.len(), 5);
        assert!(stats.failed.is_empty());
        assert_eq!(stats.completed, 5);
        assert!(stats.in_progress.is_empty());
        assert!(fetcher.probe.max() <= 2);
        assert_eq!(fetcher.requests().len(), 5);
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let tasks = matched_tasks(3);
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.behave(
            tasks[1].resolved_url.as_deref().unwrap(),
            FetchBehavior::ErrorMidTransfer,
        );

        let stats = fetch(
            tasks.clone(),
            3,
            &transcoder(),
            fetcher,
            &ProgressReporter::disabled(),
            &test_context(),
        )
        .await;

        assert_eq!(stats.failed.len(), 1);
        assert_eq!(stats.failed[0].task.index, tasks[1].index);
        assert_eq!(stats.successful.len(), 2);
        assert_eq!(stats.completed, 3);
        assert!(stats.in_progress.is_empty());
    }

    #[tokio::test]
    async fn test_repeated_errors_reported_once() {
        let tasks = matched_tasks(1);
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.behave(
            tasks[0].resolved_url.as_deref().unwrap(),
            FetchBehavior::ManyErrors,
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let stats = fetch(
            tasks,
            1,
            &transcoder(),
            fetcher,
            &ProgressReporter::new(tx),
            &test_context(),
        )
        .await;

        assert_eq!(stats.failed.len(), 1);
        assert_eq!(stats.completed, 1);
        let errors = collect(rx)
            .into_iter()
            .filter(|u| u.message.starts_with("Error:"))
            .count();
        assert_eq!(errors, 1);
    }

    #[tokio::test]
    async fn test_panic_and_spawn_failure_recorded() {
        let tasks = matched_tasks(3);
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.behave(tasks[0].resolved_url.as_deref().unwrap(), FetchBehavior::Panic);
        fetcher.behave(
            tasks[2].resolved_url.as_deref().unwrap(),
            FetchBehavior::SpawnFailure,
        );

        let stats = fetch(
            tasks.clone(),
            2,
            &transcoder(),
            fetcher,
            &ProgressReporter::disabled(),
            &test_context(),
        )
        .await;

        let mut failed: Vec<usize> = stats.failed.iter().map(|f| f.task.index).collect();
        failed.sort();
        assert_eq!(failed, vec![tasks[0].index, tasks[2].index]);
        assert_eq!(stats.successful.len(), 1);
        assert_eq!(stats.completed, stats.successful.len() + stats.failed.len());
        assert!(stats.in_progress.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_is_failure() {
        let tasks = matched_tasks(1);
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.behave(tasks[0].resolved_url.as_deref().unwrap(), FetchBehavior::Hang);

        let mut ctx = test_context();
        ctx.config.fetch_timeout = Duration::from_millis(20);

        let stats = fetch(
            tasks,
            1,
            &transcoder(),
            fetcher,
            &ProgressReporter::disabled(),
            &ctx,
        )
        .await;

        assert_eq!(stats.failed.len(), 1);
        assert!(stats.failed[0].reason.contains("timed out"));
    }

    #[tokio::test]
    async fn test_without_transcoder_requests_native_format() {
        let tasks = matched_tasks(1);
        let fetcher = Arc::new(FakeFetcher::new());

        let stats = fetch(
            tasks,
            1,
            &Capability::missing(),
            fetcher.clone(),
            &ProgressReporter::disabled(),
            &test_context(),
        )
        .await;

        assert_eq!(stats.successful.len(), 1);
        let requests = fetcher.requests();
        assert!(!requests[0].transcode);
        assert!(requests[0].transcoder_path.is_none());
    }

    #[tokio::test]
    async fn test_unmatched_tasks_ignored() {
        let mut tasks = matched_tasks(2);
        tasks[1] = SongTask::pending(2, tasks[1].entry.clone()).unmatched();
        let fetcher = Arc::new(FakeFetcher::new());

        let stats = fetch(
            tasks,
            2,
            &transcoder(),
            fetcher.clone(),
            &ProgressReporter::disabled(),
            &test_context(),
        )
        .await;

        assert_eq!(stats.total, 1);
        assert_eq!(stats.successful.len(), 1);
        assert_eq!(fetcher.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = fetch(
            Vec::new(),
            2,
            &transcoder(),
            Arc::new(FakeFetcher::new()),
            &ProgressReporter::new(tx),
            &test_context(),
        )
        .await;

        assert_eq!(stats.total, 0);
        assert_eq!(stats.completed, 0);
        let updates = collect(rx);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].percent, 100.0);
    }

    #[tokio::test]
    async fn test_bytes_accumulate_across_workers() {
        let tasks = matched_tasks(3);
        let fetcher = Arc::new(FakeFetcher::new());

        let stats = fetch(
            tasks,
            3,
            &transcoder(),
            fetcher,
            &ProgressReporter::disabled(),
            &test_context(),
        )
        .await;

        // Each fake transfer reports 1000 then 2000 of 2000 bytes
        assert_eq!(stats.downloaded_bytes, 6_000);
        assert_eq!(stats.total_bytes, 6_000);
    }

    #[tokio::test]
    async fn test_cancelled_dispatches_nothing() {
        let tasks = matched_tasks(3);
        let fetcher = Arc::new(FakeFetcher::new());
        let cancel = CancelFlag::new();
        cancel.cancel();

        let stats = fetch(
            tasks,
            2,
            &transcoder(),
            fetcher.clone(),
            &ProgressReporter::disabled(),
            &test_context().with_cancel(cancel),
        )
        .await;

        assert_eq!(stats.completed, 0);
        assert!(fetcher.requests().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_mid_run_finishes_in_flight_only() {
        let tasks = matched_tasks(6);
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.set_delay(Duration::from_millis(30));
        let cancel = CancelFlag::new();
        let ctx = test_context().with_cancel(cancel.clone());

        cancel_after(&cancel, Duration::from_millis(45));
        let stats = fetch(
            tasks,
            2,
            &transcoder(),
            fetcher.clone(),
            &ProgressReporter::disabled(),
            &ctx,
        )
        .await;

        let started = fetcher.requests().len();
        assert!(started >= 2 && started < 6, "started {}", started);
        assert!(fetcher.probe.max() <= 2);
        assert_eq!(stats.total, 6);
        assert_eq!(stats.completed, started);
        assert_eq!(stats.successful.len(), started);
        assert!(stats.failed.is_empty());
        assert!(stats.in_progress.is_empty());
    }

    #[tokio::test]
    async fn test_request_uses_output_template() {
        let tasks = matched_tasks(1);
        let fetcher = Arc::new(FakeFetcher::new());
        let mut ctx = test_context();
        ctx.config.name_order = NameOrder::TitleFirst;
        ctx.config.archive = Some("archive.txt".into());

        fetch(
            tasks.clone(),
            1,
            &transcoder(),
            fetcher.clone(),
            &ProgressReporter::disabled(),
            &ctx,
        )
        .await;

        let request = &fetcher.requests()[0];
        assert!(request.output_template.ends_with(&format!(
            "{} - {}.%(ext)s",
            tasks[0].entry.title, tasks[0].entry.artist
        )));
        assert_eq!(request.archive.as_deref(), Some(std::path::Path::new("archive.txt")));
        assert_eq!(request.url, tasks[0].resolved_url.clone().unwrap());
    }
}
