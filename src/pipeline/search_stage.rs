//! Concurrent resolution of catalog entries into song tasks

use futures::future;
use futures::stream::{self, StreamExt};
use rand::Rng;
use std::ops::RangeInclusive;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::config::RunContext;
use super::matcher;
use super::models::{CatalogEntry, MatchCandidate, SongTask};
use super::progress::{ProgressRange, ProgressReporter};
use crate::search::SearchService;

/// Search every entry and pick its best candidate
///
/// Returns one task per entry, in input order. At most `concurrency_limit`
/// searches run at once. Entries that were never dispatched because the run
/// was cancelled come back `Pending`.
pub async fn resolve(
    entries: Vec<CatalogEntry>,
    concurrency_limit: usize,
    service: &dyn SearchService,
    reporter: &ProgressReporter,
    ctx: &RunContext,
) -> Vec<SongTask> {
    let mut tasks: Vec<SongTask> = entries
        .into_iter()
        .enumerate()
        .map(|(pos, entry)| SongTask::pending(pos + 1, entry))
        .collect();

    let search = Search {
        service,
        reporter,
        range: ctx.config.search_progress,
        jitter_ms: ctx.config.search_jitter_ms.clone(),
        timeout: ctx.config.search_timeout,
        total: tasks.len(),
        completed: Mutex::new(0),
    };
    let cancel = &ctx.cancel;
    let search = &search;

    info!(
        "Searching {} songs ({} at a time)",
        tasks.len(),
        concurrency_limit.max(1)
    );

    let resolved: Vec<(usize, SongTask)> = stream::iter(tasks.clone().into_iter().enumerate())
        .take_while(|_| future::ready(!cancel.is_cancelled()))
        .map(|(pos, task)| async move { (pos, search.run(task).await) })
        .buffer_unordered(concurrency_limit.max(1))
        .collect()
        .await;

    if resolved.len() < tasks.len() {
        info!(
            "Search cancelled, {} songs not searched",
            tasks.len() - resolved.len()
        );
    }

    for (pos, task) in resolved {
        tasks[pos] = task;
    }

    tasks
}

/// State shared by the searches of one stage run
struct Search<'a> {
    service: &'a dyn SearchService,
    reporter: &'a ProgressReporter,
    range: ProgressRange,
    jitter_ms: RangeInclusive<u64>,
    timeout: Duration,
    total: usize,
    completed: Mutex<usize>,
}

impl Search<'_> {
    async fn run(&self, task: SongTask) -> SongTask {
        let label = task.label();
        self.reporter.send(
            format!("Searching: {}", label),
            self.range.at_count(self.completed(), self.total),
            None,
        );

        tokio::time::sleep(self.jitter()).await;

        let candidates = self.candidates(&task.entry).await;
        let resolved = match matcher::select(&task.entry, &candidates) {
            Some(candidate) => {
                let quality = matcher::match_quality(&task.entry, candidate);
                debug!(
                    "Matched {} to {} ({})",
                    label,
                    candidate.video_id,
                    quality.map_or_else(|| "unknown quality".to_string(), |q| format!("{:.0}%", q))
                );
                task.matched(candidate, quality)
            }
            None => {
                debug!("No match for {}", label);
                task.unmatched()
            }
        };

        let done = {
            let mut completed = self.completed.lock().unwrap_or_else(PoisonError::into_inner);
            *completed += 1;
            *completed
        };
        let percent = self.range.at_count(done, self.total);

        if resolved.is_matched() {
            self.reporter.send(format!("Found: {}", label), percent, None);
        } else {
            self.reporter.send(format!("Skipped: {}", label), percent, None);
        }

        resolved
    }

    /// Query the service. Errors and timeouts count as no candidates.
    async fn candidates(&self, entry: &CatalogEntry) -> Vec<MatchCandidate> {
        let query = entry.search_query();
        match tokio::time::timeout(self.timeout, self.service.search(&query)).await {
            Ok(Ok(candidates)) => candidates,
            Ok(Err(e)) => {
                warn!("Search failed for {}: {:#}", entry.label(), e);
                Vec::new()
            }
            Err(_) => {
                warn!(
                    "Search for {} timed out after {}s",
                    entry.label(),
                    self.timeout.as_secs()
                );
                Vec::new()
            }
        }
    }

    fn completed(&self) -> usize {
        *self.completed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn jitter(&self) -> Duration {
        let (low, high) = (*self.jitter_ms.start(), *self.jitter_ms.end());
        if low >= high {
            return Duration::from_millis(low);
        }
        Duration::from_millis(rand::thread_rng().gen_range(low..=high))
    }
}
