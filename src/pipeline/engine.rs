//! Pipeline orchestration: catalog, capability probe, search, download

use std::sync::Arc;
use tracing::{debug, info};

use super::config::RunContext;
use super::download_stage;
use super::error::PipelineError;
use super::models::{SongTask, TaskStatus};
use super::progress::{CAPABILITY_PERCENT, CATALOG_LOADED_PERCENT, DownloadStats, ProgressReporter};
use super::search_stage;
use crate::catalog::{CatalogSource, extract_playlist_id};
use crate::fetch::MediaFetcher;
use crate::search::SearchService;

/// Outcome of one run
#[derive(Debug)]
pub struct RunReport {
    /// One task per catalog entry, in playlist order
    pub tasks: Vec<SongTask>,
    pub stats: DownloadStats,
    /// Some entries or downloads were never started because the run was cancelled
    pub aborted: bool,
}

impl RunReport {
    pub fn matched(&self) -> usize {
        self.tasks.iter().filter(|t| t.is_matched()).count()
    }

    /// Tasks that were searched but had no usable candidate
    pub fn unmatched(&self) -> impl Iterator<Item = &SongTask> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Unmatched)
    }
}

/// Runs the whole pipeline for one playlist
pub struct PipelineEngine {
    catalog: Arc<dyn CatalogSource>,
    search: Arc<dyn SearchService>,
    fetcher: Arc<dyn MediaFetcher>,
    ctx: RunContext,
}

impl PipelineEngine {
    pub fn new(
        catalog: Arc<dyn CatalogSource>,
        search: Arc<dyn SearchService>,
        fetcher: Arc<dyn MediaFetcher>,
        ctx: RunContext,
    ) -> Self {
        Self {
            catalog,
            search,
            fetcher,
            ctx,
        }
    }

    /// Resolve and download a playlist, publishing progress on `reporter`
    ///
    /// Only setup problems are returned as errors. Songs that can't be
    /// matched or downloaded are part of the report.
    pub async fn run(
        &self,
        playlist_ref: &str,
        reporter: &ProgressReporter,
    ) -> Result<RunReport, PipelineError> {
        let config = &self.ctx.config;

        let playlist_id = extract_playlist_id(playlist_ref)
            .ok_or_else(|| PipelineError::InvalidPlaylist(playlist_ref.to_string()))?;
        debug!("Playlist id: {}", playlist_id);

        reporter.send("Fetching playlist", 0.0, None);
        let entries = self
            .catalog
            .playlist_entries(&playlist_id)
            .await
            .map_err(PipelineError::Catalog)?;
        if entries.is_empty() {
            return Err(PipelineError::EmptyCatalog);
        }
        info!("Playlist has {} songs", entries.len());
        reporter.send(
            format!("Found {} songs in playlist", entries.len()),
            CATALOG_LOADED_PERCENT,
            None,
        );

        if !config.dry_run {
            tokio::fs::create_dir_all(&config.output_dir)
                .await
                .map_err(|source| PipelineError::OutputDir {
                    path: config.output_dir.clone(),
                    source,
                })?;
        }

        let capability = self.ctx.transcoder.detect(config.ffmpeg_override.as_deref());
        let message = match &capability.path {
            Some(path) if capability.available => format!(
                "FFmpeg detected at {} - converting to {}",
                path.display(),
                config.audio_format
            ),
            _ => "FFmpeg not found - audio conversion will be skipped".to_string(),
        };
        info!("{}", message);
        reporter.send(message, CAPABILITY_PERCENT, None);

        let tasks = search_stage::resolve(
            entries,
            config.search_parallelism,
            self.search.as_ref(),
            reporter,
            &self.ctx,
        )
        .await;

        let matched = tasks.iter().filter(|t| t.is_matched()).count();
        reporter.send(
            format!("Found {} out of {} songs", matched, tasks.len()),
            config.search_progress.end,
            None,
        );

        if config.dry_run {
            reporter.send(
                format!("Dry run: {} songs would be downloaded", matched),
                100.0,
                None,
            );
            let aborted = has_pending(&tasks);
            return Ok(RunReport {
                tasks,
                stats: DownloadStats::new(0),
                aborted,
            });
        }

        let stats = download_stage::fetch(
            tasks.clone(),
            config.download_parallelism,
            &capability,
            self.fetcher.clone(),
            reporter,
            &self.ctx,
        )
        .await;

        reporter.send(
            format!(
                "Downloaded {} songs, failed {} songs",
                stats.successful.len(),
                stats.failed.len()
            ),
            100.0,
            Some(stats.snapshot(std::time::Instant::now())),
        );

        // Every dispatched download settles, so a short count means undispatched work
        let aborted = has_pending(&tasks) || stats.completed < stats.total;
        Ok(RunReport {
            tasks,
            stats,
            aborted,
        })
    }
}

/// Entries the search stage never dispatched stay pending
fn has_pending(tasks: &[SongTask]) -> bool {
    tasks.iter().any(|t| t.status == TaskStatus::Pending)
}
