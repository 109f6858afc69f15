//! CLI command handlers

use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::generate;
use colored::Colorize;
use console::Term;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::AuthManager;
use crate::catalog::SpotifyClient;
use crate::fetch::YtDlpFetcher;
use crate::pipeline::progress::{ProgressUpdate, format_speed};
use crate::pipeline::{
    CancelFlag, CapabilityProbe, NameOrder, PipelineConfig, PipelineEngine, ProgressAggregator,
    ProgressReporter, RunContext, RunReport,
};
use crate::search::YtMusicClient;
use crate::utils::set_progress_mode;

/// How a command ended, mapped to the process exit code by `main`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Aborted,
}

/// Options of the `download` command
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub playlist: String,
    pub output: PathBuf,
    pub format: String,
    pub title_first: bool,
    pub search_parallel: usize,
    pub download_parallel: usize,
    pub ffmpeg: Option<PathBuf>,
    pub yt_dlp: Option<PathBuf>,
    pub archive: Option<PathBuf>,
    pub dry_run: bool,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub verbose: bool,
}

impl DownloadOptions {
    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            search_parallelism: self.search_parallel,
            download_parallelism: self.download_parallel,
            output_dir: self.output.clone(),
            audio_format: self.format.clone(),
            name_order: if self.title_first {
                NameOrder::TitleFirst
            } else {
                NameOrder::ArtistFirst
            },
            archive: self.archive.clone(),
            ffmpeg_override: self.ffmpeg.clone(),
            dry_run: self.dry_run,
            ..PipelineConfig::default()
        }
    }
}

/// Handle the `download` command
pub async fn download(options: DownloadOptions) -> Result<Outcome> {
    let creds = AuthManager::resolve(options.client_id.clone(), options.client_secret.clone())?;

    let yt_dlp = CapabilityProbe::yt_dlp().detect(options.yt_dlp.as_deref());
    let yt_dlp_path = match yt_dlp.path {
        Some(path) if yt_dlp.available => path,
        _ if options.dry_run => PathBuf::from("yt-dlp"),
        _ => anyhow::bail!(
            "yt-dlp not found. Install it (https://github.com/yt-dlp/yt-dlp) or pass --yt-dlp <PATH>."
        ),
    };
    debug!("Using yt-dlp at {}", yt_dlp_path.display());

    let cancel = CancelFlag::new();
    watch_interrupts(cancel.clone());

    let ctx = RunContext::new(options.pipeline_config()).with_cancel(cancel);
    let engine = PipelineEngine::new(
        Arc::new(SpotifyClient::new(&creds.client_id, &creds.client_secret)?),
        Arc::new(YtMusicClient::new()?),
        Arc::new(YtDlpFetcher::new(yt_dlp_path)),
        ctx,
    );

    println!("{}", "Fetching playlist...".cyan());

    let (tx, rx) = mpsc::unbounded_channel();
    let reporter = ProgressReporter::new(tx);
    let renderer = Renderer::new(!options.verbose && Term::stderr().is_term());
    let render_task = {
        let renderer = renderer.clone();
        tokio::spawn(async move {
            ProgressAggregator::new()
                .drain(rx, |update| renderer.render(update))
                .await
        })
    };

    let result = engine.run(&options.playlist, &reporter).await;
    drop(reporter);
    match render_task.await {
        Ok(aggregator) => debug!(
            "Progress ended at {:.0}% ({} errors reported)",
            aggregator.last_percent(),
            aggregator.count("Error")
        ),
        Err(e) => warn!("Progress renderer stopped: {}", e),
    }
    renderer.finish();

    let report = result.context("Download failed")?;
    print_summary(&report, options.dry_run);

    if report.aborted {
        println!();
        println!("{}", "Interrupted, remaining songs were not downloaded.".yellow());
        Ok(Outcome::Aborted)
    } else {
        Ok(Outcome::Completed)
    }
}

/// Ctrl-C stops dispatching new work; a second Ctrl-C exits immediately
fn watch_interrupts(cancel: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!();
        eprintln!(
            "{}",
            "Stopping after the songs in progress (Ctrl-C again to quit now)...".yellow()
        );
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
}

/// Draws progress updates on a bar, or logs them when there is no terminal
#[derive(Clone)]
struct Renderer {
    bar: Option<ProgressBar>,
}

impl Renderer {
    fn new(interactive: bool) -> Self {
        if !interactive {
            return Self { bar: None };
        }

        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {prefix} {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        set_progress_mode(true);
        Self { bar: Some(bar) }
    }

    fn render(&self, update: &ProgressUpdate) {
        match &self.bar {
            Some(bar) => {
                bar.set_position(update.percent.round() as u64);
                if let Some(stats) = &update.stats {
                    bar.set_prefix(format!(
                        "{}/{} songs, {:.1}/{:.1} MB",
                        stats.completed,
                        stats.total,
                        stats.downloaded_bytes as f64 / 1_048_576.0,
                        stats.total_bytes as f64 / 1_048_576.0
                    ));
                }
                bar.set_message(update.message.clone());
            }
            None => debug!("[{:>3.0}%] {}", update.percent, update.message),
        }
    }

    fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
            set_progress_mode(false);
        }
    }
}

fn print_summary(report: &RunReport, dry_run: bool) {
    let stats = &report.stats;

    println!();
    if dry_run {
        println!(
            "{} {} of {} songs matched",
            "[DRY RUN]".yellow(),
            report.matched(),
            report.tasks.len()
        );
        for task in report.tasks.iter().filter(|t| t.is_matched()) {
            let quality = task
                .match_quality
                .map_or_else(|| "?".to_string(), |q| format!("{:.0}%", q));
            println!(
                "  {} -> {} ({} match)",
                task.label(),
                task.resolved_url.as_deref().unwrap_or_default().cyan(),
                quality
            );
        }
    } else if stats.failed.is_empty() {
        println!("{}", "Download complete!".green().bold());
    } else {
        println!("{}", "Download finished with errors".yellow().bold());
    }

    if !dry_run {
        println!("  Songs downloaded: {}", stats.successful.len());
        println!("  Songs failed: {}", stats.failed.len());
        println!(
            "  Total size: {:.1} MB",
            stats.downloaded_bytes as f64 / 1_048_576.0
        );
        let elapsed = stats.start.elapsed();
        println!(
            "  Time: {}m {}s (started {})",
            elapsed.as_secs() / 60,
            elapsed.as_secs() % 60,
            stats.started_at.with_timezone(&chrono::Local).format("%H:%M:%S")
        );
        if stats.current_speed > 0.0 {
            println!("  Last speed: {}", format_speed(stats.current_speed));
        }
    }

    let unmatched: Vec<_> = report.unmatched().collect();
    if !unmatched.is_empty() {
        println!();
        println!("{}", "Not found on YouTube Music:".yellow());
        for task in unmatched {
            println!("  - {}", task.label());
        }
    }

    if !stats.failed.is_empty() {
        println!();
        println!("{}", "Failed downloads:".red());
        for failed in &stats.failed {
            println!("  - {}: {}", failed.task.label(), failed.reason);
        }
    }
}

/// Handle the `auth` command
pub async fn auth(
    client_id: Option<String>,
    client_secret: Option<String>,
    force: bool,
    clear: bool,
) -> Result<Outcome> {
    if clear {
        AuthManager::clear()?;
        println!("{}", "Stored Spotify credentials removed.".green());
        return Ok(Outcome::Completed);
    }

    println!("{}", "Configuring Spotify credentials...".cyan());
    println!(
        "Create an app at {} to get a client ID and secret.",
        "https://developer.spotify.com/dashboard".cyan()
    );

    let creds = AuthManager::authenticate(client_id, client_secret, force).await?;

    println!();
    println!("{}", "Authentication successful!".green().bold());
    println!("  Client ID: {}", creds.client_id);
    println!();
    println!("Credentials stored securely in system keyring.");

    Ok(Outcome::Completed)
}

/// Handle the `probe` command
pub fn probe(ffmpeg: Option<PathBuf>, yt_dlp: Option<PathBuf>) -> Outcome {
    for (probe, explicit) in [
        (CapabilityProbe::yt_dlp(), yt_dlp),
        (CapabilityProbe::ffmpeg(), ffmpeg),
    ] {
        let capability = probe.detect(explicit.as_deref());
        match capability.path {
            Some(path) if capability.available => {
                println!("  {} {}", format!("{}:", probe.binary()).green(), path.display());
            }
            _ => println!("  {} {}", format!("{}:", probe.binary()).red(), "not found".red()),
        }
    }

    println!();
    println!(
        "Without ffmpeg, songs are saved in their native format without conversion or metadata."
    );
    Outcome::Completed
}

/// Handle the `completion` command
pub fn completion(shell: clap_complete::Shell) -> Outcome {
    let mut cmd = super::Cli::command();
    generate(shell, &mut cmd, "tunepull", &mut io::stdout());
    Outcome::Completed
}
