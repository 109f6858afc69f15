//! tunepull - Download Spotify playlists as local audio via YouTube Music

use clap::Parser;
use colored::Colorize;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod catalog;
mod cli;
mod fetch;
mod pipeline;
mod search;
mod utils;

use cli::commands::{self, DownloadOptions, Outcome};
use cli::{Cli, Commands};
use utils::ProgressAwareLayer;

/// Exit code for a run interrupted with Ctrl-C
const EXIT_ABORTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "tunepull=debug,reqwest=debug"
    } else {
        "tunepull=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(ProgressAwareLayer::new(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        ))
        .init();

    match run(cli).await {
        Ok(Outcome::Completed) => ExitCode::SUCCESS,
        Ok(Outcome::Aborted) => ExitCode::from(EXIT_ABORTED),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<Outcome> {
    match cli.command {
        Commands::Download {
            playlist,
            output,
            format,
            title_first,
            search_parallel,
            download_parallel,
            ffmpeg,
            yt_dlp,
            archive,
            dry_run,
            client_id,
            client_secret,
        } => {
            commands::download(DownloadOptions {
                playlist,
                output,
                format,
                title_first,
                search_parallel: search_parallel.into(),
                download_parallel: download_parallel.into(),
                ffmpeg,
                yt_dlp,
                archive,
                dry_run,
                client_id,
                client_secret,
                verbose: cli.verbose,
            })
            .await
        }
        Commands::Auth {
            client_id,
            client_secret,
            force,
            clear,
        } => commands::auth(client_id, client_secret, force, clear).await,
        Commands::Probe { ffmpeg, yt_dlp } => Ok(commands::probe(ffmpeg, yt_dlp)),
        Commands::Completion { shell } => Ok(commands::completion(shell)),
    }
}
