//! CLI module for tunepull

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod auth;
pub mod commands;

pub use auth::AuthManager;

#[derive(Parser, Debug)]
#[command(
    name = "tunepull",
    about = "Download Spotify playlists as audio files via YouTube Music"
)]
#[command(version, author)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download every song of a playlist
    Download {
        /// Playlist link, spotify:playlist: URI or id
        #[arg(value_name = "PLAYLIST")]
        playlist: String,

        /// Directory the audio files are written to
        #[arg(short, long, env = "TUNEPULL_OUTPUT", default_value = "./downloads/")]
        output: PathBuf,

        /// Audio format used when FFmpeg is available
        #[arg(short, long, default_value = "m4a")]
        format: String,

        /// Name files "Title - Artist" instead of "Artist - Title"
        #[arg(long)]
        title_first: bool,

        /// Number of concurrent searches
        #[arg(long, default_value = "3", value_parser = clap::value_parser!(u16).range(1..=16))]
        search_parallel: u16,

        /// Number of concurrent downloads
        #[arg(short = 'p', long, default_value = "3", value_parser = clap::value_parser!(u16).range(1..=16))]
        download_parallel: u16,

        /// Path to the ffmpeg binary
        #[arg(long, env = "TUNEPULL_FFMPEG")]
        ffmpeg: Option<PathBuf>,

        /// Path to the yt-dlp binary
        #[arg(long, env = "TUNEPULL_YT_DLP")]
        yt_dlp: Option<PathBuf>,

        /// Download archive, songs recorded there are skipped
        #[arg(long)]
        archive: Option<PathBuf>,

        /// Resolve matches without downloading
        #[arg(long)]
        dry_run: bool,

        /// Spotify client ID (overrides the keyring)
        #[arg(long, env = "SPOTIFY_CLIENT_ID", hide_env_values = true)]
        client_id: Option<String>,

        /// Spotify client secret (overrides the keyring)
        #[arg(long, env = "SPOTIFY_CLIENT_SECRET", hide_env_values = true)]
        client_secret: Option<String>,
    },

    /// Configure Spotify API credentials
    Auth {
        /// Spotify client ID
        #[arg(long, env = "SPOTIFY_CLIENT_ID", hide_env_values = true)]
        client_id: Option<String>,

        /// Spotify client secret
        #[arg(long, env = "SPOTIFY_CLIENT_SECRET", hide_env_values = true)]
        client_secret: Option<String>,

        /// Force re-authentication (ignore stored credentials)
        #[arg(long, conflicts_with = "clear")]
        force: bool,

        /// Remove stored credentials
        #[arg(long)]
        clear: bool,
    },

    /// Show which external tools were found
    Probe {
        /// Path to the ffmpeg binary
        #[arg(long, env = "TUNEPULL_FFMPEG")]
        ffmpeg: Option<PathBuf>,

        /// Path to the yt-dlp binary
        #[arg(long, env = "TUNEPULL_YT_DLP")]
        yt_dlp: Option<PathBuf>,
    },

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}
