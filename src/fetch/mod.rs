//! Media fetch tool interface

pub mod ytdlp;

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::mpsc;

pub use ytdlp::YtDlpFetcher;

/// One item to download
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub url: String,
    /// Output template understood by the tool (`%(ext)s` is filled in by it)
    pub output_template: String,
    /// Target audio format, only honored when `transcode` is set
    pub audio_format: String,
    /// Convert to `audio_format` and embed metadata. Requires a transcoder.
    pub transcode: bool,
    pub transcoder_path: Option<PathBuf>,
    pub archive: Option<PathBuf>,
}

/// Progress reported by the tool while a request runs
#[derive(Debug, Clone, PartialEq)]
pub enum FetchEvent {
    /// Cumulative bytes of the current file
    Downloading {
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
    },
    /// Transfer finished, post-processing may follow
    Finished,
    /// The tool reported an error; it may still keep running
    Error(String),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {message}")]
    Tool {
        tool: String,
        status: String,
        message: String,
    },

    #[error("Fetch timed out after {0}s")]
    Timeout(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Downloads (and optionally transcodes) one media item
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Run one request to completion, publishing progress on `events`
    ///
    /// Dropping `events` when done signals the end of the progress stream.
    async fn fetch(
        &self,
        request: &FetchRequest,
        events: mpsc::UnboundedSender<FetchEvent>,
    ) -> Result<(), FetchError>;
}
