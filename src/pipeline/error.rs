//! Run-level errors
//!
//! Only setup failures end a run. Per-item problems are recorded on the
//! task or in the download stats instead.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Not a playlist link or id: {0}")]
    InvalidPlaylist(String),

    #[error("Playlist has no playable tracks")]
    EmptyCatalog,

    #[error("Failed to load playlist")]
    Catalog(#[source] anyhow::Error),

    #[error("Failed to create output directory {}: {source}", path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
