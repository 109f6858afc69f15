//! Run configuration and the per-run context handed to every stage

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::capability::CapabilityProbe;
use super::progress::ProgressRange;

/// Order of the title and artist in output file names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameOrder {
    /// `Title - Artist.ext`
    TitleFirst,
    /// `Artist - Title.ext`
    #[default]
    ArtistFirst,
}

/// Configuration for one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of concurrent searches (network-bound, rate limited upstream)
    pub search_parallelism: usize,
    /// Number of concurrent downloads
    pub download_parallelism: usize,
    /// Directory the audio files are written to
    pub output_dir: PathBuf,
    /// Target audio format when a transcoder is available
    pub audio_format: String,
    pub name_order: NameOrder,
    /// Download archive passed through to the fetch tool
    pub archive: Option<PathBuf>,
    /// User-supplied ffmpeg location, checked before any probing
    pub ffmpeg_override: Option<PathBuf>,
    /// Random pause before each search query, in milliseconds
    pub search_jitter_ms: RangeInclusive<u64>,
    pub search_timeout: Duration,
    pub fetch_timeout: Duration,
    pub search_progress: ProgressRange,
    pub download_progress: ProgressRange,
    /// Resolve matches without downloading anything
    pub dry_run: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            search_parallelism: 3,
            download_parallelism: 3,
            output_dir: PathBuf::from("./downloads/"),
            audio_format: "m4a".to_string(),
            name_order: NameOrder::default(),
            archive: None,
            ffmpeg_override: None,
            search_jitter_ms: 200..=500,
            search_timeout: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(15 * 60),
            search_progress: ProgressRange::new(20.0, 40.0),
            download_progress: ProgressRange::new(40.0, 100.0),
            dry_run: false,
        }
    }
}

/// Cooperative cancellation, checked by the stages between dispatches
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a run needs, built once per invocation
#[derive(Debug, Clone)]
pub struct RunContext {
    pub config: PipelineConfig,
    pub transcoder: Arc<CapabilityProbe>,
    pub cancel: CancelFlag,
}

impl RunContext {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            transcoder: Arc::new(CapabilityProbe::ffmpeg()),
            cancel: CancelFlag::new(),
        }
    }

    #[cfg(test)]
    pub fn with_transcoder(mut self, probe: CapabilityProbe) -> Self {
        self.transcoder = Arc::new(probe);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }
}
