//! Utility functions

pub mod progress_log;
mod sanitize;

pub use progress_log::{ProgressAwareLayer, set_progress_mode};
pub use sanitize::sanitize_filename;
