//! Match-and-fetch pipeline
//!
//! A playlist flows through two bounded stages: [`search_stage`] turns
//! catalog entries into song tasks, [`download_stage`] fetches the matched
//! ones. [`PipelineEngine`] wires them together for one run.

pub mod capability;
pub mod config;
pub mod download_stage;
pub mod duration;
pub mod engine;
pub mod error;
pub mod matcher;
mod models;
pub mod naming;
pub mod progress;
pub mod search_stage;

#[cfg(test)]
pub mod testing;

pub use capability::CapabilityProbe;
pub use config::{CancelFlag, NameOrder, PipelineConfig, RunContext};
pub use engine::{PipelineEngine, RunReport};
pub use models::{CatalogEntry, MatchCandidate};
pub use progress::{ProgressAggregator, ProgressReporter};
