//! Value types passed between pipeline stages

use serde::{Deserialize, Serialize};

/// One playlist row as reported by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub title: String,
    pub artist: String,
    pub duration_ms: u64,
}

impl CatalogEntry {
    pub fn new(title: impl Into<String>, artist: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            duration_ms,
        }
    }

    /// Free-text query sent to the search service
    pub fn search_query(&self) -> String {
        format!("{} {}", self.title, self.artist)
    }

    /// Human-readable label, unique within a deduplicated playlist
    pub fn label(&self) -> String {
        format!("{} - {}", self.title, self.artist)
    }
}

/// A search result competing to represent a catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub video_id: String,
    pub title: String,
    pub duration_ms: u64,
}

impl MatchCandidate {
    pub fn watch_url(&self) -> String {
        format!("{}{}", WATCH_URL_PREFIX, self.video_id)
    }
}

pub const WATCH_URL_PREFIX: &str = "https://music.youtube.com/watch?v=";

/// Resolution state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Not searched yet (or never dispatched because the run was cancelled)
    Pending,
    Matched,
    Unmatched,
}

/// A catalog entry together with its search resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongTask {
    /// 1-based playlist position, identifies the task within a run
    pub index: usize,
    pub entry: CatalogEntry,
    pub resolved_url: Option<String>,
    pub resolved_title: Option<String>,
    /// Duration-based score in 0..=100, informational only
    pub match_quality: Option<f64>,
    pub status: TaskStatus,
}

impl SongTask {
    pub fn pending(index: usize, entry: CatalogEntry) -> Self {
        Self {
            index,
            entry,
            resolved_url: None,
            resolved_title: None,
            match_quality: None,
            status: TaskStatus::Pending,
        }
    }

    /// Resolve to a candidate. Only valid from `Pending`.
    pub fn matched(self, candidate: &MatchCandidate, match_quality: Option<f64>) -> Self {
        debug_assert_eq!(self.status, TaskStatus::Pending);
        Self {
            resolved_url: Some(candidate.watch_url()),
            resolved_title: Some(candidate.title.clone()),
            match_quality,
            status: TaskStatus::Matched,
            ..self
        }
    }

    /// Mark as having no acceptable candidate. Only valid from `Pending`.
    pub fn unmatched(self) -> Self {
        debug_assert_eq!(self.status, TaskStatus::Pending);
        Self {
            status: TaskStatus::Unmatched,
            ..self
        }
    }

    pub fn is_matched(&self) -> bool {
        self.status == TaskStatus::Matched && self.resolved_url.is_some()
    }

    pub fn label(&self) -> String {
        self.entry.label()
    }
}
