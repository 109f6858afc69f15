//! Search service used to find playable matches for catalog entries

mod ytmusic;

use anyhow::Result;
use async_trait::async_trait;

use crate::pipeline::MatchCandidate;

pub use ytmusic::YtMusicClient;

/// Free-text search returning candidates in the service's relevance order
#[async_trait]
pub trait SearchService: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<MatchCandidate>>;
}
