//! Playlist catalog (Spotify)

mod client;
mod models;

use anyhow::Result;
use async_trait::async_trait;
use url::Url;

use crate::pipeline::CatalogEntry;

pub use client::SpotifyClient;

/// Source of playlist entries
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Entries in playlist order, deduplicated, without unplayable items
    async fn playlist_entries(&self, playlist_id: &str) -> Result<Vec<CatalogEntry>>;
}

/// Extract a playlist id from a share link, a `spotify:playlist:` URI or a bare id
///
/// Returns `None` when nothing id-shaped is left.
pub fn extract_playlist_id(reference: &str) -> Option<String> {
    let reference = reference.trim();

    let candidate = match Url::parse(reference) {
        Ok(url) if url.has_host() => {
            let mut segments = url.path_segments()?;
            segments.find(|segment| *segment == "playlist")?;
            segments.next()?.to_string()
        }
        _ => match reference
            .split_once("playlist/")
            .or_else(|| reference.split_once("playlist:"))
        {
            Some((_, rest)) => rest.to_string(),
            None => reference.to_string(),
        },
    };

    let id = candidate
        .split(['?', '#', '/'])
        .next()
        .unwrap_or_default()
        .trim();

    if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(id.to_string())
    } else {
        None
    }
}
