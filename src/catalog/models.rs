//! Spotify Web API response models

use serde::Deserialize;
use std::collections::HashSet;
use tracing::debug;

use crate::pipeline::CatalogEntry;

/// Client-credentials token (`POST /api/token`)
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: u64,
}

/// One page of `GET /v1/playlists/{id}/tracks`
#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistTracksPage {
    #[serde(default)]
    pub items: Vec<PlaylistItem>,
    pub next: Option<String>,
    #[serde(default)]
    pub total: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistItem {
    /// Null for tracks that were removed from the service
    pub track: Option<Track>,
}

/// A track or podcast episode
#[derive(Debug, Clone, Deserialize)]
pub struct Track {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub name: Option<String>,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub duration_ms: u64,
    pub is_playable: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtistRef {
    pub name: Option<String>,
}

/// API error body
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub error: ApiError,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub status: u16,
    pub message: String,
}

impl Track {
    /// Catalog entry crediting the first artist, if this is a usable song
    pub fn to_entry(&self) -> Option<CatalogEntry> {
        if self.kind != "track" || self.is_playable == Some(false) {
            return None;
        }
        let title = self.name.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
        let artist = self
            .artists
            .first()
            .and_then(|a| a.name.as_deref())
            .map(str::trim)
            .filter(|a| !a.is_empty())?;
        Some(CatalogEntry::new(title, artist, self.duration_ms))
    }
}

/// Turn playlist items into entries, keeping the first of any repeated song
pub fn collect_entries(items: impl IntoIterator<Item = PlaylistItem>) -> Vec<CatalogEntry> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for item in items {
        let Some(track) = item.track else {
            debug!("Skipping removed playlist item");
            continue;
        };
        let Some(entry) = track.to_entry() else {
            debug!(
                "Skipping unplayable item: {}",
                track.name.as_deref().unwrap_or("<unnamed>")
            );
            continue;
        };
        if seen.insert((entry.title.clone(), entry.artist.clone())) {
            entries.push(entry);
        } else {
            debug!("Skipping duplicate {}", entry.label());
        }
    }

    entries
}
