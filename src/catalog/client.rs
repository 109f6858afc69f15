//! Spotify Web API HTTP client

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use tracing::debug;

use super::CatalogSource;
use super::models::*;
use crate::pipeline::CatalogEntry;

const ACCOUNTS_URL: &str = "https://accounts.spotify.com";
const API_URL: &str = "https://api.spotify.com";

/// Largest page the playlist tracks endpoint accepts
const PAGE_SIZE: u32 = 100;

/// Fields requested for each playlist item
const TRACK_FIELDS: &str = "items(track(type,name,duration_ms,is_playable,artists(name))),next,total";

/// HTTP client for the Spotify Web API (client-credentials flow)
#[derive(Clone)]
pub struct SpotifyClient {
    client_id: String,
    client_secret: String,
    accounts_url: String,
    api_url: String,
    http_client: Client,
}

impl SpotifyClient {
    /// Create a new Spotify client
    pub fn new(client_id: &str, client_secret: &str) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent(concat!("tunepull/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            accounts_url: ACCOUNTS_URL.to_string(),
            api_url: API_URL.to_string(),
            http_client,
        })
    }

    /// Request an app access token
    pub async fn access_token(&self) -> Result<String> {
        let url = format!("{}/api/token", self.accounts_url);
        debug!("Requesting Spotify access token");

        let response = self
            .http_client
            .post(&url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .context("Failed to connect to Spotify")?;

        if !response.status().is_success() {
            anyhow::bail!(
                "Spotify rejected the client credentials ({})",
                response.status()
            );
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("Failed to parse token response")?;
        debug!("Access token valid for {}s", token.expires_in);
        Ok(token.access_token)
    }

    /// Get every item of a playlist, following pagination
    pub async fn playlist_items(&self, playlist_id: &str) -> Result<Vec<PlaylistItem>> {
        let token = self.access_token().await?;

        let mut next = Some(format!(
            "{}/v1/playlists/{}/tracks?limit={}&fields={}",
            self.api_url,
            urlencoding::encode(playlist_id),
            PAGE_SIZE,
            urlencoding::encode(TRACK_FIELDS)
        ));
        let mut items = Vec::new();

        while let Some(url) = next {
            debug!("Fetching playlist page: {}", url);

            let response = self
                .http_client
                .get(&url)
                .bearer_auth(&token)
                .send()
                .await
                .context("Failed to fetch playlist")?;

            let page: PlaylistTracksPage = Self::check_response(response)
                .await?
                .json()
                .await
                .context("Failed to parse playlist response")?;

            debug!("Got {} of {} items", items.len() + page.items.len(), page.total);
            items.extend(page.items);
            next = page.next;
        }

        Ok(items)
    }

    /// Turn an API error body into an error
    async fn check_response(response: Response) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        match response.json::<ErrorResponse>().await {
            Ok(body) => anyhow::bail!(
                "Spotify error {}: {}",
                body.error.status,
                body.error.message
            ),
            Err(_) => anyhow::bail!("Spotify request failed with {}", status),
        }
    }
}

#[async_trait]
impl CatalogSource for SpotifyClient {
    async fn playlist_entries(&self, playlist_id: &str) -> Result<Vec<CatalogEntry>> {
        let items = self.playlist_items(playlist_id).await?;
        let total = items.len();
        let entries = collect_entries(items);
        debug!("Kept {} of {} playlist items", entries.len(), total);
        Ok(entries)
    }
}
