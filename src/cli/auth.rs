//! Keyring-based storage for Spotify API credentials

use anyhow::{Context, Result};
use dialoguer::{Input, Password};
use keyring::Entry;
use tracing::{debug, info};

use crate::catalog::SpotifyClient;

const KEYRING_SERVICE: &str = "tunepull";

/// Spotify app credentials (client-credentials flow)
#[derive(Debug, Clone)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Manages authentication credentials storage
pub struct AuthManager;

impl AuthManager {
    /// Store Spotify app credentials
    ///
    /// Missing values are prompted for. Credentials are verified against
    /// Spotify before they are written to the keyring.
    pub async fn authenticate(
        client_id: Option<String>,
        client_secret: Option<String>,
        force: bool,
    ) -> Result<SpotifyCredentials> {
        if !force {
            if let Ok(creds) = Self::load() {
                info!("Found existing credentials in keyring");
                return Ok(creds);
            }
        } else {
            debug!("Force flag set, ignoring stored credentials");
        }

        let client_id = match client_id {
            Some(id) => id,
            None => Input::<String>::new()
                .with_prompt("Spotify client ID")
                .interact_text()
                .context("Failed to read client ID")?,
        };

        let client_secret = match client_secret {
            Some(secret) => secret,
            None => Password::new()
                .with_prompt("Spotify client secret")
                .interact()
                .context("Failed to read client secret")?,
        };

        let creds = SpotifyCredentials {
            client_id: client_id.trim().to_string(),
            client_secret: client_secret.trim().to_string(),
        };

        Self::verify(&creds).await?;
        Self::store(&creds)?;
        info!("Credentials stored in keyring");

        Ok(creds)
    }

    /// Credentials for a run: explicit values win, then the keyring
    pub fn resolve(
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Result<SpotifyCredentials> {
        if let (Some(client_id), Some(client_secret)) = (client_id, client_secret) {
            debug!("Using Spotify credentials from the command line or environment");
            return Ok(SpotifyCredentials {
                client_id,
                client_secret,
            });
        }

        Self::load().map_err(|_| {
            anyhow::anyhow!(
                "No Spotify credentials found. Run 'tunepull auth' or set \
                 SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET."
            )
        })
    }

    /// Load credentials from keyring
    pub fn load() -> Result<SpotifyCredentials> {
        let client_id = Self::get_entry("client_id")?
            .get_password()
            .context("No Spotify client ID in keyring")?;

        let client_secret = Self::get_entry("client_secret")?
            .get_password()
            .context("No Spotify client secret in keyring")?;

        Ok(SpotifyCredentials {
            client_id,
            client_secret,
        })
    }

    /// Store credentials in keyring
    pub fn store(creds: &SpotifyCredentials) -> Result<()> {
        Self::get_entry("client_id")?
            .set_password(&creds.client_id)
            .context("Failed to store client ID in keyring")?;

        Self::get_entry("client_secret")?
            .set_password(&creds.client_secret)
            .context("Failed to store client secret in keyring")?;

        Ok(())
    }

    /// Clear stored credentials
    pub fn clear() -> Result<()> {
        let _ = Self::get_entry("client_id")?.delete_credential();
        let _ = Self::get_entry("client_secret")?.delete_credential();
        info!("Credentials cleared from keyring");
        Ok(())
    }

    /// Verify credentials by requesting an access token
    async fn verify(creds: &SpotifyCredentials) -> Result<()> {
        debug!("Verifying Spotify credentials");

        let client = SpotifyClient::new(&creds.client_id, &creds.client_secret)?;
        client
            .access_token()
            .await
            .context("Failed to verify credentials")?;

        info!("Credentials verified successfully");
        Ok(())
    }

    fn get_entry(key: &str) -> Result<Entry> {
        let entry_key = format!("spotify:{}", key);
        Entry::new(KEYRING_SERVICE, &entry_key).context("Failed to access keyring")
    }
}
