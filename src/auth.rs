//! Auth Token Cache: per-client OAuth2 client-credentials token refresh.
//!
//! Grounded on `cmd/authentication/authentication.go`'s `clientcredentials`
//! wrapper, but reworked so the refresh itself is serialized per client
//! (one `tokio::sync::Mutex` per client id, held across the whole refresh
//! `.await`) rather than relying on a library-internal lock, matching the
//! single-flight shape in `jwks-cache`'s `CacheManager`.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::AuthClientConfig;
use crate::model::now_secs;

#[derive(Debug, Clone, Default)]
struct CachedToken {
    access_token: String,
    expires_at: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct ClientEntry {
    config: AuthClientConfig,
    cached: Mutex<CachedToken>,
}

pub struct AuthTokenCache {
    http: Client,
    clients: HashMap<String, ClientEntry>,
}

impl AuthTokenCache {
    pub fn new(http: Client, clients: HashMap<String, AuthClientConfig>) -> Self {
        let clients = clients
            .into_iter()
            .map(|(id, config)| {
                (
                    id,
                    ClientEntry {
                        config,
                        cached: Mutex::new(CachedToken::default()),
                    },
                )
            })
            .collect();
        AuthTokenCache { http, clients }
    }

    /// Returns a valid bearer token for the named client, refreshing it if
    /// expired. Refresh is serialized per client: a second caller arriving
    /// while a refresh is in flight waits on the same mutex rather than
    /// firing a redundant token request.
    pub async fn get_token(&self, client_id: &str) -> Result<String> {
        let entry = self
            .clients
            .get(client_id)
            .with_context(|| format!("no authentication client configured for {:?}", client_id))?;

        let mut cached = entry.cached.lock().await;
        let now = now_secs();
        if !cached.access_token.is_empty() && now < cached.expires_at {
            return Ok(cached.access_token.clone());
        }

        debug!(client_id, "refreshing oauth2 access token");
        let token_url = format!("{}/protocol/openid-connect/token", entry.config.auth_url);
        let resp = self
            .http
            .post(&token_url)
            .timeout(Duration::from_secs(10))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", entry.config.client_id.as_str()),
                ("client_secret", entry.config.client_secret.as_str()),
            ])
            .send()
            .await
            .with_context(|| format!("token request failed for client {:?}", client_id))?
            .error_for_status()
            .with_context(|| format!("token endpoint returned error for client {:?}", client_id))?;

        let parsed: TokenResponse = resp
            .json()
            .await
            .context("failed to parse token response")?;

        cached.access_token = parsed.access_token.clone();
        cached.expires_at = now + parsed.expires_in.saturating_sub(5);
        Ok(parsed.access_token)
    }
}
