use chrono::{Duration, Utc};
use crmpilot_persist::{Credential, CredentialStore, Provider, StoredCredential};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Result, ToolError};

/// Refresh tokens expiring within this window
pub const REFRESH_MARGIN_SECS: i64 = 60;

/// Assumed lifetime when a token response omits `expires_in` (Salesforce)
const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

/// OAuth client registration used for refresh-token grants
#[derive(Debug, Clone)]
pub struct OAuthClient {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
}

impl OAuthClient {
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    instance_url: Option<String>,
}

/// Loads per-user provider credentials, refreshing them when they are about
/// to expire.
#[derive(Clone)]
pub struct CredentialResolver {
    store: Arc<dyn CredentialStore>,
    http: reqwest::Client,
    oauth: HashMap<Provider, OAuthClient>,
    margin: Duration,
}

impl CredentialResolver {
    pub fn new(store: Arc<dyn CredentialStore>, http: reqwest::Client) -> Self {
        Self {
            store,
            http,
            oauth: HashMap::new(),
            margin: Duration::seconds(REFRESH_MARGIN_SECS),
        }
    }

    pub fn with_oauth_client(mut self, provider: Provider, client: OAuthClient) -> Self {
        self.oauth.insert(provider, client);
        self
    }

    /// Usable credential or `None`. Missing, invalid and unrefreshable
    /// credentials all come back as `None`; the reason is logged.
    pub async fn resolve(&self, user_id: &str, provider: Provider) -> Option<Credential> {
        match self.try_resolve(user_id, provider).await {
            Ok(credential) => credential,
            Err(e) => {
                tracing::warn!(user_id, provider = %provider, error = %e, "credential unavailable");
                None
            }
        }
    }

    pub async fn try_resolve(&self, user_id: &str, provider: Provider) -> Result<Option<Credential>> {
        let Some(stored) = self.store.get_credential(user_id, provider).await? else {
            return Ok(None);
        };

        if !stored.credential.expires_within(self.margin) {
            return Ok(Some(stored.credential));
        }

        tracing::debug!(user_id, provider = %provider, "credential near expiry, refreshing");
        let refreshed = self.refresh(&stored.credential).await?;
        self.store
            .upsert_credential(StoredCredential::new(user_id, refreshed.clone()))
            .await?;
        tracing::info!(user_id, provider = %provider, "credential refreshed");

        Ok(Some(refreshed))
    }

    async fn refresh(&self, credential: &Credential) -> Result<Credential> {
        let provider = credential.provider();
        let refresh_error = |reason: String| ToolError::Refresh {
            provider: provider.to_string(),
            reason,
        };

        let refresh_token = credential
            .refresh_token()
            .ok_or_else(|| refresh_error("no refresh token stored".to_string()))?;
        let client = self
            .oauth
            .get(&provider)
            .ok_or_else(|| refresh_error("no OAuth client configured".to_string()))?;

        let response = self
            .http
            .post(&client.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", client.client_id.as_str()),
                ("client_secret", client.client_secret.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(refresh_error(format!("{status}: {body}")));
        }

        let token: TokenResponse = response.json().await?;
        let expires_at = Utc::now() + Duration::seconds(token.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS));

        let mut next = credential.refreshed(token.access_token, token.refresh_token, Some(expires_at));
        if let (Credential::Salesforce { instance_url, .. }, Some(new_url)) = (&mut next, token.instance_url) {
            *instance_url = new_url;
        }
        Ok(next)
    }
}
