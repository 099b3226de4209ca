//! Upstream authentication capability.
//!
//! The core consumes an [`AuthClient`]: something that can hand out a live
//! OAuth access token, invalidate it after a 401, and optionally suggest a
//! Cloud project id. The interactive login ceremony is not part of this
//! crate; [`OauthAuthClient`] picks up the credential cache the Gemini CLI
//! leaves behind and keeps it fresh with refresh-token grants.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::ProxyError;

const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

// Public installed-app credentials of the Gemini CLI; required for the
// refresh grant against tokens that CLI minted.
const OAUTH_CLIENT_ID: &str =
    "681255809395-oo8ft2oprdrnp9e3aqf6av3hmdib135j.apps.googleusercontent.com";
const OAUTH_CLIENT_SECRET: &str = "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";

/// How close to expiry a token is still considered usable.
const EXPIRY_SLACK_MS: u64 = 30_000;

/// Capability consumed by the Gemini streaming client.
#[async_trait]
pub trait AuthClient: Send + Sync {
    /// A live bearer token, refreshing first if the cached one is stale.
    async fn access_token(&self) -> Result<String, ProxyError>;

    /// Force a refresh on the next `access_token` call.
    fn invalidate_token(&self);

    /// An explicit project id, if the environment or configuration carries
    /// one.
    fn project_hint(&self) -> Option<String>;
}

/// Resolve the project hint from the environment first, then configuration.
#[must_use]
pub fn project_hint_from_env(configured: Option<&str>) -> Option<String> {
    for var in ["GOOGLE_CLOUD_PROJECT", "GOOGLE_CLOUD_PROJECT_ID"] {
        if let Ok(value) = std::env::var(var) {
            if !value.is_empty() {
                return Some(value);
            }
        }
    }
    configured.map(ToString::to_string)
}

// ---------------------------------------------------------------------------
// OauthAuthClient — cached-credentials implementation
// ---------------------------------------------------------------------------

/// On-disk credential cache layout (Gemini CLI `oauth_creds.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedCredentials {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    token_type: Option<String>,
    /// Expiry as Unix milliseconds.
    #[serde(default)]
    expiry_date: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshGrantResponse {
    access_token: String,
    /// Lifetime in seconds.
    expires_in: u64,
}

#[derive(Debug)]
struct TokenState {
    access_token: String,
    refresh_token: String,
    expiry_unix_ms: u64,
}

/// [`AuthClient`] backed by a cached OAuth credential file.
pub struct OauthAuthClient {
    credentials_path: PathBuf,
    state: Mutex<Option<TokenState>>,
    http: reqwest::Client,
    configured_project: Option<String>,
}

impl OauthAuthClient {
    /// Build a client over a credentials file. The file is read lazily on
    /// the first `access_token` call.
    #[must_use]
    pub fn new(credentials_path: PathBuf, configured_project: Option<String>) -> Self {
        Self {
            credentials_path,
            state: Mutex::new(None),
            http: reqwest::Client::new(),
            configured_project,
        }
    }

    /// The default Gemini CLI credentials location: `~/.gemini/oauth_creds.json`.
    #[must_use]
    pub fn default_credentials_path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        Path::new(&home).join(".gemini").join("oauth_creds.json")
    }

    fn load_state(&self) -> Result<TokenState, ProxyError> {
        let raw = std::fs::read_to_string(&self.credentials_path).map_err(|err| {
            ProxyError::Auth(format!(
                "cannot read credentials at {}: {err}",
                self.credentials_path.display()
            ))
        })?;
        let cached: CachedCredentials = serde_json::from_str(&raw)
            .map_err(|err| ProxyError::Auth(format!("malformed credential cache: {err}")))?;
        Ok(TokenState {
            access_token: cached.access_token,
            refresh_token: cached.refresh_token,
            expiry_unix_ms: cached.expiry_date,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<(String, u64), ProxyError> {
        let params = [
            ("client_id", OAUTH_CLIENT_ID),
            ("client_secret", OAUTH_CLIENT_SECRET),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        let response = self
            .http
            .post(TOKEN_ENDPOINT)
            .form(&params)
            .send()
            .await
            .map_err(|err| ProxyError::Auth(format!("token refresh failed: {err}")))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProxyError::Auth(format!(
                "token refresh rejected (status {status}): {body}"
            )));
        }
        let grant: RefreshGrantResponse = response
            .json()
            .await
            .map_err(|err| ProxyError::Auth(format!("malformed token response: {err}")))?;
        let expiry_unix_ms = unix_now_ms() + grant.expires_in.saturating_mul(1000);
        Ok((grant.access_token, expiry_unix_ms))
    }

    fn persist(&self, state: &TokenState) {
        let cached = CachedCredentials {
            access_token: state.access_token.clone(),
            refresh_token: state.refresh_token.clone(),
            token_type: Some("Bearer".to_string()),
            expiry_date: state.expiry_unix_ms,
            scope: None,
        };
        match serde_json::to_vec_pretty(&cached) {
            Ok(bytes) => {
                if let Err(err) = std::fs::write(&self.credentials_path, bytes) {
                    tracing::debug!(error = %err, "failed to persist refreshed credentials");
                }
            }
            Err(err) => tracing::debug!(error = %err, "failed to serialize credentials"),
        }
    }
}

fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis() as u64)
}

#[async_trait]
impl AuthClient for OauthAuthClient {
    async fn access_token(&self) -> Result<String, ProxyError> {
        let refresh_token = {
            let mut guard = self.state.lock();
            if guard.is_none() {
                *guard = Some(self.load_state()?);
            }
            let state = guard.as_ref().expect("state just loaded");
            if state.expiry_unix_ms > unix_now_ms() + EXPIRY_SLACK_MS {
                return Ok(state.access_token.clone());
            }
            state.refresh_token.clone()
        };

        let (access_token, expiry_unix_ms) = self.refresh(&refresh_token).await?;
        let new_state = TokenState {
            access_token: access_token.clone(),
            refresh_token,
            expiry_unix_ms,
        };
        self.persist(&new_state);
        *self.state.lock() = Some(new_state);
        Ok(access_token)
    }

    fn invalidate_token(&self) {
        if let Some(state) = self.state.lock().as_mut() {
            state.expiry_unix_ms = 0;
        }
    }

    fn project_hint(&self) -> Option<String> {
        project_hint_from_env(self.configured_project.as_deref())
    }
}

// ---------------------------------------------------------------------------
// StaticAuthClient — fixed-token implementation for tests
// ---------------------------------------------------------------------------

/// [`AuthClient`] with a fixed token; used by tests and one-off scripting.
pub struct StaticAuthClient {
    token: String,
    project: Option<String>,
    invalidations: std::sync::atomic::AtomicU64,
}

impl StaticAuthClient {
    #[must_use]
    pub fn new(token: impl Into<String>, project: Option<String>) -> Self {
        Self {
            token: token.into(),
            project,
            invalidations: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// How many times `invalidate_token` has been called.
    #[must_use]
    pub fn invalidation_count(&self) -> u64 {
        self.invalidations.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[async_trait]
impl AuthClient for StaticAuthClient {
    async fn access_token(&self) -> Result<String, ProxyError> {
        Ok(self.token.clone())
    }

    fn invalidate_token(&self) {
        self.invalidations
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    fn project_hint(&self) -> Option<String> {
        self.project.clone()
    }
}
