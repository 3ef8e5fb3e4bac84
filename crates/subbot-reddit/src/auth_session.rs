//! Bearer-token ownership and renewal.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use serde::Deserialize;
use subbot_core::truncate_for_error;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::{Credentials, RedditApiError};

/// Default window during which a granted token is reused.
pub const DEFAULT_TOKEN_FRESHNESS: Duration = Duration::from_secs(40 * 60);

/// Something that can mint a new bearer token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn request_token(&self) -> Result<String, RedditApiError>;
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

/// OAuth2 password grant against `<auth_base>/api/v1/access_token`.
#[derive(Clone)]
pub struct PasswordGrantTokenSource {
    http: reqwest::Client,
    token_url: String,
    credentials: Credentials,
}

impl PasswordGrantTokenSource {
    pub fn new(http: reqwest::Client, auth_base: &str, credentials: Credentials) -> Self {
        Self {
            http,
            token_url: format!("{}/api/v1/access_token", auth_base.trim_end_matches('/')),
            credentials,
        }
    }
}

#[async_trait]
impl TokenSource for PasswordGrantTokenSource {
    async fn request_token(&self) -> Result<String, RedditApiError> {
        let form = [
            ("grant_type", "password"),
            ("username", self.credentials.username.as_str()),
            ("password", self.credentials.password.as_str()),
        ];
        let response = self
            .http
            .post(&self.token_url)
            .header(USER_AGENT, &self.credentials.user_agent)
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(RedditApiError::HttpStatus {
                operation: "access_token",
                status: status.as_u16(),
                body: truncate_for_error(&body, 800),
            });
        }

        let parsed: AccessTokenResponse = serde_json::from_str(&body)?;
        parsed
            .access_token
            .filter(|token| !token.trim().is_empty())
            .ok_or(RedditApiError::EmptyToken)
    }
}

#[derive(Debug, Clone)]
struct AuthGrant {
    token: String,
    granted_at: Instant,
}

impl AuthGrant {
    fn is_fresh(&self, freshness: Duration) -> bool {
        self.granted_at.elapsed() < freshness
    }
}

/// Shared bearer token with time-based staleness.
///
/// Many workers read the token concurrently; renewal is serialized so that
/// a burst of callers observing a stale token triggers a single grant.
pub struct AuthSession {
    source: Arc<dyn TokenSource>,
    freshness: Duration,
    grant: RwLock<Option<AuthGrant>>,
}

impl AuthSession {
    pub fn new(source: Arc<dyn TokenSource>, freshness: Duration) -> Self {
        Self {
            source,
            freshness,
            grant: RwLock::new(None),
        }
    }

    /// Returns true when a token exists and is inside the freshness window.
    pub async fn is_fresh(&self) -> bool {
        self.fresh_token().await.is_some()
    }

    /// Returns a fresh bearer token, renewing it first when stale.
    pub async fn authorized_token(&self) -> Result<String, RedditApiError> {
        if let Some(token) = self.fresh_token().await {
            return Ok(token);
        }
        self.renew_if_stale().await
    }

    async fn fresh_token(&self) -> Option<String> {
        let grant = self.grant.read().await;
        grant
            .as_ref()
            .filter(|grant| grant.is_fresh(self.freshness))
            .map(|grant| grant.token.clone())
    }

    /// Double-checked renewal.
    ///
    /// Takes the write lock and re-checks freshness before calling the token
    /// source, so callers that queued behind a successful renewal reuse its
    /// token. A failed renewal leaves the previous grant in place and returns
    /// the error to this caller only.
    async fn renew_if_stale(&self) -> Result<String, RedditApiError> {
        let mut grant = self.grant.write().await;
        if let Some(current) = grant
            .as_ref()
            .filter(|current| current.is_fresh(self.freshness))
        {
            return Ok(current.token.clone());
        }

        tracing::info!("requesting new access token");
        let token = match self.source.request_token().await {
            Ok(token) => token,
            Err(error) => {
                tracing::warn!(error = %error, "access token renewal failed");
                return Err(error);
            }
        };
        *grant = Some(AuthGrant {
            token: token.clone(),
            granted_at: Instant::now(),
        });
        Ok(token)
    }
}
