//! Comment lookup and reply posting over the OAuth API host.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use subbot_core::truncate_for_error;

use crate::auth_session::{AuthSession, PasswordGrantTokenSource, DEFAULT_TOKEN_FRESHNESS};
use crate::comment::{is_comment_fullname, Comment, COMMENT_KIND};
use crate::{Credentials, RedditApiError};

pub const DEFAULT_API_BASE: &str = "https://oauth.reddit.com";
pub const DEFAULT_AUTH_BASE: &str = "https://www.reddit.com";

/// Operations the comment policy needs from the API.
#[async_trait]
pub trait CommentApi: Send + Sync {
    /// Fetches a single comment by fullname (`t1_...`).
    async fn get_comment(&self, fullname: &str) -> Result<Comment, RedditApiError>;
    /// Posts `body_markdown` as a reply to `parent_fullname`.
    async fn post_reply(
        &self,
        parent_fullname: &str,
        body_markdown: &str,
    ) -> Result<Comment, RedditApiError>;
}

#[derive(Debug, Clone)]
pub struct RedditApiConfig {
    pub api_base: String,
    pub auth_base: String,
    pub credentials: Credentials,
    pub request_timeout_ms: u64,
    pub token_freshness: Duration,
}

impl RedditApiConfig {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            auth_base: DEFAULT_AUTH_BASE.to_string(),
            credentials,
            request_timeout_ms: 10_000,
            token_freshness: DEFAULT_TOKEN_FRESHNESS,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Thing {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    data: Value,
}

impl Thing {
    fn into_comment(self) -> Option<Result<Comment, serde_json::Error>> {
        (self.kind == COMMENT_KIND).then(|| serde_json::from_value(self.data))
    }
}

#[derive(Debug, Deserialize)]
struct InfoResponse {
    data: InfoListing,
}

#[derive(Debug, Deserialize)]
struct InfoListing {
    #[serde(default)]
    children: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
struct PostCommentResponse {
    json: PostCommentBody,
}

#[derive(Debug, Deserialize)]
struct PostCommentBody {
    #[serde(default)]
    errors: Vec<Vec<Value>>,
    #[serde(default)]
    data: Option<PostCommentThings>,
}

#[derive(Debug, Deserialize)]
struct PostCommentThings {
    #[serde(default)]
    things: Vec<Thing>,
}

#[derive(Clone)]
pub struct RedditApiClient {
    http: reqwest::Client,
    api_base: String,
    session: Arc<AuthSession>,
}

impl RedditApiClient {
    /// Builds a client whose session authenticates with the password grant.
    ///
    /// No request is issued; see [`RedditApiClient::connect`].
    pub fn new(config: &RedditApiConfig) -> Result<Self, RedditApiError> {
        let http = build_http_client(&config.credentials.user_agent, config.request_timeout_ms)?;
        let source = PasswordGrantTokenSource::new(
            http.clone(),
            &config.auth_base,
            config.credentials.clone(),
        );
        let session = Arc::new(AuthSession::new(Arc::new(source), config.token_freshness));
        Ok(Self::with_session(http, &config.api_base, session))
    }

    /// Builds a client and performs the initial token grant.
    pub async fn connect(config: &RedditApiConfig) -> Result<Self, RedditApiError> {
        let client = Self::new(config)?;
        client.session.authorized_token().await?;
        tracing::info!(
            username = %config.credentials.username,
            "authenticated api client"
        );
        Ok(client)
    }

    pub fn with_session(http: reqwest::Client, api_base: &str, session: Arc<AuthSession>) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            session,
        }
    }

    pub fn session(&self) -> &Arc<AuthSession> {
        &self.session
    }

    pub async fn get_comment(&self, fullname: &str) -> Result<Comment, RedditApiError> {
        if !is_comment_fullname(fullname) {
            return Err(RedditApiError::InvalidFullname(fullname.to_string()));
        }

        let token = self.session.authorized_token().await?;
        let response = self
            .http
            .get(format!("{}/api/info", self.api_base))
            .query(&[("id", fullname), ("raw_json", "1")])
            .bearer_auth(token)
            .send()
            .await?;
        let parsed: InfoResponse = read_json("info", response).await?;

        let mut children = parsed.data.children;
        if children.len() != 1 {
            tracing::debug!(
                fullname = fullname,
                children = children.len(),
                "info lookup did not return exactly one thing"
            );
            return Err(RedditApiError::NotFound(fullname.to_string()));
        }
        match children.remove(0).into_comment() {
            Some(decoded) => Ok(decoded?),
            None => Err(RedditApiError::NotFound(fullname.to_string())),
        }
    }

    pub async fn post_reply(
        &self,
        parent_fullname: &str,
        body_markdown: &str,
    ) -> Result<Comment, RedditApiError> {
        if parent_fullname.is_empty() {
            return Err(RedditApiError::BlankInput {
                field: "parent fullname",
            });
        }
        if body_markdown.is_empty() {
            return Err(RedditApiError::BlankInput { field: "reply body" });
        }

        let token = self.session.authorized_token().await?;
        let form = [
            ("raw_json", "1"),
            ("api_type", "json"),
            ("thing_id", parent_fullname),
            ("text", body_markdown),
        ];
        let response = self
            .http
            .post(format!("{}/api/comment", self.api_base))
            .bearer_auth(token)
            .form(&form)
            .send()
            .await?;
        let parsed: PostCommentResponse = read_json("comment", response).await?;

        if !parsed.json.errors.is_empty() {
            return Err(RedditApiError::ApiRejected(render_api_errors(
                &parsed.json.errors,
            )));
        }
        parsed
            .json
            .data
            .map(|data| data.things)
            .unwrap_or_default()
            .into_iter()
            .find_map(Thing::into_comment)
            .ok_or(RedditApiError::NoResult)?
            .map_err(RedditApiError::from)
    }
}

#[async_trait]
impl CommentApi for RedditApiClient {
    async fn get_comment(&self, fullname: &str) -> Result<Comment, RedditApiError> {
        RedditApiClient::get_comment(self, fullname).await
    }

    async fn post_reply(
        &self,
        parent_fullname: &str,
        body_markdown: &str,
    ) -> Result<Comment, RedditApiError> {
        RedditApiClient::post_reply(self, parent_fullname, body_markdown).await
    }
}

fn build_http_client(
    user_agent: &str,
    request_timeout_ms: u64,
) -> Result<reqwest::Client, RedditApiError> {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        reqwest::header::USER_AGENT,
        reqwest::header::HeaderValue::from_str(user_agent)
            .map_err(|error| RedditApiError::InvalidHeader(error.to_string()))?,
    );
    headers.insert(
        reqwest::header::ACCEPT,
        reqwest::header::HeaderValue::from_static("application/json"),
    );
    Ok(reqwest::Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_millis(request_timeout_ms.max(1)))
        .build()?)
}

async fn read_json<T: serde::de::DeserializeOwned>(
    operation: &'static str,
    response: reqwest::Response,
) -> Result<T, RedditApiError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(RedditApiError::HttpStatus {
            operation,
            status: status.as_u16(),
            body: truncate_for_error(&body, 800),
        });
    }
    Ok(serde_json::from_str(&body)?)
}

fn render_api_errors(errors: &[Vec<Value>]) -> String {
    errors
        .iter()
        .map(|tuple| {
            let parts = tuple
                .iter()
                .map(|value| match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>();
            format!("[{}]", parts.join(", "))
        })
        .collect::<Vec<_>>()
        .join(", ")
}
