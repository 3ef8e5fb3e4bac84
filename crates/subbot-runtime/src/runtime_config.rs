use std::time::Duration;

use anyhow::{bail, Result};
use subbot_reddit::{
    Credentials, RedditApiConfig, DEFAULT_API_BASE, DEFAULT_AUTH_BASE, DEFAULT_TOKEN_FRESHNESS,
};
use subbot_store::{DEFAULT_ARCHIVE_MAX_LEN, DEFAULT_HIGH_WATER_MARK_TTL, DEFAULT_PROCESSED_TTL};

use crate::CommentPolicyConfig;

pub const DEFAULT_STREAM_URL: &str = "http://stream.pushshift.io/?type=comments&filter=author,author_fullname,body,body_html,created_utc,id,name,parent_id,permalink";
pub const DEFAULT_COMMENT_EVENT_TAG: &str = "rc";
pub const DEFAULT_REPLY_FOOTER: &str = "\n\n^^This ^^was ^^posted ^^by ^^a ^^bot. ^^[Source](https://github.com/anirbanmu/substitute-bot-go)";

/// Everything a bot run needs; built explicitly by the caller.
#[derive(Debug, Clone)]
pub struct BotRuntimeConfig {
    pub credentials: Credentials,
    pub stream_url: String,
    pub api_base: String,
    pub auth_base: String,
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub archive_max_len: usize,
    pub high_water_mark_ttl: Duration,
    pub processed_ttl: Duration,
    pub token_freshness: Duration,
    pub request_timeout_ms: u64,
    pub heartbeat_interval: Duration,
    pub comment_event_tag: String,
    pub reply_footer: String,
}

impl Default for BotRuntimeConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            stream_url: DEFAULT_STREAM_URL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            auth_base: DEFAULT_AUTH_BASE.to_string(),
            worker_count: 16,
            queue_capacity: 4096,
            archive_max_len: DEFAULT_ARCHIVE_MAX_LEN,
            high_water_mark_ttl: DEFAULT_HIGH_WATER_MARK_TTL,
            processed_ttl: DEFAULT_PROCESSED_TTL,
            token_freshness: DEFAULT_TOKEN_FRESHNESS,
            request_timeout_ms: 10_000,
            heartbeat_interval: Duration::from_secs(60),
            comment_event_tag: DEFAULT_COMMENT_EVENT_TAG.to_string(),
            reply_footer: DEFAULT_REPLY_FOOTER.to_string(),
        }
    }
}

impl BotRuntimeConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(field) = self.credentials.first_missing_field() {
            bail!("bot credential '{field}' must be set");
        }
        if self.stream_url.trim().is_empty() {
            bail!("stream url must not be empty");
        }
        if self.worker_count == 0 {
            bail!("worker count must be greater than zero");
        }
        if self.queue_capacity == 0 {
            bail!("queue capacity must be greater than zero");
        }
        if self.archive_max_len == 0 {
            bail!("archive max length must be greater than zero");
        }
        for (name, value) in [
            ("high-water-mark ttl", self.high_water_mark_ttl),
            ("processed ttl", self.processed_ttl),
            ("token freshness", self.token_freshness),
            ("heartbeat interval", self.heartbeat_interval),
        ] {
            if value.is_zero() {
                bail!("{name} must be greater than zero");
            }
        }
        if self.comment_event_tag.trim().is_empty() {
            bail!("comment event tag must not be empty");
        }
        Ok(())
    }

    /// Returns the stream URL, resuming after `high_water_mark` when known.
    pub fn resume_stream_url(&self, high_water_mark: Option<i64>) -> String {
        let Some(mark) = high_water_mark else {
            return self.stream_url.clone();
        };
        let separator = if self.stream_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{separator}comment_start_id={}",
            self.stream_url,
            mark.saturating_add(1)
        )
    }

    pub fn api_config(&self) -> RedditApiConfig {
        RedditApiConfig {
            api_base: self.api_base.clone(),
            auth_base: self.auth_base.clone(),
            credentials: self.credentials.clone(),
            request_timeout_ms: self.request_timeout_ms,
            token_freshness: self.token_freshness,
        }
    }

    pub fn policy_config(&self) -> CommentPolicyConfig {
        CommentPolicyConfig {
            bot_username: self.credentials.username.clone(),
            reply_footer: self.reply_footer.clone(),
            archive_max_len: self.archive_max_len,
        }
    }
}
