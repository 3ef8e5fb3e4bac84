use std::sync::Arc;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use subbot_reddit::Comment;

use crate::{CacheStore, CacheStoreError, StoreResult, KEY_NAMESPACE};

pub const DEFAULT_ARCHIVE_MAX_LEN: usize = 50;

/// A reply the bot posted, plus the user who asked for it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub author: String,
    pub author_fullname: String,
    pub body: String,
    pub body_html: String,
    pub created_utc: i64,
    pub id: String,
    pub name: String,
    pub parent_id: String,
    pub permalink: String,
    pub requester: String,
}

impl Reply {
    pub fn from_posted(requester: &str, posted: &Comment) -> Self {
        Self {
            author: posted.author.clone(),
            author_fullname: posted.author_fullname.clone(),
            body: posted.body.clone(),
            body_html: posted.body_html.clone(),
            created_utc: posted.created_utc as i64,
            id: posted.id.clone(),
            name: posted.name.clone(),
            parent_id: posted.parent_id.clone(),
            permalink: posted.permalink.clone(),
            requester: requester.to_string(),
        }
    }

    /// Formats `created_utc` as e.g. `January 02, 2006` (UTC).
    pub fn created_date(&self) -> String {
        DateTime::from_timestamp(self.created_utc, 0)
            .map(|timestamp| timestamp.format("%B %d, %Y").to_string())
            .unwrap_or_default()
    }
}

/// Bounded, most-recent-first list of posted replies.
#[derive(Clone)]
pub struct ReplyArchive {
    store: Arc<dyn CacheStore>,
    key: String,
}

impl ReplyArchive {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            key: format!("{KEY_NAMESPACE}:comments"),
        }
    }

    /// Inserts at the head and trims to `max_len` atomically; returns the new length.
    pub async fn append_with_trim(&self, reply: &Reply, max_len: usize) -> StoreResult<usize> {
        let encoded = serde_json::to_string(reply)?;
        self.store
            .push_front_and_trim(&self.key, &encoded, max_len)
            .await
    }

    pub async fn append(&self, reply: &Reply) -> StoreResult<usize> {
        let encoded = serde_json::to_string(reply)?;
        self.store.push_front(&self.key, &encoded).await
    }

    pub async fn trim(&self, max_len: usize) -> StoreResult<()> {
        self.store.trim(&self.key, max_len).await
    }

    pub async fn fetch(&self, count: usize) -> StoreResult<Vec<Reply>> {
        self.store
            .range(&self.key, count)
            .await?
            .iter()
            .map(|raw| serde_json::from_str::<Reply>(raw).map_err(CacheStoreError::from))
            .collect()
    }
}
