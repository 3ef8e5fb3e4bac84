//! Cache store abstractions and in-memory backend.
//!
//! `CacheStore` is the small key/value + list contract the bot needs:
//! expiring scalar keys, an atomic compare-max, and a bounded head-inserted
//! list. `DedupStore` and `ReplyArchive` layer the bot's key layout on top.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

mod dedup_store;
mod reply_archive;
mod sqlite;

pub use dedup_store::{DedupStore, DEFAULT_HIGH_WATER_MARK_TTL, DEFAULT_PROCESSED_TTL};
pub use reply_archive::{Reply, ReplyArchive, DEFAULT_ARCHIVE_MAX_LEN};
pub use sqlite::SqliteCacheStore;

/// Prefix shared by every key the bot writes.
pub const KEY_NAMESPACE: &str = "substitute-bot";

/// Result type for cache store operations.
pub type StoreResult<T> = Result<T, CacheStoreError>;

/// Errors returned by store implementations.
#[derive(Debug, Error)]
pub enum CacheStoreError {
    #[error("key '{0}' not found")]
    NotFound(String),
    #[error("key '{key}' holds a value of the wrong type for this operation")]
    WrongType { key: String },
    #[error("invalid persisted value for '{key}': {value}")]
    InvalidPersistedValue { key: String, value: String },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Async store contract used by the dedup and archive helpers.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;
    async fn exists(&self, key: &str) -> StoreResult<bool>;
    /// Stores `value` only when `key` is absent or expired; returns whether it
    /// was stored. Check and write happen as one atomic step.
    async fn set_if_absent_with_ttl(&self, key: &str, value: &str, ttl: Duration)
        -> StoreResult<bool>;
    /// Atomically stores `max(existing, value)`, resets the TTL and returns
    /// the stored number.
    async fn set_max_with_ttl(&self, key: &str, value: i64, ttl: Duration) -> StoreResult<i64>;
    /// Inserts at the head of a list, returning the new length.
    async fn push_front(&self, key: &str, value: &str) -> StoreResult<usize>;
    /// Head insert, trim to `max_len` and length read as one atomic step.
    async fn push_front_and_trim(&self, key: &str, value: &str, max_len: usize)
        -> StoreResult<usize>;
    /// Keeps only the first `max_len` list entries.
    async fn trim(&self, key: &str, max_len: usize) -> StoreResult<()>;
    /// Returns up to `count` list entries from the head.
    async fn range(&self, key: &str, count: usize) -> StoreResult<Vec<String>>;
}

#[derive(Debug)]
enum StoredValue {
    Scalar(String),
    List(VecDeque<String>),
}

#[derive(Debug)]
struct StoredEntry {
    value: StoredValue,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |expires_at| now < expires_at)
    }
}

/// Minimum spacing between full expiry sweeps of the in-memory map.
const EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<String, StoredEntry>,
    last_sweep: Option<Instant>,
}

impl MemoryState {
    /// Drops every expired entry, at most once per sweep interval.
    fn sweep_expired(&mut self, now: Instant) {
        if self
            .last_sweep
            .is_some_and(|last| now.duration_since(last) < EXPIRY_SWEEP_INTERVAL)
        {
            return;
        }
        self.entries.retain(|_, entry| entry.is_live(now));
        self.last_sweep = Some(now);
    }
}

/// Process-local backend; TTLs follow the tokio clock.
///
/// Writes periodically sweep expired keys so markers that are never read
/// again do not accumulate.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    state: Mutex<MemoryState>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    async fn entry_count(&self) -> usize {
        self.state.lock().await.entries.len()
    }
}

fn live_entry<'a>(
    entries: &'a mut HashMap<String, StoredEntry>,
    key: &str,
) -> Option<&'a mut StoredEntry> {
    let now = Instant::now();
    if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

fn list_entry<'a>(
    entries: &'a mut HashMap<String, StoredEntry>,
    key: &str,
) -> StoreResult<&'a mut VecDeque<String>> {
    if live_entry(entries, key).is_none() {
        entries.insert(
            key.to_string(),
            StoredEntry {
                value: StoredValue::List(VecDeque::new()),
                expires_at: None,
            },
        );
    }
    match entries.get_mut(key).map(|entry| &mut entry.value) {
        Some(StoredValue::List(list)) => Ok(list),
        _ => Err(CacheStoreError::WrongType {
            key: key.to_string(),
        }),
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut state = self.state.lock().await;
        match live_entry(&mut state.entries, key).map(|entry| &entry.value) {
            None => Ok(None),
            Some(StoredValue::Scalar(value)) => Ok(Some(value.clone())),
            Some(StoredValue::List(_)) => Err(CacheStoreError::WrongType {
                key: key.to_string(),
            }),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.sweep_expired(now);
        state.entries.insert(
            key.to_string(),
            StoredEntry {
                value: StoredValue::Scalar(value.to_string()),
                expires_at: Some(now + ttl),
            },
        );
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        Ok(live_entry(&mut state.entries, key).is_some())
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> StoreResult<bool> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.sweep_expired(now);
        if live_entry(&mut state.entries, key).is_some() {
            return Ok(false);
        }
        state.entries.insert(
            key.to_string(),
            StoredEntry {
                value: StoredValue::Scalar(value.to_string()),
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn set_max_with_ttl(&self, key: &str, value: i64, ttl: Duration) -> StoreResult<i64> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.sweep_expired(now);
        let existing = match live_entry(&mut state.entries, key).map(|entry| &entry.value) {
            None => None,
            Some(StoredValue::Scalar(raw)) => Some(parse_stored_i64(key, raw)?),
            Some(StoredValue::List(_)) => {
                return Err(CacheStoreError::WrongType {
                    key: key.to_string(),
                })
            }
        };
        let stored = existing.map_or(value, |existing| existing.max(value));
        state.entries.insert(
            key.to_string(),
            StoredEntry {
                value: StoredValue::Scalar(stored.to_string()),
                expires_at: Some(now + ttl),
            },
        );
        Ok(stored)
    }

    async fn push_front(&self, key: &str, value: &str) -> StoreResult<usize> {
        let mut state = self.state.lock().await;
        state.sweep_expired(Instant::now());
        let list = list_entry(&mut state.entries, key)?;
        list.push_front(value.to_string());
        Ok(list.len())
    }

    async fn push_front_and_trim(
        &self,
        key: &str,
        value: &str,
        max_len: usize,
    ) -> StoreResult<usize> {
        let mut state = self.state.lock().await;
        state.sweep_expired(Instant::now());
        let list = list_entry(&mut state.entries, key)?;
        list.push_front(value.to_string());
        list.truncate(max_len);
        Ok(list.len())
    }

    async fn trim(&self, key: &str, max_len: usize) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        list_entry(&mut state.entries, key)?.truncate(max_len);
        Ok(())
    }

    async fn range(&self, key: &str, count: usize) -> StoreResult<Vec<String>> {
        let mut state = self.state.lock().await;
        match live_entry(&mut state.entries, key).map(|entry| &entry.value) {
            None => Ok(Vec::new()),
            Some(StoredValue::List(list)) => Ok(list.iter().take(count).cloned().collect()),
            Some(StoredValue::Scalar(_)) => Err(CacheStoreError::WrongType {
                key: key.to_string(),
            }),
        }
    }
}

pub(crate) fn parse_stored_i64(key: &str, raw: &str) -> StoreResult<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| CacheStoreError::InvalidPersistedValue {
            key: key.to_string(),
            value: raw.to_string(),
        })
}
