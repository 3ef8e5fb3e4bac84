use std::sync::Arc;
use std::time::Duration;

use crate::{parse_stored_i64, CacheStore, CacheStoreError, StoreResult, KEY_NAMESPACE};

pub const DEFAULT_HIGH_WATER_MARK_TTL: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_PROCESSED_TTL: Duration = Duration::from_secs(5 * 60);

/// Tracks the largest event id seen and short-lived per-comment markers.
#[derive(Clone)]
pub struct DedupStore {
    store: Arc<dyn CacheStore>,
    high_water_mark_ttl: Duration,
    processed_ttl: Duration,
}

impl DedupStore {
    pub fn new(
        store: Arc<dyn CacheStore>,
        high_water_mark_ttl: Duration,
        processed_ttl: Duration,
    ) -> Self {
        Self {
            store,
            high_water_mark_ttl,
            processed_ttl,
        }
    }

    fn high_water_mark_key() -> String {
        format!("{KEY_NAMESPACE}:max-comment-id")
    }

    fn processed_key(id: &str) -> String {
        format!("{KEY_NAMESPACE}:processed-comments:{id}")
    }

    /// Raises the mark to `id` if larger and refreshes its TTL.
    pub async fn record_high_water_mark(&self, id: i64) -> StoreResult<i64> {
        self.store
            .set_max_with_ttl(&Self::high_water_mark_key(), id, self.high_water_mark_ttl)
            .await
    }

    pub async fn high_water_mark(&self) -> StoreResult<i64> {
        let key = Self::high_water_mark_key();
        match self.store.get(&key).await? {
            Some(raw) => parse_stored_i64(&key, &raw),
            None => Err(CacheStoreError::NotFound(key)),
        }
    }

    /// Marks `id` processed; returns false when it already was.
    ///
    /// Concurrent callers with the same id see exactly one `true`.
    pub async fn mark_processed(&self, id: &str) -> StoreResult<bool> {
        self.store
            .set_if_absent_with_ttl(&Self::processed_key(id), "1", self.processed_ttl)
            .await
    }

    pub async fn is_processed(&self, id: &str) -> StoreResult<bool> {
        self.store.exists(&Self::processed_key(id)).await
    }
}
