//! SQLite-backed `CacheStore` so the high-water-mark and archive survive restarts.

use crate::{parse_stored_i64, CacheStore, CacheStoreError, StoreResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;
use subbot_core::{current_unix_timestamp_ms, is_expired_unix_ms};

/// Persistent store backend; scalar TTLs follow the wall clock.
#[derive(Debug)]
pub struct SqliteCacheStore {
    db_path: PathBuf,
}

impl SqliteCacheStore {
    /// Creates a SQLite-backed store at `path`, creating schema if needed.
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let store = Self { db_path };
        let connection = store.open_connection()?;
        store.initialize_schema(&connection)?;
        tracing::debug!(path = %store.db_path.display(), "opened sqlite cache store");
        Ok(store)
    }

    fn open_connection(&self) -> StoreResult<Connection> {
        let connection = Connection::open(&self.db_path)?;
        connection.busy_timeout(Duration::from_secs(5))?;
        connection.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            "#,
        )?;
        Ok(connection)
    }

    fn initialize_schema(&self, connection: &Connection) -> StoreResult<()> {
        connection.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_values (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at_ms INTEGER NULL
            );

            CREATE INDEX IF NOT EXISTS idx_cache_values_expires_at
                ON cache_values (expires_at_ms);

            CREATE TABLE IF NOT EXISTS cache_list_items (
                item_id INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT NOT NULL,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_cache_list_items_key
                ON cache_list_items (key, item_id);
            "#,
        )?;
        Ok(())
    }
}

fn expiry_from_ttl(ttl: Duration) -> i64 {
    let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
    to_db_i64(current_unix_timestamp_ms().saturating_add(ttl_ms))
}

fn to_db_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_db_len(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn live_value(transaction: &Transaction<'_>, key: &str) -> StoreResult<Option<String>> {
    let row: Option<(String, Option<i64>)> = transaction
        .query_row(
            "SELECT value, expires_at_ms FROM cache_values WHERE key = ?1",
            params![key],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some((value, expires_at_ms)) = row else {
        return Ok(None);
    };

    let expires_at_ms = expires_at_ms.map(|value| u64::try_from(value).unwrap_or(0));
    if is_expired_unix_ms(expires_at_ms, current_unix_timestamp_ms()) {
        transaction.execute("DELETE FROM cache_values WHERE key = ?1", params![key])?;
        return Ok(None);
    }
    Ok(Some(value))
}

/// Deletes every scalar whose TTL has lapsed, not only the key being written.
fn sweep_expired_values(transaction: &Transaction<'_>) -> StoreResult<()> {
    transaction.execute(
        "DELETE FROM cache_values WHERE expires_at_ms IS NOT NULL AND expires_at_ms <= ?1",
        params![to_db_i64(current_unix_timestamp_ms())],
    )?;
    Ok(())
}

fn upsert_value(
    transaction: &Transaction<'_>,
    key: &str,
    value: &str,
    ttl: Duration,
) -> StoreResult<()> {
    transaction.execute(
        r#"
        INSERT INTO cache_values (key, value, expires_at_ms) VALUES (?1, ?2, ?3)
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            expires_at_ms = excluded.expires_at_ms
        "#,
        params![key, value, expiry_from_ttl(ttl)],
    )?;
    Ok(())
}

fn ensure_not_scalar(transaction: &Transaction<'_>, key: &str) -> StoreResult<()> {
    if live_value(transaction, key)?.is_some() {
        return Err(CacheStoreError::WrongType {
            key: key.to_string(),
        });
    }
    Ok(())
}

fn ensure_not_list(transaction: &Transaction<'_>, key: &str) -> StoreResult<()> {
    let list_exists: bool = transaction.query_row(
        "SELECT EXISTS(SELECT 1 FROM cache_list_items WHERE key = ?1)",
        params![key],
        |row| row.get(0),
    )?;
    if list_exists {
        return Err(CacheStoreError::WrongType {
            key: key.to_string(),
        });
    }
    Ok(())
}

fn list_len(transaction: &Transaction<'_>, key: &str) -> StoreResult<usize> {
    let count: i64 = transaction.query_row(
        "SELECT COUNT(*) FROM cache_list_items WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )?;
    Ok(usize::try_from(count).unwrap_or(0))
}

fn trim_list(transaction: &Transaction<'_>, key: &str, max_len: usize) -> StoreResult<()> {
    transaction.execute(
        r#"
        DELETE FROM cache_list_items
        WHERE key = ?1 AND item_id NOT IN (
            SELECT item_id FROM cache_list_items
            WHERE key = ?1
            ORDER BY item_id DESC
            LIMIT ?2
        )
        "#,
        params![key, to_db_len(max_len)],
    )?;
    Ok(())
}

fn insert_list_head(transaction: &Transaction<'_>, key: &str, value: &str) -> StoreResult<()> {
    ensure_not_scalar(transaction, key)?;
    transaction.execute(
        "INSERT INTO cache_list_items (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_not_list(&transaction, key)?;
        let value = live_value(&transaction, key)?;
        transaction.commit()?;
        Ok(value)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_not_list(&transaction, key)?;
        sweep_expired_values(&transaction)?;
        upsert_value(&transaction, key, value, ttl)?;
        transaction.commit()?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let scalar = live_value(&transaction, key)?.is_some();
        let list = !scalar && list_len(&transaction, key)? > 0;
        transaction.commit()?;
        Ok(scalar || list)
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> StoreResult<bool> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
        sweep_expired_values(&transaction)?;
        let absent = live_value(&transaction, key)?.is_none() && list_len(&transaction, key)? == 0;
        if absent {
            upsert_value(&transaction, key, value, ttl)?;
        }
        transaction.commit()?;
        Ok(absent)
    }

    async fn set_max_with_ttl(&self, key: &str, value: i64, ttl: Duration) -> StoreResult<i64> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_not_list(&transaction, key)?;
        sweep_expired_values(&transaction)?;
        let stored = match live_value(&transaction, key)? {
            Some(raw) => parse_stored_i64(key, &raw)?.max(value),
            None => value,
        };
        upsert_value(&transaction, key, &stored.to_string(), ttl)?;
        transaction.commit()?;
        Ok(stored)
    }

    async fn push_front(&self, key: &str, value: &str) -> StoreResult<usize> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
        insert_list_head(&transaction, key, value)?;
        let len = list_len(&transaction, key)?;
        transaction.commit()?;
        Ok(len)
    }

    async fn push_front_and_trim(
        &self,
        key: &str,
        value: &str,
        max_len: usize,
    ) -> StoreResult<usize> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
        insert_list_head(&transaction, key, value)?;
        trim_list(&transaction, key, max_len)?;
        let len = list_len(&transaction, key)?;
        transaction.commit()?;
        Ok(len)
    }

    async fn trim(&self, key: &str, max_len: usize) -> StoreResult<()> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_not_scalar(&transaction, key)?;
        trim_list(&transaction, key, max_len)?;
        transaction.commit()?;
        Ok(())
    }

    async fn range(&self, key: &str, count: usize) -> StoreResult<Vec<String>> {
        let connection = self.open_connection()?;
        let mut statement = connection.prepare(
            r#"
            SELECT value FROM cache_list_items
            WHERE key = ?1
            ORDER BY item_id DESC
            LIMIT ?2
            "#,
        )?;
        let rows = statement
            .query_map(params![key, to_db_len(count)], |row| row.get::<_, String>(0))?;
        let mut values = Vec::new();
        for row in rows {
            values.push(row?);
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteCacheStore;
    use crate::{CacheStore, CacheStoreError};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn functional_scalar_and_list_values_persist_across_reopen() {
        let temp = tempdir().expect("create tempdir");
        let db_path = temp.path().join("nested").join("cache.sqlite");

        {
            let store = SqliteCacheStore::new(&db_path).expect("create sqlite store");
            store
                .set_max_with_ttl("mark", 42, Duration::from_secs(60))
                .await
                .expect("set max");
            store.push_front("list", "a").await.expect("push");
            store.push_front("list", "b").await.expect("push");
        }

        let reopened = SqliteCacheStore::new(&db_path).expect("reopen sqlite store");
        assert_eq!(
            reopened.get("mark").await.expect("get").as_deref(),
            Some("42")
        );
        assert_eq!(
            reopened.range("list", 10).await.expect("range"),
            vec!["b", "a"]
        );
        assert!(reopened.exists("list").await.expect("exists"));
    }

    #[tokio::test]
    async fn functional_expired_scalar_is_absent() {
        let temp = tempdir().expect("create tempdir");
        let store = SqliteCacheStore::new(temp.path().join("cache.sqlite")).expect("store");
        store
            .set_with_ttl("short", "v", Duration::from_millis(1))
            .await
            .expect("set");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.get("short").await.expect("get"), None);
        assert!(!store.exists("short").await.expect("exists"));
        assert_eq!(
            store
                .set_max_with_ttl("short", 3, Duration::from_secs(60))
                .await
                .expect("set max over expired"),
            3
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn integration_concurrent_set_max_converges_on_largest_value() {
        let temp = tempdir().expect("create tempdir");
        let store =
            Arc::new(SqliteCacheStore::new(temp.path().join("cache.sqlite")).expect("store"));

        let mut handles = Vec::new();
        for value in [50_i64, 30, 70, 10] {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .set_max_with_ttl("mark", value, Duration::from_secs(60))
                    .await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("set max");
        }
        assert_eq!(store.get("mark").await.expect("get").as_deref(), Some("70"));
    }

    #[tokio::test]
    async fn functional_push_front_and_trim_keeps_most_recent_entries() {
        let temp = tempdir().expect("create tempdir");
        let store = SqliteCacheStore::new(temp.path().join("cache.sqlite")).expect("store");

        let mut last_len = 0;
        for index in 0..11 {
            last_len = store
                .push_front_and_trim("list", &format!("item-{index}"), 10)
                .await
                .expect("push");
        }
        assert_eq!(last_len, 10);
        let items = store.range("list", 100).await.expect("range");
        assert_eq!(items.len(), 10);
        assert_eq!(items.first().map(String::as_str), Some("item-10"));
        assert_eq!(items.last().map(String::as_str), Some("item-1"));

        store.trim("list", 2).await.expect("trim");
        assert_eq!(
            store.range("list", 100).await.expect("range"),
            vec!["item-10", "item-9"]
        );
    }

    #[tokio::test]
    async fn regression_scalar_and_list_keys_do_not_mix() {
        let temp = tempdir().expect("create tempdir");
        let store = SqliteCacheStore::new(temp.path().join("cache.sqlite")).expect("store");
        store.push_front("list", "a").await.expect("push");
        store
            .set_with_ttl("scalar", "v", Duration::from_secs(60))
            .await
            .expect("set");

        assert!(matches!(
            store.get("list").await,
            Err(CacheStoreError::WrongType { .. })
        ));
        assert!(matches!(
            store.push_front("scalar", "x").await,
            Err(CacheStoreError::WrongType { .. })
        ));
    }

    #[tokio::test]
    async fn regression_writes_sweep_expired_rows_for_other_keys() {
        let temp = tempdir().expect("create tempdir");
        let store = SqliteCacheStore::new(temp.path().join("cache.sqlite")).expect("store");
        for index in 0..200 {
            store
                .set_with_ttl(&format!("marker:{index}"), "1", Duration::from_millis(1))
                .await
                .expect("set");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        store
            .set_with_ttl("fresh", "1", Duration::from_secs(300))
            .await
            .expect("set");

        let connection = store.open_connection().expect("connection");
        let rows: i64 = connection
            .query_row("SELECT COUNT(*) FROM cache_values", [], |row| row.get(0))
            .expect("count");
        assert_eq!(rows, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn integration_concurrent_set_if_absent_has_one_winner() {
        let temp = tempdir().expect("create tempdir");
        let store =
            Arc::new(SqliteCacheStore::new(temp.path().join("cache.sqlite")).expect("store"));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .set_if_absent_with_ttl("claim", "1", Duration::from_secs(60))
                    .await
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.expect("join").expect("claim") {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);

        store
            .set_with_ttl("short", "v", Duration::from_millis(1))
            .await
            .expect("set");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store
            .set_if_absent_with_ttl("short", "w", Duration::from_secs(60))
            .await
            .expect("claim expired key"));
        assert_eq!(store.get("short").await.expect("get").as_deref(), Some("w"));
    }
}
