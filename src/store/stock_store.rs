//! Stock Record Storage
//!
//! SQLite-backed like counters, one record per canonical ticker symbol.
//!
//! # Schema Design
//!
//! ```sql
//! CREATE TABLE stocks (
//!     symbol TEXT PRIMARY KEY,
//!     likes INTEGER NOT NULL DEFAULT 0 CHECK (likes >= 0),
//!     created_at INTEGER NOT NULL,
//!     updated_at INTEGER NOT NULL
//! ) WITHOUT ROWID;
//!
//! -- The set of anonymization tokens that already liked a symbol
//! CREATE TABLE stock_likes (
//!     symbol TEXT NOT NULL REFERENCES stocks(symbol),
//!     ip_hash TEXT NOT NULL,
//!     liked_at INTEGER NOT NULL,
//!     PRIMARY KEY (symbol, ip_hash)
//! ) WITHOUT ROWID;
//! ```
//!
//! A like is recorded by inserting into `stock_likes` and, only when that
//! insert added a row, incrementing `stocks.likes`, inside one transaction.
//! `likes` therefore always equals the number of `stock_likes` rows for the
//! symbol, no matter how many requests race on the same caller.

use crate::models::StockRecord;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS stocks (
    symbol TEXT PRIMARY KEY,
    likes INTEGER NOT NULL DEFAULT 0 CHECK (likes >= 0),
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS stock_likes (
    symbol TEXT NOT NULL REFERENCES stocks(symbol),
    ip_hash TEXT NOT NULL,
    liked_at INTEGER NOT NULL,
    PRIMARY KEY (symbol, ip_hash)
) WITHOUT ROWID;
"#;

/// Storage for stock like records.
///
/// Opened once at startup and shared behind an `Arc`; [`StockStore::close`]
/// ends its lifecycle.
pub struct StockStore {
    conn: Arc<Mutex<Option<Connection>>>,
}

impl StockStore {
    /// Open (or create) the store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// Look up a record without creating it.
    pub async fn get(&self, symbol: &str) -> Result<Option<StockRecord>, StoreError> {
        let symbol = canonical_symbol(symbol)?;
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;
        load_record(conn, &symbol)
    }

    /// Return the record for `symbol`, creating an empty one on first use.
    pub async fn get_or_create(&self, symbol: &str) -> Result<StockRecord, StoreError> {
        let symbol = canonical_symbol(symbol)?;
        let now = Utc::now().timestamp();

        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO stocks (symbol, likes, created_at, updated_at)
             VALUES (?1, 0, ?2, ?2)",
            params![symbol, now],
        )?;
        if inserted > 0 {
            info!(symbol = %symbol, "Created stock record");
        }

        load_record(conn, &symbol)?.ok_or(StoreError::NotFound(symbol))
    }

    /// Count a like from `token` on `record`.
    ///
    /// A token already present in `record.liked_hashes` returns the record
    /// unchanged without touching the database. Otherwise the membership
    /// insert and the counter increment commit together, and the stored
    /// record is returned.
    pub async fn apply_like(
        &self,
        record: &StockRecord,
        token: &str,
    ) -> Result<StockRecord, StoreError> {
        if record.has_liked(token) {
            debug!(symbol = %record.symbol, "Like already counted");
            return Ok(record.clone());
        }

        let now = Utc::now().timestamp();
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(StoreError::Closed)?;

        let tx = conn.transaction()?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO stock_likes (symbol, ip_hash, liked_at) VALUES (?1, ?2, ?3)",
            params![record.symbol, token, now],
        )?;
        if inserted > 0 {
            let updated = tx.execute(
                "UPDATE stocks SET likes = likes + 1, updated_at = ?2 WHERE symbol = ?1",
                params![record.symbol, now],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(record.symbol.clone()));
            }
        }
        tx.commit()?;

        if inserted > 0 {
            debug!(symbol = %record.symbol, "Like recorded");
        } else {
            debug!(symbol = %record.symbol, "Like already counted by a concurrent request");
        }

        load_record(conn, &record.symbol)?.ok_or_else(|| StoreError::NotFound(record.symbol.clone()))
    }

    /// Number of stored records.
    pub async fn len(&self) -> Result<usize, StoreError> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM stocks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }

    /// Close the underlying connection. Later calls fail with [`StoreError::Closed`].
    pub async fn close(&self) -> Result<(), StoreError> {
        let mut guard = self.conn.lock().await;
        let Some(conn) = guard.take() else {
            return Ok(());
        };
        conn.execute_batch("PRAGMA optimize;")?;
        conn.close().map_err(|(_, e)| StoreError::Sqlite(e))?;
        info!("Stock store closed");
        Ok(())
    }
}

/// Trimmed, uppercased ticker used as the record key.
pub fn canonical_symbol(symbol: &str) -> Result<String, StoreError> {
    let symbol = symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(StoreError::InvalidSymbol);
    }
    Ok(symbol)
}

fn load_record(conn: &Connection, symbol: &str) -> Result<Option<StockRecord>, StoreError> {
    let row = conn
        .prepare_cached(
            "SELECT symbol, likes, created_at, updated_at FROM stocks WHERE symbol = ?1",
        )?
        .query_row(params![symbol], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })
        .optional()?;

    let Some((symbol, likes, created_at, updated_at)) = row else {
        return Ok(None);
    };

    let mut stmt = conn.prepare_cached("SELECT ip_hash FROM stock_likes WHERE symbol = ?1")?;
    let liked_hashes = stmt
        .query_map(params![symbol], |row| row.get::<_, String>(0))?
        .collect::<Result<HashSet<_>, _>>()?;

    Ok(Some(StockRecord {
        symbol,
        likes: u64::try_from(likes).unwrap_or(0),
        liked_hashes,
        created_at,
        updated_at,
    }))
}

/// Stock store errors.
#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    /// Symbol was empty after trimming
    InvalidSymbol,
    NotFound(String),
    Closed,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(e) => write!(f, "SQLite error: {}", e),
            Self::InvalidSymbol => write!(f, "Empty stock symbol"),
            Self::NotFound(symbol) => write!(f, "Stock record not found: {}", symbol),
            Self::Closed => write!(f, "Stock store is closed"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Sqlite(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sqlite(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anonymizer::hash_ip;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_get_or_create_fresh_record() {
        let store = StockStore::in_memory().unwrap();
        assert!(store.is_empty().await.unwrap());

        let record = store.get_or_create("goog").await.unwrap();
        assert_eq!(record.symbol, "GOOG");
        assert_eq!(record.likes, 0);
        assert!(record.liked_hashes.is_empty());
        assert!(record.created_at > 0);
    }

    #[tokio::test]
    async fn test_get_or_create_never_duplicates() {
        let store = StockStore::in_memory().unwrap();

        let first = store.get_or_create("MSFT").await.unwrap();
        let second = store.get_or_create(" msft ").await.unwrap();
        assert_eq!(first.symbol, second.symbol);
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_and_empty_symbol() {
        let store = StockStore::in_memory().unwrap();
        assert!(store.get("AAPL").await.unwrap().is_none());
        assert!(matches!(
            store.get_or_create("   ").await,
            Err(StoreError::InvalidSymbol)
        ));
    }

    #[tokio::test]
    async fn test_apply_like_is_idempotent_per_token() {
        let store = StockStore::in_memory().unwrap();
        let token = hash_ip("10.0.0.1");

        let record = store.get_or_create("GOOG").await.unwrap();
        let liked = store.apply_like(&record, &token).await.unwrap();
        assert_eq!(liked.likes, 1);
        assert!(liked.has_liked(&token));

        let again = store.apply_like(&liked, &token).await.unwrap();
        assert_eq!(again, liked);

        // A stale copy without the token still must not double count
        let stale = store.apply_like(&record, &token).await.unwrap();
        assert_eq!(stale.likes, 1);
    }

    #[tokio::test]
    async fn test_apply_like_distinct_tokens() {
        let store = StockStore::in_memory().unwrap();

        let record = store.get_or_create("GOOG").await.unwrap();
        let record = store.apply_like(&record, &hash_ip("10.0.0.1")).await.unwrap();
        let record = store.apply_like(&record, &hash_ip("10.0.0.2")).await.unwrap();

        assert_eq!(record.likes, 2);
        assert_eq!(record.likes as usize, record.liked_hashes.len());
        assert!(record.updated_at >= record.created_at);

        // Likes are per symbol
        let other = store.get_or_create("MSFT").await.unwrap();
        assert_eq!(other.likes, 0);
    }

    #[tokio::test]
    async fn test_liked_hashes_never_store_addresses() {
        let store = StockStore::in_memory().unwrap();
        let record = store.get_or_create("GOOG").await.unwrap();
        let record = store
            .apply_like(&record, &hash_ip("203.0.113.9"))
            .await
            .unwrap();

        assert!(record.liked_hashes.iter().all(|h| !h.contains("203.0.113.9")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_likes_same_caller_count_once() {
        let store = Arc::new(StockStore::in_memory().unwrap());
        let record = store.get_or_create("TSLA").await.unwrap();
        let token = hash_ip("198.51.100.4");

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            let record = record.clone();
            let token = token.clone();
            handles.push(tokio::spawn(async move {
                store.apply_like(&record, &token).await.unwrap()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().likes, 1);
        }

        let stored = store.get("TSLA").await.unwrap().unwrap();
        assert_eq!(stored.likes, 1);
        assert_eq!(stored.liked_hashes.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_likes_distinct_callers() {
        let store = Arc::new(StockStore::in_memory().unwrap());
        let record = store.get_or_create("NVDA").await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            let record = record.clone();
            handles.push(tokio::spawn(async move {
                let token = hash_ip(&format!("10.1.0.{}", i));
                store.apply_like(&record, &token).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stored = store.get("NVDA").await.unwrap().unwrap();
        assert_eq!(stored.likes, 16);
        assert_eq!(stored.liked_hashes.len(), 16);
    }

    #[tokio::test]
    async fn test_records_persist_across_reopen() {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap().to_string();

        {
            let store = StockStore::new(&db_path).unwrap();
            let record = store.get_or_create("AMZN").await.unwrap();
            store.apply_like(&record, &hash_ip("10.0.0.1")).await.unwrap();
            store.close().await.unwrap();
        }

        let store = StockStore::new(&db_path).unwrap();
        let record = store.get_or_create("AMZN").await.unwrap();
        assert_eq!(record.likes, 1);
        assert!(record.has_liked(&hash_ip("10.0.0.1")));
    }

    #[tokio::test]
    async fn test_closed_store_rejects_operations() {
        let store = StockStore::in_memory().unwrap();
        store.close().await.unwrap();
        // Closing twice is a no-op
        store.close().await.unwrap();

        assert!(matches!(
            store.get_or_create("GOOG").await,
            Err(StoreError::Closed)
        ));
        assert!(matches!(store.len().await, Err(StoreError::Closed)));
    }
}
