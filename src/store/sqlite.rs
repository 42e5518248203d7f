//! SQLite-backed blacklist store.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, ErrorCode, params};

use super::{BlacklistEntry, BlacklistStore};
use crate::error::StoreError;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS blacklist (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ip_address TEXT NOT NULL UNIQUE,
    website_name TEXT,
    created_at TEXT
)";

const INSERT_SQL: &str =
    "INSERT INTO blacklist (ip_address, website_name, created_at) VALUES (?1, ?2, ?3)";

const SELECT_ALL_SQL: &str =
    "SELECT id, ip_address, website_name, created_at FROM blacklist ORDER BY id";

/// Blacklist store persisted in a SQLite database.
///
/// Queries run on the blocking thread pool so callers on the async runtime
/// are never stalled by disk I/O.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(journal_mode = %mode, "opened sqlite blacklist store");
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await?
    }
}

fn insert(conn: &Connection, entry: &BlacklistEntry) -> Result<(), StoreError> {
    let created_at = entry
        .created_at
        .to_rfc3339_opts(SecondsFormat::Millis, true);

    conn.execute(
        INSERT_SQL,
        params![entry.ip_address, entry.website_name, created_at],
    )
    .map_err(|err| match err.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => StoreError::DuplicateIp(entry.ip_address.clone()),
        _ => StoreError::Sqlite(err),
    })?;
    Ok(())
}

fn parse_created_at(ip_address: &str, value: Option<String>) -> Result<DateTime<Utc>, StoreError> {
    let Some(value) = value else {
        return Ok(DateTime::<Utc>::UNIX_EPOCH);
    };
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::InvalidTimestamp {
            ip_address: ip_address.to_string(),
            value,
        })
}

impl BlacklistStore for SqliteStore {
    async fn load_all(&self) -> Result<Vec<BlacklistEntry>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(SELECT_ALL_SQL)?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?;

            let mut entries = Vec::new();
            for row in rows {
                let (id, ip_address, website_name, created_at) = row?;
                let created_at = parse_created_at(&ip_address, created_at)?;
                entries.push(BlacklistEntry {
                    id: Some(id),
                    ip_address,
                    website_name: website_name.unwrap_or_default(),
                    created_at,
                });
            }

            tracing::debug!(count = entries.len(), "loaded blacklist entries from sqlite");
            Ok(entries)
        })
        .await
    }

    async fn save(&self, entry: BlacklistEntry) -> Result<(), StoreError> {
        self.with_conn(move |conn| insert(conn, &entry)).await
    }

    async fn save_batch(&self, entries: Vec<BlacklistEntry>) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            // Dropping the transaction without commit rolls the batch back.
            let tx = conn.transaction()?;
            for entry in &entries {
                insert(&tx, entry)?;
            }
            tx.commit()?;
            tracing::debug!(count = entries.len(), "committed blacklist batch");
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn should_round_trip_entry_fields() {
        let store = SqliteStore::open_in_memory().unwrap();
        let entry = BlacklistEntry::new("10.0.0.1", "a.test");

        store.save(entry.clone()).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, Some(1));
        assert_eq!(loaded[0].ip_address, "10.0.0.1");
        assert_eq!(loaded[0].website_name, "a.test");
        assert_eq!(
            loaded[0].created_at.timestamp_millis(),
            entry.created_at.timestamp_millis()
        );
    }

    #[tokio::test]
    async fn should_map_unique_violation_to_duplicate_ip() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.save(BlacklistEntry::new("10.0.0.1", "a.test")).await.unwrap();

        let result = store.save(BlacklistEntry::new("10.0.0.1", "b.test")).await;

        assert!(matches!(result, Err(StoreError::DuplicateIp(ip)) if ip == "10.0.0.1"));
    }

    #[tokio::test]
    async fn should_roll_back_whole_batch_on_failure() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.save(BlacklistEntry::new("10.0.0.1", "a.test")).await.unwrap();

        let result = store
            .save_batch(vec![
                BlacklistEntry::new("10.0.0.2", "b.test"),
                BlacklistEntry::new("10.0.0.1", "c.test"),
            ])
            .await;

        assert!(result.is_err());
        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].ip_address, "10.0.0.1");
    }

    #[tokio::test]
    async fn should_persist_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blacklist.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .save_batch(vec![
                    BlacklistEntry::new("10.0.0.1", "a.test"),
                    BlacklistEntry::new("10.0.0.2", "b.test"),
                ])
                .await
                .unwrap();
        }

        let reopened = SqliteStore::open(&path).unwrap();
        let loaded = reopened.load_all().await.unwrap();
        let ips: Vec<_> = loaded.iter().map(|e| e.ip_address.as_str()).collect();
        assert_eq!(ips, vec!["10.0.0.1", "10.0.0.2"]);
    }
}
