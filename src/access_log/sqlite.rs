//! SQLite access-log backend
//!
//! - Connection pooling
//! - Automatic migrations
//! - WAL mode for concurrent reads/writes

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use super::{AccessLogEntry, AccessLogStore, StoreError};
use crate::config::AccessLogConfig;

pub struct SqliteAccessLogStore {
    pool: SqlitePool,
}

impl SqliteAccessLogStore {
    /// Open (creating if missing) the database and run migrations
    ///
    /// ```ignore
    /// let store = SqliteAccessLogStore::connect(&config.access_log).await?;
    /// ```
    pub async fn connect(config: &AccessLogConfig) -> anyhow::Result<Self> {
        ensure_parent_dir(&config.database_url).await?;

        let options = SqliteConnectOptions::from_str(&config.database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30))
            .pragma("synchronous", "NORMAL");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .context("Failed to connect to access log database")?;

        Self::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .context("Failed to run access log database migrations")?;

        tracing::info!("Access log database migrations completed");
        Ok(())
    }

    /// Look up an entry by id
    pub async fn get(&self, id: &str) -> Result<Option<AccessLogEntry>, StoreError> {
        let row = sqlx::query(
            "SELECT id, created_at, message, trace_id FROM access_logs WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let created_at: String = row.get("created_at");
            let created_at = DateTime::parse_from_rfc3339(&created_at)
                .map_err(|e| StoreError::Backend(format!("corrupt created_at: {}", e)))?
                .with_timezone(&Utc);

            Ok(AccessLogEntry {
                id: row.get("id"),
                created_at,
                message: row.get("message"),
                trace_id: row.get("trace_id"),
            })
        })
        .transpose()
    }

    #[cfg(test)]
    pub(crate) async fn count(&self) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM access_logs")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}

#[async_trait]
impl AccessLogStore for SqliteAccessLogStore {
    async fn insert(&self, entry: &AccessLogEntry) -> Result<String, StoreError> {
        sqlx::query(
            "INSERT INTO access_logs (id, created_at, message, trace_id) VALUES (?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(entry.created_at.to_rfc3339())
        .bind(&entry.message)
        .bind(&entry.trace_id)
        .execute(&self.pool)
        .await?;

        Ok(entry.id.clone())
    }
}

/// SQLite creates the file but not its directory
async fn ensure_parent_dir(database_url: &str) -> anyhow::Result<()> {
    let path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);

    if path.starts_with(":memory:") || path.is_empty() {
        return Ok(());
    }

    let path = path.split('?').next().unwrap_or(path);
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_log::generate_id;

    async fn memory_store() -> SqliteAccessLogStore {
        SqliteAccessLogStore::connect(&AccessLogConfig {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_insert_then_get() {
        let store = memory_store().await;
        let entry = AccessLogEntry::new(generate_id(), Some("hi".to_string()), None);

        let key = store.insert(&entry).await.unwrap();
        assert_eq!(key, entry.id);

        let stored = store.get(&key).await.unwrap().unwrap();
        assert_eq!(stored.id, entry.id);
        assert_eq!(stored.message.as_deref(), Some("hi"));
        assert_eq!(stored.created_at.timestamp(), entry.created_at.timestamp());
    }

    #[tokio::test]
    async fn test_duplicate_id_is_rejected_without_partial_write() {
        let store = memory_store().await;
        let entry = AccessLogEntry::new(generate_id(), None, None);
        store.insert(&entry).await.unwrap();

        let mut duplicate = entry.clone();
        duplicate.message = Some("other".to_string());
        let result = store.insert(&duplicate).await;

        assert!(matches!(result, Err(StoreError::Backend(_))));
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.get(&entry.id).await.unwrap().unwrap().message.is_none());
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let store = memory_store().await;
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_database_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("access_log.db");
        let store = SqliteAccessLogStore::connect(&AccessLogConfig {
            database_url: format!("sqlite:{}", db_path.display()),
            max_connections: 2,
        })
        .await
        .unwrap();

        store.insert(&AccessLogEntry::new(generate_id(), None, None)).await.unwrap();
        assert!(db_path.exists());
    }
}
