use crate::types::{CacheStore, CachedResponse, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS response_cache (
        fingerprint TEXT PRIMARY KEY,
        payload TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_response_cache_created ON response_cache (created_at)",
];

/// Durable cache store backed by a single SQLite file.
pub struct SqliteCacheStore {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SqliteCacheStore {
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::new(format!("failed to create cache directory {}: {}", parent.display(), e))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::new(format!("failed to open {}: {}", db_path.display(), e)))?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&pool)
                .await
                .map_err(|e| StoreError::new(format!("failed to run migration {}: {}", i, e)))?;
        }

        info!("Opened response cache at {}", db_path.display());
        Ok(Self {
            pool,
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub async fn len(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM response_cache")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(count.max(0) as u64)
    }

    /// Removes one entry. Returns whether it existed.
    pub async fn evict(&self, fingerprint: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM response_cache WHERE fingerprint = ?")
            .bind(fingerprint)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(result.rows_affected() > 0)
    }

    /// Removes every entry created before `now - age`. Returns the count removed.
    pub async fn evict_older_than(&self, age: Duration, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let cutoff = timestamp(now - age);
        let result = sqlx::query("DELETE FROM response_cache WHERE created_at < ?")
            .bind(&cutoff)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        debug!("Evicted {} cache entries older than {}", result.rows_affected(), cutoff);
        Ok(result.rows_affected())
    }

    pub async fn oldest_entry(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let row = sqlx::query("SELECT MIN(created_at) AS oldest FROM response_cache")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;
        let oldest: Option<String> = row.try_get("oldest").map_err(storage_error)?;
        Ok(oldest.and_then(|raw| parse_timestamp(&raw)))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn read(&self, fingerprint: &str) -> Result<Option<CachedResponse>, StoreError> {
        let row = sqlx::query("SELECT payload, created_at FROM response_cache WHERE fingerprint = ?")
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        match row {
            Some(row) => {
                let payload: String = row.try_get("payload").map_err(storage_error)?;
                let created_at: String = row.try_get("created_at").map_err(storage_error)?;
                Ok(Some(CachedResponse {
                    fingerprint: fingerprint.to_string(),
                    payload,
                    created_at: parse_timestamp(&created_at).unwrap_or_else(Utc::now),
                }))
            }
            None => Ok(None),
        }
    }

    async fn write(&self, fingerprint: &str, payload: &str) -> Result<(), StoreError> {
        // Write-once: a fingerprint that already has a payload keeps it
        sqlx::query(
            "INSERT INTO response_cache (fingerprint, payload, created_at) VALUES (?, ?, ?) \
             ON CONFLICT(fingerprint) DO NOTHING",
        )
        .bind(fingerprint)
        .bind(payload)
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }
}

fn storage_error(e: sqlx::Error) -> StoreError {
    StoreError::new(e.to_string())
}

// Fixed width so that text order matches time order
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
