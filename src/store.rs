//! Persisted relay state: the API key setting and the dedup history.
//!
//! Both live in one SQLite file. The dedup table only grows: a row is written
//! after the collector confirms a prompt and is never removed.

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::migrate;

const API_KEY: &str = "api_key";

/// Open the state database, creating the schema on first use.
pub async fn open(config: &Config) -> Result<SqlitePool> {
    let pool = db::connect(config)
        .await
        .with_context(|| format!("Failed to open state database: {}", config.store.path.display()))?;
    migrate::create_schema(&pool).await?;
    Ok(pool)
}

/// Key/value settings store.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    pool: SqlitePool,
}

impl SettingsStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// `None` when no key has been saved yet.
    pub async fn load_api_key(&self) -> Result<Option<String>> {
        let value: Option<Option<String>> =
            sqlx::query_scalar("SELECT value FROM config WHERE key = ?")
                .bind(API_KEY)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to load API key")?;

        Ok(value.flatten().filter(|v| !v.is_empty()))
    }

    pub async fn save_api_key(&self, api_key: &str) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO config (key, value) VALUES (?, ?)")
            .bind(API_KEY)
            .bind(api_key)
            .execute(&self.pool)
            .await
            .context("Failed to save API key")?;
        Ok(())
    }
}

/// Content hashes of prompts the collector has already accepted.
#[derive(Debug, Clone)]
pub struct DedupStore {
    pool: SqlitePool,
}

impl DedupStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn is_known(&self, hash: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM uploaded_md5 WHERE md5 = ?)")
                .bind(hash)
                .fetch_one(&self.pool)
                .await
                .with_context(|| format!("Failed to check hash {}", hash))?;
        Ok(exists)
    }

    /// Insert-or-replace; recording the same hash twice is harmless.
    pub async fn record(&self, hash: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("INSERT OR REPLACE INTO uploaded_md5 (md5, upload_time) VALUES (?, ?)")
            .bind(hash)
            .bind(now)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to record hash {}", hash))?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM uploaded_md5")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
