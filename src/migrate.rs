//! Relay state schema.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    create_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the relay's tables on an open pool. Idempotent.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    // Settings key/value pairs (holds `api_key`)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS config (
            key TEXT PRIMARY KEY,
            value TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Hashes of prompts the collector has confirmed
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS uploaded_md5 (
            md5 TEXT PRIMARY KEY,
            upload_time INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.store.path = tmp.path().join("relay.db");

        run_migrations(&config).await.unwrap();
        run_migrations(&config).await.unwrap();

        let pool = db::connect(&config).await.unwrap();
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type='table' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        pool.close().await;

        assert_eq!(tables, vec!["config", "uploaded_md5"]);
    }
}
