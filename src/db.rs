//! SQLite connection pool for the product catalog.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

use crate::config::Config;

/// Open (creating if needed) the catalog database named in `[db] path`.
///
/// Foreign keys are enforced so a price can never point at a missing
/// product, and WAL mode lets `stats`/`report` read while a run writes.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5))
        .journal_mode(SqliteJournalMode::Wal);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::create_schema;

    #[tokio::test]
    async fn orphan_prices_are_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Config::minimal(dir.path().join("catalog.sqlite"));
        let pool = connect(&config).await.unwrap();
        create_schema(&pool).await.unwrap();

        let result = sqlx::query(
            "INSERT INTO prices (product_id, store, price, link, last_updated) VALUES (42, 'Petz', '10', '', 0)",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());
        pool.close().await;
    }
}
