use async_trait::async_trait;
use feedguard_core::{CoreError, StoreError};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

use crate::{ConfigStore, StoreMap};

/// Store backed by a single `kv_store` table holding JSON text.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self, CoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(StoreError::from)?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(StoreError::from)?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("Opened settings store at {}", database_url);
        Ok(store)
    }

    pub async fn run_migrations(&self) -> Result<(), CoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::MigrationFailed {
                migration: e.to_string(),
            })?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn decode(key: &str, raw: &str) -> Result<Value, StoreError> {
        serde_json::from_str(raw).map_err(|e| StoreError::MalformedValue {
            key: key.to_string(),
            details: e.to_string(),
        })
    }
}

#[async_trait]
impl ConfigStore for SqliteStore {
    async fn get(&self, keys: &[&str]) -> Result<StoreMap, StoreError> {
        let mut found = StoreMap::new();
        for key in keys {
            let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?")
                .bind(*key)
                .fetch_optional(&self.pool)
                .await?;

            if let Some(row) = row {
                let raw: String = row.try_get("value")?;
                found.insert(key.to_string(), Self::decode(key, &raw)?);
            }
        }
        Ok(found)
    }

    async fn set(&self, items: StoreMap) -> Result<(), StoreError> {
        let updated_at = chrono::Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;
        for (key, value) in &items {
            sqlx::query(
                "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            )
            .bind(key)
            .bind(value.to_string())
            .bind(updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        debug!("Stored {} key(s)", items.len());
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for key in keys {
            sqlx::query("DELETE FROM kv_store WHERE key = ?")
                .bind(key)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        debug!("Removed {} key(s)", keys.len());
        Ok(())
    }

    async fn get_all(&self) -> Result<StoreMap, StoreError> {
        let rows = sqlx::query("SELECT key, value FROM kv_store ORDER BY key")
            .fetch_all(&self.pool)
            .await?;

        let mut all = StoreMap::new();
        for row in rows {
            let key: String = row.try_get("key")?;
            let raw: String = row.try_get("value")?;
            let value = Self::decode(&key, &raw)?;
            all.insert(key, value);
        }
        Ok(all)
    }
}
