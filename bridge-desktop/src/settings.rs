//! `SettingsStore` in a SQLite file

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SettingsStore,
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    Row,
};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, warn};

/// Type tag stored beside every value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Text,
    Bool,
    Int,
}

impl ValueKind {
    fn as_str(self) -> &'static str {
        match self {
            ValueKind::Text => "string",
            ValueKind::Bool => "bool",
            ValueKind::Int => "i64",
        }
    }
}

fn db_error(action: &'static str) -> impl FnOnce(sqlx::Error) -> BridgeError {
    move |e| BridgeError::DatabaseError(format!("{}: {}", action, e))
}

/// One `settings` table of type-tagged values.
///
/// Reading a key with the wrong getter is an error rather than a silent
/// conversion, so a flag stored as text is noticed at startup.
pub struct SqliteSettingsStore {
    pool: SqlitePool,
}

impl SqliteSettingsStore {
    /// Open (or create) the database at `db_path`
    pub async fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(db_error("invalid database path"))?
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(db_error("cannot open settings database"))?;

        Self::create_schema(&pool).await?;
        debug!(path = ?db_path, "Opened settings store");
        Ok(Self { pool })
    }

    /// Throwaway store for tests
    pub async fn in_memory() -> Result<Self> {
        // every pooled connection would otherwise see its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(db_error("cannot open settings database"))?;

        Self::create_schema(&pool).await?;
        Ok(Self { pool })
    }

    async fn create_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                value_type TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(db_error("cannot create settings table"))?;

        Ok(())
    }

    async fn put(&self, key: &str, value: &str, kind: ValueKind) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, value_type, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                value_type = excluded.value_type,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(kind.as_str())
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(db_error("cannot store setting"))?;

        debug!(key, kind = kind.as_str(), "Stored setting");
        Ok(())
    }

    async fn fetch(&self, key: &str, kind: ValueKind) -> Result<Option<String>> {
        let Some(row) = sqlx::query("SELECT value, value_type FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("cannot read setting"))?
        else {
            return Ok(None);
        };

        let value: String = row.get(0);
        let stored: String = row.get(1);
        if stored != kind.as_str() {
            warn!(key, expected = kind.as_str(), stored = %stored, "Setting has the wrong type");
            return Err(BridgeError::OperationFailed(format!(
                "Setting {} is a {}, not a {}",
                key,
                stored,
                kind.as_str()
            )));
        }

        Ok(Some(value))
    }

    async fn fetch_parsed<T>(&self, key: &str, kind: ValueKind) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.fetch(key, kind)
            .await?
            .map(|raw| {
                raw.parse().map_err(|e| {
                    BridgeError::OperationFailed(format!("Setting {} is corrupt: {}", key, e))
                })
            })
            .transpose()
    }
}

#[async_trait]
impl SettingsStore for SqliteSettingsStore {
    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.put(key, value, ValueKind::Text).await
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        self.fetch(key, ValueKind::Text).await
    }

    async fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.put(key, &value.to_string(), ValueKind::Bool).await
    }

    async fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        self.fetch_parsed(key, ValueKind::Bool).await
    }

    async fn set_i64(&self, key: &str, value: i64) -> Result<()> {
        self.put(key, &value.to_string(), ValueKind::Int).await
    }

    async fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        self.fetch_parsed(key, ValueKind::Int).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(db_error("cannot delete setting"))?;
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT key FROM settings ORDER BY key")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("cannot list settings"))?;

        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_string_round_trip_and_delete() {
        let store = SqliteSettingsStore::in_memory().await.unwrap();

        store
            .set_string("strm.server_address", "http://nas:29876")
            .await
            .unwrap();
        assert_eq!(
            store.get_string("strm.server_address").await.unwrap(),
            Some("http://nas:29876".to_string())
        );

        store.delete("strm.server_address").await.unwrap();
        assert_eq!(store.get_string("strm.server_address").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_typed_values() {
        let store = SqliteSettingsStore::in_memory().await.unwrap();

        store.set_bool("strm.enable_life_monitor", true).await.unwrap();
        store.set_i64("strm.list_cooldown_ms", 2000).await.unwrap();

        assert_eq!(
            store.get_bool("strm.enable_life_monitor").await.unwrap(),
            Some(true)
        );
        assert_eq!(
            store.get_i64("strm.list_cooldown_ms").await.unwrap(),
            Some(2000)
        );
    }

    #[tokio::test]
    async fn test_wrong_getter_is_an_error() {
        let store = SqliteSettingsStore::in_memory().await.unwrap();

        store.set_string("strm.enable_life_monitor", "true").await.unwrap();
        assert!(store.get_bool("strm.enable_life_monitor").await.is_err());
    }

    #[tokio::test]
    async fn test_overwrite_changes_type() {
        let store = SqliteSettingsStore::in_memory().await.unwrap();

        store.set_string("strm.sync_workers", "4").await.unwrap();
        store.set_i64("strm.sync_workers", 4).await.unwrap();

        assert_eq!(store.get_i64("strm.sync_workers").await.unwrap(), Some(4));
        assert_eq!(store.list_keys().await.unwrap(), vec!["strm.sync_workers"]);
    }

    #[tokio::test]
    async fn test_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join("strm-helper.db");

        {
            let store = SqliteSettingsStore::new(path.clone()).await.unwrap();
            store.set_string("strm.api_token", "abc").await.unwrap();
        }

        let store = SqliteSettingsStore::new(path).await.unwrap();
        assert_eq!(
            store.get_string("strm.api_token").await.unwrap(),
            Some("abc".to_string())
        );
    }
}
