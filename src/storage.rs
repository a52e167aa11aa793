use crate::error::AppError;
use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

pub const SESSIONS_BLOB_KEY: &str = "chat-sessions-v2";
pub const SETTINGS_BLOB_KEY: &str = "chat-settings-v2";

/// Keyed blob storage behind the session/settings persistence. Injected so
/// the stores can run against an in-memory fake in tests.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<String>, AppError>;
    async fn save(&self, key: &str, value: &str) -> Result<(), AppError>;
}

pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn now_unix_ms() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_millis().min(i64::MAX as u128) as i64,
        Err(_) => 0,
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn load(&self, key: &str) -> Result<Option<String>, AppError> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM app_blobs WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn save(&self, key: &str, value: &str) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO app_blobs (key, value, updated_at_ms) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at_ms=excluded.updated_at_ms",
        )
        .bind(key)
        .bind(value)
        .bind(now_unix_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStateStore {
    blobs: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.blobs.lock().get(key).cloned())
    }

    async fn save(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.blobs.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::initialize_pool_from_path;
    use std::path::PathBuf;

    fn unique_db_path() -> PathBuf {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system clock should be after unix epoch")
            .as_nanos();

        std::env::temp_dir().join(format!("openexa-core-store-{timestamp}.db"))
    }

    #[tokio::test]
    async fn sqlite_store_round_trips_and_overwrites() {
        let db_path = unique_db_path();
        let pool = initialize_pool_from_path(&db_path)
            .await
            .expect("pool initialization should succeed");
        let store = SqliteStateStore::new(pool);

        assert!(store
            .load(SESSIONS_BLOB_KEY)
            .await
            .expect("load should succeed")
            .is_none());

        store
            .save(SESSIONS_BLOB_KEY, "{\"order\":[]}")
            .await
            .expect("save should succeed");
        store
            .save(SESSIONS_BLOB_KEY, "{\"order\":[\"a\"]}")
            .await
            .expect("overwrite should succeed");

        let value = store
            .load(SESSIONS_BLOB_KEY)
            .await
            .expect("load should succeed");
        assert_eq!(value.as_deref(), Some("{\"order\":[\"a\"]}"));

        let _ = std::fs::remove_file(db_path);
    }

    #[tokio::test]
    async fn memory_store_keeps_keys_independent() {
        let store = MemoryStateStore::default();
        store.save(SESSIONS_BLOB_KEY, "sessions").await.expect("save");
        store.save(SETTINGS_BLOB_KEY, "settings").await.expect("save");

        assert_eq!(
            store.load(SESSIONS_BLOB_KEY).await.expect("load").as_deref(),
            Some("sessions")
        );
        assert_eq!(
            store.load(SETTINGS_BLOB_KEY).await.expect("load").as_deref(),
            Some("settings")
        );
    }
}
