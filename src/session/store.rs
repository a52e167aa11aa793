use crate::session::types::{now_unix_ms, SessionCollection, Settings};
use crate::storage::{SqliteStateStore, StateStore, SESSIONS_BLOB_KEY, SETTINGS_BLOB_KEY};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::warn;

/// Durable session/settings persistence over an injected blob backend.
///
/// Loads never fail visibly: corrupt or unreadable state degrades to a fresh
/// default, and a failed save is logged and swallowed so a storage fault can
/// never interrupt the conversation.
pub struct SessionStore {
    store: Arc<dyn StateStore>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    pub fn sqlite(pool: SqlitePool) -> Self {
        Self::new(Arc::new(SqliteStateStore::new(pool)))
    }

    pub async fn load(&self) -> SessionCollection {
        let mut collection = match self.store.load(SESSIONS_BLOB_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<SessionCollection>(&raw) {
                Ok(collection) => collection,
                Err(error) => {
                    warn!(%error, "discarding unreadable session blob");
                    SessionCollection::default()
                }
            },
            Ok(None) => SessionCollection::default(),
            Err(error) => {
                warn!(%error, "session blob unavailable, starting fresh");
                SessionCollection::default()
            }
        };

        collection.migrate();
        collection.ensure_active(now_unix_ms());
        collection
    }

    pub async fn persist(&self, collection: &SessionCollection) {
        let raw = match serde_json::to_string(collection) {
            Ok(raw) => raw,
            Err(error) => {
                warn!(%error, "failed to serialize session collection");
                return;
            }
        };
        if let Err(error) = self.store.save(SESSIONS_BLOB_KEY, &raw).await {
            warn!(%error, "failed to persist session collection");
        }
    }

    pub async fn load_settings(&self) -> Settings {
        let settings = match self.store.load(SETTINGS_BLOB_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<Settings>(&raw) {
                Ok(settings) => settings,
                Err(error) => {
                    warn!(%error, "discarding unreadable settings blob");
                    Settings::default()
                }
            },
            Ok(None) => Settings::default(),
            Err(error) => {
                warn!(%error, "settings blob unavailable, using defaults");
                Settings::default()
            }
        };

        settings.normalize()
    }

    pub async fn persist_settings(&self, settings: &Settings) {
        let raw = match serde_json::to_string(settings) {
            Ok(raw) => raw,
            Err(error) => {
                warn!(%error, "failed to serialize settings");
                return;
            }
        };
        if let Err(error) = self.store.save(SETTINGS_BLOB_KEY, &raw).await {
            warn!(%error, "failed to persist settings");
        }
    }
}
