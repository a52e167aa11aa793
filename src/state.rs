use crate::market::types::MarketUpdate;
use crate::session::{now_unix_ms, SessionCollection, SessionStore, Settings};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct PollHandle {
    pub cancellation_token: CancellationToken,
    pub join_handle: JoinHandle<()>,
}

/// Latest normalized market data plus the free-text feed status. A failed
/// tick only ever touches `status`; the previous `update` stays rendered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketView {
    pub update: Option<MarketUpdate>,
    pub status: String,
}

/// Busy/progress/status signals surfaced to the UI layer by the send path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatActivity {
    pub busy: bool,
    pub status: String,
    pub progress: Vec<String>,
}

pub struct AppState {
    pub sessions: Mutex<SessionCollection>,
    pub settings: Mutex<Settings>,
    pub market: Mutex<MarketView>,
    pub activity: Mutex<ChatActivity>,
    pub poll: tokio::sync::Mutex<Option<PollHandle>>,
    pub store: SessionStore,
}

impl AppState {
    pub async fn initialize(store: SessionStore) -> Self {
        let sessions = store.load().await;
        let settings = store.load_settings().await;

        Self {
            sessions: Mutex::new(sessions),
            settings: Mutex::new(settings),
            market: Mutex::new(MarketView::default()),
            activity: Mutex::new(ChatActivity::default()),
            poll: tokio::sync::Mutex::new(None),
            store,
        }
    }

    pub async fn create_session(&self) -> String {
        let (id, snapshot) = {
            let mut sessions = self.sessions.lock();
            let id = sessions.create_session(now_unix_ms());
            (id, sessions.clone())
        };
        self.store.persist(&snapshot).await;
        id
    }

    pub async fn rename_session(&self, id: &str, name: &str) {
        let snapshot = {
            let mut sessions = self.sessions.lock();
            sessions.rename_session(id, name);
            sessions.clone()
        };
        self.store.persist(&snapshot).await;
    }

    pub async fn delete_session(&self, id: &str) {
        let snapshot = {
            let mut sessions = self.sessions.lock();
            sessions.delete_session(id);
            sessions.ensure_active(now_unix_ms());
            sessions.clone()
        };
        self.store.persist(&snapshot).await;
    }

    pub async fn set_active_session(&self, id: &str) {
        let snapshot = {
            let mut sessions = self.sessions.lock();
            sessions.set_active(id);
            sessions.clone()
        };
        self.store.persist(&snapshot).await;
    }

    pub async fn update_settings(&self, settings: Settings) -> Settings {
        let normalized = settings.normalize();
        *self.settings.lock() = normalized.clone();
        self.store.persist_settings(&normalized).await;
        normalized
    }
}
