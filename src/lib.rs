//! Core engine for the OpenEXA assistant client: persistent chat sessions
//! reconciled against an agent webhook, plus a cancellable market poll that
//! normalizes vendor candlestick feeds into chart points and transcript
//! digests.

pub mod chat;
pub mod db;
pub mod error;
pub mod market;
pub mod session;
pub mod state;
pub mod storage;

pub use chat::{send_message, ChatTransport, WebhookTransport};
pub use error::AppError;
pub use market::{start_market_poll, stop_market_poll, HttpMarketFetcher, MarketFetcher};
pub use session::{Session, SessionCollection, SessionStore, Settings};
pub use state::AppState;
pub use storage::{MemoryStateStore, SqliteStateStore, StateStore};
