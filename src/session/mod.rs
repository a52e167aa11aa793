pub mod store;
pub mod types;

pub(crate) use types::now_unix_ms;
pub use store::SessionStore;
pub use types::{
    Annotation, Message, Sender, Session, SessionCollection, Settings,
    DEFAULT_POLL_INTERVAL_MS, MIN_POLL_INTERVAL_MS,
};
