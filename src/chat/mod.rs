pub mod reconcile;
pub mod sync;
pub mod wire;

pub use reconcile::{merge_with_annotations, reconcile, same_session, ReconcileOutcome};
pub use sync::{send_message, ChatTransport, WebhookTransport};
pub use wire::{AgentResponseWire, OutgoingMessageWire, RemoteMessageWire};
