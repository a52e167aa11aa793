use crate::chat::reconcile::{reconcile, ReconcileOutcome};
use crate::chat::wire::{AgentResponseWire, OutgoingMessageWire};
use crate::error::AppError;
use crate::session::{now_unix_ms, Message};
use crate::state::AppState;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use tracing::warn;

/// Transport seam for the agent webhook, injected so tests can script
/// responses without a network.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(
        &self,
        url: &str,
        payload: &OutgoingMessageWire,
    ) -> Result<AgentResponseWire, AppError>;
}

pub struct WebhookTransport {
    client: Client,
}

impl WebhookTransport {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for WebhookTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatTransport for WebhookTransport {
    async fn send(
        &self,
        url: &str,
        payload: &OutgoingMessageWire,
    ) -> Result<AgentResponseWire, AppError> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<AgentResponseWire>().await?)
    }
}

// A response that omits status or progress resets them; carrying the
// previous send's values forward would leave a stale chip on screen.
fn record_activity(state: &AppState, response: &AgentResponseWire) {
    let mut activity = state.activity.lock();
    activity.status = response.status.clone().unwrap_or_default();
    activity.progress = response.progress.clone().unwrap_or_default();
}

/// Applies a webhook response to whichever session is active when it
/// arrives. Returns whether the collection changed. The send may outlive a
/// session switch or deletion, so everything here re-reads current state
/// instead of trusting captures from send time.
fn apply_response(state: &AppState, response: &AgentResponseWire, now_ms: i64) -> bool {
    let mut sessions = state.sessions.lock();
    let Some(active) = sessions.active_session() else {
        return false;
    };

    match reconcile(active, response, now_ms) {
        ReconcileOutcome::Replace(messages) => sessions.replace_active_messages(messages),
        ReconcileOutcome::AppendAgent(message) => sessions.push_message_to_active(message),
        ReconcileOutcome::Unchanged => false,
    }
}

/// Sends one user message through the webhook and folds the response back
/// into the conversation. The user's message is appended and persisted
/// before the network round trip so it is never lost to a crash or a
/// failed send.
pub async fn send_message(
    state: &Arc<AppState>,
    transport: &dyn ChatTransport,
    text: &str,
) -> Result<(), AppError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::InvalidArgument(
            "message text is empty".to_string(),
        ));
    }

    let webhook_url = state.settings.lock().webhook_url.trim().to_string();
    if webhook_url.is_empty() {
        return Err(AppError::WebhookNotConfigured);
    }

    let sent_at = now_unix_ms();
    let (conversation_id, snapshot) = {
        let mut sessions = state.sessions.lock();
        sessions.ensure_active(sent_at);
        let Some(active) = sessions.active_session() else {
            return Err(AppError::InvalidArgument(
                "no active session to send from".to_string(),
            ));
        };
        let conversation_id = active.conversation_id.clone();
        sessions.push_message_to_active(Message::user(text, sent_at));
        (conversation_id, sessions.clone())
    };
    state.store.persist(&snapshot).await;

    {
        let mut activity = state.activity.lock();
        activity.busy = true;
        activity.progress.clear();
    }

    let payload = OutgoingMessageWire {
        conversation_id,
        message: text.to_string(),
    };

    let changed = match transport.send(&webhook_url, &payload).await {
        Ok(response) => {
            record_activity(state, &response);
            apply_response(state, &response, now_unix_ms())
        }
        Err(error) => {
            warn!(%error, "webhook send failed");
            let notice = Message::agent(format!("Network error: {error}"), now_unix_ms());
            state.sessions.lock().push_message_to_active(notice)
        }
    };

    state.activity.lock().busy = false;

    if changed {
        let snapshot = state.sessions.lock().clone();
        state.store.persist(&snapshot).await;
    }

    Ok(())
}
