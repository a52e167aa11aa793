use crate::chat::wire::AgentResponseWire;
use crate::session::{Message, Session};

/// What a webhook response means for the active session's transcript.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// The agent sent an authoritative history; adopt it (with surviving
    /// local annotations merged back in).
    Replace(Vec<Message>),
    /// The agent sent a plain reply; append it.
    AppendAgent(Message),
    /// Nothing in the response applies to this session.
    Unchanged,
}

/// A response with no session id is taken on faith for the session it was
/// sent from. A response that names a session must name this one.
pub fn same_session(session: &Session, response: &AgentResponseWire) -> bool {
    match response.response_session_id() {
        Some(id) => id == session.conversation_id,
        None => true,
    }
}

/// Rebuilds a transcript from an authoritative remote history while keeping
/// local annotations the remote side has never seen. An annotation whose
/// exact text already appears remotely is considered absorbed and dropped.
/// Surviving annotations land just before the final remote message so the
/// newest agent reply stays last.
pub fn merge_with_annotations(local: &[Message], remote: Vec<Message>) -> Vec<Message> {
    let mut merged = remote;

    let mut surviving: Vec<Message> = Vec::new();
    for message in local {
        if !message.is_local_annotation() {
            continue;
        }
        let absorbed = merged.iter().any(|remote| remote.text == message.text);
        let already_kept = surviving.iter().any(|kept| kept.text == message.text);
        if !absorbed && !already_kept {
            surviving.push(message.clone());
        }
    }

    if surviving.is_empty() {
        return merged;
    }

    let insert_at = merged.len().saturating_sub(1);
    for (offset, annotation) in surviving.into_iter().enumerate() {
        merged.insert(insert_at + offset, annotation);
    }
    merged
}

fn remote_message(who: Option<&str>, text: Option<String>, timestamp: Option<i64>, now_ms: i64) -> Message {
    let text = text.unwrap_or_default();
    let timestamp = timestamp.unwrap_or(now_ms);
    match who {
        Some("you") => Message::user(text, timestamp),
        _ => Message::agent(text, timestamp),
    }
}

/// Decides how a webhook response updates the session it was reconciled
/// against. History wins over a plain reply when both are present.
pub fn reconcile(active: &Session, response: &AgentResponseWire, now_ms: i64) -> ReconcileOutcome {
    if !same_session(active, response) {
        return ReconcileOutcome::Unchanged;
    }

    if let Some(history) = response.history.as_ref().filter(|history| !history.is_empty()) {
        let remote: Vec<Message> = history
            .iter()
            .map(|entry| {
                remote_message(
                    entry.who.as_deref(),
                    entry.text.clone(),
                    entry.timestamp,
                    now_ms,
                )
            })
            .collect();
        return ReconcileOutcome::Replace(merge_with_annotations(&active.messages, remote));
    }

    if let Some(text) = response.bot_text() {
        return ReconcileOutcome::AppendAgent(Message::agent(text, now_ms));
    }

    ReconcileOutcome::Unchanged
}
