use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

pub const MIN_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;

pub(crate) fn now_unix_ms() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_millis().min(i64::MAX as u128) as i64,
        Err(_) => 0,
    }
}

fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Agent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(default)]
    pub local: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub sender: Sender,
    pub text: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<Annotation>,
}

impl Message {
    pub fn user(text: impl Into<String>, timestamp: i64) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
            timestamp,
            annotation: None,
        }
    }

    pub fn agent(text: impl Into<String>, timestamp: i64) -> Self {
        Self {
            sender: Sender::Agent,
            text: text.into(),
            timestamp,
            annotation: None,
        }
    }

    /// Client-synthesized message with no remote counterpart (e.g. a market
    /// digest). Survives authoritative history replacement until the remote
    /// history contains equivalent text.
    pub fn local_annotation(text: impl Into<String>, timestamp: i64) -> Self {
        Self {
            sender: Sender::Agent,
            text: text.into(),
            timestamp,
            annotation: Some(Annotation { local: true }),
        }
    }

    pub fn is_local_annotation(&self) -> bool {
        self.annotation.map(|annotation| annotation.local).unwrap_or(false)
    }
}

/// Tolerates a malformed `messages` value in persisted state: a non-array
/// degrades to an empty sequence, malformed elements inside an array are
/// dropped individually.
fn lenient_messages<'de, D>(deserializer: D) -> Result<Vec<Message>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    let entries = match raw {
        serde_json::Value::Array(entries) => entries,
        _ => return Ok(Vec::new()),
    };

    Ok(entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Remote correlation key. Coincides with `id` at creation but stays a
    /// distinct concept: responses are matched against this, never `id`.
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default, deserialize_with = "lenient_messages")]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub created_at: i64,
}

impl Session {
    pub fn new(name: impl Into<String>, created_at: i64) -> Self {
        let id = new_session_id();
        Self {
            id: id.clone(),
            name: name.into(),
            conversation_id: id,
            messages: Vec::new(),
            created_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCollection {
    #[serde(default)]
    pub order: Vec<String>,
    #[serde(default)]
    pub by_id: HashMap<String, Session>,
    #[serde(default)]
    pub active_id: Option<String>,
}

impl SessionCollection {
    /// Enforces the collection invariants after loading persisted state:
    /// every id in `order` has an entry in `by_id`, sessions missing from
    /// `order` are re-appended, and a dangling `active_id` is cleared.
    pub fn migrate(&mut self) {
        self.order.retain(|id| self.by_id.contains_key(id));

        let mut known: Vec<&String> = self.by_id.keys().collect();
        known.sort();
        for id in known {
            if !self.order.contains(id) {
                self.order.push(id.clone());
            }
        }

        if let Some(active_id) = &self.active_id {
            if !self.by_id.contains_key(active_id) {
                self.active_id = None;
            }
        }
    }

    /// Guarantees at least one session exists and one is active.
    pub fn ensure_active(&mut self, now_ms: i64) {
        if self.active_id.is_none() {
            match self.order.first().cloned() {
                Some(first) => self.active_id = Some(first),
                None => {
                    self.create_session(now_ms);
                }
            }
        }
    }

    pub fn create_session(&mut self, now_ms: i64) -> String {
        let name = format!("Session {}", self.order.len() + 1);
        let session = Session::new(name, now_ms);
        let id = session.id.clone();
        self.order.insert(0, id.clone());
        self.by_id.insert(id.clone(), session);
        self.active_id = Some(id.clone());
        id
    }

    pub fn rename_session(&mut self, id: &str, name: impl Into<String>) {
        if let Some(session) = self.by_id.get_mut(id) {
            session.name = name.into();
        }
    }

    pub fn delete_session(&mut self, id: &str) {
        self.order.retain(|existing| existing != id);
        self.by_id.remove(id);
        if self.active_id.as_deref() == Some(id) {
            self.active_id = self.order.first().cloned();
        }
    }

    pub fn set_active(&mut self, id: &str) {
        if self.by_id.contains_key(id) {
            self.active_id = Some(id.to_string());
        }
    }

    pub fn active_session(&self) -> Option<&Session> {
        self.active_id
            .as_deref()
            .and_then(|id| self.by_id.get(id))
    }

    /// Appends to whatever session is active right now; a no-op when the
    /// active session disappeared mid-operation.
    pub fn push_message_to_active(&mut self, message: Message) -> bool {
        let Some(active_id) = self.active_id.clone() else {
            return false;
        };
        match self.by_id.get_mut(&active_id) {
            Some(session) => {
                session.messages.push(message);
                true
            }
            None => false,
        }
    }

    /// Appends a market digest annotation to the active session, skipped when
    /// the latest local annotation already carries the same text.
    pub fn push_digest_annotation(&mut self, text: &str, now_ms: i64) -> bool {
        if text.is_empty() {
            return false;
        }

        let already_current = self
            .active_session()
            .and_then(|session| {
                session
                    .messages
                    .iter()
                    .rev()
                    .find(|message| message.is_local_annotation())
            })
            .map(|latest| latest.text == text)
            .unwrap_or(false);
        if already_current {
            return false;
        }

        self.push_message_to_active(Message::local_annotation(text, now_ms))
    }

    pub fn replace_active_messages(&mut self, messages: Vec<Message>) -> bool {
        let Some(active_id) = self.active_id.clone() else {
            return false;
        };
        match self.by_id.get_mut(&active_id) {
            Some(session) => {
                session.messages = messages;
                true
            }
            None => false,
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default)]
    pub poll_url: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            poll_url: String::new(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl Settings {
    pub fn normalize(mut self) -> Self {
        self.webhook_url = self.webhook_url.trim().to_string();
        self.poll_url = self.poll_url.trim().to_string();
        self.poll_interval_ms = self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS);
        self
    }
}
