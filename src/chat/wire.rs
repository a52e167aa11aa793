use serde::{Deserialize, Serialize};

/// Payload posted to the agent webhook.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessageWire {
    pub conversation_id: String,
    pub message: String,
}

/// One history entry as the agent reports it. Fields the agent omits or
/// mistypes are tolerated rather than failing the whole response.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoteMessageWire {
    pub who: Option<String>,
    pub text: Option<String>,
    pub timestamp: Option<i64>,
}

/// Agent webhook response. Every field is optional; the reconciler decides
/// what to do with whichever subset arrived.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentResponseWire {
    pub status: Option<String>,
    pub progress: Option<Vec<String>>,
    pub history: Option<Vec<RemoteMessageWire>>,
    pub text: Option<String>,
    pub response: Option<String>,
    pub session_id: Option<String>,
    pub conversation_id: Option<String>,
}

impl AgentResponseWire {
    /// The agent's reply text, preferring `text` over `response`.
    pub fn bot_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .filter(|text| !text.is_empty())
            .or_else(|| self.response.as_deref().filter(|text| !text.is_empty()))
    }

    /// The session the response claims to belong to, preferring `sessionId`
    /// over `conversationId`.
    pub fn response_session_id(&self) -> Option<&str> {
        self.session_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .or_else(|| self.conversation_id.as_deref().filter(|id| !id.is_empty()))
    }
}
