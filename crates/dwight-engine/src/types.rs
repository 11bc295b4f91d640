//! Message and request types shared by the engine components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Generation time; zero for user turns.
    #[serde(rename = "duration_ms", with = "duration_millis", default)]
    pub duration: Duration,
    #[serde(default)]
    pub prompt_tokens: u32,
    /// Prompt plus completion tokens as reported by the backend.
    #[serde(default)]
    pub total_tokens: u32,
}

impl ChatMessage {
    /// A user turn stamped now.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            duration: Duration::ZERO,
            prompt_tokens: 0,
            total_tokens: 0,
        }
    }

    /// An assistant turn built from a finished reply.
    pub fn assistant(reply: ChatReply, duration: Duration) -> Self {
        Self {
            role: Role::Assistant,
            content: reply.content,
            timestamp: Utc::now(),
            duration,
            prompt_tokens: reply.prompt_tokens,
            total_tokens: reply.total_tokens,
        }
    }

    pub fn response_tokens(&self) -> u32 {
        self.total_tokens.saturating_sub(self.prompt_tokens)
    }
}

/// `{role, content}` entry sent to `/api/chat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMessage {
    pub role: Role,
    pub content: String,
}

impl RequestMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<RequestMessage>,
    pub temperature: f32,
    pub stream: bool,
}

/// Finished reply, identical in shape for streaming and non-streaming mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub content: String,
    pub prompt_tokens: u32,
    /// `prompt_eval_count + eval_count`.
    pub total_tokens: u32,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_lowercase() {
        let msg = RequestMessage::new(Role::Assistant, "hi");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }

    #[test]
    fn test_response_tokens() {
        let reply = ChatReply {
            content: "Hello!".to_string(),
            prompt_tokens: 5,
            total_tokens: 7,
        };
        let msg = ChatMessage::assistant(reply, Duration::from_millis(1500));
        assert_eq!(msg.response_tokens(), 2);
        assert_eq!(ChatMessage::user("hi").response_tokens(), 0);
    }

    #[test]
    fn test_duration_stored_as_millis() {
        let reply = ChatReply {
            content: "ok".to_string(),
            prompt_tokens: 1,
            total_tokens: 2,
        };
        let msg = ChatMessage::assistant(reply, Duration::from_millis(2345));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["duration_ms"], 2345);

        let back: ChatMessage = serde_json::from_value(value).unwrap();
        assert_eq!(back.duration, Duration::from_millis(2345));
    }
}
