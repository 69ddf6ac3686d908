//! Conversation and message types.
//!
//! Messages are the persistent units of a conversation. They are returned by
//! the history endpoint and built incrementally by the session controller
//! while an assistant turn streams in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::blocks::DataBlock;

/// Conversation id carried by optimistic messages before the conversation
/// exists on the server.
pub const PENDING_CONVERSATION_ID: &str = "pending";

/// One turn in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Client-random for optimistic entries, server-assigned once persisted.
    pub id: String,

    /// Owning conversation, or [`PENDING_CONVERSATION_ID`].
    pub conversation_id: String,

    pub role: Role,

    /// Display text, possibly containing `{{data:N}}` markers.
    pub content: String,

    /// Attached data blocks, `null` when there are none.
    #[serde(default)]
    pub data: Option<Vec<DataBlock>>,

    /// Token accounting; only set on a completed assistant message.
    #[serde(default)]
    pub usage: Option<Usage>,

    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Optimistic user message with a random id.
    pub fn user(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            role: Role::User,
            content: content.into(),
            data: None,
            usage: None,
            created_at: Utc::now(),
        }
    }

    /// Empty assistant message with a random id, filled in as a stream progresses.
    pub fn assistant(conversation_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            role: Role::Assistant,
            content: String::new(),
            data: None,
            usage: None,
            created_at: Utc::now(),
        }
    }

    /// Whether the message still belongs to a conversation that does not exist yet.
    pub fn is_pending(&self) -> bool {
        self.conversation_id == PENDING_CONVERSATION_ID
    }

    /// Attached blocks, empty when there are none.
    pub fn blocks(&self) -> &[DataBlock] {
        self.data.as_deref().unwrap_or_default()
    }
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    /// Older servers label assistant turns `model`.
    #[serde(alias = "model")]
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// Token and cost accounting for one assistant turn.
///
/// Every field defaults to zero so that servers reporting a subset (or a
/// different cache breakdown) still deserialize.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub thinking_tokens: u64,
    pub cached_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub thinking_cost: f64,
    pub cache_read_cost: f64,
    pub cache_write_cost: f64,
    pub total_cost: f64,
}

/// A tool invocation reported in the terminal `done` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_name: String,
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

/// Conversation summary as returned by the conversations endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub instrument: String,
    #[serde(default)]
    pub usage: ConversationUsage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate usage of a conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationUsage {
    #[serde(flatten)]
    pub totals: Usage,
    pub message_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::BlockStatus;

    #[test]
    fn test_message_roundtrip_keeps_null_data() {
        let msg = Message {
            id: "msg-1".to_string(),
            conversation_id: "conv-1".to_string(),
            role: Role::Assistant,
            content: "The range is 150.".to_string(),
            data: None,
            usage: None,
            created_at: Utc::now(),
        };

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"role\":\"assistant\""));
        assert!(json.contains("\"data\":null"));

        let parsed: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_model_role_alias() {
        let parsed: Message = serde_json::from_value(serde_json::json!({
            "id": "m2",
            "conversation_id": "conv-1",
            "role": "model",
            "content": "hello",
            "data": null,
            "usage": null,
            "created_at": "2024-01-01T00:00:00Z",
        }))
        .unwrap();
        assert_eq!(parsed.role, Role::Assistant);
    }

    #[test]
    fn test_history_message_with_blocks() {
        let parsed: Message = serde_json::from_value(serde_json::json!({
            "id": "m3",
            "conversation_id": "conv-1",
            "role": "assistant",
            "content": "See below",
            "data": [{"title": "Ranges", "blocks": [], "status": "success"}],
            "usage": {"input_tokens": 100, "output_tokens": 50, "total_cost": 0.01},
            "created_at": "2024-01-01T00:00:00.123456+00:00",
        }))
        .unwrap();

        assert_eq!(parsed.blocks().len(), 1);
        assert_eq!(parsed.blocks()[0].status, Some(BlockStatus::Success));
        let usage = parsed.usage.unwrap();
        assert_eq!(usage.input_tokens, 100);
        assert_eq!(usage.thinking_tokens, 0);
    }

    #[test]
    fn test_optimistic_constructors() {
        let user = Message::user(PENDING_CONVERSATION_ID, "hi");
        let assistant = Message::assistant("conv-1");

        assert!(user.is_pending());
        assert!(!assistant.is_pending());
        assert_ne!(user.id, assistant.id);
        assert!(assistant.content.is_empty());
        assert!(assistant.blocks().is_empty());
    }

    #[test]
    fn test_conversation_usage_flattened() {
        let conv: Conversation = serde_json::from_value(serde_json::json!({
            "id": "new-conv",
            "title": "New conversation",
            "instrument": "NQ",
            "usage": {"input_tokens": 0, "output_tokens": 0, "total_cost": 0, "message_count": 3},
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z",
        }))
        .unwrap();

        assert_eq!(conv.usage.message_count, 3);
        assert_eq!(conv.usage.totals.input_tokens, 0);
    }
}
