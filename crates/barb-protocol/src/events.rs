//! Stream event types.
//!
//! Events are ephemeral signals that build one assistant turn. They arrive as
//! `event: <name>` / `data: <json>` frames; each variant declares the minimal
//! set of required fields through its payload type, so a payload that
//! deserializes is a payload that may be dispatched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::blocks::DataBlock;
use crate::messages::{ToolCall, Usage};

// ============================================================================
// Event names
// ============================================================================

/// The closed set of event names this client understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ToolStart,
    ToolEnd,
    ToolPendingConfirmation,
    DataBlock,
    TextDelta,
    Done,
    Persist,
    TitleUpdate,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 9] = [
        Self::ToolStart,
        Self::ToolEnd,
        Self::ToolPendingConfirmation,
        Self::DataBlock,
        Self::TextDelta,
        Self::Done,
        Self::Persist,
        Self::TitleUpdate,
        Self::Error,
    ];

    /// Wire name of the event.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ToolStart => "tool_start",
            Self::ToolEnd => "tool_end",
            Self::ToolPendingConfirmation => "tool_pending_confirmation",
            Self::DataBlock => "data_block",
            Self::TextDelta => "text_delta",
            Self::Done => "done",
            Self::Persist => "persist",
            Self::TitleUpdate => "title_update",
            Self::Error => "error",
        }
    }

    /// Look up a wire name; `None` for events this client does not know.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// Whether the event carries content for the assistant bubble.
    pub fn is_content(self) -> bool {
        matches!(self, Self::TextDelta | Self::ToolStart | Self::DataBlock)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// A tool invocation began.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolStartPayload {
    pub tool_name: String,
    #[serde(default)]
    pub input: Option<Value>,
}

impl ToolStartPayload {
    /// Title requested by the tool input, if any.
    pub fn title(&self) -> Option<&str> {
        self.input
            .as_ref()
            .and_then(|input| input.get("title"))
            .and_then(Value::as_str)
            .filter(|title| !title.is_empty())
    }
}

/// A tool invocation finished, possibly with an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolEndPayload {
    pub tool_name: String,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// The agent wants the user to confirm (and possibly edit) a tool input
/// before running it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPendingConfirmationPayload {
    pub tool_use_id: String,
    pub tool_name: String,
    pub input: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextDeltaPayload {
    pub delta: String,
}

/// Terminal payload of an assistant turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonePayload {
    pub answer: String,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub data: Vec<DataBlock>,
}

/// The assistant message was stored server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistPayload {
    /// The key must be present; `null` means the server could not assign one.
    #[serde(deserialize_with = "Option::deserialize")]
    pub message_id: Option<String>,
    pub persisted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleUpdatePayload {
    pub title: String,
}

/// In-band error reported by the server mid-stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
}

// ============================================================================
// Event union
// ============================================================================

/// A validated stream event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    ToolStart(ToolStartPayload),
    ToolEnd(ToolEndPayload),
    ToolPendingConfirmation(ToolPendingConfirmationPayload),
    DataBlock(DataBlock),
    TextDelta(TextDeltaPayload),
    Done(DonePayload),
    Persist(PersistPayload),
    TitleUpdate(TitleUpdatePayload),
    Error(ErrorPayload),
}

impl StreamEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ToolStart(_) => EventKind::ToolStart,
            Self::ToolEnd(_) => EventKind::ToolEnd,
            Self::ToolPendingConfirmation(_) => EventKind::ToolPendingConfirmation,
            Self::DataBlock(_) => EventKind::DataBlock,
            Self::TextDelta(_) => EventKind::TextDelta,
            Self::Done(_) => EventKind::Done,
            Self::Persist(_) => EventKind::Persist,
            Self::TitleUpdate(_) => EventKind::TitleUpdate,
            Self::Error(_) => EventKind::Error,
        }
    }

    /// JSON payload as it travels in the `data:` line.
    pub fn payload(&self) -> serde_json::Result<Value> {
        match self {
            Self::ToolStart(p) => serde_json::to_value(p),
            Self::ToolEnd(p) => serde_json::to_value(p),
            Self::ToolPendingConfirmation(p) => serde_json::to_value(p),
            Self::DataBlock(p) => serde_json::to_value(p),
            Self::TextDelta(p) => serde_json::to_value(p),
            Self::Done(p) => serde_json::to_value(p),
            Self::Persist(p) => serde_json::to_value(p),
            Self::TitleUpdate(p) => serde_json::to_value(p),
            Self::Error(p) => serde_json::to_value(p),
        }
    }

    /// Encode as one event-stream frame, blank-line terminated.
    pub fn to_frame(&self) -> serde_json::Result<String> {
        let data = serde_json::to_string(&self.payload()?)?;
        Ok(format!("event: {}\ndata: {}\n\n", self.kind(), data))
    }

    pub fn text_delta(delta: impl Into<String>) -> Self {
        Self::TextDelta(TextDeltaPayload { delta: delta.into() })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload { error: message.into() })
    }
}
