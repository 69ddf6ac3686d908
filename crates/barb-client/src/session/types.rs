//! Session state, errors and observer hooks.

use barb_protocol::{Conversation, DataBlock};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Lifecycle of a [`ChatSession`](super::ChatSession).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No conversation selected.
    #[default]
    Idle,
    LoadingHistory,
    Ready,
    /// A send or a confirmed continuation is streaming.
    Sending,
    /// The stream paused on a tool that needs the user's go-ahead.
    AwaitingToolConfirmation,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::LoadingHistory => "loading_history",
            Self::Ready => "ready",
            Self::Sending => "sending",
            Self::AwaitingToolConfirmation => "awaiting_tool_confirmation",
        };
        f.write_str(s)
    }
}

/// Errors surfaced to the user through [`ChatSession::error`](super::ChatSession::error).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("{0}")]
    HistoryLoadFailed(String),

    #[error("{0}")]
    ConversationCreateFailed(String),

    #[error("{0}")]
    SendFailed(String),

    /// The server reported an error inside an otherwise healthy stream.
    #[error("{0}")]
    StreamErrorEvent(String),
}

impl SessionError {
    /// Stable kebab-case name of the error category.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::HistoryLoadFailed(_) => "history-load-failed",
            Self::ConversationCreateFailed(_) => "conversation-create-failed",
            Self::SendFailed(_) => "send-failed",
            Self::StreamErrorEvent(_) => "stream-error-event",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::HistoryLoadFailed(msg)
            | Self::ConversationCreateFailed(msg)
            | Self::SendFailed(msg)
            | Self::StreamErrorEvent(msg) => msg,
        }
    }
}

/// A tool call waiting for confirmation, with the assistant turn as it stood
/// when the stream paused.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTool {
    pub tool_use_id: String,
    pub tool_name: String,
    /// Proposed input; the user may edit it before confirming.
    pub input: Value,
    pub message_id: String,
    pub conversation_id: String,
    pub full_text: String,
    pub data_blocks: Vec<DataBlock>,
    /// Index of an unresolved loading placeholder in `data_blocks`.
    pub pending_block: Option<usize>,
}

/// Fire-and-forget notifications for the host application.
pub trait SessionObserver: Send + Sync {
    /// The first send created a conversation.
    fn on_conversation_created(&self, _conversation: &Conversation) {}

    /// The server renamed a conversation.
    fn on_title_update(&self, _conversation_id: &str, _title: &str) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}
