//! Wire and domain types for the Barb chat protocol.
//!
//! This crate defines the message, data block, and stream event formats
//! exchanged between the chat client and the Barb agent server:
//!
//! ```text
//! Session controller <--[typed StreamEvent]-- Dispatcher <--[event-stream frames]-- Server
//!         |
//!         +--[REST: conversations, messages, backtest]--> Server
//! ```
//!
//! ## Design Principles
//!
//! 1. **Messages are persistent, events are ephemeral.** Messages come back from
//!    the history endpoint. Events drive an in-flight assistant turn and are
//!    never stored as conversation content.
//! 2. **Data blocks are positional.** Assistant prose embeds `{{data:N}}`
//!    markers that refer to `data[N]`; see [`content`].
//! 3. **Validation is structural.** Every event variant has a minimal set of
//!    required fields; payloads missing them never become a [`StreamEvent`].

pub mod blocks;
pub mod commands;
pub mod content;
pub mod events;
pub mod messages;

pub use blocks::{Block, BlockStatus, DataBlock};
pub use commands::{BacktestRequest, BacktestResponse, ChatRequest, ContinueRequest, CreateConversationRequest};
pub use content::{ContentSegment, data_marker, segments};
pub use events::{
    DonePayload, ErrorPayload, EventKind, PersistPayload, StreamEvent, TextDeltaPayload,
    TitleUpdatePayload, ToolEndPayload, ToolPendingConfirmationPayload, ToolStartPayload,
};
pub use messages::{Conversation, ConversationUsage, Message, PENDING_CONVERSATION_ID, Role, ToolCall, Usage};
