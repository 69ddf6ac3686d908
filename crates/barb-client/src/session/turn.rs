//! Accumulator for one assistant turn.

use barb_protocol::{DataBlock, DonePayload, Message, Role, data_marker};
use chrono::Utc;
use uuid::Uuid;

use super::types::PendingTool;

/// Text and blocks collected so far for the assistant message being streamed.
///
/// The message itself lives in the session's list; the turn only knows its id
/// and whether it has been inserted yet.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AssistantTurn {
    pub message_id: String,
    pub conversation_id: String,
    pub full_text: String,
    pub data_blocks: Vec<DataBlock>,
    /// Loading placeholder waiting for its result.
    pub pending_block: Option<usize>,
    pub inserted: bool,
    /// Set once the stream paused on a tool confirmation.
    pub paused: bool,
}

impl AssistantTurn {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            full_text: String::new(),
            data_blocks: Vec::new(),
            pending_block: None,
            inserted: false,
            paused: false,
        }
    }

    /// Continue the turn captured in `pending`. The message may or may not
    /// already be in the list; `inserted` is settled by the caller.
    pub fn resume(pending: &PendingTool) -> Self {
        Self {
            message_id: pending.message_id.clone(),
            conversation_id: pending.conversation_id.clone(),
            full_text: pending.full_text.clone(),
            data_blocks: pending.data_blocks.clone(),
            pending_block: pending.pending_block,
            inserted: false,
            paused: false,
        }
    }

    pub fn push_text(&mut self, delta: &str) {
        self.full_text.push_str(delta);
    }

    /// Append a loading placeholder and its marker; returns the block index.
    pub fn start_tool(&mut self, title: &str) -> usize {
        let index = self.append_block(DataBlock::loading(title));
        self.pending_block = Some(index);
        index
    }

    /// Mark the pending placeholder as failed. Returns false when nothing
    /// was pending.
    pub fn fail_tool(&mut self, error: &str) -> bool {
        let Some(index) = self.pending_block.take() else {
            return false;
        };
        if let Some(block) = self.data_blocks.get_mut(index) {
            block.fail(error);
        }
        true
    }

    /// Resolve the pending placeholder with `block`, or append it with a new
    /// marker when no placeholder is waiting.
    pub fn attach_block(&mut self, block: DataBlock) {
        let block = block.into_success();
        match self.pending_block.take() {
            Some(index) if index < self.data_blocks.len() => self.data_blocks[index] = block,
            _ => {
                self.append_block(block);
            }
        }
    }

    fn append_block(&mut self, block: DataBlock) -> usize {
        let index = self.data_blocks.len();
        self.data_blocks.push(block);
        self.full_text.push_str("\n\n");
        self.full_text.push_str(&data_marker(index));
        self.full_text.push_str("\n\n");
        index
    }

    fn data(&self) -> Option<Vec<DataBlock>> {
        if self.data_blocks.is_empty() {
            None
        } else {
            Some(self.data_blocks.clone())
        }
    }

    /// The message as it should currently be displayed.
    pub fn to_message(&self) -> Message {
        Message {
            id: self.message_id.clone(),
            conversation_id: self.conversation_id.clone(),
            role: Role::Assistant,
            content: self.full_text.clone(),
            data: self.data(),
            usage: None,
            created_at: Utc::now(),
        }
    }

    /// Mirror the accumulated text and blocks into `message`.
    pub fn apply_to(&self, message: &mut Message) {
        message.content = self.full_text.clone();
        message.data = self.data();
    }

    /// Final content of the message. Streamed blocks win over the `done`
    /// payload because their markers are already in the text.
    pub fn finalize(&self, done: DonePayload, message: &mut Message) {
        if self.data_blocks.is_empty() {
            message.content = done.answer;
            message.data = if done.data.is_empty() { None } else { Some(done.data) };
        } else {
            message.content = self.full_text.clone();
            message.data = Some(self.data_blocks.clone());
        }
        message.usage = done.usage;
    }

    pub fn snapshot(&self, tool_use_id: String, tool_name: String, input: serde_json::Value) -> PendingTool {
        PendingTool {
            tool_use_id,
            tool_name,
            input,
            message_id: self.message_id.clone(),
            conversation_id: self.conversation_id.clone(),
            full_text: self.full_text.clone(),
            data_blocks: self.data_blocks.clone(),
            pending_block: self.pending_block,
        }
    }
}
