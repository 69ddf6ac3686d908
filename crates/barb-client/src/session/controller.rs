//! Chat session controller.
//!
//! Owns the displayed message list of one selected conversation and drives
//! sends, tool confirmations and history loads against a [`ChatBackend`].
//!
//! All methods take `&self`. State sits behind a mutex that is only held for
//! short synchronous sections, never across an `.await`, so the read API and
//! [`ChatSession::cancel_current_operation`] stay usable while an operation is
//! suspended. Every send/confirm gets an operation id and a
//! [`CancellationToken`]; callbacks of an operation that is no longer current
//! leave the state untouched.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use barb_protocol::{
    BacktestRequest, ChatRequest, ContinueRequest, EventKind, Message, PENDING_CONVERSATION_ID,
    StreamEvent,
};
use log::{debug, info, warn};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::backend::ChatBackend;
use super::cache::HistoryCache;
use super::turn::AssistantTurn;
use super::types::{NoopObserver, PendingTool, SessionError, SessionObserver, SessionState};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::stream::StreamOutcome;

/// Undo applied when a send or confirm fails.
enum Rollback {
    /// Drop the optimistic user message and the assistant message.
    Send { user_message_id: String },
    /// Put the assistant message back the way it was when the stream paused.
    Restore(PendingTool),
}

#[derive(Debug)]
struct Operation {
    id: u64,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct Inner {
    state: SessionState,
    messages: Vec<Message>,
    error: Option<SessionError>,
    pending_tool: Option<PendingTool>,
    conversation_id: Option<String>,
    /// Bumped on every selection; a history load for an older one is dropped.
    selection: u64,
    operation: Option<Operation>,
    next_operation: u64,
}

impl Inner {
    fn is_current(&self, operation_id: u64) -> bool {
        self.operation.as_ref().is_some_and(|op| op.id == operation_id)
    }

    fn begin_operation(&mut self) -> (u64, CancellationToken) {
        self.next_operation += 1;
        let cancel = CancellationToken::new();
        self.operation = Some(Operation {
            id: self.next_operation,
            cancel: cancel.clone(),
        });
        (self.next_operation, cancel)
    }

    fn abort_operation(&mut self) {
        if let Some(op) = self.operation.take() {
            op.cancel.cancel();
        }
    }

    fn in_flight(&self) -> bool {
        matches!(
            self.state,
            SessionState::Sending | SessionState::AwaitingToolConfirmation
        )
    }

    fn remove_message(&mut self, id: &str) {
        self.messages.retain(|m| m.id != id);
    }

    fn message_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    /// Insert the assistant message on first use, otherwise mirror the turn into it.
    fn sync_turn(&mut self, turn: &mut AssistantTurn) {
        if !turn.inserted {
            if let Some(existing) = self.message_mut(&turn.message_id) {
                turn.apply_to(existing);
            } else {
                self.messages.push(turn.to_message());
            }
            turn.inserted = true;
            return;
        }
        if let Some(message) = self.message_mut(&turn.message_id) {
            turn.apply_to(message);
        }
    }
}

/// Controller for one chat view.
pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    cache: Arc<HistoryCache>,
    observer: Arc<dyn SessionObserver>,
    instrument: String,
    inner: Mutex<Inner>,
}

impl ChatSession {
    pub fn new(backend: Arc<dyn ChatBackend>, cache: Arc<HistoryCache>, instrument: impl Into<String>) -> Self {
        Self {
            backend,
            cache,
            observer: Arc::new(NoopObserver),
            instrument: instrument.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Session with its own cache sized from `config`.
    pub fn from_config(backend: Arc<dyn ChatBackend>, config: &ClientConfig) -> Self {
        let cache = Arc::new(HistoryCache::new(config.history_cache_capacity));
        Self::new(backend, cache, config.instrument.clone())
    }

    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========== Accessors ==========

    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn error(&self) -> Option<SessionError> {
        self.lock().error.clone()
    }

    pub fn pending_tool(&self) -> Option<PendingTool> {
        self.lock().pending_tool.clone()
    }

    pub fn conversation_id(&self) -> Option<String> {
        self.lock().conversation_id.clone()
    }

    pub fn is_busy(&self) -> bool {
        matches!(
            self.lock().state,
            SessionState::LoadingHistory | SessionState::Sending
        )
    }

    pub fn clear_error(&self) {
        self.lock().error = None;
    }

    pub fn cache(&self) -> &Arc<HistoryCache> {
        &self.cache
    }

    // ========== Selection ==========

    /// Show a conversation, from the cache when possible.
    ///
    /// Re-selecting the conversation a send is streaming into is a no-op.
    /// Selecting any other conversation aborts that send.
    pub async fn select_conversation(&self, conversation_id: Option<&str>) {
        let selection = {
            let mut inner = self.lock();

            let Some(id) = conversation_id else {
                inner.abort_operation();
                inner.selection += 1;
                inner.conversation_id = None;
                inner.messages.clear();
                inner.pending_tool = None;
                inner.error = None;
                inner.state = SessionState::Idle;
                return;
            };

            if inner.in_flight() && inner.conversation_id.as_deref() == Some(id) {
                debug!("conversation {} is streaming, not reloading history", id);
                return;
            }

            inner.abort_operation();
            inner.selection += 1;
            inner.conversation_id = Some(id.to_string());
            inner.pending_tool = None;
            inner.error = None;

            if let Some(messages) = self.cache.get(id) {
                debug!("history cache hit for {}", id);
                inner.messages = messages;
                inner.state = SessionState::Ready;
                return;
            }

            inner.messages.clear();
            inner.state = SessionState::LoadingHistory;
            inner.selection
        };

        let Some(id) = conversation_id else {
            return;
        };
        let result = self.backend.get_messages(id).await;

        let mut inner = self.lock();
        if inner.selection != selection {
            debug!("discarding superseded history load for {}", id);
            return;
        }
        match result {
            Ok(messages) => {
                info!("loaded {} messages for {}", messages.len(), id);
                self.cache.set(id, messages.clone());
                inner.messages = messages;
            }
            Err(err) => {
                warn!("failed to load history for {}: {}", id, err);
                inner.messages.clear();
                inner.error = Some(SessionError::HistoryLoadFailed(err.to_string()));
            }
        }
        inner.state = SessionState::Ready;
    }

    // ========== Send ==========

    /// Send a user message and stream the reply into the list.
    ///
    /// Ignored while another send or confirmation is in flight.
    pub async fn send(&self, text: &str) {
        let (operation_id, cancel, user_message_id, existing_conversation) = {
            let mut inner = self.lock();
            if inner.in_flight() {
                warn!("send ignored: an operation is already in flight");
                return;
            }

            let conversation = inner.conversation_id.clone();
            let user = Message::user(
                conversation.as_deref().unwrap_or(PENDING_CONVERSATION_ID),
                text,
            );
            let user_message_id = user.id.clone();
            // A history load still in flight must not replace this turn.
            inner.selection += 1;
            inner.messages.push(user);
            inner.error = None;
            inner.pending_tool = None;
            inner.state = SessionState::Sending;
            let (operation_id, cancel) = inner.begin_operation();
            (operation_id, cancel, user_message_id, conversation)
        };

        let conversation_id = match existing_conversation {
            Some(id) => id,
            None => {
                let created = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    created = self.backend.create_conversation(&self.instrument) => created,
                };
                match created {
                    Ok(conversation) => {
                        {
                            let mut inner = self.lock();
                            if !inner.is_current(operation_id) {
                                return;
                            }
                            info!("created conversation {}", conversation.id);
                            if let Some(user) = inner.message_mut(&user_message_id) {
                                user.conversation_id = conversation.id.clone();
                            }
                            inner.conversation_id = Some(conversation.id.clone());
                        }
                        self.observer.on_conversation_created(&conversation);
                        conversation.id
                    }
                    Err(err) => {
                        let mut inner = self.lock();
                        if !inner.is_current(operation_id) {
                            return;
                        }
                        warn!("failed to create conversation: {}", err);
                        inner.remove_message(&user_message_id);
                        inner.error = Some(SessionError::ConversationCreateFailed(err.to_string()));
                        inner.state = SessionState::Ready;
                        inner.operation = None;
                        return;
                    }
                }
            }
        };

        let request = ChatRequest {
            conversation_id: Some(conversation_id.clone()),
            message: text.to_string(),
        };
        let mut turn = AssistantTurn::new(conversation_id);
        let result = {
            let mut on_event = |event: StreamEvent| self.apply_event(operation_id, &mut turn, event);
            self.backend.stream_chat(&request, &mut on_event, &cancel).await
        };

        self.finish(operation_id, &cancel, &turn, result, Rollback::Send { user_message_id });
    }

    // ========== Tool confirmation ==========

    /// Run the paused backtest with `modified_input` (or the proposed input)
    /// and resume the assistant turn from where it stopped.
    pub async fn confirm_backtest(&self, modified_input: Option<Value>) {
        let (operation_id, cancel, pending) = {
            let mut inner = self.lock();
            if inner.state != SessionState::AwaitingToolConfirmation {
                warn!("confirm ignored in state {}", inner.state);
                return;
            }
            let Some(pending) = inner.pending_tool.take() else {
                warn!("confirm ignored: no pending tool");
                return;
            };
            // The paused stream may still be open; it must not touch the turn again.
            inner.abort_operation();
            inner.selection += 1;
            inner.error = None;
            inner.state = SessionState::Sending;
            let (operation_id, cancel) = inner.begin_operation();
            (operation_id, cancel, pending)
        };

        let input = modified_input.unwrap_or_else(|| pending.input.clone());
        let mut turn = AssistantTurn::resume(&pending);

        let backtest = match BacktestRequest::from_tool_input(&self.instrument, &input) {
            Ok(request) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    response = self.backend.run_backtest(&request) => response,
                }
            }
            Err(err) => Err(ClientError::InvalidToolInput(err.to_string())),
        };

        let response = match backtest {
            Ok(response) => response,
            Err(err) => {
                self.finish(operation_id, &cancel, &turn, Err(err), Rollback::Restore(pending));
                return;
            }
        };

        let card = response.card.into_success();
        {
            let mut inner = self.lock();
            if !inner.is_current(operation_id) {
                return;
            }
            turn.attach_block(card.clone());
            inner.sync_turn(&mut turn);
        }

        let request = ContinueRequest {
            conversation_id: pending.conversation_id.clone(),
            tool_use_id: pending.tool_use_id.clone(),
            tool_input: input,
            model_response: response.model_response,
            data_card: card,
        };
        let result = {
            let mut on_event = |event: StreamEvent| self.apply_event(operation_id, &mut turn, event);
            self.backend.continue_chat(&request, &mut on_event, &cancel).await
        };

        self.finish(operation_id, &cancel, &turn, result, Rollback::Restore(pending));
    }

    /// Drop the pending tool; the assistant message keeps what it has.
    pub fn dismiss_tool_confirmation(&self) {
        let mut inner = self.lock();
        if inner.state != SessionState::AwaitingToolConfirmation {
            return;
        }
        inner.abort_operation();
        inner.pending_tool = None;
        inner.state = SessionState::Ready;
    }

    /// Cancel the in-flight send or confirmation. Nothing is rolled back and
    /// no error is recorded.
    pub fn cancel_current_operation(&self) {
        let mut inner = self.lock();
        let Some(op) = inner.operation.take() else {
            return;
        };
        debug!("cancelling operation {}", op.id);
        op.cancel.cancel();
        if inner.state == SessionState::Sending {
            inner.state = SessionState::Ready;
        }
    }

    // ========== Stream handling ==========

    fn apply_event(&self, operation_id: u64, turn: &mut AssistantTurn, event: StreamEvent) {
        let title = {
            let mut inner = self.lock();
            if !inner.is_current(operation_id) {
                return;
            }
            let kind = event.kind();
            if turn.paused
                && (kind.is_content()
                    || matches!(
                        kind,
                        EventKind::ToolEnd | EventKind::Done | EventKind::ToolPendingConfirmation
                    ))
            {
                debug!("ignoring {} while awaiting tool confirmation", kind);
                return;
            }

            match event {
                StreamEvent::TextDelta(payload) => {
                    turn.push_text(&payload.delta);
                    inner.sync_turn(turn);
                    None
                }
                StreamEvent::ToolStart(payload) => {
                    let title = payload.title().unwrap_or(payload.tool_name.as_str()).to_string();
                    debug!("tool {} started", payload.tool_name);
                    turn.start_tool(&title);
                    inner.sync_turn(turn);
                    None
                }
                StreamEvent::ToolEnd(payload) => {
                    if let Some(error) = payload.error {
                        warn!("tool {} failed: {}", payload.tool_name, error);
                        if turn.fail_tool(&error) && turn.inserted {
                            inner.sync_turn(turn);
                        }
                    }
                    None
                }
                StreamEvent::DataBlock(block) => {
                    turn.attach_block(block);
                    inner.sync_turn(turn);
                    None
                }
                StreamEvent::ToolPendingConfirmation(payload) => {
                    info!("tool {} awaits confirmation", payload.tool_name);
                    turn.paused = true;
                    inner.pending_tool =
                        Some(turn.snapshot(payload.tool_use_id, payload.tool_name, payload.input));
                    inner.state = SessionState::AwaitingToolConfirmation;
                    None
                }
                StreamEvent::Done(payload) => {
                    inner.sync_turn(turn);
                    if let Some(message) = inner.message_mut(&turn.message_id) {
                        turn.finalize(payload, message);
                    }
                    self.cache.set(&turn.conversation_id, inner.messages.clone());
                    None
                }
                StreamEvent::Persist(payload) => {
                    if let Some(new_id) = payload.message_id {
                        let old_id = std::mem::replace(&mut turn.message_id, new_id.clone());
                        if let Some(message) = inner.message_mut(&old_id) {
                            message.id = new_id.clone();
                        }
                        if let Some(pending) = inner.pending_tool.as_mut()
                            && pending.message_id == old_id
                        {
                            pending.message_id = new_id;
                        }
                    }
                    None
                }
                StreamEvent::TitleUpdate(payload) => Some(payload.title),
                StreamEvent::Error(payload) => {
                    warn!("stream reported an error: {}", payload.error);
                    inner.error = Some(SessionError::StreamErrorEvent(payload.error));
                    None
                }
            }
        };

        if let Some(title) = title {
            self.observer.on_title_update(&turn.conversation_id, &title);
        }
    }

    /// Settle the session after a stream (or the request before it) ended.
    fn finish(
        &self,
        operation_id: u64,
        cancel: &CancellationToken,
        turn: &AssistantTurn,
        result: ClientResult<StreamOutcome>,
        rollback: Rollback,
    ) {
        let mut inner = self.lock();
        if !inner.is_current(operation_id) || cancel.is_cancelled() {
            return;
        }
        inner.operation = None;

        match result {
            Ok(StreamOutcome::Cancelled) => {}
            Ok(StreamOutcome::Completed(stats)) => {
                debug!(
                    "stream finished: {} dispatched, {} malformed",
                    stats.dispatched, stats.malformed
                );
                if inner.state != SessionState::AwaitingToolConfirmation {
                    inner.state = SessionState::Ready;
                }
            }
            Err(err) if turn.paused => {
                warn!("stream failed after pausing for tool confirmation: {}", err);
            }
            Err(err) => {
                warn!("send failed: {}", err);
                match rollback {
                    Rollback::Send { user_message_id } => {
                        inner.remove_message(&user_message_id);
                        inner.remove_message(&turn.message_id);
                    }
                    Rollback::Restore(snapshot) => {
                        if snapshot.full_text.is_empty() && snapshot.data_blocks.is_empty() {
                            inner.remove_message(&turn.message_id);
                        } else if let Some(message) = inner.message_mut(&turn.message_id) {
                            let restored = AssistantTurn::resume(&snapshot);
                            restored.apply_to(message);
                        }
                    }
                }
                inner.pending_tool = None;
                inner.error = Some(SessionError::SendFailed(err.to_string()));
                inner.state = SessionState::Ready;
            }
        }
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("ChatSession")
            .field("state", &inner.state)
            .field("conversation_id", &inner.conversation_id)
            .field("messages", &inner.messages.len())
            .finish()
    }
}
