//! Test utilities and common setup.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use barb_client::error::{ClientError, ClientResult};
use barb_client::session::{ChatBackend, ChatSession, HistoryCache, SessionObserver};
use barb_client::stream::{DispatchStats, EventSink, StreamOutcome};
use barb_protocol::{
    BacktestRequest, BacktestResponse, ChatRequest, ContinueRequest, Conversation,
    ConversationUsage, DataBlock, DonePayload, Message, PersistPayload, StreamEvent,
    TitleUpdatePayload, ToolEndPayload, ToolPendingConfirmationPayload, ToolStartPayload,
};
use chrono::Utc;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Scripted backend
// ============================================================================

/// One step of a scripted stream.
#[derive(Clone)]
pub enum Step {
    Event(StreamEvent),
    /// Block until notified (or cancelled).
    Wait(Arc<Notify>),
    /// Fail the request with an HTTP status before anything else happens
    /// when first, or mid-stream otherwise.
    Fail(u16, String),
}

pub fn api_error(status: u16, body: &str) -> ClientError {
    ClientError::Api {
        status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        body: body.to_string(),
    }
}

/// In-memory [`ChatBackend`] replaying canned responses and recording requests.
#[derive(Default)]
pub struct ScriptedBackend {
    pub conversations: Mutex<VecDeque<Result<Conversation, (u16, String)>>>,
    pub histories: Mutex<HashMap<String, Result<Vec<Message>, (u16, String)>>>,
    pub history_gate: Mutex<Option<Arc<Notify>>>,
    pub streams: Mutex<VecDeque<Vec<Step>>>,
    pub continuations: Mutex<VecDeque<Vec<Step>>>,
    pub backtests: Mutex<VecDeque<Result<BacktestResponse, (u16, String)>>>,

    pub history_calls: Mutex<Vec<String>>,
    pub chat_requests: Mutex<Vec<ChatRequest>>,
    pub continue_requests: Mutex<Vec<ContinueRequest>>,
    pub backtest_requests: Mutex<Vec<BacktestRequest>>,
    pub create_calls: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_conversation(&self, id: &str) {
        self.conversations.lock().unwrap().push_back(Ok(conversation(id)));
    }

    pub fn fail_conversation(&self, status: u16, body: &str) {
        self.conversations
            .lock()
            .unwrap()
            .push_back(Err((status, body.to_string())));
    }

    pub fn set_history(&self, id: &str, messages: Vec<Message>) {
        self.histories.lock().unwrap().insert(id.to_string(), Ok(messages));
    }

    pub fn fail_history(&self, id: &str, status: u16, body: &str) {
        self.histories
            .lock()
            .unwrap()
            .insert(id.to_string(), Err((status, body.to_string())));
    }

    /// Hold every history load until the returned handle is notified.
    pub fn gate_history(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.history_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn push_stream(&self, steps: Vec<Step>) {
        self.streams.lock().unwrap().push_back(steps);
    }

    pub fn push_continuation(&self, steps: Vec<Step>) {
        self.continuations.lock().unwrap().push_back(steps);
    }

    pub fn push_backtest(&self, response: BacktestResponse) {
        self.backtests.lock().unwrap().push_back(Ok(response));
    }

    pub fn fail_backtest(&self, status: u16, body: &str) {
        self.backtests
            .lock()
            .unwrap()
            .push_back(Err((status, body.to_string())));
    }

    pub fn history_calls(&self) -> Vec<String> {
        self.history_calls.lock().unwrap().clone()
    }

    async fn play(steps: Vec<Step>, on_event: EventSink<'_>, cancel: &CancellationToken) -> ClientResult<StreamOutcome> {
        let mut stats = DispatchStats::default();
        for step in steps {
            if cancel.is_cancelled() {
                return Ok(StreamOutcome::Cancelled);
            }
            match step {
                Step::Event(event) => {
                    stats.frames += 1;
                    stats.dispatched += 1;
                    on_event(event);
                }
                Step::Wait(notify) => {
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(StreamOutcome::Cancelled),
                        _ = notify.notified() => {}
                    }
                }
                Step::Fail(status, body) => return Err(api_error(status, &body)),
            }
        }
        Ok(StreamOutcome::Completed(stats))
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn create_conversation(&self, instrument: &str) -> ClientResult<Conversation> {
        self.create_calls.lock().unwrap().push(instrument.to_string());
        let next = self.conversations.lock().unwrap().pop_front();
        match next {
            Some(Ok(conv)) => Ok(conv),
            Some(Err((status, body))) => Err(api_error(status, &body)),
            None => Err(api_error(500, "no conversation scripted")),
        }
    }

    async fn get_messages(&self, conversation_id: &str) -> ClientResult<Vec<Message>> {
        self.history_calls.lock().unwrap().push(conversation_id.to_string());
        let gate = self.history_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let entry = self.histories.lock().unwrap().get(conversation_id).cloned();
        match entry {
            Some(Ok(messages)) => Ok(messages),
            Some(Err((status, body))) => Err(api_error(status, &body)),
            None => Ok(Vec::new()),
        }
    }

    async fn stream_chat(
        &self,
        request: &ChatRequest,
        on_event: EventSink<'_>,
        cancel: &CancellationToken,
    ) -> ClientResult<StreamOutcome> {
        self.chat_requests.lock().unwrap().push(request.clone());
        let steps = self.streams.lock().unwrap().pop_front().unwrap_or_default();
        Self::play(steps, on_event, cancel).await
    }

    async fn continue_chat(
        &self,
        request: &ContinueRequest,
        on_event: EventSink<'_>,
        cancel: &CancellationToken,
    ) -> ClientResult<StreamOutcome> {
        self.continue_requests.lock().unwrap().push(request.clone());
        let steps = self.continuations.lock().unwrap().pop_front().unwrap_or_default();
        Self::play(steps, on_event, cancel).await
    }

    async fn run_backtest(&self, request: &BacktestRequest) -> ClientResult<BacktestResponse> {
        self.backtest_requests.lock().unwrap().push(request.clone());
        let next = self.backtests.lock().unwrap().pop_front();
        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err((status, body))) => Err(api_error(status, &body)),
            None => Err(api_error(500, "no backtest scripted")),
        }
    }
}

/// Records observer notifications.
#[derive(Default)]
pub struct RecordingObserver {
    pub created: Mutex<Vec<String>>,
    pub titles: Mutex<Vec<(String, String)>>,
}

impl SessionObserver for RecordingObserver {
    fn on_conversation_created(&self, conversation: &Conversation) {
        self.created.lock().unwrap().push(conversation.id.clone());
    }

    fn on_title_update(&self, conversation_id: &str, title: &str) {
        self.titles
            .lock()
            .unwrap()
            .push((conversation_id.to_string(), title.to_string()));
    }
}

pub fn session(backend: &Arc<ScriptedBackend>) -> ChatSession {
    ChatSession::new(backend.clone(), Arc::new(HistoryCache::default()), "NQ")
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn conversation(id: &str) -> Conversation {
    Conversation {
        id: id.to_string(),
        title: "New chat".to_string(),
        instrument: "NQ".to_string(),
        usage: ConversationUsage::default(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn block(title: &str) -> DataBlock {
    serde_json::from_value(json!({
        "title": title,
        "blocks": [{"type": "metrics-grid", "items": [{"label": "Trades", "value": "42"}]}],
    }))
    .expect("valid data block")
}

pub fn text(delta: &str) -> Step {
    Step::Event(StreamEvent::text_delta(delta))
}

pub fn tool_start(tool_name: &str, input: Value) -> Step {
    Step::Event(StreamEvent::ToolStart(ToolStartPayload {
        tool_name: tool_name.to_string(),
        input: Some(input),
    }))
}

pub fn tool_end(tool_name: &str, error: Option<&str>) -> Step {
    Step::Event(StreamEvent::ToolEnd(ToolEndPayload {
        tool_name: tool_name.to_string(),
        duration_ms: Some(5),
        error: error.map(str::to_string),
    }))
}

pub fn data(block: DataBlock) -> Step {
    Step::Event(StreamEvent::DataBlock(block))
}

pub fn done(answer: &str) -> Step {
    Step::Event(StreamEvent::Done(DonePayload {
        answer: answer.to_string(),
        usage: None,
        tool_calls: vec![],
        data: vec![],
    }))
}

pub fn done_with_data(answer: &str, data: Vec<DataBlock>) -> Step {
    Step::Event(StreamEvent::Done(DonePayload {
        answer: answer.to_string(),
        usage: None,
        tool_calls: vec![],
        data,
    }))
}

pub fn persist(message_id: Option<&str>) -> Step {
    Step::Event(StreamEvent::Persist(PersistPayload {
        message_id: message_id.map(str::to_string),
        persisted: message_id.is_some(),
    }))
}

pub fn title_update(title: &str) -> Step {
    Step::Event(StreamEvent::TitleUpdate(TitleUpdatePayload {
        title: title.to_string(),
    }))
}

pub fn pending_confirmation(tool_use_id: &str, input: Value) -> Step {
    Step::Event(StreamEvent::ToolPendingConfirmation(ToolPendingConfirmationPayload {
        tool_use_id: tool_use_id.to_string(),
        tool_name: "run_backtest".to_string(),
        input,
    }))
}

pub fn stream_error(message: &str) -> Step {
    Step::Event(StreamEvent::error(message))
}

// ============================================================================
// HTTP test server
// ============================================================================

/// Serve `app` on an ephemeral port; returns the base URL.
pub async fn spawn_server(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    format!("http://{addr}")
}

/// Let spawned tasks make progress.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
}
