//! The server operations a chat session depends on.

use async_trait::async_trait;
use barb_protocol::{
    BacktestRequest, BacktestResponse, ChatRequest, ContinueRequest, Conversation, Message,
};
use tokio_util::sync::CancellationToken;

use crate::api::ApiClient;
use crate::error::ClientResult;
use crate::stream::{EventSink, StreamOutcome};

/// Server collaborators of [`ChatSession`](super::ChatSession).
///
/// [`ApiClient`] is the production implementation; tests script their own.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn create_conversation(&self, instrument: &str) -> ClientResult<Conversation>;

    async fn get_messages(&self, conversation_id: &str) -> ClientResult<Vec<Message>>;

    async fn stream_chat(
        &self,
        request: &ChatRequest,
        on_event: EventSink<'_>,
        cancel: &CancellationToken,
    ) -> ClientResult<StreamOutcome>;

    async fn continue_chat(
        &self,
        request: &ContinueRequest,
        on_event: EventSink<'_>,
        cancel: &CancellationToken,
    ) -> ClientResult<StreamOutcome>;

    async fn run_backtest(&self, request: &BacktestRequest) -> ClientResult<BacktestResponse>;
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn create_conversation(&self, instrument: &str) -> ClientResult<Conversation> {
        ApiClient::create_conversation(self, instrument).await
    }

    async fn get_messages(&self, conversation_id: &str) -> ClientResult<Vec<Message>> {
        ApiClient::get_messages(self, conversation_id).await
    }

    async fn stream_chat(
        &self,
        request: &ChatRequest,
        on_event: EventSink<'_>,
        cancel: &CancellationToken,
    ) -> ClientResult<StreamOutcome> {
        ApiClient::stream_chat(self, request, on_event, cancel).await
    }

    async fn continue_chat(
        &self,
        request: &ContinueRequest,
        on_event: EventSink<'_>,
        cancel: &CancellationToken,
    ) -> ClientResult<StreamOutcome> {
        ApiClient::continue_chat(self, request, on_event, cancel).await
    }

    async fn run_backtest(&self, request: &BacktestRequest) -> ClientResult<BacktestResponse> {
        ApiClient::run_backtest(self, request).await
    }
}
