//! Barb REST and streaming HTTP client.

use std::sync::RwLock;

use barb_protocol::{
    BacktestRequest, BacktestResponse, ChatRequest, ContinueRequest, Conversation,
    CreateConversationRequest, Message,
};
use log::{debug, info};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::stream::{EventSink, StreamClient, StreamOutcome};

/// Client for the Barb API.
#[derive(Debug)]
pub struct ApiClient {
    /// HTTP client.
    client: Client,
    /// Base URL (e.g., "http://localhost:8000").
    base_url: String,
    /// Bearer token of the signed-in user.
    token: RwLock<String>,
    stream: StreamClient,
}

impl ApiClient {
    /// Create a new client over an existing HTTP client.
    pub fn new(client: Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            stream: StreamClient::new(client.clone()),
            client,
            base_url,
            token: RwLock::new(token.into()),
        }
    }

    /// Create a client from configuration, with the token taken from it.
    pub fn from_config(config: &ClientConfig) -> ClientResult<Self> {
        let token = config.token.clone().unwrap_or_default();
        Ok(Self::new(config.http_client()?, config.api_url.clone(), token))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Replace the bearer token, e.g. after the auth layer refreshed it.
    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = token.into();
    }

    fn token(&self) -> String {
        self.token.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(self.token())
    }

    // ========== Conversations ==========

    /// Create a new conversation for an instrument.
    pub async fn create_conversation(&self, instrument: &str) -> ClientResult<Conversation> {
        let url = self.url("/api/conversations");
        info!("creating conversation for {}", instrument);
        let response = self
            .authorized(self.client.post(&url))
            .json(&CreateConversationRequest {
                instrument: instrument.to_string(),
            })
            .send()
            .await?;

        handle_response(response).await
    }

    /// List the user's active conversations, optionally for one instrument.
    pub async fn list_conversations(&self, instrument: Option<&str>) -> ClientResult<Vec<Conversation>> {
        let url = match instrument {
            Some(instrument) => format!(
                "{}?instrument={}",
                self.url("/api/conversations"),
                urlencoding::encode(instrument)
            ),
            None => self.url("/api/conversations"),
        };
        let response = self.authorized(self.client.get(&url)).send().await?;

        handle_response(response).await
    }

    /// Get the message history of a conversation, oldest first.
    pub async fn get_messages(&self, conversation_id: &str) -> ClientResult<Vec<Message>> {
        let url = self.url(&format!("/api/conversations/{}/messages", conversation_id));
        debug!("loading history for {}", conversation_id);
        let response = self.authorized(self.client.get(&url)).send().await?;

        handle_response(response).await
    }

    /// Remove a conversation.
    pub async fn remove_conversation(&self, conversation_id: &str) -> ClientResult<()> {
        let url = self.url(&format!("/api/conversations/{}", conversation_id));
        let response = self.authorized(self.client.delete(&url)).send().await?;

        ensure_success(response).await.map(|_| ())
    }

    // ========== Tools ==========

    /// Run a backtest directly; returns the card and the model-facing summary.
    pub async fn run_backtest(&self, request: &BacktestRequest) -> ClientResult<BacktestResponse> {
        let url = self.url("/api/backtest");
        info!("running backtest on {}", request.instrument);
        let response = self
            .authorized(self.client.post(&url))
            .json(request)
            .send()
            .await?;

        handle_response(response).await
    }

    // ========== Streaming ==========

    /// Send a user message and stream the assistant turn.
    pub async fn stream_chat(
        &self,
        request: &ChatRequest,
        on_event: EventSink<'_>,
        cancel: &CancellationToken,
    ) -> ClientResult<StreamOutcome> {
        let url = self.url("/api/chat/stream");
        self.stream.run(&url, request, &self.token(), on_event, cancel).await
    }

    /// Resume an assistant turn after a confirmed tool ran.
    pub async fn continue_chat(
        &self,
        request: &ContinueRequest,
        on_event: EventSink<'_>,
        cancel: &CancellationToken,
    ) -> ClientResult<StreamOutcome> {
        let url = self.url("/api/chat/continue");
        self.stream.run(&url, request, &self.token(), on_event, cancel).await
    }
}

/// Map a non-success response to an error carrying status and body text.
pub(crate) async fn ensure_success(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(ClientError::SessionExpired);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Api { status, body })
}

/// Check status, then parse the JSON body.
async fn handle_response<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    let response = ensure_success(response).await?;
    response
        .json()
        .await
        .map_err(|e| ClientError::ParseError(e.to_string()))
}
