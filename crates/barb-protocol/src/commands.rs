//! Request and response bodies of the REST and streaming endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::blocks::DataBlock;

/// Body of `POST /api/chat/stream`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub message: String,
}

/// Body of `POST /api/chat/continue`, sent after the user confirmed a tool
/// invocation and the tool ran client-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinueRequest {
    pub conversation_id: String,
    pub tool_use_id: String,
    pub tool_input: Value,
    pub model_response: String,
    pub data_card: DataBlock,
}

/// Body of `POST /api/conversations`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateConversationRequest {
    pub instrument: String,
}

/// Body of `POST /api/backtest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRequest {
    pub instrument: String,
    pub strategy: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    #[serde(default = "default_backtest_title")]
    pub title: String,
}

fn default_backtest_title() -> String {
    "Backtest".to_string()
}

impl BacktestRequest {
    /// Build from a confirmed tool input. The input's own `instrument` wins
    /// over the session default; `strategy` is required.
    pub fn from_tool_input(instrument: &str, input: &Value) -> serde_json::Result<Self> {
        let mut value = input.clone();
        if let Some(obj) = value.as_object_mut() {
            obj.entry("instrument")
                .or_insert_with(|| Value::String(instrument.to_string()));
        }
        serde_json::from_value(value)
    }
}

/// Response of `POST /api/backtest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResponse {
    /// Text summary handed back to the model in the continuation request.
    pub model_response: String,
    /// The card shown to the user.
    pub card: DataBlock,
}
