//! Client error types.

use reqwest::StatusCode;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur while talking to the Barb server.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed before a response arrived, or the body broke off.
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("API error {}: {body}", status.as_u16())]
    Api { status: StatusCode, body: String },

    /// The bearer token was rejected.
    #[error("Session expired")]
    SessionExpired,

    /// Failed to parse a response body.
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// A confirmed tool input could not be turned into a request.
    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl ClientError {
    /// HTTP status of an API error, if this is one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::SessionExpired => Some(StatusCode::UNAUTHORIZED),
            Self::RequestFailed(err) => err.status(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_message() {
        let err = ClientError::Api {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: "Service temporarily unavailable".to_string(),
        };
        assert_eq!(err.to_string(), "API error 503: Service temporarily unavailable");
        assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[test]
    fn test_session_expired_message() {
        assert_eq!(ClientError::SessionExpired.to_string(), "Session expired");
        assert_eq!(ClientError::SessionExpired.status(), Some(StatusCode::UNAUTHORIZED));
    }
}
