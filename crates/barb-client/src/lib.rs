//! Barb chat client.
//!
//! Talks to the Barb agent server: REST calls for conversations, history and
//! backtests, and the event-stream chat endpoints that deliver an assistant
//! turn as it is produced.
//!
//! - [`api`]: HTTP client for every server endpoint
//! - [`stream`]: frame decoding, event validation and the streaming request loop
//! - [`session`]: the chat session controller with optimistic updates
//! - [`config`]: layered configuration

pub mod api;
pub mod config;
pub mod error;
pub mod session;
pub mod stream;

pub use api::ApiClient;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use session::{
    ChatBackend, ChatSession, HistoryCache, PendingTool, SessionError, SessionObserver,
    SessionState,
};
pub use stream::{StreamClient, StreamOutcome};
