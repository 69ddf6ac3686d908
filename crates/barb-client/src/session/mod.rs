//! Chat session controller and its collaborators.
//!
//! ```text
//! ChatSession ──► ChatBackend (ApiClient) ──► StreamClient
//!      │                                          │
//!      ├── HistoryCache (shared, bounded)         │
//!      └── AssistantTurn ◄──── StreamEvent ───────┘
//! ```

mod backend;
mod cache;
mod controller;
mod turn;
mod types;

pub use backend::ChatBackend;
pub use cache::HistoryCache;
pub use controller::ChatSession;
pub use types::{NoopObserver, PendingTool, SessionError, SessionObserver, SessionState};

/// Conversations kept in the history cache unless configured otherwise.
pub const DEFAULT_CACHE_CAPACITY: usize = 10;
