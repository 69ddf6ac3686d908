//! Barb server API client.
//!
//! Provides the REST collaborators (conversations, history, backtest) and the
//! two streaming chat endpoints over one shared HTTP client.

mod client;

pub use client::ApiClient;
pub(crate) use client::ensure_success;
