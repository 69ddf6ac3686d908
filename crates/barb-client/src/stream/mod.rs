//! Event-stream transport.
//!
//! ```text
//! HTTP body chunks -> FrameDecoder -> Frame -> decode_event -> StreamEvent -> sink
//! ```

mod client;
mod decoder;
mod dispatch;

pub use client::{EventSink, StreamClient, StreamOutcome};
pub use decoder::{Frame, FrameDecoder};
pub use dispatch::{DispatchStats, FrameError, decode_event};
