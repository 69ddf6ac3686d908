//! Frame validation and dispatch.
//!
//! Turns a raw [`Frame`] into a typed [`StreamEvent`] or a reason to skip it.
//! Skips are per frame; nothing here can end a stream.

use barb_protocol::{
    DataBlock, DonePayload, ErrorPayload, EventKind, PersistPayload, StreamEvent,
    TextDeltaPayload, TitleUpdatePayload, ToolEndPayload, ToolPendingConfirmationPayload,
    ToolStartPayload,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use super::decoder::Frame;

/// Why a frame was not dispatched.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("unknown event '{0}'")]
    UnknownEvent(String),

    #[error("invalid JSON in '{event}' payload: {source}")]
    InvalidJson {
        event: EventKind,
        source: serde_json::Error,
    },

    #[error("malformed '{event}' payload: {reason}")]
    Malformed { event: EventKind, reason: String },
}

impl FrameError {
    /// Known event with a payload that failed parsing or its shape check.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, Self::UnknownEvent(_))
    }
}

/// Counters for one stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub frames: usize,
    pub dispatched: usize,
    pub malformed: usize,
    pub unknown: usize,
}

impl DispatchStats {
    pub fn record(&mut self, result: &Result<StreamEvent, FrameError>) {
        self.frames += 1;
        match result {
            Ok(_) => self.dispatched += 1,
            Err(err) if err.is_malformed() => self.malformed += 1,
            Err(_) => self.unknown += 1,
        }
    }
}

/// Validate one frame against its event's shape contract.
pub fn decode_event(frame: &Frame) -> Result<StreamEvent, FrameError> {
    let kind = EventKind::from_name(&frame.event)
        .ok_or_else(|| FrameError::UnknownEvent(frame.event.clone()))?;

    let value: Value = serde_json::from_str(&frame.data)
        .map_err(|source| FrameError::InvalidJson { event: kind, source })?;

    match kind {
        EventKind::ToolStart => typed::<ToolStartPayload>(kind, value).map(StreamEvent::ToolStart),
        EventKind::ToolEnd => typed::<ToolEndPayload>(kind, value).map(StreamEvent::ToolEnd),
        EventKind::ToolPendingConfirmation => {
            typed::<ToolPendingConfirmationPayload>(kind, value).map(StreamEvent::ToolPendingConfirmation)
        }
        EventKind::DataBlock => {
            check_data_block(&value).map_err(|reason| FrameError::Malformed { event: kind, reason })?;
            typed::<DataBlock>(kind, value).map(StreamEvent::DataBlock)
        }
        EventKind::TextDelta => typed::<TextDeltaPayload>(kind, value).map(StreamEvent::TextDelta),
        EventKind::Done => typed::<DonePayload>(kind, value).map(StreamEvent::Done),
        EventKind::Persist => typed::<PersistPayload>(kind, value).map(StreamEvent::Persist),
        EventKind::TitleUpdate => typed::<TitleUpdatePayload>(kind, value).map(StreamEvent::TitleUpdate),
        EventKind::Error => typed::<ErrorPayload>(kind, value).map(StreamEvent::Error),
    }
}

fn typed<T: DeserializeOwned>(event: EventKind, value: Value) -> Result<T, FrameError> {
    serde_json::from_value(value).map_err(|err| FrameError::Malformed {
        event,
        reason: err.to_string(),
    })
}

/// A data block must be an object carrying typed `blocks` or a raw `result`.
fn check_data_block(value: &Value) -> Result<(), String> {
    let obj = value.as_object().ok_or("payload is not an object")?;
    let has_blocks = obj.get("blocks").is_some_and(Value::is_array);
    if has_blocks || obj.contains_key("result") {
        Ok(())
    } else {
        Err("expected a 'blocks' array or a 'result' field".to_string())
    }
}
