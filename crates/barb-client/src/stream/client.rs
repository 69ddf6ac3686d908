//! One request/stream cycle over HTTP.

use barb_protocol::StreamEvent;
use futures::StreamExt;
use log::{debug, info, warn};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::decoder::FrameDecoder;
use super::dispatch::{DispatchStats, decode_event};
use crate::api::ensure_success;
use crate::error::ClientResult;

/// Receives every validated event of a stream, in arrival order.
pub type EventSink<'a> = &'a mut (dyn FnMut(StreamEvent) + Send);

/// How a stream run ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The server closed the body. A `done` event is not implied.
    Completed(DispatchStats),
    /// The caller's token fired; no event was delivered after that point.
    Cancelled,
}

impl StreamOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Issues a streaming POST and feeds the body through decoder and dispatcher.
#[derive(Debug, Clone)]
pub struct StreamClient {
    http: reqwest::Client,
}

impl StreamClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Run one stream to completion.
    ///
    /// A non-success status fails before any event is delivered. Malformed
    /// frames are skipped and counted. Cancellation is observed while
    /// connecting, while waiting for each chunk, and before each dispatch.
    pub async fn run<B>(
        &self,
        url: &str,
        body: &B,
        token: &str,
        on_event: EventSink<'_>,
        cancel: &CancellationToken,
    ) -> ClientResult<StreamOutcome>
    where
        B: Serialize + ?Sized + Sync,
    {
        info!("opening event stream {}", url);

        let request = self
            .http
            .post(url)
            .bearer_auth(token)
            .header("Accept", "text/event-stream")
            .json(body)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("stream to {} cancelled while connecting", url);
                return Ok(StreamOutcome::Cancelled);
            }
            response = request => response?,
        };
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("stream to {} cancelled while reading the error body", url);
                return Ok(StreamOutcome::Cancelled);
            }
            response = ensure_success(response) => response?,
        };

        let mut body = response.bytes_stream();
        let mut decoder = FrameDecoder::new();
        let mut stats = DispatchStats::default();

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("stream to {} cancelled after {} frames", url, stats.frames);
                    return Ok(StreamOutcome::Cancelled);
                }
                chunk = body.next() => chunk,
            };
            let Some(chunk) = chunk else {
                break;
            };
            let chunk = chunk?;

            for frame in decoder.feed(&chunk) {
                if cancel.is_cancelled() {
                    return Ok(StreamOutcome::Cancelled);
                }
                let result = decode_event(&frame);
                stats.record(&result);
                match result {
                    Ok(event) => on_event(event),
                    Err(err) if err.is_malformed() => warn!("skipping frame: {}", err),
                    Err(err) => debug!("skipping frame: {}", err),
                }
            }
        }

        let discarded = decoder.finish();
        if discarded > 0 {
            debug!("discarding {} unterminated bytes at end of stream", discarded);
        }
        info!(
            "event stream {} ended: {} frames, {} dispatched, {} malformed",
            url, stats.frames, stats.dispatched, stats.malformed
        );

        Ok(StreamOutcome::Completed(stats))
    }
}
