//! Incremental event-stream frame decoder.
//!
//! Frames are blocks of lines terminated by a blank line (`\n\n`). Chunks from
//! the network may split a frame anywhere, including inside a multi-byte
//! character, so the decoder buffers raw bytes and only decodes text once a
//! whole frame is available.

const FRAME_DELIMITER: &[u8] = b"\n\n";
const EVENT_PREFIX: &str = "event: ";
const DATA_PREFIX: &str = "data: ";

/// One raw frame: an event name and its unparsed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub event: String,
    pub data: String,
}

/// Buffers chunks and yields complete frames.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Buffer offset already known to hold no delimiter start.
    scan_from: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every frame it completed, in order.
    ///
    /// Blocks without an `event: ` or a `data: ` line are dropped here.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut consumed = 0;
        let mut scan = self.scan_from;
        while let Some(offset) = find_delimiter(&self.buffer[scan..]) {
            let end = scan + offset;
            let block = &self.buffer[consumed..end];
            if let Some(frame) = parse_block(block) {
                frames.push(frame);
            }
            consumed = end + FRAME_DELIMITER.len();
            scan = consumed;
        }
        self.buffer.drain(..consumed);
        // The last byte may be the first half of a delimiter split across chunks.
        self.scan_from = self.buffer.len().saturating_sub(FRAME_DELIMITER.len() - 1);

        frames
    }

    /// Bytes received but not yet terminated by a blank line.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// End of input. Any unterminated remainder is discarded, never emitted.
    pub fn finish(mut self) -> usize {
        let discarded = self.buffer.len();
        self.buffer.clear();
        self.scan_from = 0;
        discarded
    }
}

fn find_delimiter(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(FRAME_DELIMITER.len())
        .position(|window| window == FRAME_DELIMITER)
}

fn parse_block(block: &[u8]) -> Option<Frame> {
    // A complete block never ends inside a UTF-8 sequence because `\n` is
    // never a continuation byte; lossy decoding only affects invalid input.
    let text = String::from_utf8_lossy(block);

    let mut event: Option<String> = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if let Some(name) = line.strip_prefix(EVENT_PREFIX) {
            event = Some(name.to_string());
        } else if let Some(data) = line.strip_prefix(DATA_PREFIX) {
            data_lines.push(data);
        }
    }

    let event = event.filter(|name| !name.is_empty())?;
    let data = data_lines.join("\n");
    if data.is_empty() {
        return None;
    }

    Some(Frame { event, data })
}
