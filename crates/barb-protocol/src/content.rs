//! Splitting assistant content around positional data markers.
//!
//! Assistant prose refers to its attachments with `{{data:N}}` markers. A
//! renderer walks [`segments`] to interleave text with the referenced blocks.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::blocks::DataBlock;
use crate::messages::Message;

static DATA_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{data:(\d+)\}\}").expect("Invalid regex pattern for data marker"));

/// The marker text that places `data[index]` inside message content.
pub fn data_marker(index: usize) -> String {
    format!("{{{{data:{index}}}}}")
}

/// A renderable piece of a message.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentSegment<'a> {
    Text(&'a str),
    Data { block: &'a DataBlock, index: usize },
}

/// Split a message into text and data segments.
///
/// Markers win: when at least one marker resolves to a block, blocks that no
/// marker references are not rendered. When none resolves (historical
/// messages stored before markers existed), every block follows the text.
pub fn segments(msg: &Message) -> Vec<ContentSegment<'_>> {
    let blocks = msg.blocks();
    if blocks.is_empty() {
        return vec![ContentSegment::Text(&msg.content)];
    }

    let mut out = Vec::new();
    let mut last = 0;

    for caps in DATA_MARKER.captures_iter(&msg.content) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        push_text(&mut out, &msg.content[last..whole.start()]);

        let block = caps[1]
            .parse::<usize>()
            .ok()
            .and_then(|index| blocks.get(index).map(|block| (index, block)));
        if let Some((index, block)) = block {
            out.push(ContentSegment::Data { block, index });
        }
        last = whole.end();
    }
    push_text(&mut out, &msg.content[last..]);

    let has_data = out.iter().any(|s| matches!(s, ContentSegment::Data { .. }));
    if !has_data {
        append_unmarked(&mut out, blocks);
    }

    out
}

fn push_text<'a>(out: &mut Vec<ContentSegment<'a>>, text: &'a str) {
    if !text.trim().is_empty() {
        out.push(ContentSegment::Text(text));
    }
}

/// Legacy convention: content without markers shows all blocks after the text.
fn append_unmarked<'a>(out: &mut Vec<ContentSegment<'a>>, blocks: &'a [DataBlock]) {
    out.extend(
        blocks
            .iter()
            .enumerate()
            .map(|(index, block)| ContentSegment::Data { block, index }),
    );
}
