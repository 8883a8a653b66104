// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Native chunk to public line transformation
//!
//! Reasoning chunks are re-tagged as text and each contiguous run of them is
//! wrapped in exactly one pair of delimiter lines. Everything else passes
//! through in order, one line per chunk.

use serde_json::Value;

use super::wire::{DataChunk, PartTag};

/// Opens a reasoning run in the client's text stream
pub const REASONING_OPEN: &str = "<div class=\"__thought__\">";
/// Closes a reasoning run
pub const REASONING_CLOSE: &str = "</div>\n";

/// Two-state transformer: inside or outside a reasoning run
#[derive(Debug, Default)]
pub struct ChunkTransformer {
    inside_reasoning_run: bool,
}

impl ChunkTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inside_reasoning_run(&self) -> bool {
        self.inside_reasoning_run
    }

    /// Transform one native chunk into zero or more public lines
    pub fn push(&mut self, chunk: DataChunk) -> Vec<String> {
        let mut lines = Vec::with_capacity(2);
        match chunk.tag {
            PartTag::Reasoning => {
                if !self.inside_reasoning_run {
                    self.inside_reasoning_run = true;
                    lines.push(delimiter_line(REASONING_OPEN));
                }
                lines.push(render_line(PartTag::Text, &chunk.payload));
            }
            tag => {
                lines.extend(self.finish());
                lines.push(render_line(tag, &chunk.payload));
            }
        }
        lines
    }

    /// Close a reasoning run left open at end of stream
    pub fn finish(&mut self) -> Vec<String> {
        if self.inside_reasoning_run {
            self.inside_reasoning_run = false;
            vec![delimiter_line(REASONING_CLOSE)]
        } else {
            vec![]
        }
    }
}

fn delimiter_line(delimiter: &str) -> String {
    render_line(PartTag::Text, &Value::from(delimiter).to_string())
}

fn render_line(tag: PartTag, payload: &str) -> String {
    let payload = payload.strip_suffix('\n').unwrap_or(payload);
    format!("{}:{}\n", tag.code(), payload)
}
