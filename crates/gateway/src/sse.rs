// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Incremental parser for the provider's server-sent-event stream.
//!
//! Frames arrive as `data: <json>` lines; the stream ends with a literal
//! `data: [DONE]`. Chunk boundaries fall anywhere, so payloads are only
//! yielded once their terminating newline has arrived.

/// Accumulates byte chunks and yields complete `data:` payloads.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    done: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns the data payloads completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        if self.done {
            return Vec::new();
        }
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut payloads = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            let Some(data) = line.strip_prefix("data: ") else {
                // Comments, event names, and blank keep-alive lines.
                continue;
            };
            if data == "[DONE]" {
                self.done = true;
                break;
            }
            payloads.push(data.to_string());
        }
        payloads
    }

    /// True once the `[DONE]` terminator has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }
}
