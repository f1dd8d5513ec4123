// Copyright 2026 The Suture Project
// SPDX-License-Identifier: Apache-2.0

// SSE line framing.
//
// Upstream SSE bodies arrive as arbitrary byte chunks. `SseLineReader`
// reassembles them into complete lines so the interpreter never acts on a
// partial line. A final unterminated line is still yielded at end of stream.

use crate::upstream::{ByteStream, UpstreamError};
use futures_util::StreamExt;

/// Prefix of an SSE data line, including the conventional space.
pub const DATA_PREFIX: &str = "data: ";

/// The OpenAI-style end-of-stream sentinel payload. Never JSON-parsed.
pub const DONE_PAYLOAD: &str = "[DONE]";

/// Line-oriented reader over an upstream byte stream.
pub struct SseLineReader {
    input: ByteStream,
    buffer: String,
    eof: bool,
}

impl SseLineReader {
    pub fn new(input: ByteStream) -> Self {
        Self {
            input,
            buffer: String::new(),
            eof: false,
        }
    }

    /// The next complete line with its terminator removed.
    ///
    /// `Ok(None)` means the stream is exhausted; an error is an upstream read
    /// failure and leaves the reader unusable.
    pub async fn next_line(&mut self) -> Result<Option<String>, UpstreamError> {
        loop {
            if let Some(pos) = self.buffer.find('\n') {
                let mut line: String = self.buffer.drain(..=pos).collect();
                line.pop();
                if line.ends_with('\r') {
                    line.pop();
                }
                return Ok(Some(line));
            }

            if self.eof {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(std::mem::take(&mut self.buffer)));
            }

            match self.input.next().await {
                Some(Ok(chunk)) => self.buffer.push_str(&String::from_utf8_lossy(&chunk)),
                Some(Err(err)) => return Err(err),
                None => self.eof = true,
            }
        }
    }
}

/// The payload of an SSE `data:` line, if this is one.
pub fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix(DATA_PREFIX)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
