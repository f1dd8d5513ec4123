// Copyright 2026 The Suture Project
// SPDX-License-Identifier: Apache-2.0

// Intelligent streaming core.
//
// Interprets upstream SSE responses, forwards frames to the client, detects
// premature termination, and bridges resumed attempts into a single
// client-visible stream. Channels that reliably terminate their own streams
// use the pass-through path instead.

mod dialect;
mod handler;
mod passthrough;
mod resume;
mod sse;


pub use dialect::{contains_done_token, ends_with_sentence_punct, strip_done_tokens, Dialect};
pub use handler::{
    retry_error_envelope, ClientSink, RetryRequester, SessionError, StreamHandler, StreamStart,
};
pub use passthrough::{pass_through, MAX_FORWARD_CHUNK};
pub use resume::{build_resume_body, JsonMap};
pub use sse::{data_payload, SseLineReader, DATA_PREFIX, DONE_PAYLOAD};

use std::time::Duration;

/// Sentinel substrings whose presence marks a response as finished.
pub const DEFAULT_DONE_TOKENS: &[&str] = &["[done]", "[DONE]", "done", "DONE"];

/// Tuning for one streaming session. Immutable once the session starts.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Extra attempts allowed after the first.
    pub max_retries: u32,
    /// Fixed wait before each resume attempt.
    pub retry_delay: Duration,
    /// Whether consecutive punctuation-terminated resumed attempts may end
    /// the session.
    pub punctuation_heuristic: bool,
    /// Completion markers, checked case-sensitively.
    pub done_tokens: Vec<String>,
}

impl StreamConfig {
    /// Per-channel defaults.
    ///
    /// Gemini habitually drops its completion token and gets the deepest
    /// retry budget; OpenAI and Anthropic carry reliable native terminators.
    pub fn for_dialect(dialect: Dialect) -> Self {
        let done_tokens = || DEFAULT_DONE_TOKENS.iter().map(|t| t.to_string()).collect();
        match dialect {
            Dialect::Gemini => Self {
                max_retries: 5,
                retry_delay: Duration::from_secs(1),
                punctuation_heuristic: true,
                done_tokens: done_tokens(),
            },
            Dialect::OpenAi | Dialect::Anthropic => Self {
                max_retries: 2,
                retry_delay: Duration::from_secs(1),
                punctuation_heuristic: false,
                done_tokens: Vec::new(),
            },
            Dialect::Generic => Self {
                max_retries: 3,
                retry_delay: Duration::from_secs(1),
                punctuation_heuristic: true,
                done_tokens: done_tokens(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
