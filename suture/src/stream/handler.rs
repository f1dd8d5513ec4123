// Copyright 2026 The Suture Project
// SPDX-License-Identifier: Apache-2.0

// Stream interpreter and retry controller.
//
// A `StreamHandler` drives one full streaming session: it interprets SSE
// lines from the current upstream attempt, forwards them to the client sink,
// accumulates the text the client has seen, and decides after every attempt
// whether the stream ended cleanly or must be resumed with a fresh upstream
// request built around that accumulated text.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use super::dialect::{self, Dialect};
use super::sse::{self, SseLineReader};
use super::StreamConfig;
use crate::upstream::{ByteStream, UpstreamError};

/// Consecutive punctuation-terminated resumed attempts that imply completion.
const PUNCT_STREAK_COMPLETE: u32 = 3;

// ---------------------------------------------------------------------------
// Client sink
// ---------------------------------------------------------------------------

/// Signal sent to the HTTP layer before the first body byte, so the response
/// status can still be chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStart {
    /// Bytes are flowing; respond 200 with SSE headers.
    Streaming,
    /// The retry budget ran out before anything was written; respond 504.
    RetryLimitExceeded { max_retries: u32 },
}

/// Downstream writer owned by one session.
///
/// Wraps the body channel plus the one-shot status signal. The first write
/// commits the response to streaming mode; each written chunk is flushed to
/// the client as its own body frame.
pub struct ClientSink {
    tx: mpsc::Sender<Bytes>,
    start: Option<oneshot::Sender<StreamStart>>,
    wrote: bool,
}

impl ClientSink {
    pub fn new(tx: mpsc::Sender<Bytes>, start: oneshot::Sender<StreamStart>) -> Self {
        Self {
            tx,
            start: Some(start),
            wrote: false,
        }
    }

    /// Forward one chunk to the client. Failure means the client is gone.
    pub async fn write(&mut self, bytes: Bytes) -> Result<(), SessionError> {
        self.commit(StreamStart::Streaming);
        self.tx
            .send(bytes)
            .await
            .map_err(|_| SessionError::ClientGone)?;
        self.wrote = true;
        Ok(())
    }

    /// Forward one SSE line followed by the blank separator line.
    pub async fn write_line(&mut self, line: &str) -> Result<(), SessionError> {
        self.write(Bytes::from(format!("{line}\n\n"))).await
    }

    pub fn has_written(&self) -> bool {
        self.wrote
    }

    /// Resolve the start signal. Later calls are no-ops.
    pub fn commit(&mut self, start: StreamStart) {
        if let Some(sender) = self.start.take() {
            let _ = sender.send(start);
        }
    }

    /// Completes once the client side of the channel is gone.
    pub async fn closed(&self) {
        self.tx.closed().await;
    }
}

// ---------------------------------------------------------------------------
// Retry seam
// ---------------------------------------------------------------------------

/// Builds the next upstream attempt for a session that has to resume.
///
/// Implemented by the engine and injected here, so the streaming core stays
/// free of HTTP-client, URL, and key-selection concerns.
#[async_trait]
pub trait RetryRequester: Send + Sync {
    async fn resume(&self, accumulated_text: &str) -> Result<ByteStream, SessionError>;
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Fatal session outcomes. Upstream read errors are not here on purpose:
/// they trigger a resume instead of ending the session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("client disconnected during streaming")]
    ClientGone,

    #[error("retry limit ({0}) exceeded after stream interruption")]
    RetryLimitExceeded(u32),

    #[error("failed to rebuild request body for resume: {0}")]
    ResumeBody(String),

    #[error("key selection for resume failed: {0}")]
    KeySelection(#[from] crate::keys::KeyError),

    #[error("resume request failed: {0}")]
    ResumeRequest(#[from] UpstreamError),
}

/// The 504 body sent when the retry budget runs out.
pub fn retry_error_envelope(max_retries: u32) -> Value {
    serde_json::json!({
        "error": {
            "code": 504,
            "status": "DEADLINE_EXCEEDED",
            "message": format!("Retry limit ({max_retries}) exceeded after stream interruption"),
        }
    })
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptOutcome {
    CleanExit,
    Resume,
}

/// State that survives across attempts within one session.
#[derive(Debug, Default)]
struct SessionState {
    /// Everything the client has seen, across all attempts. Append-only.
    /// For Gemini this is the post-strip text, so resume prompts never ask
    /// the model to continue past its own done-token.
    accumulated_text: String,
    /// Consecutive resumed attempts that ended on sentence punctuation.
    resume_punct_streak: u32,
}

// ---------------------------------------------------------------------------
// Stream handler
// ---------------------------------------------------------------------------

pub struct StreamHandler {
    dialect: Dialect,
    config: StreamConfig,
}

impl StreamHandler {
    pub fn new(dialect: Dialect, config: StreamConfig) -> Self {
        Self { dialect, config }
    }

    /// Drive a full session over `upstream`, resuming through `retry` while
    /// the budget allows.
    pub async fn handle(
        &self,
        upstream: ByteStream,
        sink: &mut ClientSink,
        retry: &dyn RetryRequester,
    ) -> Result<(), SessionError> {
        let mut state = SessionState::default();
        let mut retries: u32 = 0;
        let mut reader = SseLineReader::new(upstream);

        loop {
            tracing::debug!(
                attempt = retries + 1,
                allowed = self.config.max_retries + 1,
                channel = %self.dialect,
                "stream attempt starting"
            );

            match self.interpret_attempt(&mut reader, sink, &mut state, retries).await? {
                AttemptOutcome::CleanExit => {
                    tracing::debug!(
                        retries,
                        forwarded_chars = state.accumulated_text.len(),
                        "stream completed"
                    );
                    return Ok(());
                }
                AttemptOutcome::Resume => {}
            }

            if retries >= self.config.max_retries {
                return Err(self.write_retry_error(sink).await);
            }

            retries += 1;
            tracing::info!(
                retry = retries,
                max_retries = self.config.max_retries,
                "resuming interrupted stream"
            );

            // Release the exhausted attempt before waiting out the delay.
            drop(reader);
            tokio::time::sleep(self.config.retry_delay).await;

            let next = retry.resume(&state.accumulated_text).await?;
            reader = SseLineReader::new(next);
        }
    }

    /// Interpret one upstream attempt to its end.
    async fn interpret_attempt(
        &self,
        reader: &mut SseLineReader,
        sink: &mut ClientSink,
        state: &mut SessionState,
        retries: u32,
    ) -> Result<AttemptOutcome, SessionError> {
        // The last text chunk of this attempt, for the punctuation heuristic.
        let mut last_chunk = String::new();

        loop {
            let next = tokio::select! {
                next = reader.next_line() => next,
                _ = sink.closed() => {
                    tracing::debug!("client went away while awaiting upstream");
                    return Err(SessionError::ClientGone);
                }
            };

            let line = match next {
                Ok(Some(line)) => line,
                Ok(None) => return Ok(self.end_of_attempt(state, &last_chunk, retries)),
                Err(err) => {
                    // Read errors are treated as transient truncation.
                    tracing::warn!(error = %err, "upstream read error, stream will be resumed");
                    return Ok(AttemptOutcome::Resume);
                }
            };

            if line.is_empty() {
                continue;
            }

            let Some(payload) = sse::data_payload(&line) else {
                // Comments, event names, keep-alives: forward untouched.
                sink.write_line(&line).await?;
                continue;
            };

            if payload == sse::DONE_PAYLOAD {
                return Ok(AttemptOutcome::CleanExit);
            }

            let mut frame: Value = match serde_json::from_str(payload) {
                Ok(frame) => frame,
                Err(err) => {
                    tracing::debug!(error = %err, "undecodable data payload, forwarding verbatim");
                    sink.write_line(&line).await?;
                    continue;
                }
            };

            let raw_chunk = self
                .dialect
                .extract_text(&frame)
                .unwrap_or_default()
                .to_string();

            let out_line = if raw_chunk.is_empty() {
                line
            } else {
                let stripped = match self.dialect {
                    Dialect::Gemini => {
                        dialect::strip_done_tokens(&raw_chunk, &self.config.done_tokens)
                    }
                    _ => None,
                };
                let chunk = stripped.as_deref().unwrap_or(&raw_chunk);
                if !chunk.is_empty() {
                    last_chunk = chunk.to_string();
                    state.accumulated_text.push_str(chunk);
                }
                match stripped {
                    Some(clean) => {
                        dialect::rewrite_gemini_text(&mut frame, &clean);
                        format!("{}{}", sse::DATA_PREFIX, frame)
                    }
                    None => line,
                }
            };

            sink.write_line(&out_line).await?;

            if self.is_terminal(&frame, &raw_chunk, &state.accumulated_text) {
                return Ok(AttemptOutcome::CleanExit);
            }
        }
    }

    fn is_terminal(&self, frame: &Value, raw_chunk: &str, accumulated: &str) -> bool {
        // A trailing done-token is scrubbed before it is accumulated or
        // forwarded, so the raw chunk has to be inspected here for the
        // completion signal to register.
        if self.dialect == Dialect::Gemini
            && dialect::contains_done_token(raw_chunk, &self.config.done_tokens)
        {
            return true;
        }
        self.dialect
            .is_terminal_frame(frame, accumulated, &self.config.done_tokens)
    }

    /// EOF without an explicit terminal signal: decide between declaring the
    /// stream done and asking for a resume.
    fn end_of_attempt(
        &self,
        state: &mut SessionState,
        last_chunk: &str,
        retries: u32,
    ) -> AttemptOutcome {
        if self.config.punctuation_heuristic
            && retries > 0
            && dialect::ends_with_sentence_punct(last_chunk)
        {
            state.resume_punct_streak += 1;
            tracing::debug!(
                streak = state.resume_punct_streak,
                "resumed attempt ended on sentence punctuation"
            );
            if state.resume_punct_streak >= PUNCT_STREAK_COMPLETE {
                tracing::info!("stream declared complete by punctuation heuristic");
                return AttemptOutcome::CleanExit;
            }
        } else {
            state.resume_punct_streak = 0;
        }

        if self
            .dialect
            .is_content_complete(&state.accumulated_text, &self.config.done_tokens)
        {
            tracing::info!("stream declared complete by content analysis");
            return AttemptOutcome::CleanExit;
        }

        AttemptOutcome::Resume
    }

    /// Deliver the retry-limit notice and produce the sentinel error.
    ///
    /// With nothing written yet the HTTP layer can still answer with a real
    /// 504; otherwise the envelope goes out as a final data frame.
    async fn write_retry_error(&self, sink: &mut ClientSink) -> SessionError {
        let max_retries = self.config.max_retries;
        if sink.has_written() {
            let frame = format!("{}{}", sse::DATA_PREFIX, retry_error_envelope(max_retries));
            if sink.write_line(&frame).await.is_err() {
                tracing::debug!("client was gone before the retry-limit notice could be sent");
            }
        } else {
            sink.commit(StreamStart::RetryLimitExceeded { max_retries });
        }
        SessionError::RetryLimitExceeded(max_retries)
    }
}
