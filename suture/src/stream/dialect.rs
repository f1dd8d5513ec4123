// Copyright 2026 The Suture Project
// SPDX-License-Identifier: Apache-2.0

// Channel dialects.
//
// Each provider family frames streamed text differently. `Dialect` is a flat
// value with narrow accessors over dynamic JSON frames: where the text lives,
// what marks the stream finished, and how completion heuristics read the
// accumulated output. Gemini additionally gets its done-token scrubbed from
// frames before they reach the client.

use serde_json::Value;

/// Wire dialect of an upstream channel.
///
/// `Generic` covers unknown providers with OpenAI-ish conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    OpenAi,
    Gemini,
    Anthropic,
    Generic,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::OpenAi => "openai",
            Dialect::Gemini => "gemini",
            Dialect::Anthropic => "anthropic",
            Dialect::Generic => "generic",
        }
    }

    /// The text delta carried by a streamed frame, if any.
    pub fn extract_text<'a>(&self, frame: &'a Value) -> Option<&'a str> {
        match self {
            Dialect::OpenAi => frame
                .get("choices")?
                .get(0)?
                .get("delta")?
                .get("content")?
                .as_str(),
            Dialect::Gemini => frame
                .get("candidates")?
                .get(0)?
                .get("content")?
                .get("parts")?
                .get(0)?
                .get("text")?
                .as_str(),
            Dialect::Anthropic => {
                if frame.get("type")?.as_str()? != "content_block_delta" {
                    return None;
                }
                frame.get("delta")?.get("text")?.as_str()
            }
            Dialect::Generic => frame
                .get("text")
                .and_then(Value::as_str)
                .or_else(|| frame.get("content").and_then(Value::as_str)),
        }
    }

    /// Whether this frame, in the context of everything streamed so far,
    /// marks the response as finished.
    pub fn is_terminal_frame(&self, frame: &Value, accumulated: &str, done_tokens: &[String]) -> bool {
        match self {
            Dialect::OpenAi => matches!(
                frame
                    .get("choices")
                    .and_then(|c| c.get(0))
                    .and_then(|c| c.get("finish_reason"))
                    .and_then(Value::as_str),
                Some("stop") | Some("length")
            ),
            Dialect::Gemini => {
                contains_done_token(accumulated, done_tokens)
                    || frame
                        .get("metadata")
                        .and_then(|m| m.get("finishReason"))
                        .and_then(Value::as_str)
                        == Some("STOP")
            }
            Dialect::Anthropic => {
                frame.get("type").and_then(Value::as_str) == Some("message_stop")
            }
            Dialect::Generic => {
                contains_done_token(accumulated, done_tokens)
                    || matches!(
                        frame.get("finish_reason").and_then(Value::as_str),
                        Some("stop") | Some("length")
                    )
            }
        }
    }

    /// Whether the accumulated text looks finished even though no explicit
    /// terminal signal arrived. Gemini is held to its done-token contract;
    /// everything else settles for a sentence ending of plausible length.
    pub fn is_content_complete(&self, text: &str, done_tokens: &[String]) -> bool {
        if text.is_empty() {
            return false;
        }
        match self {
            Dialect::Gemini => contains_done_token(text, done_tokens),
            _ => ends_with_sentence_punct(text) && text.len() > 50,
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Done-token handling
// ---------------------------------------------------------------------------

/// Case-sensitive substring check against each configured pattern.
pub fn contains_done_token(text: &str, done_tokens: &[String]) -> bool {
    done_tokens.iter().any(|t| !t.is_empty() && text.contains(t.as_str()))
}

/// Remove a trailing done-token and any whitespace left in front of it.
///
/// Returns `None` when the text carries no trailing token. Tokens in the
/// middle of the text are left alone, as is a token split across frames
/// (each frame is considered on its own).
pub fn strip_done_tokens(text: &str, done_tokens: &[String]) -> Option<String> {
    for token in done_tokens {
        if !token.is_empty() && text.ends_with(token.as_str()) {
            let stripped = &text[..text.len() - token.len()];
            return Some(stripped.trim_end().to_string());
        }
    }
    None
}

/// Replace the text of the first candidate part in a Gemini frame.
pub fn rewrite_gemini_text(frame: &mut Value, text: &str) {
    let slot = frame
        .get_mut("candidates")
        .and_then(|c| c.get_mut(0))
        .and_then(|c| c.get_mut("content"))
        .and_then(|c| c.get_mut("parts"))
        .and_then(|p| p.get_mut(0))
        .and_then(|p| p.get_mut("text"));
    if let Some(slot) = slot {
        *slot = Value::String(text.to_string());
    }
}

// ---------------------------------------------------------------------------
// Sentence-ending heuristic
// ---------------------------------------------------------------------------

const SENTENCE_PUNCT: &[char] = &[
    '.', '!', '?', '…', '。', '！', '？', '"', '\'', '\u{201c}', '\u{201d}', '\u{2018}',
    '\u{2019}',
];

/// Whether the trimmed text ends on sentence punctuation.
pub fn ends_with_sentence_punct(text: &str) -> bool {
    match text.trim().chars().last() {
        Some(c) => SENTENCE_PUNCT.contains(&c),
        None => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
