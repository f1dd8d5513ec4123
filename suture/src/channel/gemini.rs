// Copyright 2026 The Suture Project
// SPDX-License-Identifier: Apache-2.0

// Gemini channel.
//
// Native Gemini wants the API key as a `?key=` query parameter; requests on
// the OpenAI-compatibility surface take a Bearer token instead. Streaming
// requests additionally get a system instruction injected that obliges the
// model to close its response with the `[done]` token, which is what the
// stream interpreter keys its completion detection on.

use std::sync::Arc;

use bytes::Bytes;
use http::HeaderMap;
use serde_json::{json, Map, Value};

use super::{append_query_param, set_bearer_auth, wants_stream, ChannelProxy};
use crate::keys::ApiKey;
use crate::stream::Dialect;
use crate::upstream::{HttpSender, UpstreamRequest};

/// Path marker of Gemini's OpenAI-compatibility surface.
const OPENAI_COMPAT_PATH: &str = "v1beta/openai";

/// The sentence every outbound Gemini stream request must carry.
pub const COMPLETION_CONTRACT: &str = "IMPORTANT: At the very end of your entire response, \
you must write the token [done] to signal completion. This is a mandatory technical requirement.";

pub struct GeminiChannel {
    stream_client: Arc<dyn HttpSender>,
}

impl GeminiChannel {
    pub fn new(stream_client: Arc<dyn HttpSender>) -> Self {
        Self { stream_client }
    }
}

impl ChannelProxy for GeminiChannel {
    fn dialect(&self) -> Dialect {
        Dialect::Gemini
    }

    fn modify_request(&self, request: &mut UpstreamRequest, api_key: &ApiKey) {
        if request.url.contains(OPENAI_COMPAT_PATH) {
            set_bearer_auth(request, api_key);
        } else {
            append_query_param(&mut request.url, "key", api_key.expose());
        }
    }

    fn is_stream_request(
        &self,
        path: &str,
        headers: &HeaderMap,
        query: Option<&str>,
        body: &[u8],
    ) -> bool {
        path.ends_with(":streamGenerateContent") || wants_stream(headers, query, body)
    }

    fn reshape_stream_req_body(&self, request: &mut UpstreamRequest) {
        let Ok(mut body) = serde_json::from_slice::<Map<String, Value>>(&request.body) else {
            tracing::warn!("gemini stream body is not a JSON object, leaving it untouched");
            return;
        };

        inject_completion_contract(&mut body);

        match serde_json::to_vec(&body) {
            Ok(bytes) => request.body = Bytes::from(bytes),
            Err(err) => {
                tracing::warn!(error = %err, "failed to re-serialize gemini stream body");
            }
        }
    }

    fn stream_client(&self) -> Arc<dyn HttpSender> {
        self.stream_client.clone()
    }
}

/// Ensure the body carries a system instruction with the completion contract.
///
/// The snake_case `system_instruction` spelling is folded into the canonical
/// camelCase field first, its parts kept ahead of any existing camelCase
/// parts. The contract is always appended, never deduplicated, so a resume
/// request reshaped twice simply states the requirement twice.
pub fn inject_completion_contract(body: &mut Map<String, Value>) {
    let marker = json!({ "text": COMPLETION_CONTRACT });

    if let Some(snake) = body.remove("system_instruction") {
        let mut camel = match body.remove("systemInstruction") {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        let camel_parts = match camel.remove("parts") {
            Some(Value::Array(parts)) => parts,
            _ => Vec::new(),
        };
        let mut merged = match snake {
            Value::Object(mut map) => match map.remove("parts") {
                Some(Value::Array(parts)) => parts,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };
        merged.extend(camel_parts);
        camel.insert("parts".to_string(), Value::Array(merged));
        body.insert("systemInstruction".to_string(), Value::Object(camel));
    }

    match body.get_mut("systemInstruction") {
        Some(Value::Object(instruction)) => match instruction.get_mut("parts") {
            Some(Value::Array(parts)) => parts.push(marker),
            _ => {
                instruction.insert("parts".to_string(), Value::Array(vec![marker]));
            }
        },
        _ => {
            body.insert("systemInstruction".to_string(), json!({ "parts": [marker] }));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
