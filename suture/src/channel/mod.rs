// Copyright 2026 The Suture Project
// SPDX-License-Identifier: Apache-2.0

// Channel proxies.
//
// A `ChannelProxy` knows one provider family's transport conventions: how to
// address the upstream, how to attach credentials, how to spot a streaming
// request, and any outbound body reshaping the provider needs. The engine
// holds one proxy per dialect, built once at startup.

pub mod anthropic;
pub mod gemini;
pub mod openai;

use std::sync::Arc;

use http::header::{HeaderValue, ACCEPT, AUTHORIZATION};
use http::HeaderMap;

use crate::config::Group;
use crate::keys::ApiKey;
use crate::stream::Dialect;
use crate::upstream::{HttpSender, UpstreamRequest};

/// Provider-specific transport behavior. Implementations are stateless
/// beyond their injected stream client and safe to share.
pub trait ChannelProxy: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Upstream URL for an inbound `/proxy/{group}/{path}` request.
    fn build_upstream_url(&self, path: &str, query: Option<&str>, group: &Group) -> String {
        join_upstream_url(&group.upstream, path, query)
    }

    /// Attach provider-native credentials to the outbound request.
    fn modify_request(&self, request: &mut UpstreamRequest, api_key: &ApiKey);

    /// Whether the inbound request asks for a streaming response.
    fn is_stream_request(
        &self,
        path: &str,
        headers: &HeaderMap,
        query: Option<&str>,
        body: &[u8],
    ) -> bool {
        let _ = path;
        wants_stream(headers, query, body)
    }

    /// Rewrite the outbound body of a streaming request. Most channels leave
    /// it untouched.
    fn reshape_stream_req_body(&self, request: &mut UpstreamRequest) {
        let _ = request;
    }

    /// HTTP client used for streaming calls.
    fn stream_client(&self) -> Arc<dyn HttpSender>;
}

/// The proxy for a dialect, sharing the given stream client.
pub fn channel_for(dialect: Dialect, stream_client: Arc<dyn HttpSender>) -> Arc<dyn ChannelProxy> {
    match dialect {
        Dialect::OpenAi => Arc::new(openai::OpenAiChannel::new(stream_client)),
        Dialect::Gemini => Arc::new(gemini::GeminiChannel::new(stream_client)),
        Dialect::Anthropic => Arc::new(anthropic::AnthropicChannel::new(stream_client)),
        Dialect::Generic => Arc::new(GenericChannel::new(stream_client)),
    }
}

// ---------------------------------------------------------------------------
// Generic channel
// ---------------------------------------------------------------------------

/// Fallback for unrecognized providers: Bearer auth and OpenAI-ish streaming
/// conventions.
pub struct GenericChannel {
    stream_client: Arc<dyn HttpSender>,
}

impl GenericChannel {
    pub fn new(stream_client: Arc<dyn HttpSender>) -> Self {
        Self { stream_client }
    }
}

impl ChannelProxy for GenericChannel {
    fn dialect(&self) -> Dialect {
        Dialect::Generic
    }

    fn modify_request(&self, request: &mut UpstreamRequest, api_key: &ApiKey) {
        set_bearer_auth(request, api_key);
    }

    fn stream_client(&self) -> Arc<dyn HttpSender> {
        self.stream_client.clone()
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Join the group's upstream base with the request's remaining path and query.
pub(crate) fn join_upstream_url(base: &str, path: &str, query: Option<&str>) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    match query {
        Some(query) if !query.is_empty() => format!("{base}/{path}?{query}"),
        _ => format!("{base}/{path}"),
    }
}

/// Standard streaming indicators shared by most providers: an SSE Accept
/// header, a `stream=true` query flag, or a `"stream": true` body field.
pub(crate) fn wants_stream(headers: &HeaderMap, query: Option<&str>, body: &[u8]) -> bool {
    let accepts_sse = headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/event-stream"));
    if accepts_sse {
        return true;
    }

    if query_param(query, "stream") == Some("true") {
        return true;
    }

    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("stream")?.as_bool())
        .unwrap_or(false)
}

/// The value of a query parameter in a raw query string.
pub(crate) fn query_param<'a>(query: Option<&'a str>, name: &str) -> Option<&'a str> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

pub(crate) fn set_bearer_auth(request: &mut UpstreamRequest, api_key: &ApiKey) {
    if let Ok(value) = HeaderValue::try_from(format!("Bearer {}", api_key.expose())) {
        request.headers.insert(AUTHORIZATION, value);
    }
}

/// Append a query parameter to an already-built URL string.
pub(crate) fn append_query_param(url: &mut String, name: &str, value: &str) {
    url.push(if url.contains('?') { '&' } else { '?' });
    url.push_str(name);
    url.push('=');
    url.push_str(value);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::StreamOverrides;
    use crate::upstream::{UpstreamError, UpstreamResponse};
    use async_trait::async_trait;
    use bytes::Bytes;
    use http::Method;

    /// Sender for channel tests; never actually called.
    pub(crate) struct NoopSender;

    #[async_trait]
    impl HttpSender for NoopSender {
        async fn send(&self, _request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
            Err(UpstreamError::Transport("not used".to_string()))
        }
    }

    pub(crate) fn test_group(dialect: Dialect, upstream: &str) -> Group {
        Group {
            name: "g".to_string(),
            dialect,
            upstream: upstream.to_string(),
            api_keys: vec!["k".to_string()],
            header_rules: Vec::new(),
            stream: StreamOverrides::default(),
        }
    }

    pub(crate) fn blank_request(url: &str) -> UpstreamRequest {
        UpstreamRequest {
            method: Method::POST,
            url: url.to_string(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            timeout: None,
            stream: true,
        }
    }

    #[test]
    fn url_joining_normalizes_slashes() {
        assert_eq!(
            join_upstream_url("https://x.example/", "/v1/chat", None),
            "https://x.example/v1/chat"
        );
        assert_eq!(
            join_upstream_url("https://x.example", "v1/chat", Some("alt=sse")),
            "https://x.example/v1/chat?alt=sse"
        );
        assert_eq!(
            join_upstream_url("https://x.example", "v1", Some("")),
            "https://x.example/v1"
        );
    }

    #[test]
    fn stream_detection_checks_header_query_and_body() {
        let mut sse_headers = HeaderMap::new();
        sse_headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        assert!(wants_stream(&sse_headers, None, b""));

        let plain = HeaderMap::new();
        assert!(wants_stream(&plain, Some("stream=true"), b""));
        assert!(!wants_stream(&plain, Some("stream=false"), b""));
        assert!(wants_stream(&plain, None, br#"{"stream":true}"#));
        assert!(!wants_stream(&plain, None, br#"{"stream":false}"#));
        assert!(!wants_stream(&plain, None, b"not json"));
        assert!(!wants_stream(&plain, None, b""));
    }

    #[test]
    fn query_param_finds_values_in_raw_queries() {
        assert_eq!(query_param(Some("a=1&stream=true"), "stream"), Some("true"));
        assert_eq!(query_param(Some("a=1"), "stream"), None);
        assert_eq!(query_param(None, "stream"), None);
    }

    #[test]
    fn generic_channel_uses_bearer_auth() {
        let channel = GenericChannel::new(Arc::new(NoopSender));
        let mut request = blank_request("https://x.example/v1/chat");
        channel.modify_request(&mut request, &ApiKey::new("sk-42"));

        assert_eq!(request.headers.get(AUTHORIZATION).unwrap(), "Bearer sk-42");
    }

    #[test]
    fn append_query_param_picks_the_right_separator() {
        let mut bare = "https://x.example/path".to_string();
        append_query_param(&mut bare, "key", "v");
        assert_eq!(bare, "https://x.example/path?key=v");

        let mut with_query = "https://x.example/path?alt=sse".to_string();
        append_query_param(&mut with_query, "key", "v");
        assert_eq!(with_query, "https://x.example/path?alt=sse&key=v");
    }
}
