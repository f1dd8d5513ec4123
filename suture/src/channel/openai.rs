// Copyright 2026 The Suture Project
// SPDX-License-Identifier: Apache-2.0

// OpenAI channel: Bearer auth, streaming flagged in the request body.

use std::sync::Arc;

use super::{set_bearer_auth, ChannelProxy};
use crate::keys::ApiKey;
use crate::stream::Dialect;
use crate::upstream::{HttpSender, UpstreamRequest};

pub struct OpenAiChannel {
    stream_client: Arc<dyn HttpSender>,
}

impl OpenAiChannel {
    pub fn new(stream_client: Arc<dyn HttpSender>) -> Self {
        Self { stream_client }
    }
}

impl ChannelProxy for OpenAiChannel {
    fn dialect(&self) -> Dialect {
        Dialect::OpenAi
    }

    fn modify_request(&self, request: &mut UpstreamRequest, api_key: &ApiKey) {
        set_bearer_auth(request, api_key);
    }

    fn stream_client(&self) -> Arc<dyn HttpSender> {
        self.stream_client.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::super::tests::{blank_request, NoopSender};
    use super::*;
    use http::header::AUTHORIZATION;
    use http::HeaderMap;

    #[test]
    fn requests_carry_a_bearer_token() {
        let channel = OpenAiChannel::new(Arc::new(NoopSender));
        let mut request = blank_request("https://api.openai.com/v1/chat/completions");
        channel.modify_request(&mut request, &ApiKey::new("sk-7"));

        assert_eq!(request.headers.get(AUTHORIZATION).unwrap(), "Bearer sk-7");
    }

    #[test]
    fn streaming_follows_the_body_flag() {
        let channel = OpenAiChannel::new(Arc::new(NoopSender));
        let headers = HeaderMap::new();
        assert!(channel.is_stream_request(
            "/v1/chat/completions",
            &headers,
            None,
            br#"{"stream":true}"#
        ));
        assert!(!channel.is_stream_request("/v1/chat/completions", &headers, None, br#"{}"#));
    }
}
