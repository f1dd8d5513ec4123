// Copyright 2026 The Suture Project
// SPDX-License-Identifier: Apache-2.0

// Anthropic channel: `x-api-key` header auth, streaming flagged in the body.

use std::sync::Arc;

use http::header::HeaderValue;

use super::ChannelProxy;
use crate::keys::ApiKey;
use crate::stream::Dialect;
use crate::upstream::{HttpSender, UpstreamRequest};

pub struct AnthropicChannel {
    stream_client: Arc<dyn HttpSender>,
}

impl AnthropicChannel {
    pub fn new(stream_client: Arc<dyn HttpSender>) -> Self {
        Self { stream_client }
    }
}

impl ChannelProxy for AnthropicChannel {
    fn dialect(&self) -> Dialect {
        Dialect::Anthropic
    }

    fn modify_request(&self, request: &mut UpstreamRequest, api_key: &ApiKey) {
        if let Ok(value) = HeaderValue::try_from(api_key.expose()) {
            request.headers.insert("x-api-key", value);
        }
    }

    fn stream_client(&self) -> Arc<dyn HttpSender> {
        self.stream_client.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
