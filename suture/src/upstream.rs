// Copyright 2026 The Suture Project
// SPDX-License-Identifier: Apache-2.0

// Upstream transport seam.
//
// `HttpSender` abstracts the HTTP client that talks to LLM providers so the
// engine and the streaming core can be tested against scripted responses.
// `ReqwestHttpSender` is the production implementation; streaming responses
// surface their body as a fallible byte stream.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::Stream;
use futures_util::{StreamExt, TryStreamExt};
use http::{HeaderMap, Method, StatusCode};

/// A fallible stream of body bytes from an upstream response.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, UpstreamError>> + Send>>;

/// An outbound request to an LLM provider.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Per-call deadline covering connect, send, and the full response.
    pub timeout: Option<Duration>,
    /// Whether the response body should be surfaced incrementally.
    pub stream: bool,
}

pub enum UpstreamBody {
    Full(Bytes),
    Stream(ByteStream),
}

pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: UpstreamBody,
}

impl UpstreamResponse {
    /// View the body as a byte stream regardless of how it arrived.
    pub fn into_stream(self) -> ByteStream {
        match self.body {
            UpstreamBody::Full(bytes) => {
                Box::pin(futures_util::stream::once(async move { Ok(bytes) }))
            }
            UpstreamBody::Stream(stream) => stream,
        }
    }

    /// Drain the body into a single buffer.
    pub async fn collect_body(self) -> Result<Bytes, UpstreamError> {
        match self.body {
            UpstreamBody::Full(bytes) => Ok(bytes),
            UpstreamBody::Stream(mut stream) => {
                let mut collected = Vec::new();
                while let Some(chunk) = stream.next().await {
                    collected.extend_from_slice(&chunk?);
                }
                Ok(Bytes::from(collected))
            }
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Transport(String),

    #[error("upstream request timed out: {0}")]
    Timeout(String),
}

/// Sends HTTP requests to upstream providers.
#[async_trait]
pub trait HttpSender: Send + Sync {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError>;
}

// ---------------------------------------------------------------------------
// Reqwest implementation
// ---------------------------------------------------------------------------

pub struct ReqwestHttpSender {
    client: reqwest::Client,
}

impl ReqwestHttpSender {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpSender for ReqwestHttpSender {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers)
            .body(request.body);

        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout(e.to_string())
            } else {
                UpstreamError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();

        if request.stream {
            let stream = response
                .bytes_stream()
                .map_err(|e| UpstreamError::Transport(e.to_string()));
            Ok(UpstreamResponse {
                status,
                headers,
                body: UpstreamBody::Stream(Box::pin(stream)),
            })
        } else {
            let body = response
                .bytes()
                .await
                .map_err(|e| UpstreamError::Transport(e.to_string()))?;
            Ok(UpstreamResponse {
                status,
                headers,
                body: UpstreamBody::Full(body),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
