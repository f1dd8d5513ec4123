// Engine: dispatch and upstream wiring.
//
// Wires the pieces together for every proxied request:
// - Group resolution and key selection
// - Outbound request construction (URL, headers, header rules, channel auth)
// - Streaming detection and outbound body reshaping
// - Streaming dispatch: pass-through for channels with reliable terminators,
//   the intelligent interpreter with resume support for the rest
// - Resume request construction for interrupted streams

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use bytes::Bytes;
use futures_util::StreamExt;
use http::header::{
    HeaderValue, CACHE_CONTROL, CONNECTION, CONTENT_TYPE, HOST,
};
use http::{HeaderMap, Method, StatusCode};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::channel::{channel_for, ChannelProxy};
use crate::config::{Config, Group};
use crate::headers::{apply_header_rules, HeaderRuleContext};
use crate::keys::{KeyProvider, RoundRobinKeyProvider};
use crate::proxy::{GatewayResponse, GatewayService, InboundRequest, ProxyError};
use crate::stream::{
    self, retry_error_envelope, ClientSink, Dialect, RetryRequester, SessionError, StreamConfig,
    StreamHandler, StreamStart,
};
use crate::upstream::{
    HttpSender, ReqwestHttpSender, UpstreamError, UpstreamRequest, UpstreamResponse,
};

/// Per-attempt deadline for resume requests.
const RESUME_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Depth of the hand-off channel to the client. One line deep: upstream
/// reads block on the client draining the previous line, which is the whole
/// back-pressure story.
const STREAM_CHANNEL_CAPACITY: usize = 1;

/// Headers carrying client credentials, never forwarded upstream.
const CLIENT_AUTH_HEADERS: &[&str] = &["authorization", "x-api-key", "x-goog-api-key"];

// ---------------------------------------------------------------------------
// Request context for structured logging
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct RequestContext {
    request_id: String,
    group: String,
    channel: &'static str,
}

// ---------------------------------------------------------------------------
// Engine dependencies
// ---------------------------------------------------------------------------

pub struct EngineDeps {
    pub config: Arc<Config>,
    pub http: Arc<dyn HttpSender>,
    pub keys: Arc<dyn KeyProvider>,
}

/// One channel proxy per dialect, built at startup and read-only after.
struct ChannelSet {
    openai: Arc<dyn ChannelProxy>,
    gemini: Arc<dyn ChannelProxy>,
    anthropic: Arc<dyn ChannelProxy>,
    generic: Arc<dyn ChannelProxy>,
}

impl ChannelSet {
    fn new(stream_client: Arc<dyn HttpSender>) -> Self {
        Self {
            openai: channel_for(Dialect::OpenAi, stream_client.clone()),
            gemini: channel_for(Dialect::Gemini, stream_client.clone()),
            anthropic: channel_for(Dialect::Anthropic, stream_client.clone()),
            generic: channel_for(Dialect::Generic, stream_client),
        }
    }

    fn get(&self, dialect: Dialect) -> Arc<dyn ChannelProxy> {
        match dialect {
            Dialect::OpenAi => self.openai.clone(),
            Dialect::Gemini => self.gemini.clone(),
            Dialect::Anthropic => self.anthropic.clone(),
            Dialect::Generic => self.generic.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// ProxyEngine
// ---------------------------------------------------------------------------

/// Gateway implementation running the full proxy pipeline.
pub struct ProxyEngine {
    deps: EngineDeps,
    channels: ChannelSet,
}

impl ProxyEngine {
    pub fn new_with(deps: EngineDeps) -> Self {
        let channels = ChannelSet::new(deps.http.clone());
        Self { deps, channels }
    }
}

/// Build the default engine: a real reqwest client and round-robin keys over
/// the configured groups.
pub fn build_engine(config: Arc<Config>) -> ProxyEngine {
    let pools: HashMap<String, Vec<String>> = config
        .groups
        .values()
        .map(|group| (group.name.clone(), group.api_keys.clone()))
        .collect();

    let deps = EngineDeps {
        config,
        http: Arc::new(ReqwestHttpSender::new(reqwest::Client::new())),
        keys: Arc::new(RoundRobinKeyProvider::new(pools)),
    };

    ProxyEngine::new_with(deps)
}

#[async_trait]
impl GatewayService for ProxyEngine {
    async fn handle(
        &self,
        group_name: &str,
        request: InboundRequest,
    ) -> Result<GatewayResponse, ProxyError> {
        let group = self
            .deps
            .config
            .groups
            .get(group_name)
            .ok_or_else(|| ProxyError::UnknownGroup(group_name.to_string()))?;

        let channel = self.channels.get(group.dialect);
        let ctx = RequestContext {
            request_id: Uuid::new_v4().to_string(),
            group: group.name.clone(),
            channel: group.dialect.as_str(),
        };

        tracing::debug!(
            request_id = %ctx.request_id,
            group = %ctx.group,
            channel = ctx.channel,
            method = %request.method,
            path = %request.path,
            "proxying request"
        );

        let api_key = self.deps.keys.select_key(&group.name)?;
        let url = channel.build_upstream_url(&request.path, request.query.as_deref(), group);

        // Reverse proxy header hygiene: client credentials never travel
        // upstream, and the client's Host points at us, not the provider.
        let mut headers = request.headers.clone();
        strip_client_auth(&mut headers);
        headers.remove(HOST);

        apply_header_rules(
            &mut headers,
            &group.header_rules,
            &HeaderRuleContext {
                group: &group.name,
                api_key: api_key.expose(),
            },
        );

        let stream = channel.is_stream_request(
            &request.path,
            &request.headers,
            request.query.as_deref(),
            &request.body,
        );

        let mut outbound = UpstreamRequest {
            method: request.method.clone(),
            url,
            headers,
            body: request.body.clone(),
            timeout: None,
            stream,
        };
        channel.modify_request(&mut outbound, &api_key);

        if !stream {
            let upstream = self
                .deps
                .http
                .send(outbound)
                .await
                .map_err(map_upstream_error)?;
            return buffered_response(upstream).await;
        }

        channel.reshape_stream_req_body(&mut outbound);
        outbound
            .headers
            .insert("x-accel-buffering", HeaderValue::from_static("no"));

        let requester = Arc::new(EngineRetryRequester {
            group: group.clone(),
            channel: channel.clone(),
            keys: self.deps.keys.clone(),
            method: outbound.method.clone(),
            path: request.path.clone(),
            query: request.query.clone(),
            inbound_headers: request.headers.clone(),
            original_body: request.body.clone(),
            request_id: ctx.request_id.clone(),
        });

        let upstream = channel
            .stream_client()
            .send(outbound)
            .await
            .map_err(map_upstream_error)?;

        if !upstream.status.is_success() {
            // The provider refused the call; relay its error body untouched.
            tracing::warn!(
                request_id = %ctx.request_id,
                status = %upstream.status,
                "upstream rejected streaming request"
            );
            return buffered_response(upstream).await;
        }

        Ok(self
            .handle_streaming_response(group, upstream, requester, ctx)
            .await)
    }
}

impl ProxyEngine {
    /// Dispatch a live streaming response.
    ///
    /// The session runs on its own task and talks to the HTTP layer through
    /// the body channel plus a one-shot start signal, so the status line can
    /// still become a 504 when the retry budget dies before the first byte.
    async fn handle_streaming_response(
        &self,
        group: &Group,
        upstream: UpstreamResponse,
        requester: Arc<dyn RetryRequester>,
        ctx: RequestContext,
    ) -> GatewayResponse {
        let dialect = group.dialect;
        let config = group.stream_config();

        let (tx, rx) = mpsc::channel::<Bytes>(STREAM_CHANNEL_CAPACITY);
        let (start_tx, start_rx) = oneshot::channel();
        let mut sink = ClientSink::new(tx, start_tx);

        tokio::spawn(async move {
            run_stream_session(dialect, config, upstream, requester, &mut sink, &ctx).await;
            // Release the HTTP layer even when the session wrote nothing.
            sink.commit(StreamStart::Streaming);
        });

        match start_rx.await {
            Ok(StreamStart::RetryLimitExceeded { max_retries }) => {
                retry_limit_response(max_retries)
            }
            Ok(StreamStart::Streaming) | Err(_) => sse_response(rx),
        }
    }
}

/// Mode selection for one streaming session, plus error disposition.
///
/// OpenAI and Anthropic terminate their own streams reliably and go byte-for
/// byte through the pass-through path. Everything else gets the interpreter.
async fn run_stream_session(
    dialect: Dialect,
    config: StreamConfig,
    upstream: UpstreamResponse,
    requester: Arc<dyn RetryRequester>,
    sink: &mut ClientSink,
    ctx: &RequestContext,
) {
    if matches!(dialect, Dialect::OpenAi | Dialect::Anthropic) {
        if let Err(err) = stream::pass_through(upstream.into_stream(), sink).await {
            tracing::debug!(request_id = %ctx.request_id, error = %err, "pass-through ended early");
        }
        return;
    }

    let handler = StreamHandler::new(dialect, config);
    match handler.handle(upstream.into_stream(), sink, requester.as_ref()).await {
        Ok(()) => {
            tracing::info!(request_id = %ctx.request_id, group = %ctx.group, "stream completed");
        }
        Err(SessionError::RetryLimitExceeded(max_retries)) => {
            tracing::error!(
                request_id = %ctx.request_id,
                group = %ctx.group,
                max_retries,
                "stream abandoned after exhausting the retry budget"
            );
        }
        Err(SessionError::ClientGone) => {
            tracing::debug!(request_id = %ctx.request_id, "client disconnected mid-stream");
        }
        Err(err) => {
            // Nothing unread remains of the current upstream at this point
            // (resume failures strike between attempts), so the best-effort
            // fallback is to release the stream as-is.
            tracing::error!(
                request_id = %ctx.request_id,
                group = %ctx.group,
                error = %err,
                "intelligent streaming failed"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Resume request builder
// ---------------------------------------------------------------------------

/// Builds resume attempts for one streaming session.
///
/// Captures everything the original request carried so each resume is a
/// faithful reconstruction with the continuation context spliced in and a
/// fresh key attached.
struct EngineRetryRequester {
    group: Group,
    channel: Arc<dyn ChannelProxy>,
    keys: Arc<dyn KeyProvider>,
    method: Method,
    path: String,
    query: Option<String>,
    inbound_headers: HeaderMap,
    original_body: Bytes,
    request_id: String,
}

#[async_trait]
impl RetryRequester for EngineRetryRequester {
    async fn resume(&self, accumulated_text: &str) -> Result<crate::upstream::ByteStream, SessionError> {
        let original: stream::JsonMap = serde_json::from_slice(&self.original_body)
            .map_err(|e| SessionError::ResumeBody(format!("original body is not a JSON object: {e}")))?;

        let resume_body = stream::build_resume_body(self.group.dialect, &original, accumulated_text);
        let body = serde_json::to_vec(&resume_body)
            .map_err(|e| SessionError::ResumeBody(e.to_string()))?;

        let api_key = self.keys.select_key(&self.group.name)?;
        let url = self
            .channel
            .build_upstream_url(&self.path, self.query.as_deref(), &self.group);

        let mut headers = self.inbound_headers.clone();
        strip_client_auth(&mut headers);
        headers.remove(HOST);
        apply_header_rules(
            &mut headers,
            &self.group.header_rules,
            &HeaderRuleContext {
                group: &self.group.name,
                api_key: api_key.expose(),
            },
        );

        let mut request = UpstreamRequest {
            method: self.method.clone(),
            url,
            headers,
            body: Bytes::from(body),
            timeout: Some(RESUME_REQUEST_TIMEOUT),
            stream: true,
        };
        self.channel.modify_request(&mut request, &api_key);
        self.channel.reshape_stream_req_body(&mut request);
        request
            .headers
            .insert("x-accel-buffering", HeaderValue::from_static("no"));

        tracing::debug!(
            request_id = %self.request_id,
            group = %self.group.name,
            primed_chars = accumulated_text.len(),
            "sending resume request"
        );

        let response = self.channel.stream_client().send(request).await?;
        Ok(response.into_stream())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn strip_client_auth(headers: &mut HeaderMap) {
    for name in CLIENT_AUTH_HEADERS {
        headers.remove(*name);
    }
}

fn map_upstream_error(err: UpstreamError) -> ProxyError {
    match err {
        UpstreamError::Timeout(msg) => ProxyError::UpstreamTimeout(msg),
        UpstreamError::Transport(msg) => ProxyError::UpstreamFailure(msg),
    }
}

/// Collect an upstream response into a buffered gateway response, status and
/// headers forwarded untouched.
async fn buffered_response(upstream: UpstreamResponse) -> Result<GatewayResponse, ProxyError> {
    let status = upstream.status;
    let headers = upstream.headers.clone();
    let bytes = upstream.collect_body().await.map_err(map_upstream_error)?;

    Ok(GatewayResponse {
        status,
        headers,
        body: Body::from(bytes),
    })
}

/// The streaming response shell: SSE headers set exactly once, body fed from
/// the session channel, each chunk flushed as its own frame.
fn sse_response(rx: mpsc::Receiver<Bytes>) -> GatewayResponse {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));

    GatewayResponse {
        status: StatusCode::OK,
        headers,
        body,
    }
}

/// The 504 sent when the retry budget dies before the first body byte.
fn retry_limit_response(max_retries: u32) -> GatewayResponse {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    GatewayResponse {
        status: StatusCode::GATEWAY_TIMEOUT,
        headers,
        body: Body::from(retry_error_envelope(max_retries).to_string()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
