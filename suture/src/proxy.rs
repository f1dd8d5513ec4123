// Copyright 2026 The Suture Project
// SPDX-License-Identifier: Apache-2.0

// HTTP surface.
//
// Responsibilities:
// - Route parsing: `/proxy/{group}/…` plus a health endpoint
// - Inbound body capture and JSON sanity check
// - Handing requests to the injected `GatewayService`
// - Mapping gateway errors to HTTP responses

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Method, Request, Response, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use std::sync::Arc;

/// Largest inbound request body accepted, in bytes.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

/// Inbound request data handed to the gateway, with the `/proxy/{group}`
/// prefix already stripped from the path.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    /// Remaining path after the group segment, with its leading slash.
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Response produced by the gateway. The body may be a buffered passthrough
/// or a live SSE stream.
pub struct GatewayResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

/// Errors that end a request before a gateway response exists.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("unknown proxy group \"{0}\"")]
    UnknownGroup(String),

    #[error("request body is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("upstream request failed: {0}")]
    UpstreamFailure(String),

    #[error("upstream request timed out: {0}")]
    UpstreamTimeout(String),

    #[error("no usable API key: {0}")]
    KeySelection(#[from] crate::keys::KeyError),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> axum::response::Response {
        let (status, public_message) = match &self {
            ProxyError::UnknownGroup(group) => {
                (StatusCode::NOT_FOUND, format!("unknown proxy group \"{group}\""))
            }
            ProxyError::MalformedJson(_) => (
                StatusCode::BAD_REQUEST,
                "request body is not valid JSON".to_string(),
            ),
            ProxyError::UpstreamFailure(_) => (
                StatusCode::BAD_GATEWAY,
                "upstream request failed".to_string(),
            ),
            ProxyError::UpstreamTimeout(_) => (
                StatusCode::GATEWAY_TIMEOUT,
                "upstream request timed out".to_string(),
            ),
            ProxyError::KeySelection(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "no usable API key for this group".to_string(),
            ),
        };
        (status, public_message).into_response()
    }
}

// ---------------------------------------------------------------------------
// Trait: GatewayService (dependency injection point)
// ---------------------------------------------------------------------------

/// The engine behind the HTTP surface.
///
/// Implementations must be Send + Sync so they can be shared across request
/// handlers via `Arc`.
#[async_trait::async_trait]
pub trait GatewayService: Send + Sync {
    async fn handle(
        &self,
        group: &str,
        request: InboundRequest,
    ) -> Result<GatewayResponse, ProxyError>;
}

// ---------------------------------------------------------------------------
// Route parsing
// ---------------------------------------------------------------------------

/// Split `/proxy/{group}/rest…` into the group name and the remaining path.
///
/// Returns `None` for paths outside the proxy prefix.
pub fn split_proxy_path(path: &str) -> Option<(&str, &str)> {
    let rest = path.strip_prefix("/proxy/")?;
    let (group, tail) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };
    if group.is_empty() {
        return None;
    }
    Some((group, tail))
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<dyn GatewayService>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Health endpoint: GET /healthz -> 200 OK
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Proxy handler for group paths.
pub async fn gateway_handler(
    State(state): State<AppState>,
    request: Request<Body>,
) -> impl IntoResponse {
    let (parts, body) = request.into_parts();

    let Some((group, rest)) = split_proxy_path(parts.uri.path()) else {
        return (StatusCode::NOT_FOUND, "unknown path").into_response();
    };
    let group = group.to_string();
    let path = rest.to_string();
    let query = parts.uri.query().map(str::to_string);

    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                format!("failed to read request body: {err}"),
            )
                .into_response()
        }
    };

    // LLM request bodies are JSON; refuse garbage before it reaches upstream.
    if !body.is_empty() && serde_json::from_slice::<serde_json::Value>(&body).is_err() {
        return ProxyError::MalformedJson("request body is not valid JSON".to_string())
            .into_response();
    }

    let inbound = InboundRequest {
        method: parts.method,
        path,
        query,
        headers: parts.headers,
        body,
    };

    match state.service.handle(&group, inbound).await {
        Ok(resp) => {
            let mut response = Response::builder().status(resp.status);
            if let Some(headers) = response.headers_mut() {
                *headers = resp.headers;
            }
            response.body(resp.body).unwrap().into_response()
        }
        Err(err) => err.into_response(),
    }
}

// ---------------------------------------------------------------------------
// Router construction
// ---------------------------------------------------------------------------

/// Build the axum router. The gateway is injected; no hard-wired engine.
pub fn build_router(service: Arc<dyn GatewayService>) -> Router {
    let state = AppState { service };

    Router::new()
        .route("/healthz", get(healthz))
        .fallback(gateway_handler)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use tower::ServiceExt; // for oneshot

    /// Gateway that records what it was called with and returns a canned
    /// response.
    struct CapturingService {
        captured: tokio::sync::Mutex<Option<(String, InboundRequest)>>,
    }

    impl CapturingService {
        fn new() -> Self {
            Self {
                captured: tokio::sync::Mutex::new(None),
            }
        }
    }

    #[async_trait::async_trait]
    impl GatewayService for CapturingService {
        async fn handle(
            &self,
            group: &str,
            request: InboundRequest,
        ) -> Result<GatewayResponse, ProxyError> {
            *self.captured.lock().await = Some((group.to_string(), request));
            let mut headers = HeaderMap::new();
            headers.insert("content-type", HeaderValue::from_static("application/json"));
            Ok(GatewayResponse {
                status: StatusCode::OK,
                headers,
                body: Body::from("{\"ok\":true}"),
            })
        }
    }

    struct FailingService(fn() -> ProxyError);

    #[async_trait::async_trait]
    impl GatewayService for FailingService {
        async fn handle(
            &self,
            _group: &str,
            _request: InboundRequest,
        ) -> Result<GatewayResponse, ProxyError> {
            Err((self.0)())
        }
    }

    fn json_request(path: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    // -----------------------------------------------------------------------
    // Path splitting
    // -----------------------------------------------------------------------

    #[test]
    fn proxy_paths_split_into_group_and_rest() {
        assert_eq!(
            split_proxy_path("/proxy/gem/v1beta/models/g:streamGenerateContent"),
            Some(("gem", "/v1beta/models/g:streamGenerateContent"))
        );
        assert_eq!(split_proxy_path("/proxy/gem"), Some(("gem", "")));
        assert_eq!(split_proxy_path("/proxy//v1"), None);
        assert_eq!(split_proxy_path("/v1/chat/completions"), None);
        assert_eq!(split_proxy_path("/"), None);
    }

    // -----------------------------------------------------------------------
    // Routing
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn requests_reach_the_gateway_with_group_and_stripped_path() {
        let service = Arc::new(CapturingService::new());
        let app = build_router(service.clone());

        let req = json_request(
            "/proxy/gem/v1beta/models/g:streamGenerateContent?alt=sse",
            r#"{"contents":[]}"#,
        );
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let captured = service.captured.lock().await;
        let (group, inbound) = captured.as_ref().unwrap();
        assert_eq!(group, "gem");
        assert_eq!(inbound.path, "/v1beta/models/g:streamGenerateContent");
        assert_eq!(inbound.query.as_deref(), Some("alt=sse"));
        assert_eq!(&inbound.body[..], br#"{"contents":[]}"#);
    }

    #[tokio::test]
    async fn non_proxy_paths_return_404() {
        let app = build_router(Arc::new(CapturingService::new()));
        let resp = app
            .oneshot(json_request("/v1/chat/completions", "{}"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn healthz_returns_200() {
        let app = build_router(Arc::new(CapturingService::new()));
        let req = Request::builder()
            .method("GET")
            .uri("/healthz")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_json_bodies_are_rejected_with_400() {
        let app = build_router(Arc::new(CapturingService::new()));
        let resp = app
            .oneshot(json_request("/proxy/gem/v1", "this is not json {{{"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("not valid JSON"));
    }

    #[tokio::test]
    async fn empty_bodies_are_allowed_for_get_style_calls() {
        let service = Arc::new(CapturingService::new());
        let app = build_router(service.clone());

        let req = Request::builder()
            .method("GET")
            .uri("/proxy/gem/v1beta/models")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    // -----------------------------------------------------------------------
    // Error mapping
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn unknown_group_maps_to_404() {
        let app = build_router(Arc::new(FailingService(|| {
            ProxyError::UnknownGroup("ghost".to_string())
        })));
        let resp = app.oneshot(json_request("/proxy/ghost/v1", "{}")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn upstream_timeout_maps_to_504() {
        let app = build_router(Arc::new(FailingService(|| {
            ProxyError::UpstreamTimeout("deadline".to_string())
        })));
        let resp = app.oneshot(json_request("/proxy/g/v1", "{}")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn upstream_failure_maps_to_502() {
        let resp = ProxyError::UpstreamFailure("refused".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn key_selection_failure_maps_to_500() {
        let err = ProxyError::KeySelection(crate::keys::KeyError::UnknownGroup("g".to_string()));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
