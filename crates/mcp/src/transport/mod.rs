//! HTTP transport for the protocol server.
//!
//! A single [`TransportAdapter`] serves both endpoint flavours; the
//! [`TransportMode`] passed with each request decides which one applies:
//!
//! - `Unary`: `POST` a JSON-RPC request, receive one JSON-RPC response.
//! - `Streaming`: `GET` an SSE stream that announces the unary endpoint and
//!   then carries heartbeats and pushed notifications.
//!
//! Method checks, content negotiation and the rejection envelope are shared
//! by both. CORS headers are left to the HTTP layer in front of the adapter.

mod sse;

pub use sse::{SessionStream, SseFrame, EVENT_ENDPOINT, EVENT_MESSAGE};

use crate::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::server::ProtocolServer;
use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use serde_json::Value;
use sse::SessionParams;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

pub const MEDIA_TYPE_JSON: &str = "application/json";
pub const MEDIA_TYPE_EVENT_STREAM: &str = "text/event-stream";

const NOTIFICATION_CAPACITY: usize = 64;

/// Which endpoint a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Unary,
    Streaming,
}

impl TransportMode {
    pub fn method(self) -> Method {
        match self {
            Self::Unary => Method::POST,
            Self::Streaming => Method::GET,
        }
    }

    /// Media type the client has to accept
    pub fn media_type(self) -> &'static str {
        match self {
            Self::Unary => MEDIA_TYPE_JSON,
            Self::Streaming => MEDIA_TYPE_EVENT_STREAM,
        }
    }

    pub fn allowed_methods(self) -> &'static str {
        match self {
            Self::Unary => "POST, OPTIONS",
            Self::Streaming => "GET, OPTIONS",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Unary endpoint URL announced as the first stream event
    pub endpoint_url: String,
    pub heartbeat_interval: Duration,
    pub max_body_bytes: usize,
    /// Frames buffered per stream before pushes wait on the client
    pub stream_buffer: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "/api/mcp".to_string(),
            heartbeat_interval: Duration::from_secs(30),
            max_body_bytes: 1024 * 1024,
            stream_buffer: 32,
        }
    }
}

/// Counters for the streaming side of a transport.
#[derive(Debug, Default)]
pub struct TransportStats {
    streams_opened: AtomicU64,
    open_streams: AtomicUsize,
    heartbeats_sent: AtomicU64,
}

impl TransportStats {
    pub fn streams_opened(&self) -> u64 {
        self.streams_opened.load(Ordering::Relaxed)
    }

    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::Relaxed)
    }

    pub fn heartbeats_sent(&self) -> u64 {
        self.heartbeats_sent.load(Ordering::Relaxed)
    }
}

pub struct TransportAdapter {
    server: Arc<ProtocolServer>,
    config: TransportConfig,
    notifications: broadcast::Sender<String>,
    shutdown: CancellationToken,
    stats: Arc<TransportStats>,
}

impl TransportAdapter {
    pub fn new(server: Arc<ProtocolServer>, config: TransportConfig) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            server,
            config,
            notifications,
            shutdown: CancellationToken::new(),
            stats: Arc::new(TransportStats::default()),
        }
    }

    pub fn server(&self) -> &Arc<ProtocolServer> {
        &self.server
    }

    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Handle one HTTP request arriving on the endpoint for `mode`.
    pub async fn handle(&self, mode: TransportMode, request: Request) -> Response {
        // Preflight; the CORS layer in front of the adapter supplies the headers
        if request.method() == Method::OPTIONS {
            return StatusCode::NO_CONTENT.into_response();
        }

        if request.method() != mode.method() {
            return method_not_allowed(mode);
        }

        if self.is_closed() {
            return rejection(
                StatusCode::SERVICE_UNAVAILABLE,
                "Service Unavailable: transport is closed",
            );
        }

        if !accepts(request.headers(), mode.media_type()) {
            tracing::debug!(?mode, "Rejected request with unacceptable Accept header");
            return rejection(
                StatusCode::NOT_ACCEPTABLE,
                format!("Not Acceptable: Client must accept {}", mode.media_type()),
            );
        }

        match mode {
            TransportMode::Unary => self.handle_unary(request).await,
            TransportMode::Streaming => self.open_stream(),
        }
    }

    async fn handle_unary(&self, request: Request) -> Response {
        let limit = self.config.max_body_bytes;
        if declared_length(request.headers()).is_some_and(|len| len > limit) {
            return payload_too_large();
        }

        let bytes = match read_body(request.into_body(), limit).await {
            Ok(bytes) => bytes,
            Err(response) => return response,
        };

        let body: Value = if bytes.iter().all(u8::is_ascii_whitespace) {
            Value::Object(Default::default())
        } else {
            match serde_json::from_slice(&bytes) {
                Ok(value) => value,
                Err(e) => {
                    tracing::debug!("Rejected unparseable request body: {}", e);
                    return invalid_json();
                }
            }
        };

        let response = self.server.dispatch(body).await;
        (StatusCode::OK, Json(response)).into_response()
    }

    fn open_stream(&self) -> Response {
        let stream = sse::open_session(SessionParams {
            endpoint_url: self.config.endpoint_url.clone(),
            heartbeat_interval: self.config.heartbeat_interval,
            buffer: self.config.stream_buffer,
            notifications: self.notifications.subscribe(),
            shutdown: self.shutdown.child_token(),
            stats: self.stats.clone(),
        });

        (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, MEDIA_TYPE_EVENT_STREAM),
                (header::CACHE_CONTROL, "no-cache, no-transform"),
                (header::CONNECTION, "keep-alive"),
            ],
            Body::from_stream(stream),
        )
            .into_response()
    }

    /// Push a JSON-RPC message to every open stream.
    ///
    /// Returns the number of streams the message was queued for.
    pub fn push(&self, message: &JsonRpcRequest) -> usize {
        let encoded = match serde_json::to_string(message) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::error!("Failed to encode pushed message: {}", e);
                return 0;
            }
        };
        self.notifications.send(encoded).unwrap_or(0)
    }

    /// End all streams and reject further requests.
    pub async fn close(&self) {
        if !self.shutdown.is_cancelled() {
            self.shutdown.cancel();
            tracing::info!(
                open_streams = self.stats.open_streams(),
                "MCP transport closed"
            );
        }
    }
}

/// Whether any media range in `Accept` admits `media_type`.
///
/// Ranges with `q=0` are explicit refusals. A missing header admits nothing.
pub fn accepts(headers: &HeaderMap, media_type: &str) -> bool {
    let wildcard = media_type
        .split_once('/')
        .map(|(kind, _)| format!("{}/*", kind))
        .unwrap_or_default();

    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|range| {
            let mut parts = range.split(';');
            let essence = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
            let refused = parts.any(|param| {
                param
                    .trim()
                    .split_once('=')
                    .is_some_and(|(key, value)| {
                        key.trim().eq_ignore_ascii_case("q")
                            && value.trim().parse::<f32>().is_ok_and(|q| q == 0.0)
                    })
            });

            !refused && (essence == media_type || essence == wildcard || essence == "*/*")
        })
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

/// Collect a request body, stopping as soon as it grows past `limit`.
///
/// Covers bodies without a `Content-Length`, which the declared-length check
/// cannot see.
async fn read_body(body: Body, limit: usize) -> Result<Bytes, Response> {
    let mut chunks = body.into_data_stream();
    let mut buffer = BytesMut::new();

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| {
            tracing::warn!("Failed to read request body: {}", e);
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "Failed to read request body"})),
            )
                .into_response()
        })?;

        if buffer.len() + chunk.len() > limit {
            return Err(payload_too_large());
        }
        buffer.extend_from_slice(&chunk);
    }

    Ok(buffer.freeze())
}

fn payload_too_large() -> Response {
    rejection(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large")
}

fn invalid_json() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": "Invalid JSON"})),
    )
        .into_response()
}

/// Transport-level rejection in the JSON-RPC error envelope, `id: null`.
fn rejection(status: StatusCode, message: impl Into<String>) -> Response {
    let body = JsonRpcResponse::error(Value::Null, JsonRpcError::transport_rejected(message));
    (status, Json(body)).into_response()
}

fn method_not_allowed(mode: TransportMode) -> Response {
    let mut response = rejection(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static(mode.allowed_methods()));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::error_codes;
    use crate::tools::{EchoTool, Tool, ToolRegistry};
    use futures::StreamExt;
    use serde_json::json;

    fn create_adapter(heartbeat_interval: Duration) -> TransportAdapter {
        let tools: Vec<Arc<dyn Tool>> = vec![Arc::new(EchoTool::new("echo"))];
        let server = Arc::new(ProtocolServer::new(
            ToolRegistry::from_tools("test", tools).unwrap(),
        ));
        TransportAdapter::new(
            server,
            TransportConfig {
                endpoint_url: "http://localhost:8080/api/mcp".to_string(),
                heartbeat_interval,
                ..Default::default()
            },
        )
    }

    fn post(body: &str) -> Request {
        Request::builder()
            .method(Method::POST)
            .uri("/api/mcp")
            .header(header::ACCEPT, "application/json, text/event-stream")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(accept: Option<&str>) -> Request {
        let mut builder = Request::builder().method(Method::GET).uri("/api/mcp/sse");
        if let Some(accept) = accept {
            builder = builder.header(header::ACCEPT, accept);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_accept_negotiation() {
        let mut headers = HeaderMap::new();
        assert!(!accepts(&headers, MEDIA_TYPE_JSON));

        headers.insert(header::ACCEPT, HeaderValue::from_static("text/html, application/json;q=0.9"));
        assert!(accepts(&headers, MEDIA_TYPE_JSON));
        assert!(!accepts(&headers, MEDIA_TYPE_EVENT_STREAM));

        headers.insert(header::ACCEPT, HeaderValue::from_static("text/*"));
        assert!(accepts(&headers, MEDIA_TYPE_EVENT_STREAM));

        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
        assert!(accepts(&headers, MEDIA_TYPE_JSON));

        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json; q=0"));
        assert!(!accepts(&headers, MEDIA_TYPE_JSON));
    }

    #[tokio::test]
    async fn test_unary_round_trip() {
        let adapter = create_adapter(Duration::from_secs(30));
        let response = adapter
            .handle(
                TransportMode::Unary,
                post(r#"{"jsonrpc":"2.0","method":"tools/list","id":1}"#),
            )
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        let body = json_body(response).await;
        assert_eq!(body["id"], 1);
        assert_eq!(body["result"]["tools"][0]["name"], "echo");
    }

    #[tokio::test]
    async fn test_unary_invalid_json() {
        let adapter = create_adapter(Duration::from_secs(30));
        let response = adapter.handle(TransportMode::Unary, post("not-json")).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await, json!({"error": "Invalid JSON"}));
    }

    #[tokio::test]
    async fn test_unary_empty_body_is_invalid_request() {
        let adapter = create_adapter(Duration::from_secs(30));
        let response = adapter.handle(TransportMode::Unary, post("")).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], error_codes::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_unary_rejects_oversized_body() {
        let mut adapter = create_adapter(Duration::from_secs(30));
        adapter.config.max_body_bytes = 16;
        let body = r#"{"jsonrpc":"2.0","method":"tools/list","id":1}"#;
        let mut request = post(body);
        request
            .headers_mut()
            .insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        let response = adapter.handle(TransportMode::Unary, request).await;

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_unary_rejects_oversized_chunked_body() {
        let mut adapter = create_adapter(Duration::from_secs(30));
        adapter.config.max_body_bytes = 16;
        let chunks = futures::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(br#"{"jsonrpc":"2.0","#)),
            Ok(Bytes::from_static(br#""method":"tools/list","id":1}"#)),
        ]);
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/mcp")
            .header(header::ACCEPT, "application/json")
            .body(Body::from_stream(chunks))
            .unwrap();
        assert!(request.headers().get(header::CONTENT_LENGTH).is_none());

        let response = adapter.handle(TransportMode::Unary, request).await;

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body = json_body(response).await;
        assert_eq!(body["id"], Value::Null);
        assert_eq!(body["error"]["code"], error_codes::TRANSPORT_REJECTED);
    }

    #[tokio::test]
    async fn test_unary_chunked_body_within_limit() {
        let adapter = create_adapter(Duration::from_secs(30));
        let chunks = futures::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(br#"{"jsonrpc":"2.0","#)),
            Ok(Bytes::from_static(br#""method":"tools/list","id":4}"#)),
        ]);
        let request = Request::builder()
            .method(Method::POST)
            .header(header::ACCEPT, "application/json")
            .body(Body::from_stream(chunks))
            .unwrap();

        let response = adapter.handle(TransportMode::Unary, request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["id"], 4);
    }

    #[tokio::test]
    async fn test_unary_requires_json_accept() {
        let adapter = create_adapter(Duration::from_secs(30));
        let request = Request::builder()
            .method(Method::POST)
            .header(header::ACCEPT, "text/event-stream")
            .body(Body::from("{}"))
            .unwrap();
        let response = adapter.handle(TransportMode::Unary, request).await;

        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
        let body = json_body(response).await;
        assert_eq!(body["id"], Value::Null);
        assert_eq!(body["error"]["code"], error_codes::TRANSPORT_REJECTED);
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("application/json"));
    }

    #[tokio::test]
    async fn test_wrong_method_lists_allowed_methods() {
        let adapter = create_adapter(Duration::from_secs(30));
        let request = Request::builder()
            .method(Method::DELETE)
            .body(Body::empty())
            .unwrap();
        let response = adapter.handle(TransportMode::Streaming, request).await;

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "GET, OPTIONS");
    }

    #[tokio::test]
    async fn test_preflight() {
        let adapter = create_adapter(Duration::from_secs(30));
        let request = Request::builder()
            .method(Method::OPTIONS)
            .body(Body::empty())
            .unwrap();
        let response = adapter.handle(TransportMode::Unary, request).await;

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(adapter.stats().streams_opened(), 0);
    }

    #[tokio::test]
    async fn test_stream_requires_event_stream_accept() {
        let adapter = create_adapter(Duration::from_secs(30));
        let response = adapter
            .handle(TransportMode::Streaming, get(Some("application/json")))
            .await;

        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
        assert_eq!(adapter.stats().streams_opened(), 0);
        assert_eq!(adapter.stats().open_streams(), 0);

        let response = adapter.handle(TransportMode::Streaming, get(None)).await;
        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
        assert_eq!(adapter.stats().streams_opened(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_announces_endpoint_then_heartbeats() {
        let adapter = create_adapter(Duration::from_secs(30));
        let response = adapter
            .handle(TransportMode::Streaming, get(Some("text/event-stream")))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache, no-transform");
        assert_eq!(response.headers()[header::CONNECTION], "keep-alive");
        assert_eq!(adapter.stats().open_streams(), 1);

        let mut body = response.into_body().into_data_stream();
        let first = body.next().await.unwrap().unwrap();
        assert_eq!(
            first,
            "event: endpoint\ndata: http://localhost:8080/api/mcp\n\n".as_bytes()
        );

        let second = body.next().await.unwrap().unwrap();
        let second = String::from_utf8(second.to_vec()).unwrap();
        assert!(second.starts_with(": ping - "));
        assert!(second.ends_with("\n\n"));
        assert_eq!(adapter.stats().heartbeats_sent(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_stops_heartbeat() {
        let adapter = create_adapter(Duration::from_secs(30));
        let response = adapter
            .handle(TransportMode::Streaming, get(Some("text/event-stream")))
            .await;
        let mut body = response.into_body().into_data_stream();

        body.next().await.unwrap().unwrap();
        body.next().await.unwrap().unwrap();
        assert_eq!(adapter.stats().heartbeats_sent(), 1);

        drop(body);
        assert_eq!(adapter.stats().open_streams(), 0);

        tokio::time::advance(Duration::from_secs(120)).await;
        tokio::task::yield_now().await;
        assert_eq!(adapter.stats().heartbeats_sent(), 1);
        assert_eq!(adapter.stats().streams_opened(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pushed_messages_arrive_in_order() {
        let adapter = create_adapter(Duration::from_secs(3600));
        let response = adapter
            .handle(TransportMode::Streaming, get(Some("text/event-stream")))
            .await;
        let mut body = response.into_body().into_data_stream();
        body.next().await.unwrap().unwrap();

        let first = JsonRpcRequest::notification("notifications/message", Some(json!({"n": 1})));
        let second = JsonRpcRequest::notification("notifications/message", Some(json!({"n": 2})));
        assert_eq!(adapter.push(&first), 1);
        assert_eq!(adapter.push(&second), 1);

        for expected in [1, 2] {
            let frame = body.next().await.unwrap().unwrap();
            let frame = String::from_utf8(frame.to_vec()).unwrap();
            let data = frame
                .strip_prefix("event: message\ndata: ")
                .and_then(|rest| rest.strip_suffix("\n\n"))
                .unwrap();
            let message: Value = serde_json::from_str(data).unwrap();
            assert_eq!(message["params"]["n"], expected);
        }
    }

    #[tokio::test]
    async fn test_close_ends_streams_and_rejects_requests() {
        let adapter = create_adapter(Duration::from_secs(30));
        let response = adapter
            .handle(TransportMode::Streaming, get(Some("text/event-stream")))
            .await;
        let mut body = response.into_body().into_data_stream();
        body.next().await.unwrap().unwrap();

        adapter.close().await;
        adapter.close().await;
        assert!(body.next().await.is_none());

        let response = adapter
            .handle(
                TransportMode::Unary,
                post(r#"{"jsonrpc":"2.0","method":"tools/list","id":1}"#),
            )
            .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
