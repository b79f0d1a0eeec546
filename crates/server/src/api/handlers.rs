use crate::config::AppState;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use supercommerce_mcp::protocol::{JsonRpcError, JsonRpcResponse};
use supercommerce_mcp::TransportMode;

/// Unary JSON-RPC endpoint
pub async fn unary_endpoint(State(state): State<Arc<AppState>>, request: Request) -> Response {
    forward(&state, TransportMode::Unary, request).await
}

/// Streaming (SSE) endpoint
pub async fn stream_endpoint(State(state): State<Arc<AppState>>, request: Request) -> Response {
    forward(&state, TransportMode::Streaming, request).await
}

async fn forward(state: &AppState, mode: TransportMode, request: Request) -> Response {
    match state.instances.acquire().await {
        Ok(instance) => instance.transport().handle(mode, request).await,
        Err(e) => {
            tracing::error!("MCP instance unavailable: {}", e);
            let body = JsonRpcResponse::error(
                Value::Null,
                JsonRpcError::internal_error(format!("MCP server unavailable: {}", e)),
            );
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub instance: InstanceHealth,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InstanceHealth {
    pub constructed: bool,
    pub tools: usize,
    pub open_streams: usize,
}

/// Health check endpoint; never constructs the instance.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let instance = match state.instances.current().await {
        Some(instance) => InstanceHealth {
            constructed: true,
            tools: instance.server().registry().len(),
            open_streams: instance.transport().stats().open_streams(),
        },
        None => InstanceHealth {
            constructed: false,
            tools: 0,
            open_streams: 0,
        },
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        service: "supercommerce-mcp".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        instance,
    })
}
