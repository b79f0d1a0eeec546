use crate::config::{AppState, McpConfig, ServerConfig};
use anyhow::{Context, Result};
use axum::{
    extract::Request,
    http::{Method, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{any, get},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

mod handlers;

/// Start the API server
pub async fn serve(addr: &str, config: ServerConfig) -> Result<()> {
    let state = AppState::new(&config)?;

    // Fail fast: a tool manifest that does not validate should stop startup
    let instance = state
        .instances
        .acquire()
        .await
        .context("Failed to construct MCP instance")?;
    tracing::info!(
        tools = instance.server().registry().len(),
        "MCP instance ready"
    );
    drop(instance);

    let app = create_router(state.clone(), &config.mcp);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("API server listening on {}", addr);
    tracing::info!(
        "MCP endpoints: POST {} (unary), GET {} (stream)",
        config.mcp.endpoint_path,
        config.mcp.stream_path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await?;

    state.instances.teardown().await;
    tracing::info!("API server stopped");

    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
///
/// Open streams would hold graceful shutdown forever, so the instance is torn
/// down here, which ends every stream session.
async fn shutdown_signal(state: AppState) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    state.instances.teardown().await;
}

/// Create the API router
fn create_router(state: AppState, mcp: &McpConfig) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health_check))
        // Method and Accept checks belong to the transport, so both accept any method
        .route(&mcp.endpoint_path, any(handlers::unary_endpoint))
        .route(&mcp.stream_path, any(handlers::stream_endpoint))
        // Middleware
        .layer(cors_layer())
        .layer(middleware::from_fn(preflight_no_content))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .with_state(Arc::new(state))
}

/// Permissive CORS; requested headers are echoed back since browsers do not
/// let `*` cover `Authorization`.
fn cors_layer() -> CorsLayer {
    CorsLayer::permissive().allow_headers(AllowHeaders::mirror_request())
}

/// Preflights are answered with 204 rather than the CORS layer's 200.
async fn preflight_no_content(request: Request, next: Next) -> Response {
    let preflight = request.method() == Method::OPTIONS;
    let mut response = next.run(request).await;
    if preflight && response.status() == StatusCode::OK {
        *response.status_mut() = StatusCode::NO_CONTENT;
    }
    response
}
