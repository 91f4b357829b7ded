//! Vector Memory Server
//!
//! HTTP API for the memory tool.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vector_memory::{Config, ErrorKind, MemoryService, ToolResponse};

type SharedState = Arc<MemoryService>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("Starting Vector Memory Server on port {}", config.server_port);
    tracing::info!("Backend: {:?}, index: {}", config.backend, config.index_name);

    let port = config.server_port;
    let service = MemoryService::new(config).await?;

    let app = Router::new()
        .route("/health", get(health))
        .route("/memory", post(memory))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(Arc::new(service));

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("Server listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

async fn memory(
    State(service): State<SharedState>,
    Json(request): Json<serde_json::Value>,
) -> (StatusCode, Json<ToolResponse>) {
    let response = service.execute_json(request).await;
    let status = match response.failure() {
        None => StatusCode::OK,
        Some(failure) => status_for(failure.error_kind),
    };
    (status, Json(response))
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
        ErrorKind::AuthorizationError => StatusCode::FORBIDDEN,
        ErrorKind::Unsupported => StatusCode::NOT_IMPLEMENTED,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::EmbeddingFailure | ErrorKind::BackendUnavailable => StatusCode::BAD_GATEWAY,
        ErrorKind::ConfigurationError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
