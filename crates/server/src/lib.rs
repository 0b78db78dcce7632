//! HTTP server for docstream.
//!
//! Exposes the query pipeline as a JSON and event-stream API under a
//! configurable prefix (default `/api`). See [`routes`] for the endpoints.
//!
//! # Error Contract
//!
//! ```json
//! { "error": "Query is required" }
//! ```
//!
//! A missing or blank query is 400; any other failure, including a panic in
//! a handler, is 500 with the message `Internal server error`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

pub mod delay;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use delay::ProcessingDelay;
pub use error::ApiError;
pub use metrics::{MetricsCollector, MetricsSummary};
pub use state::AppState;

use axum::{
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use docstream_core::{AppConfig, AppError, AppResult};
use std::any::Any;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};

/// Build the router with every route nested under `api_prefix`.
pub fn build_router(state: AppState, api_prefix: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods(AnyOrigin)
        .allow_headers(AnyOrigin)
        .expose_headers(AnyOrigin);

    let api = Router::new()
        .route("/query", post(routes::handle_query))
        .route("/query/stream", post(routes::handle_query_stream))
        .route("/health", get(routes::handle_health))
        .route("/metrics", get(routes::handle_metrics));

    let prefix = api_prefix.trim_end_matches('/');
    let app = if prefix.is_empty() {
        api
    } else {
        Router::new().nest(prefix, api)
    };

    app.layer(CatchPanicLayer::custom(handle_panic))
        .layer(axum::middleware::from_fn(middleware::track_requests))
        .layer(cors)
        .with_state(state)
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!("Handler panicked: {}", detail);
    error::internal().into_response()
}

/// Serve on an already-bound listener until the process is terminated.
pub async fn serve(listener: TcpListener, state: AppState, api_prefix: &str) -> AppResult<()> {
    let app = build_router(state, api_prefix);
    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::Other(format!("Server error: {}", e)))
}

/// Starts the HTTP server.
///
/// Loads the corpus, binds to `server.bind` and serves until the process is
/// terminated. Fails if the corpus cannot be loaded or the address is in use.
pub async fn run_server(config: &AppConfig) -> AppResult<()> {
    let state = AppState::from_config(config)?;
    tracing::info!(
        "Loaded corpus with {} documents",
        state.pipeline.corpus().len()
    );

    let bind_addr = &config.server.bind;
    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!(
        "Listening on http://{}{}",
        listener.local_addr()?,
        config.server.api_prefix
    );

    serve(listener, state, &config.server.api_prefix).await
}
