//! Route handlers.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `{prefix}/query` | Answer a query, streamed unless `stream` is false |
//! | `POST` | `{prefix}/query/stream` | Always stream |
//! | `GET`  | `{prefix}/health` | Status, version, corpus size and cache counters |
//! | `GET`  | `{prefix}/metrics` | Query count, latency percentiles, cache hit rate |

use crate::error::{internal, query_required, ApiError};
use crate::metrics::MetricsSummary;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use docstream_retrieval::{pipeline::elapsed_ms, Answered, CacheStats};
use docstream_stream::{
    encode_synthesis, ChannelSink, QueryRequest, QueryResponse, StreamEncoder, CACHE_HEADER,
    EVENT_STREAM_CONTENT_TYPE,
};
use serde::Serialize;
use std::convert::Infallible;
use std::time::Instant;

/// Frames buffered between the encoder task and the response body.
const STREAM_BUFFER: usize = 32;

// ============ POST /query ============

/// Handler for `POST {prefix}/query`.
pub async fn handle_query(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let received_at = Instant::now();
    let request = parse_request(payload)?;

    if request.stream {
        stream_answer(&state, &request.query, received_at).await
    } else {
        json_answer(&state, &request.query, received_at).await
    }
}

/// Handler for `POST {prefix}/query/stream`.
pub async fn handle_query_stream(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let received_at = Instant::now();
    let request = parse_request(payload)?;
    stream_answer(&state, &request.query, received_at).await
}

/// An unreadable body has no usable query.
fn parse_request(payload: Result<Json<QueryRequest>, JsonRejection>) -> Result<QueryRequest, ApiError> {
    match payload {
        Ok(Json(request)) => Ok(request),
        Err(rejection) => {
            tracing::debug!("Rejected query body: {}", rejection);
            Err(query_required())
        }
    }
}

async fn answer(state: &AppState, query: &str) -> Result<Answered, ApiError> {
    let answered = state.pipeline.answer(query)?;
    tracing::info!(
        "Answered query with {} sources (cache {})",
        answered.synthesis.sources.len(),
        cache_label(answered.cache_hit)
    );

    state.delay.wait(query).await;
    Ok(answered)
}

async fn json_answer(state: &AppState, query: &str, received_at: Instant) -> Result<Response, ApiError> {
    let answered = answer(state, query).await?;

    let latency_ms = elapsed_ms(received_at);
    state.metrics.record(latency_ms, answered.cache_hit);

    let body = QueryResponse {
        answer: answered.synthesis.answer,
        sources: answered.synthesis.sources,
        latency_ms,
    };

    let mut response = Json(body).into_response();
    response
        .headers_mut()
        .insert(CACHE_HEADER, HeaderValue::from_static(cache_label(answered.cache_hit)));
    Ok(response)
}

/// Run the pipeline, then hand the answer to an encoder task that writes
/// frames into the response body until done or the client goes away.
async fn stream_answer(state: &AppState, query: &str, received_at: Instant) -> Result<Response, ApiError> {
    let answered = answer(state, query).await?;
    let cache_hit = answered.cache_hit;
    let words_per_token = state.words_per_token;
    let metrics = state.metrics.clone();

    let (sink, rx) = ChannelSink::channel(STREAM_BUFFER);
    tokio::spawn(async move {
        let mut encoder = StreamEncoder::new(sink, received_at);
        let result = encode_synthesis(&mut encoder, &answered.synthesis, words_per_token).await;
        let latency_ms = match result {
            Ok(latency_ms) => {
                tracing::debug!("Stream complete in {:.2}ms", latency_ms);
                latency_ms
            }
            Err(e) => {
                tracing::warn!("Stream aborted: {}", e);
                elapsed_ms(received_at)
            }
        };
        metrics.record(latency_ms, cache_hit);
    });

    let events = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok::<_, Infallible>(event), rx))
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, EVENT_STREAM_CONTENT_TYPE)
        .header(header::CACHE_CONTROL, "no-cache")
        .header(CACHE_HEADER, cache_label(cache_hit))
        .body(Body::from_stream(events))
        .map_err(|e| {
            tracing::error!("Failed to build stream response: {}", e);
            internal()
        })
}

fn cache_label(cache_hit: bool) -> &'static str {
    if cache_hit {
        "hit"
    } else {
        "miss"
    }
}

// ============ GET /health ============

/// JSON response body for `GET {prefix}/health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    pub version: String,
    /// Documents in the corpus
    pub documents: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheStats>,
}

/// Handler for `GET {prefix}/health`.
pub async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        documents: state.pipeline.corpus().len(),
        cache: state.pipeline.cache_stats(),
    })
}

// ============ GET /metrics ============

/// Handler for `GET {prefix}/metrics`.
pub async fn handle_metrics(State(state): State<AppState>) -> Json<MetricsSummary> {
    Json(state.metrics.summary(state.pipeline.corpus().len()))
}
