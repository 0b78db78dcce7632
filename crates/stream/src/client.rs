//! HTTP client for the query endpoint.
//!
//! [`QueryBackend`] is the seam a [`Session`](crate::session::Session) talks
//! to; [`QueryClient`] implements it over `reqwest`.

use crate::frame::{ErrorBody, QueryMetrics, QueryRequest, QueryResponse, CACHE_HEADER};
use docstream_core::{AppError, AppResult};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::time::Instant;

/// Raw response body chunks, as read from the network.
pub type ByteStream = Pin<Box<dyn Stream<Item = AppResult<Vec<u8>>> + Send>>;

/// An opened streaming response.
pub struct FrameStream {
    pub bytes: ByteStream,
    /// Whether the server answered from its result cache
    pub cache_hit: bool,
}

impl std::fmt::Debug for FrameStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameStream")
            .field("cache_hit", &self.cache_hit)
            .finish_non_exhaustive()
    }
}

/// A finished non-streaming query.
#[derive(Debug, Clone)]
pub struct CompletedQuery {
    pub response: QueryResponse,
    pub metrics: QueryMetrics,
}

/// Transport used to submit queries.
#[async_trait::async_trait]
pub trait QueryBackend: Send + Sync {
    /// Submit a query and return the frame byte stream.
    async fn open_stream(&self, query: &str) -> AppResult<FrameStream>;

    /// Submit a query for a single JSON response.
    async fn query(&self, query: &str) -> AppResult<CompletedQuery>;
}

/// `reqwest` client for a docstream server.
#[derive(Debug, Clone)]
pub struct QueryClient {
    /// Base URL including the API prefix, e.g. `http://127.0.0.1:8000/api`
    base_url: String,

    client: reqwest::Client,
}

impl QueryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn query_url(&self) -> String {
        format!("{}/query", self.base_url)
    }

    async fn post(&self, query: &str, stream: bool) -> AppResult<reqwest::Response> {
        let url = self.query_url();
        tracing::debug!("POST {} (stream={})", url, stream);

        let response = self
            .client
            .post(&url)
            .json(&QueryRequest::new(query, stream))
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to reach {}: {}", url, e)))?;

        check_status(response).await
    }
}

/// Map non-success statuses onto the error taxonomy.
async fn check_status(response: reqwest::Response) -> AppResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);

    if status == reqwest::StatusCode::BAD_REQUEST {
        Err(AppError::Input(message))
    } else {
        Err(AppError::Upstream(format!(
            "Server error ({}): {}",
            status, message
        )))
    }
}

fn cache_hit(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(CACHE_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("hit"))
}

#[async_trait::async_trait]
impl QueryBackend for QueryClient {
    async fn open_stream(&self, query: &str) -> AppResult<FrameStream> {
        let response = self.post(query, true).await?;
        let cache_hit = cache_hit(&response);

        let bytes = response.bytes_stream().map(|chunk| {
            chunk
                .map(|b| b.to_vec())
                .map_err(|e| AppError::Upstream(format!("Stream error: {}", e)))
        });

        Ok(FrameStream {
            bytes: Box::pin(bytes),
            cache_hit,
        })
    }

    async fn query(&self, query: &str) -> AppResult<CompletedQuery> {
        let start = Instant::now();
        let response = self.post(query, false).await?;
        let cache_hit = cache_hit(&response);

        let response: QueryResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse response: {}", e)))?;
        let round_trip_ms = start.elapsed().as_secs_f64() * 1000.0;

        let metrics = QueryMetrics::from_round_trip(round_trip_ms, response.latency_ms, cache_hit);
        Ok(CompletedQuery { response, metrics })
    }
}
