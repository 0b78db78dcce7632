//! Wire types for the query protocol.
//!
//! A streamed answer is a sequence of [`Frame`]s, each written as one
//! event-stream line (`data: <json>`) followed by a blank line. The
//! non-streaming fallback returns a single [`QueryResponse`].

use docstream_core::AppResult;
use docstream_retrieval::Source;
use serde::{Deserialize, Serialize};

/// Prefix of every frame line.
pub const DATA_PREFIX: &str = "data:";

/// Content type of a streamed response.
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

/// Response header carrying whether the answer came from the result cache.
pub const CACHE_HEADER: &str = "x-cache";

/// Share of total latency attributed to retrieval when no sub-timers exist.
pub const RETRIEVAL_SHARE: f64 = 0.3;

/// Share of total latency attributed to generation when no sub-timers exist.
pub const GENERATION_SHARE: f64 = 0.7;

/// One typed unit of a streamed answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    /// Sources selected by retrieval; at most one per query, always first
    Retrieval { sources: Vec<Source> },

    /// A fragment of the answer text
    Token { content: String },

    /// Terminates the stream with total latency since the query was received
    Done { latency_ms: f64 },
}

impl Frame {
    /// Short name used in logs and protocol errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Retrieval { .. } => "retrieval",
            Frame::Token { .. } => "token",
            Frame::Done { .. } => "done",
        }
    }

    /// Encode as a complete event: `data: <json>\n\n`.
    pub fn to_event(&self) -> AppResult<String> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{} {}\n\n", DATA_PREFIX, json))
    }
}

/// Body of a query request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: String,

    #[serde(default = "default_stream")]
    pub stream: bool,
}

fn default_stream() -> bool {
    true
}

impl QueryRequest {
    pub fn new(query: impl Into<String>, stream: bool) -> Self {
        Self {
            query: query.into(),
            stream,
        }
    }
}

/// Non-streaming response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<Source>,
    #[serde(rename = "latencyMs")]
    pub latency_ms: f64,
}

/// Error response body: `{"error": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Timing attached to a completed answer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetrics {
    pub total_ms: f64,
    pub retrieval_ms: f64,
    pub generation_ms: f64,
    pub cache_hit: bool,
}

impl QueryMetrics {
    /// Estimate sub-timings as fixed shares of the reported total latency.
    pub fn from_latency(latency_ms: f64, cache_hit: bool) -> Self {
        let total_ms = non_negative(latency_ms);
        Self {
            total_ms,
            retrieval_ms: total_ms * RETRIEVAL_SHARE,
            generation_ms: total_ms * GENERATION_SHARE,
            cache_hit,
        }
    }

    /// Metrics for a non-streaming round trip.
    ///
    /// The total is the client-measured round trip (never less than the
    /// server-reported latency); sub-timings are shares of the server latency.
    pub fn from_round_trip(round_trip_ms: f64, reported_ms: f64, cache_hit: bool) -> Self {
        let reported_ms = non_negative(reported_ms);
        let total_ms = non_negative(round_trip_ms).max(reported_ms);
        Self {
            total_ms,
            retrieval_ms: reported_ms * RETRIEVAL_SHARE,
            generation_ms: reported_ms * GENERATION_SHARE,
            cache_hit,
        }
    }
}

fn non_negative(ms: f64) -> f64 {
    if ms.is_finite() && ms > 0.0 {
        ms
    } else {
        0.0
    }
}
