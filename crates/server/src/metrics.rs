//! In-memory query metrics.
//!
//! Every answered query records its latency and whether the cache served
//! it. Latency percentiles are computed over the most recent
//! [`LATENCY_WINDOW`] samples; the counters cover the whole process lifetime.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Latency samples kept for percentile calculation.
pub const LATENCY_WINDOW: usize = 10_000;

/// Snapshot served by `GET {prefix}/metrics`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub queries: u64,
    pub latency_p50_ms: f64,
    pub latency_p95_ms: f64,
    pub latency_p99_ms: f64,
    /// Zero until the first query
    pub cache_hit_rate: f64,
    pub documents_indexed: usize,
}

#[derive(Debug)]
pub struct MetricsCollector {
    window: usize,
    latencies: Mutex<VecDeque<f64>>,
    queries: AtomicU64,
    cache_hits: AtomicU64,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::with_window(LATENCY_WINDOW)
    }

    pub fn with_window(window: usize) -> Self {
        Self {
            window: window.max(1),
            latencies: Mutex::new(VecDeque::new()),
            queries: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
        }
    }

    /// Record one answered query.
    pub fn record(&self, latency_ms: f64, cache_hit: bool) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        if cache_hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        }

        if !latency_ms.is_finite() || latency_ms < 0.0 {
            tracing::debug!("Ignoring invalid latency sample {}", latency_ms);
            return;
        }
        let mut latencies = self.latencies.lock().unwrap_or_else(|e| e.into_inner());
        if latencies.len() >= self.window {
            latencies.pop_front();
        }
        latencies.push_back(latency_ms);
    }

    pub fn summary(&self, documents_indexed: usize) -> MetricsSummary {
        let mut sorted: Vec<f64> = {
            let latencies = self.latencies.lock().unwrap_or_else(|e| e.into_inner());
            latencies.iter().copied().collect()
        };
        sorted.sort_by(f64::total_cmp);

        let queries = self.queries.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let cache_hit_rate = if queries == 0 {
            0.0
        } else {
            cache_hits as f64 / queries as f64
        };

        MetricsSummary {
            queries,
            latency_p50_ms: percentile(&sorted, 50.0),
            latency_p95_ms: percentile(&sorted, 95.0),
            latency_p99_ms: percentile(&sorted, 99.0),
            cache_hit_rate,
            documents_indexed,
        }
    }
}

/// Percentile of ascending `sorted` samples, interpolating linearly between
/// the two nearest ranks. Empty input yields zero.
pub fn percentile(sorted: &[f64], pct: f64) -> f64 {
    let (first, last) = match (sorted.first(), sorted.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return 0.0,
    };
    if pct <= 0.0 {
        return first;
    }
    if pct >= 100.0 {
        return last;
    }

    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}
