use crate::delay::ProcessingDelay;
use crate::metrics::MetricsCollector;
use docstream_core::{AppConfig, AppResult};
use docstream_retrieval::Pipeline;
use std::sync::Arc;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Read-only corpus, scorer and synthesizer plus the shared result cache
    pub pipeline: Arc<Pipeline>,

    /// Words carried by each token frame
    pub words_per_token: usize,

    pub delay: ProcessingDelay,

    /// Latency and cache-hit samples for `GET {prefix}/metrics`
    pub metrics: Arc<MetricsCollector>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            words_per_token: 1,
            delay: ProcessingDelay::none(),
            metrics: Arc::new(MetricsCollector::new()),
        }
    }

    /// Build state from configuration, loading the corpus.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let pipeline = Pipeline::from_config(config)?;
        Ok(Self {
            pipeline: Arc::new(pipeline),
            words_per_token: config.stream.words_per_token,
            delay: ProcessingDelay::from(&config.server.delay),
            metrics: Arc::new(MetricsCollector::new()),
        })
    }

    pub fn with_words_per_token(mut self, words_per_token: usize) -> Self {
        self.words_per_token = words_per_token.max(1);
        self
    }

    pub fn with_delay(mut self, delay: ProcessingDelay) -> Self {
        self.delay = delay;
        self
    }
}
