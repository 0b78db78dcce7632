//! Artificial processing delay.
//!
//! Stands in for retrieval and generation latency. The delay for a query is
//! picked from `[min_ms, max_ms]` by hashing the query, so the same query
//! always waits the same amount.

use docstream_core::config::DelayConfig;
use sha2::{Digest, Sha256};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessingDelay {
    min_ms: u64,
    max_ms: u64,
}

impl ProcessingDelay {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms: min_ms.min(max_ms),
            max_ms: max_ms.max(min_ms),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_none(&self) -> bool {
        self.max_ms == 0
    }

    /// Delay to apply for `query`.
    pub fn for_query(&self, query: &str) -> Duration {
        let span = self.max_ms - self.min_ms;
        if span == 0 {
            return Duration::from_millis(self.min_ms);
        }

        let digest = Sha256::digest(query.as_bytes());
        let mut seed = [0u8; 8];
        seed.copy_from_slice(&digest[..8]);
        let offset = u64::from_be_bytes(seed) % (span + 1);

        Duration::from_millis(self.min_ms + offset)
    }

    /// Sleep for the query's delay.
    pub async fn wait(&self, query: &str) {
        if self.is_none() {
            return;
        }
        let delay = self.for_query(query);
        tracing::debug!("Simulating {}ms processing delay", delay.as_millis());
        tokio::time::sleep(delay).await;
    }
}

impl From<&DelayConfig> for ProcessingDelay {
    fn from(config: &DelayConfig) -> Self {
        Self::new(config.min_ms, config.max_ms)
    }
}
