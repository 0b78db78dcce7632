//! Query result cache.
//!
//! Caches synthesized answers keyed by a SHA-256 digest of the normalized
//! query. Entries expire after a TTL and the oldest entry is evicted once the
//! cache reaches capacity. This is the only state shared between requests.

use crate::synthesizer::Synthesis;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Synthesis,
    inserted_at: Instant,
}

/// Hit/miss counters exposed by the health endpoint.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// TTL-bounded cache of query results.
#[derive(Debug)]
pub struct ResultCache {
    ttl: Duration,
    capacity: usize,
    entries: RwLock<HashMap<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Normalize a query for caching: trim, lower-case, collapse whitespace.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cache key for a query: hex SHA-256 of its normalized form.
pub fn cache_key(query: &str) -> String {
    let digest = Sha256::digest(normalize_query(query).as_bytes());
    hex::encode(digest)
}

impl ResultCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a fresh entry for `query`.
    pub fn get(&self, query: &str) -> Option<Synthesis> {
        let key = cache_key(query);
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());

        match entries.get(&key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Cache hit for key {}", &key[..12]);
                Some(entry.value.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a result, evicting expired entries and then the oldest if full.
    pub fn insert(&self, query: &str, value: Synthesis) {
        let key = cache_key(query);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());

        let ttl = self.ttl;
        entries.retain(|_, entry| entry.inserted_at.elapsed() < ttl);

        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: entries.len(),
        }
    }
}
