//! Relevance scoring.
//!
//! A scorer turns a raw query and the corpus into a ranked, truncated list of
//! [`ScoredDocument`]s. The [`LexicalScorer`] is a deterministic stand-in for
//! embedding or BM25 similarity; any replacement must keep the same contract:
//! relevance in `[0.8, 1.0)`, descending order, at most `top_k` results.

use crate::corpus::{CorpusIndex, IndexedDocument};
use crate::types::ScoredDocument;

/// Lowest relevance a candidate can receive.
pub const BASELINE_RELEVANCE: f64 = 0.8;

/// Width of the relevance band above the baseline.
pub const RELEVANCE_SPAN: f64 = 0.2;

/// Largest representable relevance strictly below 1.0.
const MAX_RELEVANCE: f64 = 1.0 - f64::EPSILON;

/// Tokens of this many characters or fewer are discarded.
const MIN_TOKEN_CHARS: usize = 2;

/// Weight of a query token found in a document title.
const TITLE_WEIGHT: f64 = 2.0;

/// Weight of a query token found only in a document body.
const BODY_WEIGHT: f64 = 1.0;

/// Trait for relevance scorers.
pub trait RelevanceScorer: Send + Sync + std::fmt::Debug {
    /// Scorer name, used in logs.
    fn name(&self) -> &str;

    /// Score `corpus` against `query`, returning at most `top_k` documents
    /// ordered by relevance descending.
    fn score(&self, query: &str, corpus: &CorpusIndex, top_k: usize) -> Vec<ScoredDocument>;
}

/// Split a query into lower-cased search tokens longer than two characters.
pub fn tokenize(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .filter(|t| t.chars().count() > MIN_TOKEN_CHARS)
        .map(str::to_string)
        .collect()
}

/// Substring-matching scorer over titles and bodies.
///
/// A document is a candidate when any token occurs in its title or body.
/// Candidates are scored by the share of query tokens they contain, with
/// title hits counting double, mapped into the relevance band.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalScorer;

impl LexicalScorer {
    pub fn new() -> Self {
        Self
    }

    /// Similarity in `[0, 1)`, or `None` when no token matches.
    fn similarity(tokens: &[String], entry: &IndexedDocument) -> Option<f64> {
        let mut matched = 0.0;
        for token in tokens {
            if entry.title_lower.contains(token.as_str()) {
                matched += TITLE_WEIGHT;
            } else if entry.body_lower.contains(token.as_str()) {
                matched += BODY_WEIGHT;
            }
        }

        if matched == 0.0 {
            return None;
        }

        let max_weight = TITLE_WEIGHT * tokens.len() as f64;
        Some(matched / (max_weight + 1.0))
    }
}

impl RelevanceScorer for LexicalScorer {
    fn name(&self) -> &str {
        "lexical"
    }

    fn score(&self, query: &str, corpus: &CorpusIndex, top_k: usize) -> Vec<ScoredDocument> {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            tracing::debug!("Query has no searchable tokens");
            return Vec::new();
        }

        let mut scored: Vec<ScoredDocument> = corpus
            .entries()
            .iter()
            .filter_map(|entry| {
                Self::similarity(&tokens, entry).map(|similarity| ScoredDocument {
                    document: entry.document.clone(),
                    relevance: relevance_from_similarity(similarity),
                })
            })
            .collect();

        let candidates = scored.len();

        // Stable sort: ties keep corpus order.
        scored.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
        scored.truncate(top_k);

        tracing::debug!(
            "Scored {} candidates for {} tokens, kept {}",
            candidates,
            tokens.len(),
            scored.len()
        );

        scored
    }
}

/// Map a similarity in `[0, 1]` into the relevance band `[0.8, 1.0)`.
pub fn relevance_from_similarity(similarity: f64) -> f64 {
    let similarity = similarity.clamp(0.0, 1.0);
    (BASELINE_RELEVANCE + RELEVANCE_SPAN * similarity).min(MAX_RELEVANCE)
}
