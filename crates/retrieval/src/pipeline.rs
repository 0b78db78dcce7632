//! Query pipeline: corpus lookup, scoring, synthesis and caching.
//!
//! The pipeline is synchronous; it runs to completion before the caller
//! starts emitting frames.

use crate::cache::{CacheStats, ResultCache};
use crate::corpus::CorpusIndex;
use crate::scorer::{LexicalScorer, RelevanceScorer};
use crate::synthesizer::{AnswerSynthesizer, Synthesis};
use docstream_core::{AppConfig, AppError, AppResult};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Message returned for a missing or blank query.
pub const QUERY_REQUIRED: &str = "Query is required";

/// Output of [`Pipeline::answer`].
#[derive(Debug, Clone)]
pub struct Answered {
    pub synthesis: Synthesis,
    pub cache_hit: bool,
    /// Time spent in lookup and scoring (zero-ish on a cache hit)
    pub retrieval_ms: f64,
}

/// End-to-end answering pipeline shared by all requests.
#[derive(Debug, Clone)]
pub struct Pipeline {
    corpus: Arc<CorpusIndex>,
    scorer: Arc<dyn RelevanceScorer>,
    synthesizer: AnswerSynthesizer,
    cache: Option<Arc<ResultCache>>,
    top_k: usize,
}

impl Pipeline {
    /// Create a pipeline over `corpus` with the lexical scorer and default rules.
    pub fn new(corpus: CorpusIndex) -> Self {
        Self {
            corpus: Arc::new(corpus),
            scorer: Arc::new(LexicalScorer::new()),
            synthesizer: AnswerSynthesizer::default(),
            cache: None,
            top_k: 3,
        }
    }

    /// Build a pipeline from configuration, loading the corpus.
    ///
    /// Fails if the configured corpus cannot be loaded.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let corpus = CorpusIndex::from_path_or_reference(config.retrieval.corpus.as_deref())?;

        let mut pipeline = Self::new(corpus)
            .with_top_k(config.retrieval.top_k)
            .with_synthesizer(
                AnswerSynthesizer::default().with_excerpt_chars(config.retrieval.excerpt_chars),
            );

        if config.cache.enabled {
            pipeline = pipeline.with_cache(ResultCache::new(
                Duration::from_secs(config.cache.ttl_secs),
                config.cache.capacity,
            ));
        }

        Ok(pipeline)
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn RelevanceScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_synthesizer(mut self, synthesizer: AnswerSynthesizer) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn corpus(&self) -> &CorpusIndex {
        &self.corpus
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }

    /// Answer a query.
    ///
    /// Returns [`AppError::Input`] when the query is empty or blank.
    pub fn answer(&self, query: &str) -> AppResult<Answered> {
        if query.trim().is_empty() {
            return Err(AppError::Input(QUERY_REQUIRED.to_string()));
        }

        let start = Instant::now();

        if let Some(cached) = self.cache.as_ref().and_then(|c| c.get(query)) {
            return Ok(Answered {
                synthesis: cached,
                cache_hit: true,
                retrieval_ms: elapsed_ms(start),
            });
        }

        let scored = self.scorer.score(query, &self.corpus, self.top_k);
        let retrieval_ms = elapsed_ms(start);

        tracing::info!(
            "Retrieved {} documents with {} scorer in {:.2}ms",
            scored.len(),
            self.scorer.name(),
            retrieval_ms
        );

        let synthesis = self.synthesizer.synthesize(query, &scored);

        if let Some(cache) = &self.cache {
            cache.insert(query, synthesis.clone());
        }

        Ok(Answered {
            synthesis,
            cache_hit: false,
            retrieval_ms,
        })
    }
}

/// Milliseconds elapsed since `start`, as a float.
pub fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_query_is_input_error() {
        let pipeline = Pipeline::new(CorpusIndex::reference());
        for query in ["", "   ", "\n\t"] {
            match pipeline.answer(query) {
                Err(AppError::Input(msg)) => assert_eq!(msg, QUERY_REQUIRED),
                other => panic!("expected input error, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_cache_hit_on_repeat() {
        let pipeline = Pipeline::new(CorpusIndex::reference())
            .with_cache(ResultCache::new(Duration::from_secs(60), 16));

        let first = pipeline.answer("What are our security protocols?").unwrap();
        let second = pipeline.answer("what are our  security protocols?").unwrap();

        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert_eq!(first.synthesis, second.synthesis);
        assert_eq!(pipeline.cache_stats().unwrap().hits, 1);
    }

    #[test]
    fn test_cached_and_uncached_answers_agree() {
        let uncached = Pipeline::new(CorpusIndex::reference());
        let cached = Pipeline::new(CorpusIndex::reference())
            .with_cache(ResultCache::new(Duration::from_secs(60), 16));

        // Warm the cache with the single-spaced form first.
        cached.answer("access control rules").unwrap();

        for query in ["access  control rules", "system   design notes"] {
            let fresh = uncached.answer(query).unwrap().synthesis;
            let from_cache = cached.answer(query).unwrap().synthesis;
            assert_eq!(fresh, from_cache, "query {query:?}");
        }
        assert!(cached.answer("access  control rules").unwrap().cache_hit);
    }

    #[test]
    fn test_without_cache_never_hits() {
        let pipeline = Pipeline::new(CorpusIndex::reference());
        pipeline.answer("revenue").unwrap();
        assert!(!pipeline.answer("revenue").unwrap().cache_hit);
        assert!(pipeline.cache_stats().is_none());
    }

    #[test]
    fn test_from_config_honours_top_k() {
        let mut config = AppConfig::default();
        config.retrieval.top_k = 1;
        config.cache.enabled = false;

        let pipeline = Pipeline::from_config(&config).unwrap();
        let answered = pipeline.answer("the").unwrap();
        assert_eq!(answered.synthesis.sources.len(), 1);
    }

    #[test]
    fn test_from_config_fails_on_missing_corpus() {
        let mut config = AppConfig::default();
        config.retrieval.corpus = Some("/nonexistent/docstream/corpus".into());
        assert!(matches!(
            Pipeline::from_config(&config),
            Err(AppError::Corpus(_))
        ));
    }
}
