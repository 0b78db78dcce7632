//! Document retrieval and answer synthesis.
//!
//! Provides the server-side half of a docstream query: an in-memory corpus,
//! a relevance scorer, an intent-table answer synthesizer, and a result cache,
//! tied together by [`Pipeline`].

pub mod cache;
pub mod corpus;
pub mod pipeline;
pub mod scorer;
pub mod synthesizer;
pub mod types;


// Re-export commonly used types
pub use cache::{CacheStats, ResultCache};
pub use corpus::CorpusIndex;
pub use pipeline::{Answered, Pipeline, QUERY_REQUIRED};
pub use scorer::{LexicalScorer, RelevanceScorer};
pub use synthesizer::{AnswerSynthesizer, Intent, IntentRule, Synthesis};
pub use types::{Document, Metadata, MetadataValue, ScoredDocument, Source};
