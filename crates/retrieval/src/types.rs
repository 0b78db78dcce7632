//! Retrieval type definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Marker appended to excerpts cut short by [`Source::project`].
pub const TRUNCATION_MARKER: &str = "...";

/// A scalar metadata value attached to a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

/// Document metadata, ordered by key so serialized output is stable.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A document held by the corpus index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier within the corpus
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// Full document text
    pub body: String,

    /// Free-form scalar metadata (source file, category, author, ...)
    #[serde(default)]
    pub metadata: Metadata,
}

/// A document paired with its relevance to one query.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: Arc<Document>,

    /// Relevance in `[0.8, 1.0)`; higher renders first
    pub relevance: f64,
}

/// Client-visible projection of a [`ScoredDocument`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Document body, truncated with [`TRUNCATION_MARKER`] when too long
    pub excerpt: String,

    #[serde(default)]
    pub metadata: Metadata,

    pub relevance: f64,
}

impl Source {
    /// Project a scored document, cutting the body to `max_chars` characters.
    ///
    /// The document title and id are carried in metadata so clients can label
    /// the excerpt without a second lookup.
    pub fn project(scored: &ScoredDocument, max_chars: usize) -> Self {
        let doc = &scored.document;

        let mut metadata = doc.metadata.clone();
        metadata
            .entry("title".to_string())
            .or_insert_with(|| MetadataValue::Text(doc.title.clone()));
        metadata
            .entry("document_id".to_string())
            .or_insert_with(|| MetadataValue::Text(doc.id.clone()));

        Self {
            excerpt: excerpt(&doc.body, max_chars),
            metadata,
            relevance: scored.relevance,
        }
    }
}

/// Truncate `body` to `max_chars` characters, appending the truncation marker.
pub fn excerpt(body: &str, max_chars: usize) -> String {
    match body.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &body[..cut], TRUNCATION_MARKER),
        None => body.to_string(),
    }
}
