//! In-memory corpus index.
//!
//! The index is built once at startup, either from the built-in reference
//! corpus or from YAML/JSON files on disk, and is read-only afterwards.
//! There is no partial-index recovery: any load failure is fatal.

use crate::types::{Document, Metadata, MetadataValue};
use docstream_core::{AppError, AppResult};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// A document together with its precomputed searchable text.
#[derive(Debug, Clone)]
pub struct IndexedDocument {
    pub document: Arc<Document>,
    pub title_lower: String,
    pub body_lower: String,
}

impl IndexedDocument {
    fn new(document: Document) -> Self {
        Self {
            title_lower: document.title.to_lowercase(),
            body_lower: document.body.to_lowercase(),
            document: Arc::new(document),
        }
    }
}

/// Read-only collection of documents in corpus order.
#[derive(Debug, Clone)]
pub struct CorpusIndex {
    entries: Vec<IndexedDocument>,
}

/// Shape of a corpus file: either a list of documents or a single one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CorpusFile {
    Many(Vec<Document>),
    One(Document),
}

impl CorpusIndex {
    /// Build an index from documents, rejecting empty sets and duplicate ids.
    pub fn build(documents: Vec<Document>) -> AppResult<Self> {
        if documents.is_empty() {
            return Err(AppError::Corpus("corpus contains no documents".to_string()));
        }

        let mut seen = HashSet::new();
        for doc in &documents {
            if doc.id.trim().is_empty() {
                return Err(AppError::Corpus(format!(
                    "document '{}' has an empty id",
                    doc.title
                )));
            }
            if !seen.insert(doc.id.as_str()) {
                return Err(AppError::Corpus(format!("duplicate document id: {}", doc.id)));
            }
        }

        let entries = documents.into_iter().map(IndexedDocument::new).collect();
        Ok(Self { entries })
    }

    /// The built-in five-document reference corpus.
    pub fn reference() -> Self {
        Self {
            entries: reference_documents()
                .into_iter()
                .map(IndexedDocument::new)
                .collect(),
        }
    }

    /// Load a corpus from a YAML/JSON file or a directory of such files.
    ///
    /// Directories are walked recursively; files are read in path order so
    /// the corpus order is stable across runs.
    pub fn load(path: &Path) -> AppResult<Self> {
        tracing::info!("Loading corpus from {:?}", path);

        let files = if path.is_dir() {
            corpus_files(path)
        } else if path.is_file() {
            vec![path.to_path_buf()]
        } else {
            return Err(AppError::Corpus(format!(
                "corpus path does not exist: {:?}",
                path
            )));
        };

        let mut documents = Vec::new();
        for file in &files {
            documents.extend(read_corpus_file(file)?);
        }

        let index = Self::build(documents)?;
        tracing::info!(
            "Loaded {} documents from {} file(s)",
            index.len(),
            files.len()
        );
        Ok(index)
    }

    /// Load from `path` when given, otherwise fall back to the reference corpus.
    pub fn from_path_or_reference(path: Option<&Path>) -> AppResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                tracing::info!("Using built-in reference corpus");
                Ok(Self::reference())
            }
        }
    }

    /// Full scan over all documents, in corpus order.
    pub fn lookup(&self) -> impl Iterator<Item = &Document> {
        self.entries.iter().map(|e| e.document.as_ref())
    }

    /// Indexed entries with precomputed lower-cased text.
    pub fn entries(&self) -> &[IndexedDocument] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn corpus_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            matches!(
                p.extension().and_then(|ext| ext.to_str()),
                Some("yaml" | "yml" | "json")
            )
        })
        .collect();
    files.sort();
    files
}

fn read_corpus_file(path: &Path) -> AppResult<Vec<Document>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| AppError::Corpus(format!("Failed to read {:?}: {}", path, e)))?;

    // JSON is a subset of YAML, so one parser covers both formats.
    let parsed: CorpusFile = serde_yaml::from_str(&content)
        .map_err(|e| AppError::Corpus(format!("Failed to parse {:?}: {}", path, e)))?;

    let documents = match parsed {
        CorpusFile::Many(docs) => docs,
        CorpusFile::One(doc) => vec![doc],
    };

    tracing::debug!("Read {} documents from {:?}", documents.len(), path);
    Ok(documents)
}

fn doc(id: &str, title: &str, body: &str, meta: &[(&str, MetadataValue)]) -> Document {
    let metadata: Metadata = meta
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();

    Document {
        id: id.to_string(),
        title: title.to_string(),
        body: body.to_string(),
        metadata,
    }
}

fn reference_documents() -> Vec<Document> {
    vec![
        doc(
            "doc_1",
            "Security Protocol Documentation",
            "This document describes what our security protocols are and how they are enforced. \
             All data in transit is protected with TLS 1.3 and data at rest is encrypted with \
             AES-256. Access to production systems requires multi-factor authentication and is \
             granted on a least-privilege basis. Credentials are rotated every 90 days, and all \
             access is logged to a tamper-evident audit trail that the security team reviews weekly.",
            &[
                ("source", "security_protocols.pdf".into()),
                ("category", "security".into()),
                ("page", 1i64.into()),
            ],
        ),
        doc(
            "doc_2",
            "Q3 Financial Report",
            "Revenue for the third quarter grew 18% year over year, driven by enterprise \
             subscriptions and expansion in existing accounts. Gross margin improved to 74% as \
             infrastructure costs were consolidated. Operating expenses stayed within budget, and \
             the company closed the quarter with eleven months of runway at the current burn rate. \
             Deferred revenue rose 22%, indicating strong bookings heading into Q4.",
            &[
                ("source", "q3_financial_report.pdf".into()),
                ("category", "finance".into()),
                ("page", 3i64.into()),
            ],
        ),
        doc(
            "doc_3",
            "Performance Optimization Guide",
            "Query latency is dominated by retrieval and generation. Caching repeated queries cuts \
             median latency by more than half, and batching embedding requests improves \
             throughput under load. Profile before optimizing: measure p50, p95 and p99 latency, \
             identify the slowest stage, and set a budget per stage. Connection pooling and \
             streaming responses reduce perceived latency for end users.",
            &[
                ("source", "performance_guide.md".into()),
                ("category", "engineering".into()),
            ],
        ),
        doc(
            "doc_4",
            "System Architecture Overview",
            "The platform is composed of an ingestion service, a hybrid retrieval layer that \
             combines vector and lexical search, a reranking stage, and a generation service that \
             streams answers to clients. Components communicate over HTTP and share no mutable \
             state; the document index is read-only at query time. Each service scales \
             horizontally behind a load balancer.",
            &[
                ("source", "architecture_overview.md".into()),
                ("category", "engineering".into()),
            ],
        ),
        doc(
            "doc_5",
            "Employee Onboarding Handbook",
            "Welcome to the team. During the first week new hires set up their workstation, \
             complete compliance training, and meet their onboarding buddy. Benefits enrollment \
             must be completed within thirty days of the start date. Questions about payroll, \
             equipment, or time off go to the people operations team through the internal help desk.",
            &[
                ("source", "onboarding_handbook.pdf".into()),
                ("category", "hr".into()),
            ],
        ),
    ]
}
