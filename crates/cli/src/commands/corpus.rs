//! Corpus command handler.
//!
//! Inspects the corpus the server would load, without the network.

use clap::Args;
use docstream_core::{config::AppConfig, AppResult};
use docstream_retrieval::{CorpusIndex, LexicalScorer, RelevanceScorer, ScoredDocument};
use std::path::PathBuf;

/// List corpus documents or score a query locally
#[derive(Args, Debug)]
pub struct CorpusCommand {
    /// Corpus file or directory (default: configured corpus or the built-in one)
    #[arg(long)]
    pub corpus: Option<PathBuf>,

    /// Score this query against the corpus instead of listing documents
    #[arg(short, long)]
    pub query: Option<String>,

    /// Number of results when scoring a query
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl CorpusCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing corpus command");
        tracing::debug!("Corpus options: {:?}", self);

        let path = self.corpus.as_deref().or(config.retrieval.corpus.as_deref());
        let corpus = CorpusIndex::from_path_or_reference(path)?;
        tracing::info!("Loaded {} documents", corpus.len());

        match &self.query {
            Some(query) => {
                let top_k = self.top_k.unwrap_or(config.retrieval.top_k);
                let scored = LexicalScorer::new().score(query, &corpus, top_k);
                self.print_scored(&scored)
            }
            None => self.print_documents(&corpus),
        }
    }

    fn print_documents(&self, corpus: &CorpusIndex) -> AppResult<()> {
        if self.json {
            let docs: Vec<_> = corpus.lookup().collect();
            println!("{}", serde_json::to_string_pretty(&docs)?);
            return Ok(());
        }

        for doc in corpus.lookup() {
            println!("{:<12} {} ({} chars)", doc.id, doc.title, doc.body.chars().count());
        }
        Ok(())
    }

    fn print_scored(&self, scored: &[ScoredDocument]) -> AppResult<()> {
        if self.json {
            let rows: Vec<_> = scored
                .iter()
                .map(|s| {
                    serde_json::json!({
                        "id": s.document.id,
                        "title": s.document.title,
                        "relevance": s.relevance,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
            return Ok(());
        }

        if scored.is_empty() {
            println!("No matching documents");
        }
        for s in scored {
            println!("{:.4}  {:<12} {}", s.relevance, s.document.id, s.document.title);
        }
        Ok(())
    }
}
