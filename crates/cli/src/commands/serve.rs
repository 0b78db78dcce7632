//! Serve command handler.

use clap::Args;
use docstream_core::{config::AppConfig, AppResult};
use std::path::PathBuf;

/// Run the HTTP server
#[derive(Args, Debug)]
pub struct ServeCommand {
    /// Address to bind, e.g. 127.0.0.1:8000
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Corpus file or directory (default: built-in reference corpus)
    #[arg(long)]
    pub corpus: Option<PathBuf>,

    /// Number of sources returned per query
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Words per streamed token frame
    #[arg(long)]
    pub words_per_token: Option<usize>,

    /// Disable the result cache
    #[arg(long)]
    pub no_cache: bool,
}

impl ServeCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing serve command");
        tracing::debug!("Serve options: {:?}", self);

        let config = self.apply(config.clone());
        config.validate()?;

        docstream_server::run_server(&config).await
    }

    fn apply(&self, mut config: AppConfig) -> AppConfig {
        if let Some(bind) = &self.bind {
            config.server.bind = bind.clone();
        }
        if let Some(corpus) = &self.corpus {
            config.retrieval.corpus = Some(corpus.clone());
        }
        if let Some(top_k) = self.top_k {
            config.retrieval.top_k = top_k;
        }
        if let Some(words) = self.words_per_token {
            config.stream.words_per_token = words;
        }
        if self.no_cache {
            config.cache.enabled = false;
        }
        config
    }
}
