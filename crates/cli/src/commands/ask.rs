//! Ask command handler.
//!
//! Submits a query to a running server through a [`Session`], printing
//! tokens as they arrive.

use clap::Args;
use docstream_core::{config::AppConfig, AppError, AppResult};
use docstream_retrieval::{MetadataValue, Source};
use docstream_stream::{Frame, Message, QueryClient, Session};
use std::io::Write;

/// Ask a question against a running server
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub query: String,

    /// Request a single JSON response instead of a stream
    #[arg(long)]
    pub no_stream: bool,

    /// Output the assembled message as JSON
    #[arg(long)]
    pub json: bool,

    /// Server base URL including the API prefix
    #[arg(long, env = "DOCSTREAM_SERVER_URL")]
    pub server: Option<String>,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let server_url = self
            .server
            .clone()
            .unwrap_or_else(|| config.client.server_url.clone());
        let client = QueryClient::new(server_url);
        let mut session = Session::new();

        let result = if self.no_stream {
            session.ask(&client, &self.query).await
        } else {
            let print_tokens = !self.json;
            session
                .ask_stream(&client, &self.query, |frame| {
                    if let Frame::Token { content } = frame {
                        if print_tokens {
                            // Stream to stdout in real-time
                            print!("{}", content);
                            std::io::stdout().flush().ok();
                        }
                    }
                })
                .await
        };

        let last = session
            .transcript()
            .last()
            .ok_or_else(|| AppError::Other("No answer recorded".to_string()))?;

        if self.json {
            let json = serde_json::to_string_pretty(last)?;
            println!("{}", json);
            return result;
        }

        match result {
            Ok(()) => {
                if self.no_stream {
                    print!("{}", last.content);
                }
                println!();
                print_attachments(last);
                Ok(())
            }
            Err(e) => {
                // Start a fresh line after any partial answer.
                println!();
                println!("{}", last.content);
                Err(e)
            }
        }
    }
}

fn print_attachments(message: &Message) {
    if let Some(sources) = &message.sources {
        if !sources.is_empty() {
            println!();
            println!("Sources:");
            for (i, source) in sources.iter().enumerate() {
                println!("  [{}] {} ({:.3})", i + 1, source_title(source), source.relevance);
            }
        }
    }

    if let Some(metrics) = &message.metrics {
        tracing::info!(
            "Latency {:.1}ms (retrieval ~{:.1}ms, generation ~{:.1}ms, cache {})",
            metrics.total_ms,
            metrics.retrieval_ms,
            metrics.generation_ms,
            if metrics.cache_hit { "hit" } else { "miss" }
        );
    }
}

fn source_title(source: &Source) -> &str {
    match source.metadata.get("title") {
        Some(MetadataValue::Text(title)) => title,
        _ => "untitled",
    }
}
