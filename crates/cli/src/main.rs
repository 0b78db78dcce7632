//! Docstream CLI
//!
//! Main entry point for the docstream command-line tool.
//! Runs the streaming QA server, asks questions against it, and inspects
//! the document corpus.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, CorpusCommand, ServeCommand};
use docstream_core::{config::AppConfig, logging, AppResult};
use std::path::PathBuf;

/// Docstream - streaming question answering over a document corpus
#[derive(Parser, Debug)]
#[command(name = "docstream")]
#[command(about = "Streaming question answering over a document corpus", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server
    Serve(ServeCommand),

    /// Ask a question against a running server
    Ask(AskCommand),

    /// List corpus documents or score a query locally
    Corpus(CorpusCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Load base configuration from file and environment
    let config = AppConfig::load()?;

    // Apply CLI overrides
    let config = config.with_overrides(cli.config, cli.log_level, cli.verbose, cli.no_color)?;
    config.validate()?;

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("Docstream CLI starting");
    tracing::debug!("Config file: {:?}", config.config_file);

    let command_name = match &cli.command {
        Commands::Serve(_) => "serve",
        Commands::Ask(_) => "ask",
        Commands::Corpus(_) => "corpus",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    // Route to command handlers
    let result = match cli.command {
        Commands::Serve(cmd) => cmd.execute(&config).await,
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Corpus(cmd) => cmd.execute(&config),
    };

    // Log completion
    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
