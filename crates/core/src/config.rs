//! Configuration management for docstream.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Built-in defaults
//! - A YAML config file (`docstream.yaml` or `DOCSTREAM_CONFIG`)
//! - Environment variables (`DOCSTREAM_*`)
//! - Command-line flags
//!
//! Later sources override earlier ones.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Default config file name, looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = "docstream.yaml";

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Optional config file path
    #[serde(skip)]
    pub config_file: Option<PathBuf>,

    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Corpus and scoring settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Result cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Frame encoding settings
    #[serde(default)]
    pub stream: StreamConfig,

    /// Settings used by `docstream ask`
    #[serde(default)]
    pub client: ClientConfig,

    /// Log level override
    #[serde(default)]
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    #[serde(default)]
    pub verbose: bool,

    /// Disable colored output
    #[serde(default)]
    pub no_color: bool,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind (e.g. "127.0.0.1:8000")
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Prefix for every route (e.g. "/api")
    #[serde(default = "default_api_prefix", rename = "apiPrefix")]
    pub api_prefix: String,

    /// Artificial processing delay standing in for real retrieval latency
    #[serde(default)]
    pub delay: DelayConfig,
}

/// Bounds of the artificial processing delay, in milliseconds.
///
/// The actual delay for a query is picked deterministically inside
/// `[min_ms, max_ms]`. Both zero disables the delay.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DelayConfig {
    #[serde(default, rename = "minMs")]
    pub min_ms: u64,

    #[serde(default, rename = "maxMs")]
    pub max_ms: u64,
}

/// Retrieval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of scored documents kept per query
    #[serde(default = "default_top_k", rename = "topK")]
    pub top_k: usize,

    /// Maximum excerpt length (in characters) before truncation
    #[serde(default = "default_excerpt_chars", rename = "excerptChars")]
    pub excerpt_chars: usize,

    /// Corpus file or directory; the built-in reference corpus when unset
    #[serde(default)]
    pub corpus: Option<PathBuf>,
}

/// Result cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cache_ttl", rename = "ttlSecs")]
    pub ttl_secs: u64,

    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

/// Frame encoding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Words carried by each token frame
    #[serde(default = "default_words_per_token", rename = "wordsPerToken")]
    pub words_per_token: usize,
}

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of a running docstream server, including the API prefix
    #[serde(default = "default_server_url", rename = "serverUrl")]
    pub server_url: String,
}

/// Logging section of the YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

/// Full configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    server: Option<ServerConfig>,
    retrieval: Option<RetrievalConfig>,
    cache: Option<CacheConfig>,
    stream: Option<StreamConfig>,
    client: Option<ClientConfig>,
    logging: Option<LoggingConfig>,
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_api_prefix() -> String {
    "/api".to_string()
}

fn default_top_k() -> usize {
    3
}

fn default_excerpt_chars() -> usize {
    200
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_cache_capacity() -> usize {
    1024
}

fn default_words_per_token() -> usize {
    1
}

fn default_server_url() -> String {
    "http://127.0.0.1:8000/api".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            api_prefix: default_api_prefix(),
            delay: DelayConfig::default(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            excerpt_chars: default_excerpt_chars(),
            corpus: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_cache_ttl(),
            capacity: default_cache_capacity(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            words_per_token: default_words_per_token(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_file: None,
            server: ServerConfig::default(),
            retrieval: RetrievalConfig::default(),
            cache: CacheConfig::default(),
            stream: StreamConfig::default(),
            client: ClientConfig::default(),
            log_level: None,
            verbose: false,
            no_color: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the config file, environment variables and defaults.
    ///
    /// Environment variables:
    /// - `DOCSTREAM_CONFIG`: Path to config file
    /// - `DOCSTREAM_BIND`: Server bind address
    /// - `DOCSTREAM_CORPUS`: Corpus file or directory
    /// - `DOCSTREAM_TOP_K`: Number of documents kept per query
    /// - `DOCSTREAM_SERVER_URL`: Server URL used by the client
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use docstream_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Binding to {}", config.server.bind);
    /// ```
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(config_file) = std::env::var("DOCSTREAM_CONFIG") {
            let path = PathBuf::from(config_file);
            if !path.exists() {
                return Err(AppError::Config(format!(
                    "Config file does not exist: {:?}",
                    path
                )));
            }
            config.config_file = Some(path);
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        config.apply_env()?;
        config.validate()?;

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    pub fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();
        result.config_file = Some(path.to_path_buf());

        if let Some(server) = config_file.server {
            result.server = server;
        }
        if let Some(retrieval) = config_file.retrieval {
            result.retrieval = retrieval;
        }
        if let Some(cache) = config_file.cache {
            result.cache = cache;
        }
        if let Some(stream) = config_file.stream {
            result.stream = stream;
        }
        if let Some(client) = config_file.client {
            result.client = client;
        }
        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        tracing::debug!("Merged config file {:?}", path);
        Ok(result)
    }

    /// Apply `DOCSTREAM_*` environment variables on top of the current values.
    fn apply_env(&mut self) -> AppResult<()> {
        if let Ok(bind) = std::env::var("DOCSTREAM_BIND") {
            self.server.bind = bind;
        }

        if let Ok(corpus) = std::env::var("DOCSTREAM_CORPUS") {
            self.retrieval.corpus = Some(PathBuf::from(corpus));
        }

        if let Ok(top_k) = std::env::var("DOCSTREAM_TOP_K") {
            self.retrieval.top_k = top_k.parse().map_err(|_| {
                AppError::Config(format!("DOCSTREAM_TOP_K is not a number: {}", top_k))
            })?;
        }

        if let Ok(url) = std::env::var("DOCSTREAM_SERVER_URL") {
            self.client.server_url = url;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            self.no_color = true;
        }

        Ok(())
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over the config file and
    /// environment variables.
    pub fn with_overrides(
        mut self,
        config_file: Option<PathBuf>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> AppResult<Self> {
        if let Some(config_file) = config_file {
            self = self.merge_yaml(&config_file)?;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        Ok(self)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> AppResult<()> {
        if self.retrieval.top_k == 0 {
            return Err(AppError::Config("retrieval.topK must be >= 1".to_string()));
        }

        if self.retrieval.excerpt_chars == 0 {
            return Err(AppError::Config(
                "retrieval.excerptChars must be >= 1".to_string(),
            ));
        }

        if self.stream.words_per_token == 0 {
            return Err(AppError::Config(
                "stream.wordsPerToken must be >= 1".to_string(),
            ));
        }

        if self.server.delay.min_ms > self.server.delay.max_ms {
            return Err(AppError::Config(format!(
                "server.delay.minMs ({}) must not exceed maxMs ({})",
                self.server.delay.min_ms, self.server.delay.max_ms
            )));
        }

        if !self.server.api_prefix.is_empty() && !self.server.api_prefix.starts_with('/') {
            return Err(AppError::Config(format!(
                "server.apiPrefix must start with '/': {}",
                self.server.api_prefix
            )));
        }

        Ok(())
    }
}
