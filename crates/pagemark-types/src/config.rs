//! Configuration loading for pagemark.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/pagemark/config.toml.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::PagemarkError;

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    /// Provider name ("openai" for any OpenAI-compatible endpoint, "hash" for offline)
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// Model name (e.g., "text-embedding-3-small")
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// API key (loaded from env var, not stored in config file)
    #[serde(default)]
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    #[serde(default)]
    pub api_base_url: Option<String>,

    /// Embedding dimension (must match the model and the vector index)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dimension() -> usize {
    1536
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            api_key: None,
            api_base_url: None,
            dimension: default_embedding_dimension(),
        }
    }
}

impl EmbeddingSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.dimension == 0 {
            return Err("embedding.dimension must be > 0".to_string());
        }
        match self.provider.as_str() {
            "openai" | "hash" => Ok(()),
            other => Err(format!("unknown embedding provider: {}", other)),
        }
    }
}

/// Summarizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerSettings {
    /// Provider name ("openai", "anthropic", "mock")
    #[serde(default = "default_summarizer_provider")]
    pub provider: String,

    /// Model name (e.g., "gpt-4o-mini", "claude-3-haiku")
    #[serde(default = "default_summarizer_model")]
    pub model: String,

    /// API key (loaded from env var, not stored in config file)
    #[serde(default)]
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    #[serde(default)]
    pub api_base_url: Option<String>,
}

fn default_summarizer_provider() -> String {
    "openai".to_string()
}

fn default_summarizer_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self {
            provider: default_summarizer_provider(),
            model: default_summarizer_model(),
            api_key: None,
            api_base_url: None,
        }
    }
}

impl SummarizerSettings {
    pub fn validate(&self) -> Result<(), String> {
        match self.provider.as_str() {
            "openai" | "anthropic" | "mock" => Ok(()),
            other => Err(format!("unknown summarizer provider: {}", other)),
        }
    }
}

/// Delayed indexing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Delay between a bookmark being added and its page being indexed.
    /// Bookmarks removed within this window never reach the providers.
    #[serde(default = "default_index_delay_secs")]
    pub index_delay_secs: u64,
}

fn default_index_delay_secs() -> u64 {
    180
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            index_delay_secs: default_index_delay_secs(),
        }
    }
}

impl SchedulerSettings {
    pub fn index_delay(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.index_delay_secs)
    }
}

/// Two-phase search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Number of results returned when the caller does not ask for a count
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Coarse candidates requested per wanted result
    #[serde(default = "default_coarse_multiplier")]
    pub coarse_multiplier: usize,

    /// Upper bound on coarse candidates
    #[serde(default = "default_coarse_ceiling")]
    pub coarse_ceiling: usize,

    /// Page embeddings requested concurrently during rerank
    #[serde(default = "default_rerank_concurrency")]
    pub rerank_concurrency: usize,
}

fn default_top_k() -> usize {
    5
}

fn default_coarse_multiplier() -> usize {
    4
}

fn default_coarse_ceiling() -> usize {
    50
}

fn default_rerank_concurrency() -> usize {
    4
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            coarse_multiplier: default_coarse_multiplier(),
            coarse_ceiling: default_coarse_ceiling(),
            rerank_concurrency: default_rerank_concurrency(),
        }
    }
}

impl SearchSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.coarse_multiplier == 0 {
            return Err("search.coarse_multiplier must be > 0".to_string());
        }
        if self.rerank_concurrency == 0 {
            return Err("search.rerank_concurrency must be > 0".to_string());
        }
        Ok(())
    }

    /// Number of coarse candidates to request for `top_k` results.
    pub fn coarse_candidates(&self, top_k: usize) -> usize {
        let ceiling = self.coarse_ceiling.max(top_k);
        top_k.saturating_mul(self.coarse_multiplier).clamp(top_k, ceiling)
    }
}

/// Rate-limit retry configuration for batch operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Retries per item after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Back-off used when the provider gives no retry hint
    #[serde(default = "default_backoff_secs")]
    pub default_backoff_secs: u64,

    /// Fixed pause between items of a batch
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_secs() -> u64 {
    30
}

fn default_throttle_ms() -> u64 {
    1000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            default_backoff_secs: default_backoff_secs(),
            throttle_ms: default_throttle_ms(),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to RocksDB metadata directory
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Path to HNSW vector index directory
    #[serde(default = "default_vector_index_path")]
    pub vector_index_path: String,

    /// Directory holding extracted page text (`<doc>/<page>.txt`)
    #[serde(default = "default_pages_dir")]
    pub pages_dir: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub embedding: EmbeddingSettings,

    #[serde(default)]
    pub summarizer: SummarizerSettings,

    #[serde(default)]
    pub scheduler: SchedulerSettings,

    #[serde(default)]
    pub search: SearchSettings,

    #[serde(default)]
    pub retry: RetrySettings,
}

fn data_dir(name: &str) -> String {
    ProjectDirs::from("", "", "pagemark")
        .map(|p| p.data_local_dir().join(name))
        .unwrap_or_else(|| PathBuf::from(".").join(name))
        .to_string_lossy()
        .to_string()
}

fn default_db_path() -> String {
    data_dir("db")
}

fn default_vector_index_path() -> String {
    data_dir("vector-index")
}

fn default_pages_dir() -> String {
    data_dir("pages")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            vector_index_path: default_vector_index_path(),
            pages_dir: default_pages_dir(),
            log_level: default_log_level(),
            embedding: EmbeddingSettings::default(),
            summarizer: SummarizerSettings::default(),
            scheduler: SchedulerSettings::default(),
            search: SearchSettings::default(),
            retry: RetrySettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/pagemark/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (PAGEMARK_*, nested keys joined with `__`)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, PagemarkError> {
        let config_dir = ProjectDirs::from("", "", "pagemark")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("db_path", default_db_path())
            .map_err(|e| PagemarkError::Config(e.to_string()))?
            .set_default("vector_index_path", default_vector_index_path())
            .map_err(|e| PagemarkError::Config(e.to_string()))?
            .set_default("pages_dir", default_pages_dir())
            .map_err(|e| PagemarkError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| PagemarkError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: PAGEMARK_DB_PATH, PAGEMARK_EMBEDDING__API_KEY, PAGEMARK_SEARCH__TOP_K, etc.
        builder = builder.add_source(
            Environment::with_prefix("PAGEMARK")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| PagemarkError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| PagemarkError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), PagemarkError> {
        self.embedding.validate().map_err(PagemarkError::Config)?;
        self.summarizer.validate().map_err(PagemarkError::Config)?;
        self.search.validate().map_err(PagemarkError::Config)?;
        Ok(())
    }
}
