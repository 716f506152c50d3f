//! Command implementations for pagemark.
//!
//! Every command opens the same [`App`]: RocksDB storage (metadata and
//! bookmarks), the usearch vector index, the configured providers and the
//! page directory, composed into one [`SemanticIndex`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::info;

use pagemark_embeddings::{ApiEmbedder, ApiEmbedderConfig, EmbeddingClient, HashEmbedder};
use pagemark_service::{Collaborators, SemanticIndex};
use pagemark_storage::Storage;
use pagemark_summarizer::{ApiSummarizer, ApiSummarizerConfig, MockSummarizer, SummaryClient};
use pagemark_types::{EmbeddingSettings, PageKey, Settings, SummarizerSettings};
use pagemark_vector::{HnswConfig, HnswIndex};

use crate::cli::BookmarkCommands;
use crate::pages::DirectoryTextSource;

/// Load configuration and apply CLI overrides (highest precedence).
pub fn load_settings(config_path: Option<&str>, log_level: Option<&str>) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    if let Some(level) = log_level {
        settings.log_level = level.to_string();
    }
    Ok(settings)
}

/// Install the tracing subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logging(settings: &Settings) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Expand `~` and environment variables in a configured path.
pub fn expand_path(raw: &str) -> Result<PathBuf> {
    let expanded =
        shellexpand::full(raw).with_context(|| format!("Failed to expand path {}", raw))?;
    Ok(PathBuf::from(expanded.into_owned()))
}

fn api_key(configured: Option<&str>, env_var: &str) -> Result<String> {
    if let Some(key) = configured.filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }
    std::env::var(env_var)
        .with_context(|| format!("No API key configured: set {} or the api_key setting", env_var))
}

/// Embedding client for the configured provider.
pub fn build_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn EmbeddingClient>> {
    match settings.provider.as_str() {
        "hash" => Ok(Arc::new(HashEmbedder::new(settings.dimension))),
        "openai" => {
            let key = api_key(settings.api_key.as_deref(), "OPENAI_API_KEY")?;
            let mut config =
                ApiEmbedderConfig::openai(key, settings.model.clone(), settings.dimension);
            if let Some(url) = &settings.api_base_url {
                config = config.with_base_url(url.clone());
            }
            Ok(Arc::new(
                ApiEmbedder::new(config).context("Failed to create embedding client")?,
            ))
        }
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Summary client for the configured provider.
pub fn build_summarizer(settings: &SummarizerSettings) -> Result<Arc<dyn SummaryClient>> {
    let mut config = match settings.provider.as_str() {
        "mock" => return Ok(Arc::new(MockSummarizer::new())),
        "openai" => ApiSummarizerConfig::openai(
            api_key(settings.api_key.as_deref(), "OPENAI_API_KEY")?,
            settings.model.clone(),
        ),
        "anthropic" => ApiSummarizerConfig::claude(
            api_key(settings.api_key.as_deref(), "ANTHROPIC_API_KEY")?,
            settings.model.clone(),
        ),
        other => bail!("Unknown summarizer provider: {}", other),
    };
    if let Some(url) = &settings.api_base_url {
        config = config.with_base_url(url.clone());
    }
    Ok(Arc::new(
        ApiSummarizer::new(config).context("Failed to create summary client")?,
    ))
}

/// Opened storage plus the composed index.
pub struct App {
    pub storage: Arc<Storage>,
    pub index: SemanticIndex,
}

impl App {
    pub fn open(settings: &Settings) -> Result<Self> {
        let db_path = expand_path(&settings.db_path)?;
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }
        info!(path = ?db_path, "Opening storage");
        let storage = Arc::new(Storage::open(&db_path).context("Failed to open storage")?);

        let vector_path = expand_path(&settings.vector_index_path)?;
        let vectors = HnswIndex::open_or_create(HnswConfig::new(
            settings.embedding.dimension,
            vector_path,
        ))
        .context("Failed to open vector index")?;

        let pages_dir = expand_path(&settings.pages_dir)?;
        let collaborators = Collaborators {
            metadata: storage.clone(),
            vectors: Arc::new(vectors),
            embedder: build_embedder(&settings.embedding)?,
            summarizer: build_summarizer(&settings.summarizer)?,
            bookmarks: storage.clone(),
            texts: Arc::new(DirectoryTextSource::new(pages_dir)),
        };
        let index =
            SemanticIndex::new(collaborators, settings).context("Failed to open semantic index")?;

        Ok(Self { storage, index })
    }

    /// Persist vectors and flush storage.
    pub async fn close(self) -> Result<()> {
        self.index.shutdown().await;
        self.storage.flush().context("Failed to flush storage")?;
        Ok(())
    }
}

pub async fn handle_bookmark(settings: &Settings, command: BookmarkCommands) -> Result<()> {
    let app = App::open(settings)?;
    match command {
        BookmarkCommands::Add {
            document,
            page,
            delay_secs,
        } => {
            let key = PageKey::new(document.clone(), page);
            if !app.storage.add_bookmark(&key)? {
                println!("{} is already bookmarked", key);
            }
            let delay = delay_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| settings.scheduler.index_delay());

            if delay.is_zero() {
                app.index.initialize().await?;
                if app.index.index_page_now(&document, page).await? {
                    println!("Indexed {}", key);
                } else {
                    println!("{} was already indexed", key);
                }
            } else if app.index.schedule_indexing(&document, page, delay)? {
                println!(
                    "Scheduled indexing of {} in {}s (processed by `pagemark run`)",
                    key,
                    delay.as_secs()
                );
            } else {
                println!("{} is already indexed", key);
            }
        }
        BookmarkCommands::Remove { document, page } => {
            let key = PageKey::new(document.clone(), page);
            let was_bookmarked = app.storage.remove_bookmark(&key)?;
            let unindexed = app.index.on_bookmark_removed(&document, page).await?;
            match (was_bookmarked, unindexed) {
                (_, true) => println!("Removed {} and dropped it from the index", key),
                (true, false) => println!("Removed {}", key),
                (false, false) => println!("{} was not bookmarked", key),
            }
        }
        BookmarkCommands::List => {
            let bookmarks = app.storage.list_bookmarks()?;
            if bookmarks.is_empty() {
                println!("No bookmarks");
            }
            for key in bookmarks {
                let state = if app.index.store().is_indexed(&key.document_key, key.page_index) {
                    "indexed"
                } else if app.index.scheduler().has_pending(&key) {
                    "pending"
                } else {
                    "not indexed"
                };
                println!("{:<40} {}", key.to_string(), state);
            }
        }
    }
    app.close().await
}

pub async fn run_index(settings: &Settings, document: &str, page: u32) -> Result<()> {
    let app = App::open(settings)?;
    app.index.initialize().await?;
    let key = PageKey::new(document, page);
    if app.index.index_page_now(document, page).await? {
        println!("Indexed {}", key);
    } else {
        println!("{} was already indexed", key);
    }
    app.close().await
}

pub async fn run_search(settings: &Settings, query: &str, top_k: Option<usize>) -> Result<()> {
    let app = App::open(settings)?;
    app.index.initialize().await?;
    let top_k = top_k.unwrap_or_else(|| app.index.default_top_k());

    let hits = app
        .index
        .search(query, top_k)
        .await
        .context("Search failed")?;
    if hits.is_empty() {
        println!("No results");
    }
    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "{}. {}#{}  (score {:.3})",
            rank + 1,
            hit.document_key,
            hit.page_index,
            hit.score
        );
        println!("   {}", hit.summary);
        for excerpt in &hit.highlight_excerpts {
            println!("   > {}", excerpt);
        }
    }
    app.close().await
}

pub async fn run_reindex(settings: &Settings) -> Result<()> {
    let app = App::open(settings)?;
    app.index.initialize().await?;
    let report = app.index.reindex_all().await?;
    println!("Reindex complete:");
    println!("  Documents rebuilt:  {}", report.documents);
    println!("  Pages indexed:      {}", report.pages_indexed);
    println!("  Pages failed:       {}", report.pages_failed);
    println!("  Documents removed:  {}", report.documents_removed);
    app.close().await
}

pub async fn show_status(settings: &Settings) -> Result<()> {
    let app = App::open(settings)?;
    let status = app.index.status()?;
    let stats = app.storage.get_stats()?;

    println!("pagemark status");
    println!("===============");
    match status.schema_version {
        Some(version) => println!("Schema version:  {}", version),
        None => println!("Schema version:  (not yet determined)"),
    }
    println!("Documents:       {}", status.documents);
    println!("Pages:           {}", status.pages);
    println!(
        "Vectors:         {} ({} bytes on disk)",
        status.vectors, status.vector_index_bytes
    );
    println!("Bookmarks:       {}", status.bookmarks);
    println!("Pending tasks:   {}", stats.pending_task_count);
    println!("Legacy records:  {}", stats.legacy_page_count);
    println!("Disk usage:      {} bytes", stats.disk_usage_bytes);
    app.close().await
}

/// Start the index, process pending tasks as they come due, stop on Ctrl-C.
pub async fn run_foreground(settings: &Settings) -> Result<()> {
    let app = App::open(settings)?;
    let report = app.index.start().await?;
    info!(
        migrated = report.migration.documents_migrated,
        repaired = report.repair.repaired,
        "Started"
    );
    if let Some(reconcile) = &report.reconcile {
        println!(
            "Pending tasks: {} fired, {} rescheduled, {} discarded",
            reconcile.fired, reconcile.rescheduled, reconcile.discarded
        );
    }
    println!("Running; press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Received Ctrl-C, shutting down...");
    app.close().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_path_plain() {
        assert_eq!(
            expand_path("/var/lib/pagemark").unwrap(),
            PathBuf::from("/var/lib/pagemark")
        );
    }

    #[test]
    fn test_expand_path_unknown_variable() {
        assert!(expand_path("$PAGEMARK_TEST_UNSET_VARIABLE/db").is_err());
    }

    #[test]
    fn test_build_offline_providers() {
        let embedding = EmbeddingSettings {
            provider: "hash".to_string(),
            dimension: 32,
            ..Default::default()
        };
        assert_eq!(build_embedder(&embedding).unwrap().dimension(), 32);

        let summarizer = SummarizerSettings {
            provider: "mock".to_string(),
            ..Default::default()
        };
        assert!(build_summarizer(&summarizer).is_ok());
    }

    #[test]
    fn test_configured_api_key_is_used() {
        let embedding = EmbeddingSettings {
            api_key: Some("sk-test".to_string()),
            api_base_url: Some("http://localhost:9/v1".to_string()),
            ..Default::default()
        };
        assert!(build_embedder(&embedding).is_ok());

        let summarizer = SummarizerSettings {
            provider: "anthropic".to_string(),
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        assert!(build_summarizer(&summarizer).is_ok());
    }

    #[test]
    fn test_unknown_provider() {
        let embedding = EmbeddingSettings {
            provider: "carrier-pigeon".to_string(),
            ..Default::default()
        };
        assert!(build_embedder(&embedding).is_err());
    }
}
