//! pagemark
//!
//! Semantic search over bookmarked pages.
//!
//! # Usage
//!
//! ```bash
//! pagemark bookmark add paper.pdf 3
//! pagemark search "optimization algorithm" -k 5
//! pagemark run
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/pagemark/config.toml)
//! 3. `--config` file
//! 4. Environment variables (PAGEMARK_*)
//! 5. CLI flags

use anyhow::Result;
use clap::Parser;

use pagemark_daemon::{
    handle_bookmark, init_logging, load_settings, run_foreground, run_index, run_reindex,
    run_search, show_status, Cli, Commands,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref(), cli.log_level.as_deref())?;
    init_logging(&settings)?;

    match cli.command {
        Commands::Bookmark { command } => handle_bookmark(&settings, command).await?,
        Commands::Index { document, page } => run_index(&settings, &document, page).await?,
        Commands::Search { query, top_k } => run_search(&settings, &query, top_k).await?,
        Commands::Reindex => run_reindex(&settings).await?,
        Commands::Status => show_status(&settings).await?,
        Commands::Run => run_foreground(&settings).await?,
    }

    Ok(())
}
