//! CLI argument parsing for pagemark.
//!
//! CLI flags override all other config sources.

use clap::{Parser, Subcommand};

/// Semantic bookmark index
///
/// Indexes bookmarked pages and answers natural-language queries with the
/// best-matching pages.
#[derive(Parser, Debug)]
#[command(name = "pagemark")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/pagemark/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage bookmarks
    Bookmark {
        #[command(subcommand)]
        command: BookmarkCommands,
    },

    /// Index one page now, without the scheduling delay
    Index {
        /// Document key (e.g. the source filename)
        document: String,

        /// Zero-based page index
        page: u32,
    },

    /// Search bookmarked pages
    Search {
        /// Natural-language query
        query: String,

        /// Number of results (default from config)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Rebuild the whole index from the current bookmarks
    Reindex,

    /// Show index status
    Status,

    /// Run in the foreground, processing pending tasks until Ctrl-C
    Run,
}

#[derive(Subcommand, Debug, Clone)]
pub enum BookmarkCommands {
    /// Bookmark a page and schedule it for indexing
    Add {
        document: String,
        page: u32,

        /// Override the indexing delay (0 indexes immediately)
        #[arg(long)]
        delay_secs: Option<u64>,
    },

    /// Remove a bookmark and drop the page from the index
    Remove { document: String, page: u32 },

    /// List bookmarks
    List,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_bookmark_add() {
        let cli = Cli::parse_from(["pagemark", "bookmark", "add", "paper.pdf", "3"]);
        match cli.command {
            Commands::Bookmark {
                command:
                    BookmarkCommands::Add {
                        document,
                        page,
                        delay_secs,
                    },
            } => {
                assert_eq!(document, "paper.pdf");
                assert_eq!(page, 3);
                assert_eq!(delay_secs, None);
            }
            _ => panic!("Expected Bookmark Add command"),
        }
    }

    #[test]
    fn test_cli_bookmark_add_with_delay() {
        let cli = Cli::parse_from([
            "pagemark",
            "bookmark",
            "add",
            "book.pdf",
            "5",
            "--delay-secs",
            "0",
        ]);
        match cli.command {
            Commands::Bookmark {
                command: BookmarkCommands::Add { delay_secs, .. },
            } => assert_eq!(delay_secs, Some(0)),
            _ => panic!("Expected Bookmark Add command"),
        }
    }

    #[test]
    fn test_cli_search_top_k() {
        let cli = Cli::parse_from(["pagemark", "search", "optimization algorithm", "-k", "3"]);
        match cli.command {
            Commands::Search { query, top_k } => {
                assert_eq!(query, "optimization algorithm");
                assert_eq!(top_k, Some(3));
            }
            _ => panic!("Expected Search command"),
        }
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::parse_from([
            "pagemark",
            "status",
            "--config",
            "/path/to/config.toml",
            "--log-level",
            "debug",
        ]);
        assert_eq!(cli.config, Some("/path/to/config.toml".to_string()));
        assert_eq!(cli.log_level, Some("debug".to_string()));
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn test_cli_rejects_negative_page() {
        assert!(Cli::try_parse_from(["pagemark", "index", "a.pdf", "-1"]).is_err());
    }

    #[test]
    fn test_cli_run_and_reindex() {
        assert!(matches!(
            Cli::parse_from(["pagemark", "run"]).command,
            Commands::Run
        ));
        assert!(matches!(
            Cli::parse_from(["pagemark", "reindex"]).command,
            Commands::Reindex
        ));
    }
}
