//! pagemark command-line library.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations
//! - `pages`: Page text read from a directory tree

pub mod cli;
pub mod commands;
pub mod pages;

pub use cli::{BookmarkCommands, Cli, Commands};
pub use commands::{
    build_embedder, build_summarizer, expand_path, handle_bookmark, init_logging, load_settings,
    run_foreground, run_index, run_reindex, run_search, show_status, App,
};
pub use pages::DirectoryTextSource;
