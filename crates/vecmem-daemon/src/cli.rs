//! CLI argument parsing for vecmem.
//!
//! CLI flags override every other config source.

use clap::{Parser, Subcommand};

/// vecmem
///
/// A small persistent vector memory: store text, search it by meaning.
#[derive(Parser, Debug)]
#[command(name = "vecmem")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/vecmem/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override the data directory holding the index and database
    #[arg(short, long, global = true)]
    pub data_dir: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Serve the add_text / search / reset_memory tools over stdio
    Serve,

    /// Store a piece of text
    Add {
        /// Text to remember
        text: String,
    },

    /// Search stored text
    Search {
        /// Query text
        query: String,

        /// Maximum number of matches (default from config)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Delete every stored memory
    Reset,

    /// Show index and database statistics
    Status,
}
