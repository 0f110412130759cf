//! vecmem
//!
//! A small persistent vector memory exposing `add_text`, `search` and
//! `reset_memory` as tools over stdio.
//!
//! # Usage
//!
//! ```bash
//! vecmem serve
//! vecmem add "the cat sat"
//! vecmem search cat -k 1
//! vecmem reset
//! vecmem status
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/vecmem/config.toml)
//! 3. `--config` file
//! 4. Environment variables (VECMEM_*)
//! 5. CLI flags

use anyhow::Result;
use clap::Parser;

use vecmem_daemon::{init_logging, load_settings, run_oneshot, serve, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = load_settings(
        cli.config.as_deref(),
        cli.data_dir.as_deref(),
        cli.log_level.as_deref(),
    )?;
    init_logging(&settings.log_level)?;

    match cli.command {
        Commands::Serve => serve(settings).await?,
        command => {
            tokio::task::spawn_blocking(move || run_oneshot(&settings, &command)).await??;
        }
    }

    Ok(())
}
