//! vecmem binary library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Settings, logging, bootstrap and command implementations

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands};
pub use commands::{
    bootstrap, build_embedder, init_logging, load_settings, run_command, run_oneshot, serve,
    CommandOutput,
};
