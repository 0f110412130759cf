//! # vecmem-types
//!
//! Shared types for the vecmem vector-memory store.
//!
//! This crate defines the data structures used across the workspace:
//! - Settings: layered configuration (defaults, file, env, CLI)
//! - Operation types: the request/response shapes of `add_text`,
//!   `search` and `reset_memory`
//!
//! ## Usage
//!
//! ```rust
//! use vecmem_types::{OperationResult, SearchResponse};
//!
//! let ok = OperationResult::success("Stored 5 chars.");
//! assert!(ok.ok);
//! let empty = SearchResponse::empty("cat");
//! assert!(empty.matches.is_empty());
//! ```

pub mod config;
pub mod error;
pub mod memory;

pub use config::{
    EmbedderProvider, EmbedderSettings, Settings, DEFAULT_DIMENSION, INDEX_FILE_NAME,
    METADATA_DIR_NAME,
};
pub use error::ConfigError;
pub use memory::{MemoryMatch, MemoryStatus, OperationResult, SearchResponse, DEFAULT_TOP_K};
