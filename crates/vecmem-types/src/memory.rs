//! Operation types shared by the store, the tool server and the CLI.
//!
//! These are the shapes of the three operations a caller sees:
//! `add_text` and `reset_memory` answer with an [`OperationResult`],
//! `search` answers with a [`SearchResponse`].

use serde::{Deserialize, Serialize};

/// Number of matches returned by `search` when the caller gives none.
pub const DEFAULT_TOP_K: usize = 5;

/// Outcome of a mutating operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    /// Whether the operation committed
    pub ok: bool,
    /// Human-readable confirmation or failure description
    pub message: String,
}

impl OperationResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// A single search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryMatch {
    /// Record id in the metadata store
    pub id: u64,
    /// Original text
    pub text: String,
}

/// Result of a `search` call, ordered by ascending distance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// The query string exactly as received
    pub query: String,
    pub matches: Vec<MemoryMatch>,
}

impl SearchResponse {
    /// Response with no matches (empty store, `top_k == 0`, or no hits).
    pub fn empty(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            matches: Vec::new(),
        }
    }
}

/// Snapshot of the store's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStatus {
    /// Records in the metadata store
    pub records: usize,
    /// Vectors in the index
    pub vectors: usize,
    /// Embedding dimension
    pub dimension: usize,
    /// Current index generation (bumped by every reset)
    pub generation: u64,
    /// Path of the durable index file
    pub index_path: String,
    /// Size of the index file in bytes (0 if not yet written)
    pub index_size_bytes: u64,
}

impl MemoryStatus {
    /// Index and metadata agree on the number of entries.
    pub fn is_consistent(&self) -> bool {
        self.records == self.vectors
    }
}
