//! Store error types.

use thiserror::Error;

/// Errors raised by the vector index, the metadata store and the service
/// that coordinates them.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Vector length differs from the index dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Record id has no row in the metadata store
    #[error("Record not found: {0}")]
    NotFound(u64),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// RocksDB error
    #[error("Database error: {0}")]
    Database(#[from] rocksdb::Error),

    /// Column family missing from an opened database
    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(&'static str),

    /// Index file is truncated or not an index file at all
    #[error("Corrupt index file: {0}")]
    Format(String),

    /// Index file was built for a different embedding dimension
    #[error("Index file has dimension {found}, expected {expected}")]
    IncompatibleDimension { expected: usize, found: usize },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Embedding error
    #[error("Embedding error: {0}")]
    Embedding(#[from] vecmem_embeddings::EmbeddingError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Slot handle was issued before the last reset
    #[error("Stale slot handle: issued in generation {actual}, current generation is {expected}")]
    StaleGeneration { expected: u64, actual: u64 },

    /// Reset cleared memory and metadata but the index file survived
    #[error("Memory cleared, but the old index file could not be removed: {0}")]
    IndexFileNotRemoved(std::io::Error),

    #[error("Memory state lock poisoned")]
    LockPoisoned,
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
