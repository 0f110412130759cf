//! Tool server error types.

use thiserror::Error;

use vecmem_store::StoreError;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Reading requests or writing responses failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A blocking store call panicked or was cancelled
    #[error("Task error: {0}")]
    Task(#[from] tokio::task::JoinError),
}
