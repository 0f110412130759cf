//! Embedding errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Model inference failed: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("Tokenizer failed: {0}")]
    Tokenizer(String),

    /// The model's config.json could not be understood
    #[error("Invalid model config: {0}")]
    InvalidConfig(String),

    #[error("Could not fetch {file}: {reason}")]
    Download { file: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Input the embedder cannot produce a vector for
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Byte buffer does not hold a whole number of f32 values
    #[error("Invalid vector encoding: {0} bytes is not a multiple of 4")]
    InvalidEncoding(usize),
}
