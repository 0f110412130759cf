//! # vecmem-embeddings
//!
//! Text embedding for the vecmem vector-memory store.
//!
//! The store treats embedding as a black box: anything implementing
//! [`EmbeddingModel`] can feed it. Two implementations ship here:
//! - [`CandleEmbedder`]: all-MiniLM-L6-v2 (384 dimensions) run locally via Candle
//! - [`HashingEmbedder`]: feature-hashed bag of words, offline and deterministic
//!
//! Model files are fetched through hf-hub's cache on first use.

pub mod candle;
pub mod error;
pub mod hashing;
pub mod hub;
pub mod model;

pub use crate::candle::{CandleEmbedder, EMBEDDING_DIM};
pub use error::EmbeddingError;
pub use hashing::HashingEmbedder;
pub use hub::{default_cache_dir, ModelFiles, ModelSource, DEFAULT_MODEL_REPO};
pub use model::{squared_l2, Embedding, EmbeddingModel, ModelInfo};
