//! Feature-hashing embedder.
//!
//! Lower-cased alphanumeric tokens are hashed into one of `dimension`
//! buckets and the result is normalized to unit length. Texts sharing words
//! land close together; there is no notion of meaning beyond that. Useful
//! offline and in tests where a deterministic embedder is needed.
//!
//! Tokens are hashed with BLAKE3 so stored vectors stay comparable with new
//! queries across builds and platforms.

use crate::error::EmbeddingError;
use crate::model::{Embedding, EmbeddingModel, ModelInfo};

/// Bag-of-words embedder backed by feature hashing.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    info: ModelInfo,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            info: ModelInfo {
                name: "feature-hashing".to_string(),
                dimension,
                max_sequence_length: usize::MAX,
            },
        }
    }

    fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
    }
}

impl EmbeddingModel for HashingEmbedder {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let dimension = self.info.dimension;
        if dimension == 0 {
            return Err(EmbeddingError::InvalidInput(
                "hashing embedder needs a non-zero dimension".to_string(),
            ));
        }

        let mut values = vec![0.0f32; dimension];
        for token in Self::tokens(text) {
            let hash = token_hash(&token);

            let bucket = (hash % dimension as u64) as usize;
            // Weight in [0.5, 1.0] so a single token never vanishes
            let weight = 0.5 + ((hash >> 32) as f32 / u32::MAX as f32) * 0.5;
            values[bucket] += weight;
        }

        Ok(Embedding::normalized(values))
    }
}

/// First eight bytes of the token's BLAKE3 digest, little-endian.
fn token_hash(token: &str) -> u64 {
    let digest = blake3::hash(token.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(head)
}
