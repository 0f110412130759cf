//! Vector index trait and types.
//!
//! Defines the interface for exact nearest-neighbor search over an
//! append-only set of vectors addressed by insertion slot.

use std::path::Path;

use crate::error::StoreError;

/// Result of a vector search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    /// Insertion slot of the matched vector
    pub slot: usize,
    /// Squared Euclidean distance to the query (lower = closer)
    pub distance: f32,
}

impl SearchResult {
    pub fn new(slot: usize, distance: f32) -> Self {
        Self { slot, distance }
    }
}

/// Index statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Number of vectors in the index
    pub vector_count: usize,
    /// Embedding dimension
    pub dimension: usize,
    /// Size of the serialized index in bytes
    pub size_bytes: u64,
}

/// Trait for vector indexes.
///
/// Slots are assigned 0, 1, 2, ... in insertion order and are never reused.
/// The only ways to shrink an index are `truncate` and `clear`.
pub trait VectorIndex: Send + Sync {
    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the number of vectors in the index
    fn len(&self) -> usize;

    /// Check if the index is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a vector and return its slot.
    fn add(&mut self, vector: &[f32]) -> Result<usize, StoreError>;

    /// Search for the k nearest neighbors, closest first.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, StoreError>;

    /// Read back the vector stored at a slot
    fn vector(&self, slot: usize) -> Option<&[f32]>;

    /// Drop every slot at or beyond `len`.
    fn truncate(&mut self, len: usize);

    /// Remove all vectors; the next add returns slot 0
    fn clear(&mut self);

    /// Get index statistics
    fn stats(&self) -> IndexStats;

    /// Persist the index to `path`, replacing any previous file atomically.
    fn save(&self, path: &Path) -> Result<(), StoreError>;
}
