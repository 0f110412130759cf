//! End-to-end test infrastructure for vecmem.
//!
//! Provides a shared TestHarness owning a scratch data directory, plus a
//! table-driven embedder for tests that need vectors at known distances.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use vecmem_embeddings::{Embedding, EmbeddingError, EmbeddingModel, HashingEmbedder, ModelInfo};
use vecmem_store::{MemoryConfig, MemoryService};

/// Dimension used by the default harness.
pub const TEST_DIMENSION: usize = 256;

/// Shared test harness for E2E tests.
///
/// Each call to [`TestHarness::open`] opens the store afresh over the same
/// files, so dropping a service and opening another simulates a restart.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    pub data_dir: PathBuf,
    pub dimension: usize,
    pub embedder: Arc<dyn EmbeddingModel>,
}

impl TestHarness {
    /// Harness backed by the hashing embedder.
    pub fn new() -> Self {
        Self::with_embedder(Arc::new(HashingEmbedder::new(TEST_DIMENSION)), TEST_DIMENSION)
    }

    pub fn with_embedder(embedder: Arc<dyn EmbeddingModel>, dimension: usize) -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let data_dir = temp_dir.path().join("data");
        Self {
            _temp_dir: temp_dir,
            data_dir,
            dimension,
            embedder,
        }
    }

    pub fn config(&self) -> MemoryConfig {
        MemoryConfig::new(&self.data_dir, self.dimension)
    }

    /// Open the memory service over the harness files.
    pub fn open(&self) -> MemoryService {
        MemoryService::open(self.config(), Arc::clone(&self.embedder))
            .expect("Failed to open memory service")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Embedder returning preset vectors. Unknown text is an error.
pub struct FixedEmbedder {
    info: ModelInfo,
    vectors: HashMap<String, Vec<f32>>,
}

impl FixedEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            info: ModelInfo {
                name: "fixed".to_string(),
                dimension,
                max_sequence_length: usize::MAX,
            },
            vectors: HashMap::new(),
        }
    }

    /// Register the vector returned for `text`.
    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }
}

impl EmbeddingModel for FixedEmbedder {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.vectors
            .get(text)
            .cloned()
            .map(Embedding::new)
            .ok_or_else(|| EmbeddingError::InvalidInput(format!("no fixed vector for {text:?}")))
    }
}

/// Vector with `value` at position `axis` and zeros elsewhere.
pub fn axis_vector(dimension: usize, axis: usize, value: f32) -> Vec<f32> {
    let mut v = vec![0.0; dimension];
    v[axis] = value;
    v
}
