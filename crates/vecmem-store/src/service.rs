//! Memory service.
//!
//! Owns the flat index and the metadata store and keeps them aligned:
//! index slot `n` always holds the vector of record id `n + 1`.
//!
//! Writes go to the metadata store first, then to the index file. If the
//! index file cannot be written the metadata row is rolled back. If the
//! process dies in between, [`MemoryService::open`] replays the missing
//! vectors from the metadata store, which acts as the write-ahead log.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use vecmem_embeddings::EmbeddingModel;
use vecmem_types::{
    MemoryMatch, MemoryStatus, OperationResult, SearchResponse, Settings, INDEX_FILE_NAME,
    METADATA_DIR_NAME,
};

use crate::error::StoreError;
use crate::flat::FlatIndex;
use crate::index::VectorIndex;
use crate::metadata::{MemoryRecord, MetadataStore};

/// Where the service keeps its files and which dimension it indexes.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    pub data_dir: PathBuf,
    pub dimension: usize,
}

impl MemoryConfig {
    pub fn new(data_dir: impl Into<PathBuf>, dimension: usize) -> Self {
        Self {
            data_dir: data_dir.into(),
            dimension,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.expanded_data_dir(), settings.dimension)
    }

    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join(INDEX_FILE_NAME)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.data_dir.join(METADATA_DIR_NAME)
    }
}

/// Handle to an index slot, valid only within the generation it was
/// issued in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotRef {
    pub generation: u64,
    pub slot: usize,
}

/// What an add committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMemory {
    pub id: u64,
    pub slot: SlotRef,
    /// Length of the stored text in characters
    pub chars: usize,
}

/// State swapped as a unit by reset.
struct IndexState {
    index: FlatIndex,
    generation: u64,
}

/// Vector memory: embed, store, search, reset.
///
/// Adds and resets take the write lock; searches share the read lock.
/// Embedding runs before any lock is taken.
pub struct MemoryService {
    embedder: Arc<dyn EmbeddingModel>,
    metadata: MetadataStore,
    state: RwLock<IndexState>,
    config: MemoryConfig,
}

impl MemoryService {
    /// Open the store under `config.data_dir`, creating it when absent and
    /// reconciling the index file with the metadata store.
    pub fn open(
        config: MemoryConfig,
        embedder: Arc<dyn EmbeddingModel>,
    ) -> Result<Self, StoreError> {
        fs::create_dir_all(&config.data_dir)?;

        if embedder.dimension() != config.dimension {
            warn!(
                embedder = %embedder.info().name,
                embedder_dim = embedder.dimension(),
                index_dim = config.dimension,
                "Embedder dimension differs from index dimension; adds will fail"
            );
        }

        let metadata = MetadataStore::open(config.metadata_path())?;
        let index_path = config.index_path();
        let mut index = FlatIndex::open_or_create(&index_path, config.dimension)?;
        reconcile(&mut index, &metadata, &index_path)?;

        let generation = metadata.generation()?;
        info!(
            data_dir = ?config.data_dir,
            vectors = index.len(),
            generation,
            "Memory service ready"
        );

        Ok(Self {
            embedder,
            metadata,
            state: RwLock::new(IndexState { index, generation }),
            config,
        })
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, IndexState>, StoreError> {
        self.state.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, IndexState>, StoreError> {
        self.state.write().map_err(|_| StoreError::LockPoisoned)
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    /// Number of vectors in the index
    pub fn count(&self) -> Result<usize, StoreError> {
        Ok(self.read_state()?.index.len())
    }

    /// Current reset generation
    pub fn generation(&self) -> Result<u64, StoreError> {
        Ok(self.read_state()?.generation)
    }

    /// Embed `text` and store it.
    ///
    /// Either both the metadata row and the index entry are committed, or
    /// neither is.
    pub fn add(&self, text: &str) -> Result<StoredMemory, StoreError> {
        let vector = self.embedder.embed(text)?;

        let mut state = self.write_state()?;
        let expected = state.index.dimension();
        if vector.dimension() != expected {
            return Err(StoreError::DimensionMismatch {
                expected,
                actual: vector.dimension(),
            });
        }

        let slot = state.index.len();
        let id = self.metadata.insert(text, vector.as_slice(), slot)?;

        let flushed = state
            .index
            .add(vector.as_slice())
            .and_then(|_| state.index.save(&self.config.index_path()));
        if let Err(e) = flushed {
            state.index.truncate(slot);
            if let Err(rollback_err) = self.metadata.rollback(id, slot) {
                // The record stays committed; bring the index back in line
                // with it so later adds get fresh slots.
                error!(id, slot, error = %rollback_err, "Metadata rollback failed");
                if let Err(sync_err) = align_with_metadata(&mut state.index, &self.metadata) {
                    error!(error = %sync_err, "Could not realign index with metadata");
                }
            }
            warn!(id, slot, error = %e, "Index flush failed, add rolled back");
            return Err(e);
        }

        let chars = text.chars().count();
        debug!(id, slot, chars, "Added memory");
        Ok(StoredMemory {
            id,
            slot: SlotRef {
                generation: state.generation,
                slot,
            },
            chars,
        })
    }

    /// `add_text` operation: never errors, reports failure in the result.
    pub fn add_text(&self, text: &str) -> OperationResult {
        match self.add(text) {
            Ok(stored) => OperationResult::success(format!("Stored {} chars.", stored.chars)),
            Err(e) => {
                warn!(error = %e, "add_text failed");
                OperationResult::failure(e.to_string())
            }
        }
    }

    /// `search` operation.
    ///
    /// Returns up to `top_k` matches, closest first. Slots whose record
    /// cannot be found are skipped, so fewer than `top_k` matches may come
    /// back even when the index holds more vectors.
    pub fn search(&self, query: &str, top_k: usize) -> Result<SearchResponse, StoreError> {
        if top_k == 0 || self.count()? == 0 {
            return Ok(SearchResponse::empty(query));
        }

        let query_vector = self.embedder.embed(query)?;

        let state = self.read_state()?;
        let results = state.index.search(query_vector.as_slice(), top_k)?;

        let mut matches = Vec::with_capacity(results.len());
        for result in results {
            match self.lookup_slot(result.slot) {
                Ok(Some((id, text))) => matches.push(MemoryMatch { id, text }),
                Ok(None) => debug!(slot = result.slot, "No record for slot, skipping"),
                Err(e) => warn!(slot = result.slot, error = %e, "Record lookup failed, skipping"),
            }
        }

        debug!(top_k, found = matches.len(), "Search complete");
        Ok(SearchResponse {
            query: query.to_string(),
            matches,
        })
    }

    fn lookup_slot(&self, slot: usize) -> Result<Option<(u64, String)>, StoreError> {
        let Some(id) = self.metadata.id_for_slot(slot)? else {
            return Ok(None);
        };
        Ok(self.metadata.lookup(id)?.map(|text| (id, text)))
    }

    /// Clear both stores and start a new generation.
    ///
    /// Returns the new generation. Handles issued before this call no
    /// longer resolve.
    pub fn reset(&self) -> Result<u64, StoreError> {
        let mut state = self.write_state()?;

        let generation = self.metadata.clear()?;
        *state = IndexState {
            index: FlatIndex::new(self.config.dimension),
            generation,
        };

        // Memory is already empty here. A leftover file is truncated to the
        // empty metadata on the next open.
        let index_path = self.config.index_path();
        match fs::remove_file(&index_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = ?index_path, error = %e, "Old index file left behind");
                return Err(StoreError::IndexFileNotRemoved(e));
            }
        }

        info!(generation, "Memory reset");
        Ok(generation)
    }

    /// `reset_memory` operation.
    pub fn reset_memory(&self) -> OperationResult {
        match self.reset() {
            Ok(_) => OperationResult::success("All memory cleared."),
            Err(e) => {
                error!(error = %e, "reset_memory failed");
                OperationResult::failure(e.to_string())
            }
        }
    }

    /// Resolve a slot handle to its record.
    pub fn resolve(&self, slot_ref: SlotRef) -> Result<Option<MemoryRecord>, StoreError> {
        let state = self.read_state()?;
        if slot_ref.generation != state.generation {
            return Err(StoreError::StaleGeneration {
                expected: state.generation,
                actual: slot_ref.generation,
            });
        }

        match self.metadata.id_for_slot(slot_ref.slot)? {
            Some(id) => self.metadata.get(id),
            None => Ok(None),
        }
    }

    pub fn status(&self) -> Result<MemoryStatus, StoreError> {
        let state = self.read_state()?;
        let index_path = self.config.index_path();
        let index_size_bytes = fs::metadata(&index_path).map(|m| m.len()).unwrap_or(0);

        Ok(MemoryStatus {
            records: self.metadata.count()?,
            vectors: state.index.len(),
            dimension: state.index.dimension(),
            generation: state.generation,
            index_path: index_path.to_string_lossy().to_string(),
            index_size_bytes,
        })
    }
}

/// Bring the index in line with the metadata store.
///
/// Slots the metadata store knows about but the index file lacks are
/// replayed from stored vectors; index entries with no metadata are
/// dropped. The index file is rewritten when anything changed.
fn reconcile(
    index: &mut FlatIndex,
    metadata: &MetadataStore,
    index_path: &Path,
) -> Result<(), StoreError> {
    if align_with_metadata(index, metadata)? {
        index.save(index_path)?;
    }
    Ok(())
}

/// Make the in-memory index hold exactly the slots the metadata store maps.
/// Returns whether the index changed.
fn align_with_metadata(
    index: &mut FlatIndex,
    metadata: &MetadataStore,
) -> Result<bool, StoreError> {
    let slots = metadata.slot_count()?;
    let len = index.len();

    if len == slots {
        return Ok(false);
    }

    if len > slots {
        warn!(index = len, metadata = slots, "Dropping index entries without records");
        index.truncate(slots);
    } else {
        info!(index = len, metadata = slots, "Replaying vectors missing from index");
        for (slot, vector) in metadata.vectors_from_slot(len)? {
            if slot != index.len() {
                return Err(StoreError::Format(format!(
                    "slot mapping has a gap at slot {}",
                    index.len()
                )));
            }
            index.add(&vector)?;
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::thread;

    use tempfile::TempDir;
    use vecmem_embeddings::{Embedding, EmbeddingError, HashingEmbedder, ModelInfo};

    /// Returns preset vectors; unknown text is an error.
    struct TableEmbedder {
        info: ModelInfo,
        table: HashMap<String, Vec<f32>>,
    }

    impl TableEmbedder {
        fn new(dimension: usize, entries: &[(&str, Vec<f32>)]) -> Self {
            Self {
                info: ModelInfo {
                    name: "table".to_string(),
                    dimension,
                    max_sequence_length: 0,
                },
                table: entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
            }
        }
    }

    impl EmbeddingModel for TableEmbedder {
        fn info(&self) -> &ModelInfo {
            &self.info
        }

        fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
            self.table
                .get(text)
                .cloned()
                .map(Embedding::new)
                .ok_or_else(|| EmbeddingError::InvalidInput(format!("no vector for {text:?}")))
        }
    }

    const DIM: usize = 32;

    fn hashing_service(dir: &Path) -> MemoryService {
        MemoryService::open(
            MemoryConfig::new(dir, DIM),
            Arc::new(HashingEmbedder::new(DIM)),
        )
        .unwrap()
    }

    #[test]
    fn test_add_text_reports_char_count() {
        let temp = TempDir::new().unwrap();
        let service = hashing_service(temp.path());

        let result = service.add_text("the cat sat");
        assert_eq!(result, OperationResult::success("Stored 11 chars."));

        let result = service.add_text("héllo");
        assert_eq!(result.message, "Stored 5 chars.");
        assert_eq!(service.count().unwrap(), 2);
    }

    #[test]
    fn test_empty_text_is_stored() {
        let temp = TempDir::new().unwrap();
        let service = hashing_service(temp.path());
        let result = service.add_text("");
        assert!(result.ok);
        assert_eq!(result.message, "Stored 0 chars.");
    }

    #[test]
    fn test_slot_id_alignment() {
        let temp = TempDir::new().unwrap();
        let service = hashing_service(temp.path());

        for i in 0..5 {
            let stored = service.add(&format!("memory number {i}")).unwrap();
            assert_eq!(stored.slot.slot, i);
            assert_eq!(stored.id, i as u64 + 1);
        }

        for slot in 0..5 {
            let record = service
                .resolve(SlotRef {
                    generation: 0,
                    slot,
                })
                .unwrap()
                .unwrap();
            assert_eq!(record.id, slot as u64 + 1);
            assert_eq!(record.text, format!("memory number {slot}"));
        }
    }

    #[test]
    fn test_count_consistency() {
        let temp = TempDir::new().unwrap();
        let service = hashing_service(temp.path());

        for text in ["a", "b", "c"] {
            service.add_text(text);
            let status = service.status().unwrap();
            assert!(status.is_consistent());
        }
        let status = service.status().unwrap();
        assert_eq!(status.records, 3);
        assert_eq!(status.dimension, DIM);
        assert!(status.index_size_bytes > 0);

        service.reset_memory();
        let status = service.status().unwrap();
        assert_eq!(status.records, 0);
        assert_eq!(status.vectors, 0);
        assert_eq!(status.index_size_bytes, 0);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let service = hashing_service(temp.path());
        service.add_text("something");

        assert_eq!(
            service.reset_memory(),
            OperationResult::success("All memory cleared.")
        );
        assert!(service.reset_memory().ok);
        assert_eq!(service.count().unwrap(), 0);
        assert!(!service.config().index_path().exists());

        let stored = service.add("after reset").unwrap();
        assert_eq!(stored.id, 1);
        assert_eq!(stored.slot.slot, 0);
        assert_eq!(stored.slot.generation, 2);
    }

    #[test]
    fn test_search_empty_store_does_not_embed() {
        let temp = TempDir::new().unwrap();
        // Any embed call would fail: the table is empty
        let service = MemoryService::open(
            MemoryConfig::new(temp.path(), 2),
            Arc::new(TableEmbedder::new(2, &[])),
        )
        .unwrap();

        let response = service.search("anything", 3).unwrap();
        assert_eq!(response, SearchResponse::empty("anything"));
    }

    #[test]
    fn test_search_zero_top_k() {
        let temp = TempDir::new().unwrap();
        let service = hashing_service(temp.path());
        service.add_text("cat");
        assert!(service.search("cat", 0).unwrap().matches.is_empty());
    }

    #[test]
    fn test_ranking_order() {
        let temp = TempDir::new().unwrap();
        let embedder = TableEmbedder::new(
            2,
            &[
                ("far", vec![10.0, 0.0]),
                ("near", vec![1.0, 0.0]),
                ("middle", vec![0.0, 3.0]),
                ("query", vec![0.0, 0.0]),
            ],
        );
        let service =
            MemoryService::open(MemoryConfig::new(temp.path(), 2), Arc::new(embedder)).unwrap();

        for text in ["far", "near", "middle"] {
            assert!(service.add_text(text).ok);
        }

        let response = service.search("query", 5).unwrap();
        let texts: Vec<&str> = response.matches.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["near", "middle", "far"]);
        let ids: Vec<u64> = response.matches.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);

        let top1 = service.search("query", 1).unwrap();
        assert_eq!(top1.matches.len(), 1);
        assert_eq!(top1.matches[0].text, "near");
    }

    #[test]
    fn test_dimension_mismatch_is_reported() {
        let temp = TempDir::new().unwrap();
        let service = MemoryService::open(
            MemoryConfig::new(temp.path(), 4),
            Arc::new(HashingEmbedder::new(3)),
        )
        .unwrap();

        let result = service.add_text("hello");
        assert!(!result.ok);
        assert!(result.message.contains("Dimension mismatch"));
        assert_eq!(service.status().unwrap().records, 0);
        assert_eq!(service.count().unwrap(), 0);
    }

    #[test]
    fn test_round_trip_persistence() {
        let temp = TempDir::new().unwrap();
        {
            let service = hashing_service(temp.path());
            assert!(service.add_text("hello").ok);
            assert!(service.add_text("goodbye").ok);
        }

        let service = hashing_service(temp.path());
        assert_eq!(service.count().unwrap(), 2);
        let response = service.search("hello", 1).unwrap();
        assert_eq!(response.matches[0].text, "hello");
        assert_eq!(response.matches[0].id, 1);
    }

    #[test]
    fn test_flush_failure_rolls_back() {
        let temp = TempDir::new().unwrap();
        let service = hashing_service(temp.path());
        assert!(service.add_text("kept").ok);

        // A non-empty directory where the index file should go makes the
        // rename fail.
        let index_path = service.config().index_path();
        fs::remove_file(&index_path).unwrap();
        fs::create_dir(&index_path).unwrap();
        fs::write(index_path.join("blocker"), b"x").unwrap();

        let result = service.add_text("lost");
        assert!(!result.ok);
        assert_eq!(service.count().unwrap(), 1);
        assert_eq!(service.status().unwrap().records, 1);

        fs::remove_dir_all(&index_path).unwrap();
        let stored = service.add("recovered").unwrap();
        assert_eq!(stored.id, 2);
        assert_eq!(stored.slot.slot, 1);
    }

    #[test]
    fn test_stranded_record_realigns_index() {
        let temp = TempDir::new().unwrap();
        let service = hashing_service(temp.path());
        assert!(service.add_text("kept").ok);

        // A committed record the index never received, as left behind when
        // both the flush and the metadata rollback fail
        let vector = service.embedder.embed("stranded").unwrap();
        service
            .metadata
            .insert("stranded", vector.as_slice(), 1)
            .unwrap();
        assert!(service.add("blocked").is_err());

        {
            let mut state = service.state.write().unwrap();
            assert!(align_with_metadata(&mut state.index, &service.metadata).unwrap());
            assert_eq!(state.index.len(), 2);
        }

        let stored = service.add("next").unwrap();
        assert_eq!((stored.id, stored.slot.slot), (3, 2));
        let response = service.search("stranded", 1).unwrap();
        assert_eq!(response.matches[0].text, "stranded");
    }

    #[test]
    fn test_reset_reports_leftover_index_file() {
        let temp = TempDir::new().unwrap();
        let service = hashing_service(temp.path());
        assert!(service.add_text("soon gone").ok);

        let index_path = service.config().index_path();
        fs::remove_file(&index_path).unwrap();
        fs::create_dir(&index_path).unwrap();
        fs::write(index_path.join("blocker"), b"x").unwrap();

        let result = service.reset_memory();
        assert!(!result.ok);
        assert!(result.message.starts_with("Memory cleared"));
        assert_eq!(service.count().unwrap(), 0);
        assert_eq!(service.status().unwrap().records, 0);
        assert!(service.search("soon gone", 5).unwrap().matches.is_empty());
    }

    #[test]
    fn test_reopen_replays_missing_vectors() {
        let temp = TempDir::new().unwrap();
        let backup = temp.path().join("index.backup");
        {
            let service = hashing_service(temp.path());
            service.add_text("one");
            service.add_text("two");
            fs::copy(service.config().index_path(), &backup).unwrap();
            service.add_text("three dogs");
        }

        // Simulate a crash after the metadata commit but before the flush
        let config = MemoryConfig::new(temp.path(), DIM);
        fs::copy(&backup, config.index_path()).unwrap();
        assert_eq!(FlatIndex::load(&config.index_path(), DIM).unwrap().len(), 2);

        let service = hashing_service(temp.path());
        assert_eq!(service.count().unwrap(), 3);
        assert!(service.status().unwrap().is_consistent());
        let response = service.search("three dogs", 1).unwrap();
        assert_eq!(response.matches[0].text, "three dogs");

        assert_eq!(FlatIndex::load(&config.index_path(), DIM).unwrap().len(), 3);
    }

    #[test]
    fn test_reopen_drops_orphan_vectors() {
        let temp = TempDir::new().unwrap();
        let config = MemoryConfig::new(temp.path(), DIM);
        {
            let service = hashing_service(temp.path());
            service.add_text("one");
            service.add_text("two");
        }
        {
            let metadata = MetadataStore::open(config.metadata_path()).unwrap();
            metadata.rollback(2, 1).unwrap();
        }

        let service = hashing_service(temp.path());
        assert_eq!(service.count().unwrap(), 1);
        let stored = service.add("two again").unwrap();
        assert_eq!(stored.id, 2);
        assert_eq!(stored.slot.slot, 1);
    }

    #[test]
    fn test_stale_generation_detected() {
        let temp = TempDir::new().unwrap();
        let service = hashing_service(temp.path());

        let old = service.add("before reset").unwrap();
        service.reset().unwrap();
        let new = service.add("after reset").unwrap();
        assert_eq!(old.slot.slot, new.slot.slot);

        assert!(matches!(
            service.resolve(old.slot),
            Err(StoreError::StaleGeneration {
                expected: 1,
                actual: 0
            })
        ));
        let record = service.resolve(new.slot).unwrap().unwrap();
        assert_eq!(record.text, "after reset");
        assert_eq!(record.generation, 1);
    }

    #[test]
    fn test_generation_survives_restart() {
        let temp = TempDir::new().unwrap();
        {
            let service = hashing_service(temp.path());
            service.reset().unwrap();
            service.reset().unwrap();
        }
        let service = hashing_service(temp.path());
        assert_eq!(service.generation().unwrap(), 2);
    }

    #[test]
    fn test_open_rejects_incompatible_index() {
        let temp = TempDir::new().unwrap();
        {
            let service = hashing_service(temp.path());
            service.add_text("hello");
        }

        let result = MemoryService::open(
            MemoryConfig::new(temp.path(), DIM * 2),
            Arc::new(HashingEmbedder::new(DIM * 2)),
        );
        assert!(matches!(
            result,
            Err(StoreError::IncompatibleDimension { .. })
        ));
    }

    #[test]
    fn test_open_rejects_corrupt_index() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(INDEX_FILE_NAME), b"not an index").unwrap();

        let result = MemoryService::open(
            MemoryConfig::new(temp.path(), DIM),
            Arc::new(HashingEmbedder::new(DIM)),
        );
        assert!(matches!(result, Err(StoreError::Format(_))));
    }

    #[test]
    fn test_concurrent_adds_keep_alignment() {
        let temp = TempDir::new().unwrap();
        let service = Arc::new(hashing_service(temp.path()));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let service = Arc::clone(&service);
                thread::spawn(move || {
                    for i in 0..5 {
                        assert!(service.add_text(&format!("thread {t} item {i}")).ok);
                        service.search("item", 3).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(service.count().unwrap(), 20);
        assert!(service.status().unwrap().is_consistent());
        for slot in 0..20 {
            let record = service
                .resolve(SlotRef {
                    generation: 0,
                    slot,
                })
                .unwrap()
                .unwrap();
            assert_eq!(record.id, slot as u64 + 1);
        }
    }
}
