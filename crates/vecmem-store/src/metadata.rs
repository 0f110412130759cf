//! Durable record storage.
//!
//! Maps record ids to their text and raw vector bytes, and keeps the
//! explicit slot -> id mapping plus the id and generation counters.
//! Stored in RocksDB; every mutation is a single synced `WriteBatch`.
//!
//! Column families:
//! - `records`: id (u64 BE) -> JSON [`MemoryRecord`]
//! - `vectors`: id (u64 BE) -> little-endian f32 bytes
//! - `slots`: slot (u64 BE) -> id (u64 BE)
//! - `meta`: `next_id`, `generation` -> u64 BE

use std::path::Path;

use chrono::{DateTime, Utc};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch,
    WriteOptions, DB,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use vecmem_embeddings::Embedding;

use crate::error::StoreError;

pub const CF_RECORDS: &str = "records";
pub const CF_VECTORS: &str = "vectors";
pub const CF_SLOTS: &str = "slots";
pub const CF_META: &str = "meta";

pub const ALL_CF_NAMES: &[&str] = &[CF_RECORDS, CF_VECTORS, CF_SLOTS, CF_META];

const KEY_NEXT_ID: &[u8] = b"next_id";
const KEY_GENERATION: &[u8] = b"generation";

/// First id handed out in every generation. Slot `n` maps to id `n + FIRST_ID`.
pub const FIRST_ID: u64 = 1;

/// A stored memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: u64,
    /// Index slot holding this record's vector
    pub slot: u64,
    /// Reset generation the record was written in
    pub generation: u64,
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// Kept in its own column family, filled in by [`MetadataStore::get`]
    #[serde(skip)]
    pub vector: Vec<f32>,
}

/// Record storage using RocksDB.
pub struct MetadataStore {
    db: DB,
}

impl MetadataStore {
    /// Open or create the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = ALL_CF_NAMES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, cfs)?;

        let store = Self { db };
        info!(
            path = ?path,
            records = store.count()?,
            generation = store.generation()?,
            "Opened metadata store"
        );
        Ok(store)
    }

    fn cf(&self, name: &'static str) -> Result<&ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or(StoreError::ColumnFamilyNotFound(name))
    }

    fn read_counter(&self, key: &[u8], default: u64) -> Result<u64, StoreError> {
        match self.db.get_cf(self.cf(CF_META)?, key)? {
            Some(bytes) => decode_u64(&bytes),
            None => Ok(default),
        }
    }

    /// Id the next insert will receive
    pub fn next_id(&self) -> Result<u64, StoreError> {
        self.read_counter(KEY_NEXT_ID, FIRST_ID)
    }

    /// Number of resets this store has seen
    pub fn generation(&self) -> Result<u64, StoreError> {
        self.read_counter(KEY_GENERATION, 0)
    }

    /// Store a record for the vector about to occupy `slot`.
    ///
    /// The record, its vector bytes, the slot mapping and the advanced id
    /// counter commit together or not at all.
    pub fn insert(&self, text: &str, vector: &[f32], slot: usize) -> Result<u64, StoreError> {
        let records = self.cf(CF_RECORDS)?;
        let vectors = self.cf(CF_VECTORS)?;
        let slots = self.cf(CF_SLOTS)?;
        let meta = self.cf(CF_META)?;

        let slot_key = (slot as u64).to_be_bytes();
        if self.db.get_cf(slots, slot_key)?.is_some() {
            return Err(StoreError::InvalidInput(format!(
                "slot {slot} is already mapped"
            )));
        }

        let id = self.next_id()?;
        let record = MemoryRecord {
            id,
            slot: slot as u64,
            generation: self.generation()?,
            text: text.to_string(),
            created_at: Utc::now(),
            vector: Vec::new(),
        };

        let mut batch = WriteBatch::default();
        batch.put_cf(records, id.to_be_bytes(), serde_json::to_vec(&record)?);
        batch.put_cf(
            vectors,
            id.to_be_bytes(),
            Embedding::new(vector.to_vec()).to_le_bytes(),
        );
        batch.put_cf(slots, slot_key, id.to_be_bytes());
        batch.put_cf(meta, KEY_NEXT_ID, (id + 1).to_be_bytes());
        self.db.write_opt(batch, &synced())?;

        debug!(id, slot, chars = text.chars().count(), "Stored record");
        Ok(id)
    }

    /// Undo the most recent [`insert`](Self::insert).
    ///
    /// Only the last record can be rolled back; the id counter is restored
    /// so the next insert reuses `id`.
    pub fn rollback(&self, id: u64, slot: usize) -> Result<(), StoreError> {
        let next_id = self.next_id()?;
        if next_id != id + 1 {
            return Err(StoreError::InvalidInput(format!(
                "cannot roll back id {id}: latest id is {}",
                next_id.saturating_sub(1)
            )));
        }

        let mut batch = WriteBatch::default();
        batch.delete_cf(self.cf(CF_RECORDS)?, id.to_be_bytes());
        batch.delete_cf(self.cf(CF_VECTORS)?, id.to_be_bytes());
        batch.delete_cf(self.cf(CF_SLOTS)?, (slot as u64).to_be_bytes());
        batch.put_cf(self.cf(CF_META)?, KEY_NEXT_ID, id.to_be_bytes());
        self.db.write_opt(batch, &synced())?;

        info!(id, slot, "Rolled back record");
        Ok(())
    }

    /// Text of record `id`, if present.
    pub fn lookup(&self, id: u64) -> Result<Option<String>, StoreError> {
        Ok(self.get_record(id)?.map(|record| record.text))
    }

    fn get_record(&self, id: u64) -> Result<Option<MemoryRecord>, StoreError> {
        match self.db.get_cf(self.cf(CF_RECORDS)?, id.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Full record including its vector.
    pub fn get(&self, id: u64) -> Result<Option<MemoryRecord>, StoreError> {
        let Some(mut record) = self.get_record(id)? else {
            return Ok(None);
        };
        record.vector = self.vector(id)?.ok_or(StoreError::NotFound(id))?;
        Ok(Some(record))
    }

    fn vector(&self, id: u64) -> Result<Option<Vec<f32>>, StoreError> {
        match self.db.get_cf(self.cf(CF_VECTORS)?, id.to_be_bytes())? {
            Some(bytes) => Ok(Some(Embedding::from_le_bytes(&bytes)?.values)),
            None => Ok(None),
        }
    }

    /// Record id stored for an index slot.
    pub fn id_for_slot(&self, slot: usize) -> Result<Option<u64>, StoreError> {
        match self.db.get_cf(self.cf(CF_SLOTS)?, (slot as u64).to_be_bytes())? {
            Some(bytes) => Ok(Some(decode_u64(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Vectors for every mapped slot from `start` on, in slot order.
    ///
    /// Used to rebuild index entries that were committed here but never
    /// reached the index file.
    pub fn vectors_from_slot(&self, start: usize) -> Result<Vec<(usize, Vec<f32>)>, StoreError> {
        let start_key = (start as u64).to_be_bytes();
        let iter = self.db.iterator_cf(
            self.cf(CF_SLOTS)?,
            IteratorMode::From(&start_key[..], Direction::Forward),
        );

        let mut out = Vec::new();
        for item in iter {
            let (key, value) = item?;
            let slot = decode_u64(&key)? as usize;
            let id = decode_u64(&value)?;
            let vector = self.vector(id)?.ok_or(StoreError::NotFound(id))?;
            out.push((slot, vector));
        }
        Ok(out)
    }

    /// Number of stored records
    pub fn count(&self) -> Result<usize, StoreError> {
        let mut count = 0;
        for item in self.db.iterator_cf(self.cf(CF_RECORDS)?, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    /// One past the highest mapped slot (0 when empty).
    pub fn slot_count(&self) -> Result<usize, StoreError> {
        let mut iter = self.db.iterator_cf(self.cf(CF_SLOTS)?, IteratorMode::End);
        match iter.next() {
            Some(item) => {
                let (key, _) = item?;
                Ok(decode_u64(&key)? as usize + 1)
            }
            None => Ok(0),
        }
    }

    /// Delete every record and slot mapping, restart ids at 1 and advance
    /// the generation. Returns the new generation.
    pub fn clear(&self) -> Result<u64, StoreError> {
        let generation = self.generation()? + 1;
        let first = [0u8; 8];
        let last = [0xffu8; 8];

        let mut batch = WriteBatch::default();
        for name in [CF_RECORDS, CF_VECTORS, CF_SLOTS] {
            batch.delete_range_cf(self.cf(name)?, first, last);
        }
        let meta = self.cf(CF_META)?;
        batch.put_cf(meta, KEY_NEXT_ID, FIRST_ID.to_be_bytes());
        batch.put_cf(meta, KEY_GENERATION, generation.to_be_bytes());
        self.db.write_opt(batch, &synced())?;

        info!(generation, "Cleared metadata store");
        Ok(generation)
    }
}

/// Writes are fsynced to the WAL before returning
fn synced() -> WriteOptions {
    let mut opts = WriteOptions::default();
    opts.set_sync(true);
    opts
}

fn decode_u64(bytes: &[u8]) -> Result<u64, StoreError> {
    let arr: [u8; 8] = bytes.try_into().map_err(|_| {
        StoreError::Serialization(format!("expected 8-byte value, got {}", bytes.len()))
    })?;
    Ok(u64::from_be_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, MetadataStore) {
        let temp = TempDir::new().unwrap();
        let store = MetadataStore::open(temp.path().join("memory.db")).unwrap();
        (temp, store)
    }

    #[test]
    fn test_insert_assigns_sequential_ids() {
        let (_temp, store) = open_temp();
        assert_eq!(store.next_id().unwrap(), 1);

        assert_eq!(store.insert("first", &[1.0, 2.0], 0).unwrap(), 1);
        assert_eq!(store.insert("second", &[3.0, 4.0], 1).unwrap(), 2);
        assert_eq!(store.next_id().unwrap(), 3);
        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(store.slot_count().unwrap(), 2);
    }

    #[test]
    fn test_lookup_and_get() {
        let (_temp, store) = open_temp();
        let id = store.insert("the cat sat", &[0.5, -1.5], 0).unwrap();

        assert_eq!(store.lookup(id).unwrap().as_deref(), Some("the cat sat"));
        assert_eq!(store.lookup(99).unwrap(), None);

        let record = store.get(id).unwrap().unwrap();
        assert_eq!(record.slot, 0);
        assert_eq!(record.generation, 0);
        assert_eq!(record.vector, vec![0.5, -1.5]);
        assert!(store.get(99).unwrap().is_none());
    }

    #[test]
    fn test_slot_mapping() {
        let (_temp, store) = open_temp();
        store.insert("a", &[1.0], 0).unwrap();
        store.insert("b", &[2.0], 1).unwrap();

        assert_eq!(store.id_for_slot(0).unwrap(), Some(1));
        assert_eq!(store.id_for_slot(1).unwrap(), Some(2));
        assert_eq!(store.id_for_slot(2).unwrap(), None);
    }

    #[test]
    fn test_insert_rejects_mapped_slot() {
        let (_temp, store) = open_temp();
        store.insert("a", &[1.0], 0).unwrap();
        assert!(matches!(
            store.insert("b", &[2.0], 0),
            Err(StoreError::InvalidInput(_))
        ));
        assert_eq!(store.next_id().unwrap(), 2);
    }

    #[test]
    fn test_rollback_restores_counter() {
        let (_temp, store) = open_temp();
        store.insert("keep", &[1.0], 0).unwrap();
        let id = store.insert("drop", &[2.0], 1).unwrap();

        store.rollback(id, 1).unwrap();
        assert_eq!(store.lookup(id).unwrap(), None);
        assert_eq!(store.id_for_slot(1).unwrap(), None);
        assert_eq!(store.next_id().unwrap(), id);
        assert_eq!(store.count().unwrap(), 1);

        // Only the latest insert can be undone
        assert!(store.rollback(1, 0).is_err());
    }

    #[test]
    fn test_vectors_from_slot() {
        let (_temp, store) = open_temp();
        for slot in 0..4 {
            store.insert(&format!("t{slot}"), &[slot as f32], slot).unwrap();
        }

        let tail = store.vectors_from_slot(2).unwrap();
        assert_eq!(tail, vec![(2, vec![2.0]), (3, vec![3.0])]);
        assert!(store.vectors_from_slot(4).unwrap().is_empty());
    }

    #[test]
    fn test_clear_resets_ids_and_bumps_generation() {
        let (_temp, store) = open_temp();
        for slot in 0..3 {
            store.insert("x", &[1.0], slot).unwrap();
        }

        assert_eq!(store.clear().unwrap(), 1);
        assert_eq!(store.count().unwrap(), 0);
        assert_eq!(store.slot_count().unwrap(), 0);
        assert_eq!(store.next_id().unwrap(), 1);
        assert_eq!(store.lookup(1).unwrap(), None);

        let id = store.insert("fresh", &[1.0], 0).unwrap();
        assert_eq!(id, 1);
        assert_eq!(store.get(id).unwrap().unwrap().generation, 1);

        assert_eq!(store.clear().unwrap(), 2);
    }

    #[test]
    fn test_persists_across_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("memory.db");

        {
            let store = MetadataStore::open(&path).unwrap();
            store.insert("hello", &[1.0, 2.0], 0).unwrap();
            store.clear().unwrap();
            store.insert("again", &[3.0, 4.0], 0).unwrap();
        }

        let store = MetadataStore::open(&path).unwrap();
        assert_eq!(store.generation().unwrap(), 1);
        assert_eq!(store.next_id().unwrap(), 2);
        assert_eq!(store.lookup(1).unwrap().as_deref(), Some("again"));
    }

    #[test]
    fn test_unicode_text() {
        let (_temp, store) = open_temp();
        let id = store.insert("héllo wörld 🦀", &[0.0], 0).unwrap();
        assert_eq!(store.lookup(id).unwrap().as_deref(), Some("héllo wörld 🦀"));
    }
}
