//! # vecmem-store
//!
//! Persistent vector memory: an exact flat index, a RocksDB metadata
//! store, and the service that keeps the two aligned.
//!
//! ## Features
//! - Exact k-NN by squared Euclidean distance (linear scan)
//! - Index file written atomically after every mutation
//! - Explicit slot -> record id mapping, persisted with each record
//! - Reset generations so handles from before a reset are detected
//! - Startup reconciliation replaying vectors the index file missed

pub mod error;
pub mod flat;
pub mod index;
pub mod metadata;
pub mod service;

pub use error::StoreError;
pub use flat::FlatIndex;
pub use index::{IndexStats, SearchResult, VectorIndex};
pub use metadata::{MemoryRecord, MetadataStore, FIRST_ID};
pub use service::{MemoryConfig, MemoryService, SlotRef, StoredMemory};
