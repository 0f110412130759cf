//! Exact flat index.
//!
//! Vectors live contiguously in one `Vec<f32>`; search is a linear scan
//! computing squared Euclidean distance against every slot. No
//! normalization is applied to stored or query vectors.
//!
//! File layout (little-endian):
//!
//! | bytes | field |
//! |---|---|
//! | 4 | magic `VMFI` |
//! | 4 | format version (`u32`) |
//! | 4 | dimension (`u32`) |
//! | 8 | vector count (`u64`) |
//! | count * dimension * 4 | `f32` components, slot order |

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use vecmem_embeddings::squared_l2;

use crate::error::StoreError;
use crate::index::{IndexStats, SearchResult, VectorIndex};

const MAGIC: &[u8; 4] = b"VMFI";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

/// Brute-force exact nearest-neighbor index.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    /// Create an empty index for vectors of `dimension` components.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Load an index file.
    ///
    /// A missing file surfaces as `StoreError::Io` with kind `NotFound`, which
    /// callers use to tell "no index yet" apart from a damaged one.
    pub fn load(path: &Path, dimension: usize) -> Result<Self, StoreError> {
        let bytes = fs::read(path)?;

        if bytes.len() < HEADER_LEN {
            return Err(StoreError::Format(format!(
                "file is {} bytes, shorter than the header",
                bytes.len()
            )));
        }
        if &bytes[0..4] != MAGIC {
            return Err(StoreError::Format("bad magic".to_string()));
        }

        let version = read_u32(&bytes[4..8]);
        if version != FORMAT_VERSION {
            return Err(StoreError::Format(format!(
                "unsupported format version {version}"
            )));
        }

        let found = read_u32(&bytes[8..12]) as usize;
        if found != dimension {
            return Err(StoreError::IncompatibleDimension {
                expected: dimension,
                found,
            });
        }

        let count = read_u64(&bytes[12..20]);
        let payload = &bytes[HEADER_LEN..];
        let expected_len = usize::try_from(count)
            .ok()
            .and_then(|c| c.checked_mul(dimension))
            .and_then(|n| n.checked_mul(4));
        if expected_len != Some(payload.len()) {
            return Err(StoreError::Format(format!(
                "header declares {count} vectors but payload is {} bytes",
                payload.len()
            )));
        }

        let data = payload
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        info!(path = ?path, vectors = count, dim = dimension, "Loaded flat index");
        Ok(Self { dimension, data })
    }

    /// Load `path`, or start empty when the file does not exist yet.
    pub fn open_or_create(path: &Path, dimension: usize) -> Result<Self, StoreError> {
        match Self::load(path, dimension) {
            Ok(index) => Ok(index),
            Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = ?path, dim = dimension, "Creating new flat index");
                Ok(Self::new(dimension))
            }
            Err(e) => Err(e),
        }
    }

    fn encoded_len(&self) -> u64 {
        (HEADER_LEN + self.data.len() * 4) as u64
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

/// Sibling path used while writing, renamed over the target when complete.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

impl VectorIndex for FlatIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    fn add(&mut self, vector: &[f32]) -> Result<usize, StoreError> {
        if vector.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        self.data.extend_from_slice(vector);
        let slot = self.len() - 1;
        debug!(slot, "Added vector");
        Ok(slot)
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, StoreError> {
        if query.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Err(StoreError::InvalidInput("k must be at least 1".to_string()));
        }
        if self.is_empty() {
            return Ok(Vec::new());
        }

        let mut results: Vec<SearchResult> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(slot, v)| SearchResult::new(slot, squared_l2(query, v)))
            .collect();

        results.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.slot.cmp(&b.slot))
        });
        results.truncate(k);

        debug!(k, found = results.len(), "Search complete");
        Ok(results)
    }

    fn vector(&self, slot: usize) -> Option<&[f32]> {
        let start = slot.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    fn truncate(&mut self, len: usize) {
        self.data.truncate(len * self.dimension);
    }

    fn clear(&mut self) {
        self.data = Vec::new();
    }

    fn stats(&self) -> IndexStats {
        IndexStats {
            vector_count: self.len(),
            dimension: self.dimension,
            size_bytes: self.encoded_len(),
        }
    }

    fn save(&self, path: &Path) -> Result<(), StoreError> {
        let tmp = temp_path(path);

        {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(MAGIC)?;
            writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
            writer.write_all(&(self.dimension as u32).to_le_bytes())?;
            writer.write_all(&(self.len() as u64).to_le_bytes())?;
            for value in &self.data {
                writer.write_all(&value.to_le_bytes())?;
            }
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }

        fs::rename(&tmp, path)?;

        // Make the rename itself durable where the platform allows it
        if let Some(parent) = path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        debug!(path = ?path, vectors = self.len(), "Saved flat index");
        Ok(())
    }
}
