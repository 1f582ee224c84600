//! Vector Index
//!
//! Stores (chunk, embedding, metadata) entries and answers k-nearest
//! lookups by brute-force cosine distance (`1 - cosine similarity`), the
//! same metric on the write and read paths. The index lives in memory
//! and, when opened against a directory, persists every mutation to
//! `index.json` so a restarted process sees exactly what was stored.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::chunker::Chunk;
use crate::embedding::cosine_similarity;

/// On-disk index file name
const INDEX_FILE: &str = "index.json";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Vector index is empty")]
    Empty,
    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("Index IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt index file: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// A chunk together with its embedding, owned by the index once added.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
    pub metadata: Value,
}

/// One nearest-neighbor hit, smaller distance means more similar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Retrieved {
    pub chunk_text: String,
    pub distance: f32,
}

/// Serialized form of the index.
#[derive(Serialize, Deserialize)]
struct IndexFile {
    dimension: usize,
    entries: Vec<EmbeddedChunk>,
}

/// Nearest-neighbor store over embedded chunks.
#[derive(Debug)]
pub struct VectorIndex {
    dimension: usize,
    entries: Vec<EmbeddedChunk>,
    /// Persistence target; `None` for a purely in-memory index
    path: Option<PathBuf>,
}

impl VectorIndex {
    /// Create an index that lives only in memory.
    pub fn in_memory(dimension: usize) -> Self {
        Self {
            dimension,
            entries: Vec::new(),
            path: None,
        }
    }

    /// Open an index persisted under `dir`, creating the directory if
    /// needed and loading any previously stored entries.
    pub fn open(dir: &Path, dimension: usize) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(INDEX_FILE);

        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            let file: IndexFile = serde_json::from_str(&raw)?;
            if file.dimension != dimension {
                return Err(StoreError::DimensionMismatch {
                    expected: dimension,
                    got: file.dimension,
                });
            }
            info!(path = %path.display(), count = file.entries.len(), "Loaded vector index");
            file.entries
        } else {
            debug!(path = %path.display(), "No persisted index, starting empty");
            Vec::new()
        };

        Ok(Self {
            dimension,
            entries,
            path: Some(path),
        })
    }

    /// Append entries to the index. Does not deduplicate against prior
    /// content; callers wanting a clean index must `clear` first.
    pub fn add(&mut self, embedded_chunks: Vec<EmbeddedChunk>) -> Result<(), StoreError> {
        for entry in &embedded_chunks {
            if entry.vector.len() != self.dimension {
                return Err(StoreError::DimensionMismatch {
                    expected: self.dimension,
                    got: entry.vector.len(),
                });
            }
        }

        let count = embedded_chunks.len();
        self.entries.extend(embedded_chunks);
        self.persist()?;
        info!(added = count, total = self.entries.len(), "Added entries to vector index");
        Ok(())
    }

    /// Remove all stored entries.
    pub fn clear(&mut self) -> Result<(), StoreError> {
        if !self.entries.is_empty() {
            warn!(dropped = self.entries.len(), "Clearing vector index");
        }
        self.entries.clear();
        self.persist()
    }

    /// Return up to `top_k` entries nearest to `vector`, ordered by
    /// ascending cosine distance.
    pub fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<Retrieved>, StoreError> {
        if self.entries.is_empty() {
            return Err(StoreError::Empty);
        }
        if vector.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }

        let mut hits: Vec<Retrieved> = self
            .entries
            .iter()
            .map(|entry| Retrieved {
                chunk_text: entry.chunk.text.clone(),
                distance: 1.0 - cosine_similarity(vector, &entry.vector),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);

        debug!(top_k, returned = hits.len(), "Vector index query");
        Ok(hits)
    }

    /// Number of entries currently stored.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = IndexFile {
            dimension: self.dimension,
            entries: self.entries.clone(),
        };
        fs::write(path, serde_json::to_string(&file)?)?;
        debug!(path = %path.display(), count = self.entries.len(), "Persisted vector index");
        Ok(())
    }
}
