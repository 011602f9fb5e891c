//! Append-only flat L2 vector index with a parallel metadata store.
//!
//! Slot `i` of the vector buffer and `records[i]` always describe the same
//! chunk; slots are assigned in insertion order and never reused. Both halves
//! are persisted together as two coupled artifacts.
use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use models::ChunkMetadata;

pub mod insert;
pub mod models;
pub mod persist;
pub mod search;

/// Errors that can occur during vector index operations.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector dimension must be positive")]
    ZeroDimension,

    #[error("{chunks} chunks but {vectors} vectors")]
    LengthMismatch { chunks: usize, vectors: usize },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("metadata serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt index artifact: {0}")]
    Corrupt(String),

    #[error("index has no storage location")]
    NoStorage,
}

/// Lifecycle of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    /// No dimension fixed yet.
    Uninitialized,
    /// Dimension fixed, no vectors.
    Empty,
    Populated,
}

/// Locations of the two coupled artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPaths {
    pub vectors: PathBuf,
    pub metadata: PathBuf,
}

impl IndexPaths {
    pub fn from_config(config: &Config) -> Self {
        Self {
            vectors: config.index_path(),
            metadata: config.metadata_path(),
        }
    }

    fn both_exist(&self) -> bool {
        self.vectors.exists() && self.metadata.exists()
    }
}

pub struct VectorIndex {
    pub(crate) dimension: Option<usize>,
    /// Slot-major, `dimension` floats per slot.
    pub(crate) vectors: Vec<f32>,
    pub(crate) records: Vec<ChunkMetadata>,
    pub(crate) paths: Option<IndexPaths>,
}

impl VectorIndex {
    /// An index that lives only in memory; `save` is a no-op.
    pub fn in_memory(dimension: Option<usize>) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
            records: Vec::new(),
            paths: None,
        }
    }

    /// Open the index persisted at `paths`, or start an empty one.
    ///
    /// A fresh index is saved immediately so both artifacts exist. When the
    /// artifacts exist but cannot be loaded, the failure is logged and a fresh
    /// empty index is returned.
    pub fn open(paths: IndexPaths, dimension: usize) -> Self {
        let mut index = Self {
            dimension: Some(dimension),
            vectors: Vec::new(),
            records: Vec::new(),
            paths: Some(paths.clone()),
        };

        if paths.both_exist() {
            match index.load() {
                Ok(()) => {
                    info!(
                        "Loaded existing index from {} ({} vectors)",
                        paths.vectors.display(),
                        index.len()
                    );
                    if index.dimension.is_some_and(|d| d != dimension) {
                        warn!(
                            "Persisted index dimension {:?} differs from configured {dimension}",
                            index.dimension
                        );
                    }
                    return index;
                }
                Err(e) => warn!("Found index files but failed to load them: {e}"),
            }
        } else {
            info!(
                "No existing index found at {}, creating an empty one",
                paths.vectors.display()
            );
        }

        if let Err(e) = index.save() {
            warn!("Failed to save empty index: {e}");
        }
        index
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn state(&self) -> IndexState {
        match (self.dimension, self.records.is_empty()) {
            (None, _) => IndexState::Uninitialized,
            (Some(_), true) => IndexState::Empty,
            (Some(_), false) => IndexState::Populated,
        }
    }

    pub fn paths(&self) -> Option<&IndexPaths> {
        self.paths.as_ref()
    }

    /// Metadata stored at `slot`.
    pub fn record(&self, slot: usize) -> Option<&ChunkMetadata> {
        self.records.get(slot)
    }

    pub fn records(&self) -> &[ChunkMetadata] {
        &self.records
    }

    /// Vector stored at `slot`.
    pub fn vector(&self, slot: usize) -> Option<&[f32]> {
        let dim = self.dimension?;
        self.vectors.get(slot * dim..(slot + 1) * dim)
    }
}
