use std::ops::Range;

use tracing::{error, info};

use super::{IndexError, VectorIndex};
use crate::indexer::chunker::Chunk;

impl VectorIndex {
    /// Append chunks and their vectors as new trailing slots.
    ///
    /// Every vector must have exactly `dimension` components, and `dimension`
    /// must match the index once fixed; an uninitialized index adopts it.
    /// Validation happens before anything is appended, so a rejected call
    /// leaves the index untouched.
    ///
    /// A persistent index is saved after the append. If that save fails the
    /// error is returned, but the appended slots stay in memory.
    pub fn add(
        &mut self,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
        dimension: usize,
    ) -> Result<Range<usize>, IndexError> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::LengthMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }
        if dimension == 0 {
            return Err(IndexError::ZeroDimension);
        }
        if let Some(expected) = self.dimension {
            if expected != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    actual: dimension,
                });
            }
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }

        self.dimension = Some(dimension);
        let start = self.records.len();
        self.vectors.reserve(vectors.len() * dimension);
        for vector in vectors {
            self.vectors.extend_from_slice(vector);
        }
        self.records
            .extend(chunks.iter().map(|chunk| chunk.metadata.clone()));
        let slots = start..self.records.len();

        info!(
            "Added {} chunks to vector index. Total: {}",
            slots.len(),
            self.len()
        );

        if self.paths.is_some() {
            if let Err(e) = self.save() {
                error!("Failed to save index after adding chunks: {e}");
                return Err(e);
            }
        }

        Ok(slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::segmenter::UnitKind;
    use crate::store::models::ChunkMetadata;
    use crate::store::{IndexPaths, IndexState};

    fn chunk(name: &str) -> Chunk {
        Chunk {
            text: format!("def {name}(): pass"),
            metadata: ChunkMetadata {
                file_path: "m.py".into(),
                kind: UnitKind::Function,
                name: Some(name.into()),
                docstring: String::new(),
                members: vec![],
                bases: vec![],
                parameters: vec![],
                start_line: Some(1),
                end_line: Some(1),
                imports: None,
                called_symbols: None,
                branch_count: None,
                chunk_index: 0,
                chunk_count: 1,
                content: Some(format!("def {name}(): pass")),
            },
        }
    }

    #[test]
    fn test_add_fixes_dimension() {
        let mut index = VectorIndex::in_memory(None);
        let slots = index
            .add(&[chunk("a"), chunk("b")], &[vec![0.0, 1.0], vec![1.0, 0.0]], 2)
            .unwrap();
        assert_eq!(slots, 0..2);
        assert_eq!(index.state(), IndexState::Populated);
        assert_eq!(index.dimension(), Some(2));
        assert_eq!(index.vector(1), Some(&[1.0, 0.0][..]));
        assert_eq!(index.record(1).unwrap().name.as_deref(), Some("b"));

        let slots = index.add(&[chunk("c")], &[vec![2.0, 2.0]], 2).unwrap();
        assert_eq!(slots, 2..3);
    }

    #[test]
    fn test_dimension_mismatch_leaves_index_unchanged() {
        let mut index = VectorIndex::in_memory(Some(3));
        index.add(&[chunk("a")], &[vec![0.0; 3]], 3).unwrap();

        let err = index.add(&[chunk("b")], &[vec![0.0; 4]], 4).unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { expected: 3, actual: 4 }));

        let err = index
            .add(&[chunk("b"), chunk("c")], &[vec![0.0; 3], vec![0.0; 2]], 3)
            .unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { expected: 3, actual: 2 }));

        assert_eq!(index.len(), 1);
        assert_eq!(index.vectors.len(), 3);
    }

    #[test]
    fn test_length_mismatch() {
        let mut index = VectorIndex::in_memory(None);
        let err = index.add(&[chunk("a")], &[], 2).unwrap_err();
        assert!(matches!(err, IndexError::LengthMismatch { chunks: 1, vectors: 0 }));
        assert_eq!(index.state(), IndexState::Uninitialized);
    }

    #[test]
    fn test_add_persists() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths {
            vectors: dir.path().join("v.bin"),
            metadata: dir.path().join("m.json"),
        };
        let mut index = VectorIndex::open(paths.clone(), 2);
        index.add(&[chunk("a")], &[vec![0.5, 0.5]], 2).unwrap();

        let reopened = VectorIndex::open(paths, 2);
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.vector(0), Some(&[0.5, 0.5][..]));
    }

    #[test]
    fn test_save_failure_keeps_appended_slots() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the index directory should be.
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, b"").unwrap();
        let mut index = VectorIndex::in_memory(Some(2));
        index.paths = Some(IndexPaths {
            vectors: blocker.join("v.bin"),
            metadata: blocker.join("m.json"),
        });

        let err = index.add(&[chunk("a")], &[vec![1.0, 1.0]], 2).unwrap_err();
        assert!(matches!(err, IndexError::Io { .. }));
        assert_eq!(index.len(), 1);
    }
}
