//! On-disk form of the index.
//!
//! The vector file is a small little-endian header followed by the raw
//! slot-major floats:
//!
//! ```text
//! magic "CPVX" | version u32 | dimension u32 (0 = unset) | count u64 | f32 * count * dimension
//! ```
//!
//! The metadata file is a JSON array with one record per slot.
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::models::ChunkMetadata;
use super::{IndexError, IndexPaths, VectorIndex};

const MAGIC: &[u8; 4] = b"CPVX";
const VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

/// Serialize vectors to bytes for storage.
pub fn serialize_vectors(dimension: Option<usize>, count: usize, vectors: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + vectors.len() * 4);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&VERSION.to_le_bytes());
    bytes.extend_from_slice(&(dimension.unwrap_or(0) as u32).to_le_bytes());
    bytes.extend_from_slice(&(count as u64).to_le_bytes());
    for v in vectors {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Parse a vector file into `(dimension, count, values)`.
pub fn deserialize_vectors(bytes: &[u8]) -> Result<(Option<usize>, usize, Vec<f32>), IndexError> {
    if bytes.len() < HEADER_LEN {
        return Err(IndexError::Corrupt(format!(
            "vector file is {} bytes, shorter than its header",
            bytes.len()
        )));
    }
    if &bytes[0..4] != MAGIC {
        return Err(IndexError::Corrupt("bad magic in vector file".into()));
    }
    let version = u32::from_le_bytes(word(bytes, 4));
    if version != VERSION {
        return Err(IndexError::Corrupt(format!(
            "unsupported vector file version {version}"
        )));
    }
    let dimension = u32::from_le_bytes(word(bytes, 8)) as usize;
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&bytes[12..20]);
    let count = u64::from_le_bytes(count_bytes) as usize;

    let body = &bytes[HEADER_LEN..];
    let expected = count
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| IndexError::Corrupt("vector count overflows".into()))?;
    if body.len() != expected {
        return Err(IndexError::Corrupt(format!(
            "expected {expected} bytes of vectors for {count}x{dimension}, found {}",
            body.len()
        )));
    }
    if dimension == 0 && count > 0 {
        return Err(IndexError::Corrupt(
            "vectors present but dimension is unset".into(),
        ));
    }

    let values = body
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    let dimension = (dimension > 0).then_some(dimension);
    Ok((dimension, count, values))
}

fn word(bytes: &[u8], at: usize) -> [u8; 4] {
    [bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]
}

impl VectorIndex {
    /// Write both artifacts to the configured location. In-memory indexes
    /// have nothing to write.
    pub fn save(&self) -> Result<(), IndexError> {
        match &self.paths {
            Some(paths) => self.save_to(paths),
            None => Ok(()),
        }
    }

    pub fn save_to(&self, paths: &IndexPaths) -> Result<(), IndexError> {
        let vectors = serialize_vectors(self.dimension, self.records.len(), &self.vectors);
        let metadata = serde_json::to_vec_pretty(&self.records)?;
        write_atomic(&paths.vectors, &vectors)?;
        write_atomic(&paths.metadata, &metadata)?;
        debug!(
            "Saved {} vectors to {} and metadata to {}",
            self.records.len(),
            paths.vectors.display(),
            paths.metadata.display()
        );
        Ok(())
    }

    /// Replace the in-memory state with the persisted artifacts.
    pub fn load(&mut self) -> Result<(), IndexError> {
        let paths = self.paths.clone().ok_or(IndexError::NoStorage)?;
        self.load_from(&paths)
    }

    /// Both artifacts are read and checked against each other before
    /// anything is replaced; on error the index is left as it was.
    pub fn load_from(&mut self, paths: &IndexPaths) -> Result<(), IndexError> {
        let bytes = read(&paths.vectors)?;
        let (dimension, count, vectors) = deserialize_vectors(&bytes)?;
        let json = read(&paths.metadata)?;
        let records: Vec<ChunkMetadata> = serde_json::from_slice(&json)?;

        if records.len() != count {
            return Err(IndexError::Corrupt(format!(
                "{} holds {count} vectors but {} holds {} records",
                paths.vectors.display(),
                paths.metadata.display(),
                records.len()
            )));
        }

        // An empty persisted index keeps whatever dimension was configured.
        if dimension.is_some() {
            self.dimension = dimension;
        }
        self.vectors = vectors;
        self.records = records;
        info!("Loaded {} records from {}", count, paths.metadata.display());
        Ok(())
    }
}

fn read(path: &Path) -> Result<Vec<u8>, IndexError> {
    fs::read(path).map_err(|source| io_error(path, source))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), IndexError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
        }
    }
    let tmp = tmp_path(path);
    fs::write(&tmp, bytes).map_err(|source| io_error(&tmp, source))?;
    fs::rename(&tmp, path).map_err(|source| io_error(path, source))
}

fn io_error(path: &Path, source: std::io::Error) -> IndexError {
    IndexError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::chunker::Chunk;
    use crate::indexer::segmenter::UnitKind;

    fn paths_in(dir: &Path) -> IndexPaths {
        IndexPaths {
            vectors: dir.join("vectors.bin"),
            metadata: dir.join("metadata.json"),
        }
    }

    fn chunk(name: &str, content: Option<&str>) -> Chunk {
        Chunk {
            text: name.to_string(),
            metadata: ChunkMetadata {
                file_path: "pkg/mod.py".into(),
                kind: UnitKind::Class,
                name: Some(name.into()),
                docstring: "Doc.".into(),
                members: vec!["run".into()],
                bases: vec!["Base".into()],
                parameters: vec![],
                start_line: Some(3),
                end_line: Some(9),
                imports: Some(vec!["os".into()]),
                called_symbols: Some(vec!["print".into()]),
                branch_count: Some(2),
                chunk_index: 0,
                chunk_count: 1,
                content: content.map(str::to_string),
            },
        }
    }

    #[test]
    fn test_vector_bytes_layout() {
        let bytes = serialize_vectors(Some(2), 1, &[1.0, 2.0]);
        assert_eq!(&bytes[0..4], b"CPVX");
        assert_eq!(bytes.len(), HEADER_LEN + 8);
        assert_eq!(&bytes[HEADER_LEN..HEADER_LEN + 4], &1.0f32.to_le_bytes());
        let (dim, count, values) = deserialize_vectors(&bytes).unwrap();
        assert_eq!((dim, count), (Some(2), 1));
        assert_eq!(values, [1.0, 2.0]);
    }

    #[test]
    fn test_truncated_vector_file_is_corrupt() {
        let mut bytes = serialize_vectors(Some(2), 2, &[1.0, 2.0, 3.0, 4.0]);
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(deserialize_vectors(&bytes), Err(IndexError::Corrupt(_))));
        assert!(matches!(deserialize_vectors(b"CPV"), Err(IndexError::Corrupt(_))));
    }

    #[test]
    fn test_round_trip_preserves_search() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        let mut index = VectorIndex::in_memory(None);
        index
            .add(
                &[chunk("A", Some("class A: pass")), chunk("B", None)],
                &[vec![0.1, 0.9, 0.0], vec![0.7, 0.2, 0.1]],
                3,
            )
            .unwrap();
        index.save_to(&paths).unwrap();

        let mut restored = VectorIndex::in_memory(None);
        restored.load_from(&paths).unwrap();
        assert_eq!(restored.dimension(), Some(3));
        assert_eq!(restored.records(), index.records());

        let query = [0.5, 0.5, 0.0];
        assert_eq!(
            restored.search(&query, 2).unwrap(),
            index.search(&query, 2).unwrap()
        );
    }

    #[test]
    fn test_count_disagreement_leaves_state() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        fs::write(&paths.vectors, serialize_vectors(Some(1), 1, &[1.0])).unwrap();
        fs::write(&paths.metadata, b"[]").unwrap();

        let mut index = VectorIndex::in_memory(Some(1));
        index.add(&[chunk("kept", None)], &[vec![5.0]], 1).unwrap();
        let err = index.load_from(&paths).unwrap_err();
        assert!(matches!(err, IndexError::Corrupt(_)));
        assert_eq!(index.len(), 1);
        assert_eq!(index.vector(0), Some(&[5.0][..]));
    }

    #[test]
    fn test_load_without_storage() {
        let mut index = VectorIndex::in_memory(None);
        assert!(matches!(index.load(), Err(IndexError::NoStorage)));
        assert!(index.save().is_ok());
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        VectorIndex::in_memory(Some(4)).save_to(&paths).unwrap();
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert!(names.iter().all(|n| !n.ends_with(".tmp")), "{names:?}");
        assert_eq!(names.len(), 2);
    }
}
