//! Query-time path: embed the query, search the index, rank the hits.
use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::embedder::{Embedder, embed_query};
use crate::indexer::segmenter::UnitKind;
use crate::store::VectorIndex;
use crate::store::models::ChunkMetadata;
use crate::store::search::SearchHit;

#[derive(Debug, Clone, PartialEq)]
pub struct RankedResult {
    pub slot: usize,
    /// Displayable text of the chunk, possibly a placeholder.
    pub content: String,
    pub metadata: ChunkMetadata,
    pub distance: f32,
    pub relevance_score: f32,
}

/// Map a squared L2 distance into `(0, 1]`; zero distance scores 1.
pub fn relevance_score(distance: f32) -> f32 {
    1.0 / (1.0 + distance)
}

pub struct Retriever<'a, E: Embedder + ?Sized> {
    index: &'a VectorIndex,
    embedder: &'a E,
}

impl<'a, E: Embedder + ?Sized> Retriever<'a, E> {
    pub fn new(index: &'a VectorIndex, embedder: &'a E) -> Self {
        Self { index, embedder }
    }

    /// Return up to `k` chunks closest to `query`, best first.
    ///
    /// Results with equal scores keep the index's slot order. A query vector
    /// the index cannot search (e.g. a degenerate embedding of the wrong
    /// length) is logged and yields no results.
    pub fn retrieve(&self, query: &str, k: usize) -> Vec<RankedResult> {
        let vector = embed_query(self.embedder, query);
        match self.index.search(&vector, k) {
            Ok(hits) => self.rank(&hits),
            Err(e) => {
                warn!("Search failed for query {query:?}: {e}");
                Vec::new()
            }
        }
    }

    /// Attach content and relevance to raw hits and order them by descending
    /// relevance.
    pub fn rank(&self, hits: &[SearchHit]) -> Vec<RankedResult> {
        let mut results: Vec<RankedResult> = hits
            .iter()
            .filter_map(|hit| {
                let metadata = self.index.record(hit.slot)?.clone();
                Some(RankedResult {
                    slot: hit.slot,
                    content: recover_content(&metadata),
                    metadata,
                    distance: hit.distance,
                    relevance_score: relevance_score(hit.distance),
                })
            })
            .collect();
        results.sort_by(|a, b| sort_key(b.relevance_score).total_cmp(&sort_key(a.relevance_score)));
        results
    }
}

/// Undefined scores rank below every real one.
fn sort_key(score: f32) -> f32 {
    if score.is_nan() { f32::NEG_INFINITY } else { score }
}

/// Text to show for a stored chunk.
///
/// Tries the stored content, then the chunk's line range in the source file,
/// and finally a placeholder naming the unit.
pub fn recover_content(metadata: &ChunkMetadata) -> String {
    if let Some(content) = &metadata.content {
        return content.clone();
    }
    if let (Some(start), Some(end)) = (metadata.start_line, metadata.end_line) {
        match read_lines(Path::new(&metadata.file_path), start, end) {
            Some(text) => return text,
            None => debug!(
                "Could not recover lines {start}-{end} of {}",
                metadata.file_path
            ),
        }
    }
    placeholder(metadata)
}

/// Lines `start..=end` (1-based) of `path`, or `None` if the file is gone or
/// the range selects nothing.
fn read_lines(path: &Path, start: usize, end: usize) -> Option<String> {
    let text = fs::read_to_string(path).ok()?;
    let first = start.max(1) - 1;
    let take = end.checked_sub(first)?;
    let lines: String = text.split_inclusive('\n').skip(first).take(take).collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines)
    }
}

fn placeholder(metadata: &ChunkMetadata) -> String {
    let path = &metadata.file_path;
    match (metadata.kind, metadata.name.as_deref()) {
        (UnitKind::Class, Some(name)) => format!(
            "class {name}:\n    # Content not available - check file {path}\n    pass"
        ),
        (UnitKind::Function, Some(name)) => format!(
            "def {name}({}):\n    # Content not available - check file {path}\n    pass",
            metadata.parameters.join(", ")
        ),
        _ => format!("# Content from {path} (unavailable in search results)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::mock::MockEmbedder;
    use crate::indexer::chunker::Chunk;

    fn meta(kind: UnitKind, name: Option<&str>) -> ChunkMetadata {
        ChunkMetadata {
            file_path: "gone/missing.py".into(),
            kind,
            name: name.map(str::to_string),
            docstring: String::new(),
            members: vec![],
            bases: vec![],
            parameters: vec!["a".into(), "b".into()],
            start_line: Some(1),
            end_line: Some(2),
            imports: None,
            called_symbols: None,
            branch_count: None,
            chunk_index: 0,
            chunk_count: 1,
            content: None,
        }
    }

    #[test]
    fn test_relevance_score() {
        assert_eq!(relevance_score(0.0), 1.0);
        assert!((relevance_score(0.5) - 0.667).abs() < 1e-3);
        assert!((relevance_score(2.0) - 0.333).abs() < 1e-3);
        assert!(relevance_score(1.0) > relevance_score(1.5));
    }

    #[test]
    fn test_rank_orders_by_score() {
        let mut index = VectorIndex::in_memory(None);
        let chunks = [
            Chunk { text: "far".into(), metadata: meta(UnitKind::Function, Some("far")) },
            Chunk { text: "near".into(), metadata: meta(UnitKind::Function, Some("near")) },
        ];
        index.add(&chunks, &[vec![0.0], vec![0.0]], 1).unwrap();
        let embedder = MockEmbedder::new(1);
        let retriever = Retriever::new(&index, &embedder);

        let results = retriever.rank(&[
            SearchHit { slot: 0, distance: 2.0 },
            SearchHit { slot: 1, distance: 0.5 },
        ]);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].metadata.name.as_deref(), Some("near"));
        assert!((results[0].relevance_score - 0.667).abs() < 1e-3);
        assert!((results[1].relevance_score - 0.333).abs() < 1e-3);
    }

    #[test]
    fn test_nan_scores_rank_last() {
        let mut index = VectorIndex::in_memory(None);
        let chunks: Vec<Chunk> = ["undefined", "far", "near"]
            .into_iter()
            .map(|n| Chunk { text: n.to_string(), metadata: meta(UnitKind::Function, Some(n)) })
            .collect();
        index.add(&chunks, &[vec![0.0], vec![0.0], vec![0.0]], 1).unwrap();
        let embedder = MockEmbedder::new(1);

        let results = Retriever::new(&index, &embedder).rank(&[
            SearchHit { slot: 0, distance: f32::NAN },
            SearchHit { slot: 1, distance: 3.0 },
            SearchHit { slot: 2, distance: 1.0 },
        ]);
        let names: Vec<_> = results.iter().map(|r| r.metadata.name.as_deref().unwrap()).collect();
        assert_eq!(names, ["near", "far", "undefined"]);
        assert!(results[2].relevance_score.is_nan());
    }

    #[test]
    fn test_retrieve_end_to_end() {
        let embedder = MockEmbedder::new(16);
        let texts = ["def parse_config(): pass", "class Renderer: pass"];
        let chunks: Vec<Chunk> = texts
            .iter()
            .map(|t| {
                let mut m = meta(UnitKind::Function, Some("x"));
                m.content = Some(t.to_string());
                Chunk { text: t.to_string(), metadata: m }
            })
            .collect();
        let vectors = embedder.embed_batch(&texts).unwrap();
        let mut index = VectorIndex::in_memory(None);
        index.add(&chunks, &vectors, 16).unwrap();

        let results = Retriever::new(&index, &embedder).retrieve("class Renderer: pass", 5);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content, "class Renderer: pass");
        assert_eq!(results[0].relevance_score, 1.0);
    }

    #[test]
    fn test_wrong_length_query_yields_nothing() {
        let mut index = VectorIndex::in_memory(None);
        let chunk = Chunk { text: "t".into(), metadata: meta(UnitKind::RawText, None) };
        index.add(&[chunk], &[vec![1.0; 4]], 4).unwrap();
        let embedder = MockEmbedder::new(8);
        assert!(Retriever::new(&index, &embedder).retrieve("t", 3).is_empty());
    }

    #[test]
    fn test_content_from_metadata() {
        let mut m = meta(UnitKind::Function, Some("f"));
        m.content = Some("def f(a, b): return a + b".into());
        assert_eq!(recover_content(&m), "def f(a, b): return a + b");
    }

    #[test]
    fn test_content_reread_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("m.py");
        fs::write(&file, "import os\ndef f(a, b):\n    return a + b\nx = 1\n").unwrap();
        let mut m = meta(UnitKind::Function, Some("f"));
        m.file_path = file.to_string_lossy().into_owned();
        m.start_line = Some(2);
        m.end_line = Some(3);
        assert_eq!(recover_content(&m), "def f(a, b):\n    return a + b\n");
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(
            recover_content(&meta(UnitKind::Class, Some("Cache"))),
            "class Cache:\n    # Content not available - check file gone/missing.py\n    pass"
        );
        assert_eq!(
            recover_content(&meta(UnitKind::Function, Some("f"))),
            "def f(a, b):\n    # Content not available - check file gone/missing.py\n    pass"
        );
        let mut raw = meta(UnitKind::RawText, None);
        raw.start_line = None;
        assert_eq!(
            recover_content(&raw),
            "# Content from gone/missing.py (unavailable in search results)"
        );
    }
}
