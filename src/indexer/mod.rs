//! Source-to-chunk pipeline: segmentation, enrichment, chunking, and the
//! directory indexer that drives them into the vector index.

pub mod chunker;
pub mod core;
pub mod enricher;
pub mod python;
pub mod segmenter;

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while setting up parsers or reading source files.
///
/// Syntax errors in the source itself are not errors here: they degrade to a
/// raw-text unit (segmenter) or to missing derived facts (enricher).
#[derive(Error, Debug)]
pub enum ParserError {
    #[error("failed to load Python grammar: {0}")]
    Language(#[from] tree_sitter::LanguageError),

    #[error("invalid tree-sitter query: {0}")]
    Query(#[from] tree_sitter::QueryError),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
