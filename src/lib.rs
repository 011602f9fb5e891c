//! # CodePilot: local code retrieval
//!
//! Segments Python sources into classes and top-level functions, enriches
//! them with imports, calls and branch counts, cuts them into bounded chunks,
//! and stores chunk embeddings in a flat L2 index that can be ranked against a
//! natural-language query.
//!
//! ## Architecture
//!
//! - **[`config`]**: Configuration loading, validation, and artifact paths
//! - **[`embedder`]**: Embedding collaborator trait, mock embedder, batching
//! - **[`indexer`]**: Segmenter, metadata enricher, chunker, directory indexer
//! - **[`store`]**: Append-only vector index with persisted metadata
//! - **[`retriever`]**: Query embedding, k-NN search, relevance ranking

pub mod config;
pub mod embedder;
pub mod indexer;
pub mod retriever;
pub mod store;
