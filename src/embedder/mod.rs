/// Embedder trait and shared helpers for text embedding.
///
/// Vector generation itself is an external collaborator; this module only
/// fixes its contract and the batching policy the indexer drives it with.
pub mod mock;

use thiserror::Error;
use tracing::{info, warn};

/// Errors that can occur during embedding operations.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("embedder returned {actual} vectors for a batch of {expected}")]
    BatchSizeMismatch { expected: usize, actual: usize },
}

/// Trait for text embedding implementations.
///
/// Implementations map each text to one vector of [`Embedder::dimensions`]
/// components.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Embed multiple text strings into vectors.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError>;

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;
}

/// Embed `texts` in sequential batches of `batch_size`.
///
/// Always returns exactly one vector per input. A batch that fails, or that
/// comes back with the wrong number of vectors, is replaced by zero vectors so
/// a single bad batch never aborts indexing.
pub fn embed_in_batches<E: Embedder + ?Sized>(
    embedder: &E,
    texts: &[&str],
    batch_size: usize,
) -> Vec<Vec<f32>> {
    let batch_size = batch_size.max(1);
    let dimensions = embedder.dimensions();
    let mut vectors = Vec::with_capacity(texts.len());

    for (batch_no, batch) in texts.chunks(batch_size).enumerate() {
        let done = batch_no * batch_size;
        if batch_no > 0 && batch_no % 5 == 0 {
            info!("Generated embeddings for {done}/{} texts", texts.len());
        }

        let result = embedder.embed_batch(batch).and_then(|out| {
            if out.len() == batch.len() {
                Ok(out)
            } else {
                Err(EmbedderError::BatchSizeMismatch {
                    expected: batch.len(),
                    actual: out.len(),
                })
            }
        });

        match result {
            Ok(out) => vectors.extend(out),
            Err(e) => {
                warn!("Embedding batch at offset {done} failed, using zero vectors: {e}");
                vectors.extend(std::iter::repeat_n(vec![0.0; dimensions], batch.len()));
            }
        }
    }

    vectors
}

/// Embed a query, degrading to a zero vector when the collaborator fails.
pub fn embed_query<E: Embedder + ?Sized>(embedder: &E, text: &str) -> Vec<f32> {
    match embedder.embed(text) {
        Ok(v) => v,
        Err(e) => {
            warn!("Query embedding failed, using a zero vector: {e}");
            vec![0.0; embedder.dimensions()]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockEmbedder;
    use super::*;

    struct FailingEmbedder;

    impl Embedder for FailingEmbedder {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedderError> {
            Err(EmbedderError::InferenceFailed("offline".into()))
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
            // Drops the last text to exercise the count check.
            if texts.len() > 1 {
                Ok(vec![vec![1.0; 4]; texts.len() - 1])
            } else {
                Err(EmbedderError::InferenceFailed("offline".into()))
            }
        }

        fn dimensions(&self) -> usize {
            4
        }
    }

    #[test]
    fn test_batches_preserve_count_and_order() {
        let embedder = MockEmbedder::new(16);
        let texts = ["a", "b", "c", "d", "e"];
        let vectors = embed_in_batches(&embedder, &texts, 2);
        assert_eq!(vectors.len(), 5);
        for (text, vector) in texts.iter().zip(&vectors) {
            assert_eq!(vector, &embedder.embed(text).unwrap());
        }
    }

    #[test]
    fn test_failed_batches_become_zero_vectors() {
        let vectors = embed_in_batches(&FailingEmbedder, &["x", "y", "z"], 2);
        assert_eq!(vectors.len(), 3);
        assert!(vectors.iter().all(|v| v == &vec![0.0; 4]));
    }

    #[test]
    fn test_query_failure_degrades() {
        assert_eq!(embed_query(&FailingEmbedder, "q"), vec![0.0; 4]);
    }

    #[test]
    fn test_empty_input() {
        let embedder = MockEmbedder::new(8);
        assert!(embed_in_batches(&embedder, &[], 8).is_empty());
    }
}
