//! Offline embedder used by the CLI and the tests.
//!
//! Each identifier token and each of its character trigrams is hashed into a
//! signed bucket, then the vector is scaled to unit length. Texts that share
//! names land close together, which is enough to exercise ranking without an
//! embedding service.
use std::hash::{DefaultHasher, Hash, Hasher};

use super::{Embedder, EmbedderError};

const TOKEN_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

#[derive(Debug, Clone, Copy)]
pub struct MockEmbedder {
    pub dimensions: usize,
}

impl MockEmbedder {
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(768)
    }
}

impl Embedder for MockEmbedder {
    /// Text without any identifier characters embeds to the zero vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let mut vector = vec![0.0; self.dimensions];
        if vector.is_empty() {
            return Ok(vector);
        }
        for token in identifiers(text) {
            bump(&mut vector, 0, &token, TOKEN_WEIGHT);
            let padded: Vec<char> = format!("^{token}$").chars().collect();
            for gram in padded.windows(3) {
                let gram: String = gram.iter().collect();
                bump(&mut vector, 1, &gram, TRIGRAM_WEIGHT);
            }
        }
        scale_to_unit(&mut vector);
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Lowercased runs of alphanumerics and underscores.
fn identifiers(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// Add `weight` to the bucket `feature` hashes to, with a hash-derived sign.
/// `space` keeps tokens and trigrams with the same spelling apart.
fn bump(vector: &mut [f32], space: u8, feature: &str, weight: f32) {
    let mut hasher = DefaultHasher::new();
    space.hash(&mut hasher);
    feature.hash(&mut hasher);
    let h = hasher.finish();
    let slot = (h % vector.len() as u64) as usize;
    if h >> 63 == 0 {
        vector[slot] += weight;
    } else {
        vector[slot] -= weight;
    }
}

fn scale_to_unit(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
    }

    #[test]
    fn test_vector_length_follows_configuration() {
        assert_eq!(MockEmbedder::new(384).embed("def f(a, b): return a + b").unwrap().len(), 384);
        assert!(MockEmbedder::new(0).embed("def f(): pass").unwrap().is_empty());
        assert_eq!(MockEmbedder::default().dimensions(), 768);
    }

    #[test]
    fn test_identical_text_identical_vector() {
        let embedder = MockEmbedder::new(64);
        let single = embedder.embed("class Parser(Base): pass").unwrap();
        let batch = embedder
            .embed_batch(&["class Parser(Base): pass", "class Lexer: pass"])
            .unwrap();
        assert_eq!(batch[0], single);
        assert_eq!(squared_distance(&batch[0], &single), 0.0);
        assert_ne!(batch[1], single);
    }

    #[test]
    fn test_unit_length() {
        let v = MockEmbedder::new(128).embed("import os\nos.path.join(a, b)").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "got {norm}");
    }

    #[test]
    fn test_shared_names_rank_closer() {
        let embedder = MockEmbedder::new(256);
        let query = embedder.embed("load_config").unwrap();
        let related = embedder
            .embed("def load_config(path):\n    return read(path)")
            .unwrap();
        let unrelated = embedder.embed("class Renderer:\n    pass").unwrap();
        assert!(squared_distance(&query, &related) < squared_distance(&query, &unrelated));
    }

    #[test]
    fn test_punctuation_only_is_zero_vector() {
        let embedder = MockEmbedder::new(16);
        assert_eq!(embedder.embed("(): -> ,").unwrap(), vec![0.0; 16]);
        assert_eq!(embedder.embed("").unwrap(), vec![0.0; 16]);
    }
}
