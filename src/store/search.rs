use super::{IndexError, VectorIndex};

/// One nearest-neighbour match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub slot: usize,
    /// Squared Euclidean distance to the query.
    pub distance: f32,
}

impl VectorIndex {
    /// Exact k-nearest-neighbour search by squared L2 distance.
    ///
    /// Returns at most `k` hits in ascending distance; equal distances keep
    /// slot order. An empty index or `k == 0` yields no hits.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        let Some(dim) = self.dimension else {
            return Ok(Vec::new());
        };
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != dim {
            return Err(IndexError::DimensionMismatch {
                expected: dim,
                actual: query.len(),
            });
        }

        let mut hits: Vec<SearchHit> = self
            .vectors
            .chunks_exact(dim)
            .enumerate()
            .map(|(slot, v)| SearchHit {
                slot,
                distance: squared_l2(query, v),
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);
        // Slots without a metadata record are never reported.
        hits.retain(|hit| hit.slot < self.records.len());
        Ok(hits)
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
