//! Immutable vector index over interaction embeddings.
//!
//! An index is built in one piece from a snapshot of the interaction log and
//! never mutated afterwards; the store swaps in a new `Arc<SemanticIndex>` on
//! each rebuild.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::debug;

use crate::embedding::EmbeddingError;
use crate::types::Interaction;

struct IndexEntry {
    interaction: Arc<Interaction>,
    vector: Vec<f32>,
}

#[derive(Default)]
pub struct SemanticIndex {
    entries: Vec<IndexEntry>,
}

impl SemanticIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Pair each interaction with its embedding.
    pub fn build(
        interactions: Vec<Arc<Interaction>>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, EmbeddingError> {
        if interactions.len() != vectors.len() {
            return Err(EmbeddingError::Generation(format!(
                "Embedder returned {} vectors for {} documents",
                vectors.len(),
                interactions.len()
            )));
        }

        let entries = interactions
            .into_iter()
            .zip(vectors)
            .map(|(interaction, vector)| IndexEntry {
                interaction,
                vector,
            })
            .collect();

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Up to `k` interactions ranked by cosine similarity, highest first.
    /// Equal scores rank the more recent interaction first.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(Arc<Interaction>, f32)> {
        let mut scored: Vec<(Arc<Interaction>, f32)> = self
            .entries
            .iter()
            .filter(|entry| {
                let same_dim = entry.vector.len() == query.len();
                if !same_dim {
                    debug!(
                        interaction = %entry.interaction.id,
                        expected = query.len(),
                        actual = entry.vector.len(),
                        "Skipping entry with mismatched dimension"
                    );
                }
                same_dim
            })
            .map(|entry| {
                (
                    entry.interaction.clone(),
                    cosine_similarity(query, &entry.vector),
                )
            })
            .collect();

        scored.sort_by(|(a, score_a), (b, score_b)| {
            score_b
                .partial_cmp(score_a)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.sequence.cmp(&a.sequence))
        });
        scored.truncate(k);
        scored
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InteractionMetadata;

    fn interaction(sequence: u64, query: &str) -> Arc<Interaction> {
        Arc::new(Interaction::new(
            sequence,
            query,
            "answer",
            InteractionMetadata::default(),
        ))
    }

    #[test]
    fn cosine_handles_zero_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn build_rejects_length_mismatch() {
        let result = SemanticIndex::build(vec![interaction(1, "a")], vec![]);
        assert!(result.is_err());
    }

    #[test]
    fn search_ranks_by_similarity() {
        let index = SemanticIndex::build(
            vec![interaction(1, "x-axis"), interaction(2, "y-axis")],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        )
        .unwrap();

        let results = index.search(&[0.1, 0.9], 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.query, "y-axis");
        assert_eq!(results[1].0.query, "x-axis");
    }

    #[test]
    fn ties_prefer_more_recent() {
        let index = SemanticIndex::build(
            vec![
                interaction(1, "old"),
                interaction(3, "newest"),
                interaction(2, "middle"),
            ],
            vec![vec![1.0, 0.0], vec![1.0, 0.0], vec![1.0, 0.0]],
        )
        .unwrap();

        let queries: Vec<String> = index
            .search(&[1.0, 0.0], 3)
            .into_iter()
            .map(|(i, _)| i.query.clone())
            .collect();
        assert_eq!(queries, vec!["newest", "middle", "old"]);
    }

    #[test]
    fn search_truncates_to_k_and_skips_other_dimensions() {
        let index = SemanticIndex::build(
            vec![interaction(1, "a"), interaction(2, "b"), interaction(3, "c")],
            vec![vec![1.0, 0.0], vec![1.0, 0.0, 0.0], vec![0.5, 0.5]],
        )
        .unwrap();

        let results = index.search(&[1.0, 0.0], 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.query, "a");
        assert_eq!(index.search(&[1.0, 0.0], 10).len(), 2);
    }
}
