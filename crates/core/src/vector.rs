use crate::store::SearchableChunk;
use tracing::debug;

/// Candidates below this cosine similarity are dropped before fusion.
pub const SIMILARITY_FLOOR: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct VectorHit {
    pub corpus_index: usize,
    pub similarity: f64,
}

/// `dot(a, b) / (||a|| * ||b||)`, and 0 when either norm is 0 or the
/// dimensions differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let x = f64::from(*x);
        let y = f64::from(*y);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Ranks corpus chunks by similarity to the query embedding, descending.
/// Stored vectors whose dimension does not match the query are discarded
/// rather than scored.
pub fn rank_by_similarity(query_embedding: &[f32], corpus: &[SearchableChunk]) -> Vec<VectorHit> {
    let mut hits: Vec<VectorHit> = corpus
        .iter()
        .enumerate()
        .filter(|(corpus_index, chunk)| {
            if chunk.embedding.len() != query_embedding.len() {
                debug!(
                    corpus_index,
                    stored = chunk.embedding.len(),
                    query = query_embedding.len(),
                    "discarding chunk with mismatched embedding dimension"
                );
                return false;
            }
            true
        })
        .map(|(corpus_index, chunk)| VectorHit {
            corpus_index,
            similarity: cosine_similarity(query_embedding, &chunk.embedding),
        })
        .filter(|hit| hit.similarity >= SIMILARITY_FLOOR)
        .collect();

    hits.sort_by(|left, right| right.similarity.total_cmp(&left.similarity));
    hits
}
