//! Semantic search (C10).
//!
//! §4.10 suggests an ANN index (e.g. HNSW) over `Chunk.embedding`. The
//! teacher's own `SqliteVectorStore` already documents doing a brute-force
//! cosine scan in application code and notes that an ANN index is the thing
//! to reach for once a dataset outgrows it — this module takes that same
//! substitution rather than vendoring an ANN crate for a store this size.

use crate::db::Db;
use crate::embedder;
use crate::error::Result;
use serde::Serialize;
use uuid::Uuid;

/// One ranked hit (§4.10).
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk_id: Uuid,
    pub transcription_id: Uuid,
    pub media_file_id: Uuid,
    pub text: String,
    pub start_s: Option<f64>,
    pub end_s: Option<f64>,
    pub similarity: f32,
}

/// Encode `query`, scan every embedded chunk owned by `owner_id`, and return
/// the top `limit` hits ranked by descending cosine similarity (§4.10).
pub fn search(db: &Db, owner_id: &str, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
    let query_vec = embedder::embed_query(query)?;
    let candidates = db.list_search_candidates(owner_id)?;

    let mut hits: Vec<SearchHit> = candidates
        .into_iter()
        .map(|c| {
            let similarity = cosine_similarity(&query_vec, &c.embedding);
            SearchHit {
                chunk_id: c.chunk_id,
                transcription_id: c.transcription_id,
                media_file_id: c.media_file_id,
                text: c.text,
                start_s: c.start_s,
                end_s: c.end_s,
                similarity,
            }
        })
        .collect();

    hits.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(limit);
    Ok(hits)
}

/// Cosine similarity of two equal-length vectors. Zero-norm vectors (the
/// placeholder embedding for empty chunk text) score 0 rather than NaN.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_score_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_score_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn zero_vector_scores_zero_not_nan() {
        let score = cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn mismatched_lengths_score_zero() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
