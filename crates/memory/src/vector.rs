//! Vector similarity utilities.
//!
//! Pure-Rust cosine similarity plus top-K ranking of stored embeddings.

use std::cmp::Ordering;

use switchyard_core::{EmbeddingRecord, SimilarMatch};

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is zero-length, empty, or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank records by cosine similarity to `query`, keeping the top `k`.
///
/// Ordering: similarity descending; equal similarities put the newer record
/// first (timestamp, then sequence number).
pub fn rank_by_similarity(records: Vec<EmbeddingRecord>, query: &[f32], k: usize) -> Vec<SimilarMatch> {
    let mut scored: Vec<(f32, EmbeddingRecord)> = records
        .into_iter()
        .map(|r| (cosine_similarity(&r.vector, query), r))
        .collect();

    scored.sort_by(|(sa, ra), (sb, rb)| {
        sb.partial_cmp(sa)
            .unwrap_or(Ordering::Equal)
            .then_with(|| rb.timestamp.cmp(&ra.timestamp))
            .then_with(|| rb.seq.cmp(&ra.seq))
    });
    scored.truncate(k);

    scored
        .into_iter()
        .map(|(similarity, r)| SimilarMatch {
            provider_id: r.provider_id,
            content: r.content,
            similarity,
            metadata: r.metadata,
            timestamp: r.timestamp,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn record(seq: u64, content: &str, vector: Vec<f32>, age_secs: i64) -> EmbeddingRecord {
        EmbeddingRecord {
            seq,
            user_id: "u".into(),
            provider_id: "p".into(),
            content: content.into(),
            vector,
            metadata: serde_json::Value::Null,
            timestamp: Utc::now() - Duration::seconds(age_secs),
        }
    }

    #[test]
    fn cosine_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors() {
        assert!(cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]).abs() < 1e-6);
    }

    #[test]
    fn cosine_opposite_vectors() {
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn cosine_known_value() {
        // [1,1] · [1,0] = 1, |[1,1]| = sqrt(2) → 0.7071
        assert!((cosine_similarity(&[1.0, 1.0], &[1.0, 0.0]) - 0.7071).abs() < 0.001);
    }

    #[test]
    fn ranks_descending_and_truncates() {
        let query = vec![1.0, 0.0, 0.0];
        let records = vec![
            record(1, "orthogonal", vec![0.0, 1.0, 0.0], 30),
            record(2, "identical", vec![1.0, 0.0, 0.0], 20),
            record(3, "partial", vec![0.5, 0.5, 0.0], 10),
        ];
        let ranked = rank_by_similarity(records, &query, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].content, "identical");
        assert_eq!(ranked[1].content, "partial");
    }

    #[test]
    fn ties_prefer_newer_records() {
        let query = vec![1.0, 0.0];
        let records = vec![
            record(1, "old", vec![1.0, 0.0], 600),
            record(2, "new", vec![2.0, 0.0], 5),
        ];
        let ranked = rank_by_similarity(records, &query, 5);
        assert_eq!(ranked[0].content, "new");
        assert_eq!(ranked[1].content, "old");
    }
}
