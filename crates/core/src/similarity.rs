use crate::models::{EmbeddingRecord, RetrievedChunk};
use std::cmp::Ordering;

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }

    let mut dot = 0f32;
    let mut left_norm = 0f32;
    let mut right_norm = 0f32;
    for (a, b) in left.iter().zip(right) {
        dot += a * b;
        left_norm += a * a;
        right_norm += b * b;
    }

    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    dot / (left_norm.sqrt() * right_norm.sqrt())
}

/// Exact top-k by cosine similarity, nearest first. Equal scores keep
/// insertion order.
pub fn rank_nearest(records: &[EmbeddingRecord], query: &[f32], k: usize) -> Vec<RetrievedChunk> {
    let mut scored: Vec<(usize, f32)> = records
        .iter()
        .enumerate()
        .map(|(position, record)| (position, cosine_similarity(query, &record.vector)))
        .collect();

    scored.sort_by(|left, right| match right.1.total_cmp(&left.1) {
        Ordering::Equal => left.0.cmp(&right.0),
        other => other,
    });

    scored
        .into_iter()
        .take(k)
        .map(|(position, score)| RetrievedChunk {
            chunk: records[position].chunk.clone(),
            score,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;

    fn record(id: &str, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            vector,
            chunk: Chunk {
                chunk_id: id.to_string(),
                document_id: "doc".to_string(),
                source: "a.pdf".to_string(),
                source_path: "/data/a.pdf".to_string(),
                page_number: 1,
                chunk_index: 0,
                text: id.to_string(),
            },
        }
    }

    #[test]
    fn identical_vectors_score_one() {
        let score = cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]);
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_or_mismatched_vectors_score_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn ranking_is_nearest_first_and_bounded_by_k() {
        let records = vec![
            record("orthogonal", vec![0.0, 1.0]),
            record("exact", vec![1.0, 0.0]),
            record("close", vec![0.9, 0.1]),
            record("opposite", vec![-1.0, 0.0]),
        ];

        let hits = rank_nearest(&records, &[1.0, 0.0], 3);

        let ids: Vec<_> = hits.iter().map(|hit| hit.chunk.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["exact", "close", "orthogonal"]);
        assert!(hits.windows(2).all(|pair| pair[0].score >= pair[1].score));
    }

    #[test]
    fn ties_keep_insertion_order() {
        let records = vec![
            record("first", vec![1.0, 0.0]),
            record("second", vec![2.0, 0.0]),
        ];
        let hits = rank_nearest(&records, &[1.0, 0.0], 5);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.chunk_id, "first");
    }
}
