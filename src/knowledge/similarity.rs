use std::cmp::Ordering;

/// Cosine similarity between two vectors.
///
/// Returns 0.0 for empty or mismatched-length inputs and for zero-norm
/// vectors, so callers can score heterogeneous candidates without a
/// separate validity check.
pub fn cosine_similarity(query: &[f32], candidate: &[f32]) -> f32 {
    if query.is_empty() || query.len() != candidate.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut query_norm_sq = 0.0f32;
    let mut candidate_norm_sq = 0.0f32;
    for (lhs, rhs) in query.iter().zip(candidate.iter()) {
        dot += lhs * rhs;
        query_norm_sq += lhs * lhs;
        candidate_norm_sq += rhs * rhs;
    }

    let denom = query_norm_sq.sqrt() * candidate_norm_sq.sqrt();
    if denom <= f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Score every candidate against the query and sort best-first.
///
/// The sort is stable, so candidates with equal scores keep their
/// insertion order. Returned pairs are (candidate index, score).
pub fn rank_descending_by_cosine(query: &[f32], candidates: &[&[f32]]) -> Vec<(usize, f32)> {
    let mut scores: Vec<(usize, f32)> = candidates
        .iter()
        .enumerate()
        .map(|(idx, candidate)| (idx, cosine_similarity(query, candidate)))
        .collect();

    scores.sort_by(|left, right| right.1.partial_cmp(&left.1).unwrap_or(Ordering::Equal));
    scores
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(left: f32, right: f32) -> bool {
        (left - right).abs() < 1e-5
    }

    #[test]
    fn cosine_is_one_for_identical_vectors() {
        let vec = vec![1.0, 2.0, 3.0, 4.0];
        assert!(approx_eq(cosine_similarity(&vec, &vec), 1.0));
    }

    #[test]
    fn cosine_is_zero_for_orthogonal_vectors() {
        assert!(approx_eq(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0));
    }

    #[test]
    fn cosine_is_zero_for_invalid_input() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn ranking_returns_highest_similarity_first() {
        let query = vec![1.0, 0.0];
        let candidates: Vec<&[f32]> = vec![&[0.8, 0.2], &[0.1, 0.9], &[0.9, 0.0]];
        let ranked = rank_descending_by_cosine(&query, &candidates);

        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].0, 2);
        assert_eq!(ranked[2].0, 1);
    }

    #[test]
    fn ranking_keeps_insertion_order_on_ties() {
        let query = vec![1.0, 0.0];
        let candidates: Vec<&[f32]> = vec![&[2.0, 0.0], &[1.0, 0.0], &[3.0, 0.0]];
        let ranked = rank_descending_by_cosine(&query, &candidates);

        // All three score 1.0; stable sort keeps 0, 1, 2.
        assert_eq!(
            ranked.iter().map(|(idx, _)| *idx).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }
}
