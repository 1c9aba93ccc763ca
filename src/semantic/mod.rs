//! Embeddings and similarity.
//!
//! The engine embeds queries (optionally blended with a profile embedding)
//! for the semantic cache and for vector search over stored POIs.

pub mod embedder;
pub mod search;

pub use embedder::{Embedder, EmbedderError, HttpEmbedder};
#[cfg(any(test, feature = "mock"))]
pub use embedder::MockEmbedder;
pub use search::VectorSearch;

/// Cosine similarity: `Σ aᵢbᵢ / (‖a‖·‖b‖)`.
///
/// Returns 0.0 for mismatched lengths, empty vectors, or a zero norm on
/// either side.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

/// Weighted element-wise blend of a profile embedding into a query
/// embedding, renormalized to unit length.
///
/// `profile_weight` is clamped to [0, 1]; 0 returns the query unchanged
/// (renormalized), 1 returns the profile.
pub fn blend_embeddings(query: &[f32], profile: &[f32], profile_weight: f32) -> Vec<f32> {
    if profile.len() != query.len() || query.is_empty() {
        return query.to_vec();
    }

    let w = profile_weight.clamp(0.0, 1.0);
    let mut blended: Vec<f32> = query
        .iter()
        .zip(profile.iter())
        .map(|(q, p)| q * (1.0 - w) + p * w)
        .collect();

    let norm: f32 = blended.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in blended.iter_mut() {
            *v /= norm;
        }
    }
    blended
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical_vectors_is_one() {
        let v = vec![0.3, -0.5, 0.8];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn cosine_is_symmetric() {
        let a = vec![0.2, 0.9, -0.1];
        let b = vec![0.7, 0.1, 0.4];
        assert_eq!(cosine_similarity(&a, &b), cosine_similarity(&b, &a));
    }

    #[test]
    fn cosine_stays_within_unit_interval() {
        let a = vec![3.0, -4.0, 12.0];
        let b = vec![-7.0, 2.5, 0.5];
        let sim = cosine_similarity(&a, &b);
        assert!((-1.0..=1.0).contains(&sim));
    }

    #[test]
    fn cosine_zero_norm_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn cosine_mismatched_lengths_is_zero() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn blend_zero_weight_keeps_query_direction() {
        let query = vec![2.0, 0.0];
        let profile = vec![0.0, 2.0];
        let blended = blend_embeddings(&query, &profile, 0.0);
        assert!((cosine_similarity(&blended, &query) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn blend_full_weight_takes_profile_direction() {
        let query = vec![2.0, 0.0];
        let profile = vec![0.0, 2.0];
        let blended = blend_embeddings(&query, &profile, 1.0);
        assert!((cosine_similarity(&blended, &profile) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn blend_output_is_unit_length() {
        let blended = blend_embeddings(&[1.0, 2.0, 3.0], &[-1.0, 0.5, 0.0], 0.3);
        let norm: f32 = blended.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn blend_mismatched_profile_returns_query() {
        assert_eq!(blend_embeddings(&[1.0, 2.0], &[1.0], 0.5), vec![1.0, 2.0]);
    }
}
