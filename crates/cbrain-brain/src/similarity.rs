//! Vector and token-set similarity.

use std::collections::HashSet;

/// Cosine similarity of two vectors, or `None` when the dimensions differ or
/// either vector has zero norm.
#[must_use]
pub fn cosine(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let sim = (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32;
    Some(sim.clamp(-1.0, 1.0))
}

/// Jaccard similarity of two token sets. Two empty sets score 0.
#[must_use]
pub fn jaccard(a: &[String], b: &[String]) -> f32 {
    let a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let b: HashSet<&str> = b.iter().map(String::as_str).collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = a.intersection(&b).count();
    #[allow(clippy::cast_precision_loss)]
    let score = intersection as f32 / union as f32;
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| (*w).to_string()).collect()
    }

    #[test]
    fn identical_vectors_score_one() {
        let v = [0.3, -0.2, 0.9];
        let sim = cosine(&v, &v).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_score_zero() {
        assert!(cosine(&[1.0, 0.0], &[0.0, 1.0]).unwrap().abs() < 1e-6);
    }

    #[test]
    fn mismatched_or_zero_vectors_have_no_similarity() {
        assert!(cosine(&[1.0, 0.0], &[1.0]).is_none());
        assert!(cosine(&[0.0, 0.0], &[1.0, 0.0]).is_none());
        assert!(cosine(&[], &[]).is_none());
    }

    #[test]
    fn jaccard_of_overlapping_sets() {
        let a = tokens(&["cold", "email", "outreach"]);
        let b = tokens(&["cold", "email"]);
        assert!((jaccard(&a, &b) - 2.0 / 3.0).abs() < 1e-6);
        assert!((jaccard(&a, &a) - 1.0).abs() < 1e-6);
        assert!(jaccard(&[], &[]).abs() < f32::EPSILON);
    }
}
