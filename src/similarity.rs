//! Vector similarity and top-k selection.

use crate::node::Node;

/// Default minimum similarity for a search hit.
pub const DEFAULT_THRESHOLD: f32 = 0.7;

/// Cosine similarity of two vectors.
///
/// Empty, zero-magnitude or mismatched vectors score `0.0`. The result is
/// symmetric and clamped to `[-1, 1]`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = dot / (norm_a * norm_b).sqrt();
    if similarity.is_nan() {
        return 0.0;
    }
    similarity.clamp(-1.0, 1.0) as f32
}

/// A node scored against a query vector.
#[derive(Debug, Clone, Copy)]
pub struct Ranked<'a> {
    pub node: &'a Node,
    pub similarity: f32,
}

/// Score every candidate carrying an embedding, keep those at or above
/// `threshold`, and return the best `top_k` by descending similarity.
///
/// Equal scores keep their input order.
pub fn rank<'a, I>(query: &[f32], candidates: I, threshold: f32, top_k: usize) -> Vec<Ranked<'a>>
where
    I: IntoIterator<Item = &'a Node>,
{
    if query.is_empty() || top_k == 0 {
        return Vec::new();
    }

    let mut ranked: Vec<Ranked<'a>> = candidates
        .into_iter()
        .filter_map(|node| {
            let embedding = node.embedding.as_deref()?;
            let similarity = cosine_similarity(query, embedding);
            (similarity >= threshold).then_some(Ranked { node, similarity })
        })
        .collect();

    // sort_by is stable, which gives the tie-break.
    ranked.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    ranked.truncate(top_k);
    ranked
}
