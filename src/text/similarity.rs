use std::collections::HashMap;

use strsim::normalized_levenshtein;

use super::normalize;

/// Cosine similarity of the term-frequency vectors of two strings, tokenized
/// on whitespace after normalization. Zero when either side has no tokens.
pub fn token_cosine(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let mut counts: HashMap<&str, (u32, u32)> = HashMap::new();
    for token in a.split(' ') {
        counts.entry(token).or_default().0 += 1;
    }
    for token in b.split(' ') {
        counts.entry(token).or_default().1 += 1;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (ca, cb) in counts.values() {
        let (ca, cb) = (f64::from(*ca), f64::from(*cb));
        dot += ca * cb;
        norm_a += ca * ca;
        norm_b += cb * cb;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    (dot / denom).clamp(0.0, 1.0)
}

/// Edit-distance similarity over normalized strings, in `[0, 1]`.
///
/// Symmetric, total, and `1.0` only when the normalized strings are equal.
pub fn score_fuzzy(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    if a == b {
        return 1.0;
    }
    normalized_levenshtein(&a, &b).clamp(0.0, 1.0)
}
