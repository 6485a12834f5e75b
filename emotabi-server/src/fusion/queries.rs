//! Search query permutations
//!
//! Text search ranking is sensitive to word order, so the same vocabulary is
//! submitted three times in different orders:
//!
//! 1. `region purpose w1 w2 w3` (original order)
//! 2. `region purpose w3 w2 w1` (reversed)
//! 3. `region purpose w2 w3 w1` (rotated left by one; same as 1 when fewer
//!    than two words)
//!
//! Without any valid word the fixed fallbacks are used.

use super::EmotionVocabulary;

/// Suffixes of the fallback queries (plain, "recommended", "popular")
pub const FALLBACK_SUFFIXES: [&str; 3] = ["", "おすすめ", "人気"];

/// Number of queries per request
pub const QUERY_COUNT: usize = 3;

/// Build the three search queries for a request
pub fn build_queries(region: &str, purpose: &str, vocabulary: &EmotionVocabulary) -> Vec<String> {
    let base = format!("{} {}", region, purpose);

    if vocabulary.is_empty() {
        return FALLBACK_SUFFIXES
            .iter()
            .map(|suffix| join(&base, &[*suffix]))
            .collect();
    }

    let original: Vec<&str> = vocabulary.words().iter().map(String::as_str).collect();
    let reversed: Vec<&str> = original.iter().rev().copied().collect();
    let rotated: Vec<&str> = if original.len() > 1 {
        let mut rotated = original.clone();
        rotated.rotate_left(1);
        rotated
    } else {
        original.clone()
    };

    vec![
        join(&base, &original),
        join(&base, &reversed),
        join(&base, &rotated),
    ]
}

fn join(base: &str, words: &[&str]) -> String {
    let tail = words.join(" ");
    if tail.is_empty() {
        base.to_string()
    } else {
        format!("{} {}", base, tail)
    }
}
