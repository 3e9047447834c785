use std::collections::HashSet;

/// Tokens shorter than this (in chars) carry no signal: "a", "of", "to".
const MIN_TOKEN_CHARS: usize = 3;

fn tokens(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
        .map(str::to_string)
        .collect()
}

/// Token overlap between two short texts, in [0, 1].
///
/// `|A ∩ B| / max(|A|, |B|)` over lower-cased whitespace tokens of three or
/// more characters. Identical strings score 1; an empty token set scores 0.
pub fn token_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let ta = tokens(a);
    let tb = tokens(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let shared = ta.intersection(&tb).count();
    shared as f64 / ta.len().max(tb.len()) as f64
}
