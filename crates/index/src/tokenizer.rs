//! Text tokenizer for full-text indexing
//!
//! Pipeline: whitespace split → lowercase. No stemming, no stopwords: a token
//! matches only itself, case-insensitively.

use rustc_hash::FxHashSet;

/// Tokenize text into index terms.
///
/// # Example
///
/// ```
/// use stratadoc_index::tokenizer::tokenize;
///
/// let tokens = tokenize("The Quick  brown\tFox");
/// assert_eq!(tokens, vec!["the", "quick", "brown", "fox"]);
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// Tokenize and deduplicate, keeping first-occurrence order.
///
/// # Example
///
/// ```
/// use stratadoc_index::tokenizer::tokenize_unique;
///
/// let tokens = tokenize_unique("to be or not TO BE");
/// assert_eq!(tokens, vec!["to", "be", "or", "not"]);
/// ```
pub fn tokenize_unique(text: &str) -> Vec<String> {
    let mut seen = FxHashSet::default();
    tokenize(text)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}
