//! Tokenizer for the in-memory text index
//!
//! Lowercases, splits on non-alphanumeric characters, drops English stop words
//! and single-character tokens.

use std::collections::HashSet;
use std::sync::LazyLock;

static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have",
        "if", "in", "into", "is", "it", "its", "no", "not", "of", "on", "or", "such", "that",
        "the", "their", "then", "there", "these", "they", "this", "to", "was", "were", "what",
        "which", "who", "will", "with",
    ]
    .into_iter()
    .collect()
});

/// Split text into index terms
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() > 1 && !STOP_WORDS.contains(token))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_basic() {
        assert_eq!(
            tokenize("What is the role of TP53-mutations?"),
            vec!["role", "tp53", "mutations"]
        );
    }

    #[test]
    fn test_tokenize_drops_short_and_empty() {
        assert!(tokenize("a I , .").is_empty());
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_tokenize_unicode() {
        assert_eq!(tokenize("Größe ÜBER alles"), vec!["größe", "über", "alles"]);
    }
}
