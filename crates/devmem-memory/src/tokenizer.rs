use std::collections::HashSet;
use std::sync::LazyLock;

/// Common English function words dropped before indexing.
static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
        "do", "does", "did", "will", "would", "could", "should", "may", "might", "shall", "can",
        "it", "its", "this", "that", "these", "those", "i", "you", "he", "she", "we", "they", "me",
        "him", "her", "us", "them", "my", "your", "his", "our", "their", "in", "on", "at", "to",
        "for", "of", "with", "by", "from", "as", "into", "about", "between", "and", "or", "not",
        "but", "if", "so", "no", "nor",
    ]
    .into_iter()
    .collect()
});

/// Returns `true` if `word` (already lower-cased) is a stop word.
pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(word)
}

/// Split text into lowercase tokens.
///
/// Any character that is not a letter or digit separates tokens. Tokens
/// shorter than two bytes and stop words are dropped; duplicates are kept so
/// callers can count term frequency.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 2 && !is_stop_word(w))
        .map(str::to_string)
        .collect()
}
