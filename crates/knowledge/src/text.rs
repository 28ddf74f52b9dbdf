//! Tokenisation shared by the hashed embedders and the lexical reranker.

/// Words ignored when building term features.
const STOP_WORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "a", "an", "as", "are", "was", "were", "for", "to", "of",
    "in", "and", "or", "but", "with", "by", "from", "this", "that", "be", "have", "has", "had",
    "it", "its", "their", "they", "them", "what", "who", "how", "der", "die", "das", "und",
    "ist", "von", "den", "des", "ein", "eine", "mit", "wie", "was", "wer",
];

/// Lowercased alphanumeric terms, stop words and one-letter tokens removed.
pub fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 1)
        .map(str::to_lowercase)
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .collect()
}

/// Stable 64-bit hash of a term, identical across processes.
pub fn term_hash(term: &str) -> u64 {
    term.bytes()
        .fold(0xcbf2_9ce4_8422_2325u64, |acc, b| {
            (acc ^ b as u64).wrapping_mul(0x0100_0000_01b3)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terms() {
        assert_eq!(
            terms("What is the capital of Germany?"),
            vec!["capital", "germany"]
        );
        assert_eq!(terms("Größe: 3 m"), vec!["größe"]);
    }

    #[test]
    fn test_term_hash_is_stable() {
        assert_eq!(term_hash("berlin"), term_hash("berlin"));
        assert_ne!(term_hash("berlin"), term_hash("bonn"));
    }
}
