//! Text normalization for phrases and tokens.
//!
//! Phrases keep their diacritics: "mèo" and "meo" are different tokens.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Characters stripped from the edges of a token
const TOKEN_PUNCTUATION: &[char] = &[
    '.', ',', ';', ':', '!', '?', '"', '\'', '(', ')', '[', ']', '{', '}', '…', '–', '—', '-',
    '/',
];

/// A normalized phrase: lowercase, single-spaced, diacritics preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Phrase(String);

impl Phrase {
    /// Normalize raw input into a phrase, or `None` if nothing is left
    pub fn parse(raw: &str) -> Option<Self> {
        normalize(raw)
    }

    /// Wrap text that is already normalized (e.g. read back from the store)
    pub(crate) fn from_normalized(text: String) -> Self {
        Self(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn first_token(&self) -> Option<&str> {
        first_token(&self.0)
    }

    pub fn last_token(&self) -> Option<&str> {
        last_token(&self.0)
    }

    /// Whether `next` is a legal reply to `self` under the chain rule
    pub fn chains_to(&self, next: &Phrase) -> bool {
        chains(&self.0, &next.0)
    }
}

impl fmt::Display for Phrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Phrase {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Trim, lowercase and collapse whitespace
pub fn normalize(raw: &str) -> Option<Phrase> {
    let collapsed = raw
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    (!collapsed.is_empty()).then_some(Phrase(collapsed))
}

fn clean_token(token: &str) -> &str {
    token.trim_matches(TOKEN_PUNCTUATION).trim()
}

fn tokens(text: &str) -> impl DoubleEndedIterator<Item = &str> {
    text.split_whitespace()
        .map(clean_token)
        .filter(|t| !t.is_empty())
}

/// First token with edge punctuation stripped
pub fn first_token(text: &str) -> Option<&str> {
    tokens(text).next()
}

/// Last token with edge punctuation stripped
pub fn last_token(text: &str) -> Option<&str> {
    tokens(text).next_back()
}

/// Chain rule: `next` starts with the token `previous` ends with. Exact, diacritics included.
pub fn chains(previous: &str, next: &str) -> bool {
    match (last_token(previous), first_token(next)) {
        (Some(need), Some(got)) => need == got,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_and_lowercases() {
        let phrase = normalize("  Con   MÈO \t").unwrap();
        assert_eq!(phrase.as_str(), "con mèo");
    }

    #[test]
    fn test_normalize_empty() {
        assert!(normalize("").is_none());
        assert!(normalize("   \n\t ").is_none());
    }

    #[test]
    fn test_normalize_keeps_punctuation_in_phrase() {
        let phrase = normalize("Xin chào!").unwrap();
        assert_eq!(phrase.as_str(), "xin chào!");
        assert_eq!(phrase.last_token(), Some("chào"));
    }

    #[test]
    fn test_tokens_strip_edge_punctuation() {
        assert_eq!(first_token("\"con mèo\""), Some("con"));
        assert_eq!(last_token("\"con mèo\""), Some("mèo"));
        assert_eq!(last_token("con mèo ..."), Some("mèo"));
        assert_eq!(first_token("(— con) mèo"), Some("con"));
    }

    #[test]
    fn test_tokens_absent_for_punctuation_only() {
        assert_eq!(first_token("... !!"), None);
        assert_eq!(last_token("... !!"), None);
        let phrase = normalize("?!").unwrap();
        assert!(phrase.first_token().is_none());
    }

    #[test]
    fn test_inner_punctuation_kept() {
        assert_eq!(first_token("e-mail gửi"), Some("e-mail"));
    }

    #[test]
    fn test_chain_rule_is_diacritic_sensitive() {
        let prev = normalize("con mèo").unwrap();
        assert!(prev.chains_to(&normalize("mèo con").unwrap()));
        assert!(!prev.chains_to(&normalize("meo con").unwrap()));
        assert!(!prev.chains_to(&normalize("mẹo hay").unwrap()));
    }

    #[test]
    fn test_chains_needs_both_tokens() {
        assert!(chains("xin chào!", "chào bạn"));
        assert!(!chains("...", "chào bạn"));
        assert!(!chains("xin chào", "!!"));
    }

    #[test]
    fn test_single_token_phrase() {
        let phrase = normalize("mèo").unwrap();
        assert_eq!(phrase.first_token(), Some("mèo"));
        assert_eq!(phrase.last_token(), Some("mèo"));
    }
}
