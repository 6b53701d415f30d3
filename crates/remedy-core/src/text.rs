//! Tokenization for similarity scoring.
//!
//! Text is lowercased and split on every non-alphanumeric character, so
//! `npm ERR!` becomes `["npm", "err"]` and `package@1.0.0` becomes
//! `["package", "1", "0", "0"]`.
//!
//! Two views are derived from the token stream:
//!
//! - **terms**: tokens minus stopwords. Feeds the TF-IDF vector.
//! - **significant terms**: terms at least `min_term_len` characters long
//!   that are not purely numeric. Feeds the term-overlap ratio.
//!
//! Short messages such as `go: ok` or `E: 404` have no significant terms.
//! [`Tokenizer::match_terms`] then falls back to plain terms, and to raw
//! tokens for stopword-only text, so overlap is never undefined for text
//! that has any tokens at all.

use std::collections::HashSet;

/// Built-in stopwords: English function words plus log filler that carries
/// no diagnostic signal.
pub const DEFAULT_STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "been", "but", "by", "can", "could", "did", "do",
    "does", "for", "from", "had", "has", "have", "if", "in", "into", "is", "it", "its", "may",
    "no", "not", "of", "on", "or", "should", "so", "such", "than", "that", "the", "then",
    "there", "these", "this", "those", "to", "was", "were", "will", "with", "would", "see",
    "above", "below", "details", "please",
];

/// Default minimum length for a significant term.
pub const DEFAULT_MIN_TERM_LEN: usize = 3;

#[derive(Debug, Clone)]
pub struct Tokenizer {
    stopwords: HashSet<String>,
    min_term_len: usize,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_TERM_LEN, std::iter::empty::<String>())
    }
}

impl Tokenizer {
    /// Builds a tokenizer from the built-in stopwords plus `extra_stopwords`.
    pub fn new<I, S>(min_term_len: usize, extra_stopwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut stopwords: HashSet<String> =
            DEFAULT_STOPWORDS.iter().map(|s| s.to_string()).collect();
        stopwords.extend(
            extra_stopwords
                .into_iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .filter(|s| !s.is_empty()),
        );
        Self {
            stopwords,
            min_term_len: min_term_len.max(1),
        }
    }

    pub fn min_term_len(&self) -> usize {
        self.min_term_len
    }

    pub fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }

    /// Raw lowercase tokens in order of appearance.
    pub fn tokens<'a>(&self, text: &'a str) -> impl Iterator<Item = String> + 'a {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
    }

    /// Tokens with stopwords removed, duplicates kept.
    pub fn terms(&self, text: &str) -> Vec<String> {
        self.tokens(text).filter(|t| !self.is_stopword(t)).collect()
    }

    /// Distinct terms that count toward lexical corroboration.
    pub fn significant_terms(&self, text: &str) -> HashSet<String> {
        self.terms(text)
            .into_iter()
            .filter(|t| self.is_significant(t))
            .collect()
    }

    /// The set a query is matched on: significant terms, else terms, else
    /// raw tokens.
    pub fn match_terms(&self, text: &str) -> HashSet<String> {
        let significant = self.significant_terms(text);
        if !significant.is_empty() {
            return significant;
        }
        let terms: HashSet<String> = self.terms(text).into_iter().collect();
        if !terms.is_empty() {
            return terms;
        }
        self.tokens(text).collect()
    }

    /// Every distinct token, stopwords included.
    pub fn vocabulary(&self, text: &str) -> HashSet<String> {
        self.tokens(text).collect()
    }

    /// Canonical form used to recognise an identical error text:
    /// space-joined tokens, or the trimmed lowercase text when it has none.
    pub fn normalized(&self, text: &str) -> String {
        let joined = self.tokens(text).collect::<Vec<_>>().join(" ");
        if joined.is_empty() {
            text.trim().to_lowercase()
        } else {
            joined
        }
    }

    fn is_significant(&self, term: &str) -> bool {
        term.chars().count() >= self.min_term_len && !term.chars().all(|c| c.is_ascii_digit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_split_on_punctuation() {
        let t = Tokenizer::default();
        let tokens: Vec<String> = t.tokens("npm ERR! code ENOENT").collect();
        assert_eq!(tokens, vec!["npm", "err", "code", "enoent"]);
    }

    #[test]
    fn test_terms_drop_stopwords() {
        let t = Tokenizer::default();
        assert_eq!(
            t.terms("This package is deprecated"),
            vec!["package", "deprecated"]
        );
    }

    #[test]
    fn test_significant_terms_skip_short_and_numeric() {
        let t = Tokenizer::default();
        let sig = t.significant_terms("npm WARN deprecated package@1.0.0: exit 127 ok");
        let mut sig: Vec<_> = sig.into_iter().collect();
        sig.sort();
        assert_eq!(sig, vec!["deprecated", "exit", "npm", "package", "warn"]);
    }

    #[test]
    fn test_extra_stopwords_are_normalized() {
        let t = Tokenizer::new(3, [" NPM "]);
        assert!(t.is_stopword("npm"));
        assert!(t.significant_terms("npm install").contains("install"));
        assert!(!t.significant_terms("npm install").contains("npm"));
    }

    #[test]
    fn test_match_terms_fall_back_for_short_text() {
        let t = Tokenizer::default();
        let sig = t.match_terms("npm ERR! code ENOENT");
        assert!(sig.contains("enoent") && !sig.contains("err"));

        let short = t.match_terms("go: ok");
        assert_eq!(short.len(), 2);
        assert!(short.contains("go") && short.contains("ok"));

        let numeric = t.match_terms("E: 404");
        assert!(numeric.contains("e") && numeric.contains("404"));

        let stop = t.match_terms("it is not");
        assert_eq!(stop.len(), 3);

        assert!(t.match_terms("!!!").is_empty());
    }

    #[test]
    fn test_normalized_ignores_case_and_punctuation() {
        let t = Tokenizer::default();
        assert_eq!(t.normalized("Go: OK"), t.normalized("go ok"));
        assert_eq!(t.normalized("  !!! "), "!!!");
    }

    #[test]
    fn test_unicode_is_lowercased() {
        let t = Tokenizer::default();
        let tokens: Vec<String> = t.tokens("Ошибка СЕТИ").collect();
        assert_eq!(tokens, vec!["ошибка", "сети"]);
    }
}
