//! The analyzer used by every in-process index profile.

use std::fmt;

use ahash::AHashMap;
use rust_stemmers::Stemmer;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;
use unicode_segmentation::UnicodeSegmentation;

use crate::analysis::language::stemming_algorithm;
use crate::util::simd::ascii;

/// Analyzer settings.
///
/// Persisted alongside every saved index so that a loaded index analyzes
/// queries exactly as it analyzed its documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Language tag used to pick a stemming table (`en`, `eng_Latn`, ...).
    pub language: String,

    /// Apply Snowball stemming when a table exists for `language`.
    pub stem: bool,

    /// Fold accented characters to their base letters (`café` → `cafe`).
    pub strip_accents: bool,

    /// Tokens longer than this many bytes are dropped.
    pub max_token_len: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        AnalyzerConfig {
            language: "en".to_string(),
            stem: true,
            strip_accents: false,
            max_token_len: 100,
        }
    }
}

impl AnalyzerConfig {
    pub fn for_language<S: Into<String>>(language: S) -> Self {
        AnalyzerConfig {
            language: language.into(),
            ..Default::default()
        }
    }
}

/// Term frequencies of one document plus its length in tokens.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TermFrequencies {
    pub terms: Vec<(String, u32)>,
    pub length: u32,
}

/// Segments text into normalized terms.
pub struct Analyzer {
    config: AnalyzerConfig,
    stemmer: Option<Stemmer>,
}

impl fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyzer")
            .field("config", &self.config)
            .field("stemming", &self.stemmer.is_some())
            .finish()
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Analyzer::new(AnalyzerConfig::default())
    }
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        let stemmer = if config.stem {
            stemming_algorithm(&config.language).map(Stemmer::create)
        } else {
            None
        };

        Analyzer { config, stemmer }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Normalize a single word, or `None` when it is filtered out.
    fn normalize(&self, word: &str) -> Option<String> {
        let mut token = ascii::to_lowercase(word);

        if self.config.strip_accents && !token.is_ascii() {
            token = token.nfd().filter(|c| !is_combining_mark(*c)).collect();
        }

        if token.is_empty() || token.len() > self.config.max_token_len {
            return None;
        }

        match &self.stemmer {
            Some(stemmer) => Some(stemmer.stem(&token).into_owned()),
            None => Some(token),
        }
    }

    /// Split `text` into normalized terms, in order of appearance.
    ///
    /// Empty or punctuation-only input yields an empty vector.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        text.unicode_words()
            .filter_map(|word| self.normalize(word))
            .collect()
    }

    /// Reduce `text` to term frequencies.
    ///
    /// Terms are listed in order of first appearance; `length` counts every
    /// token, repeated or not.
    pub fn term_frequencies(&self, text: &str) -> TermFrequencies {
        let mut positions: AHashMap<String, usize> = AHashMap::new();
        let mut terms: Vec<(String, u32)> = Vec::new();
        let mut length = 0u32;

        for token in text.unicode_words().filter_map(|word| self.normalize(word)) {
            length = length.saturating_add(1);
            match positions.get(&token) {
                Some(&slot) => terms[slot].1 += 1,
                None => {
                    positions.insert(token.clone(), terms.len());
                    terms.push((token, 1));
                }
            }
        }

        TermFrequencies { terms, length }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_lowercases_and_stems() {
        let analyzer = Analyzer::default();
        assert_eq!(analyzer.tokenize("The Cats sat!"), vec!["the", "cat", "sat"]);
        assert_eq!(analyzer.tokenize("running dogs"), vec!["run", "dog"]);
    }

    #[test]
    fn test_empty_and_punctuation_input() {
        let analyzer = Analyzer::default();
        assert!(analyzer.tokenize("").is_empty());
        assert!(analyzer.tokenize("  ... !!! ").is_empty());
        assert_eq!(analyzer.term_frequencies("").length, 0);
    }

    #[test]
    fn test_language_without_stemmer_only_lowercases() {
        let analyzer = Analyzer::new(AnalyzerConfig::for_language("vie_Latn"));
        assert_eq!(analyzer.tokenize("Xin Chào Cats"), vec!["xin", "chào", "cats"]);
    }

    #[test]
    fn test_strip_accents() {
        let analyzer = Analyzer::new(AnalyzerConfig {
            language: "xx".to_string(),
            strip_accents: true,
            ..Default::default()
        });
        assert_eq!(analyzer.tokenize("Café NAÏVE"), vec!["cafe", "naive"]);
    }

    #[test]
    fn test_long_tokens_dropped() {
        let analyzer = Analyzer::new(AnalyzerConfig {
            max_token_len: 5,
            stem: false,
            ..Default::default()
        });
        assert_eq!(analyzer.tokenize("short lengthy word"), vec!["short", "word"]);
    }

    #[test]
    fn test_term_frequencies() {
        let analyzer = Analyzer::default();
        let tf = analyzer.term_frequencies("cat dog cats Cat bird");
        assert_eq!(tf.length, 5);
        assert_eq!(
            tf.terms,
            vec![
                ("cat".to_string(), 3),
                ("dog".to_string(), 1),
                ("bird".to_string(), 1)
            ]
        );
    }
}
