//! Query text parsing.

use crate::analysis::Analyzer;
use crate::query::{Occur, Query, QueryTerm};

/// Turns raw query text into a [`Query`] using the index analyzer.
///
/// Text wrapped in double quotes becomes a phrase query. Every parsed term
/// is required.
#[derive(Debug, Clone, Copy)]
pub struct QueryParser<'a> {
    analyzer: &'a Analyzer,
}

impl<'a> QueryParser<'a> {
    pub fn new(analyzer: &'a Analyzer) -> Self {
        QueryParser { analyzer }
    }

    pub fn parse(&self, text: &str) -> Query {
        let trimmed = text.trim();
        let (body, quoted) = match trimmed
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
        {
            Some(inner) => (inner, true),
            None => (trimmed, false),
        };

        let terms: Vec<QueryTerm> = self
            .analyzer
            .tokenize(body)
            .into_iter()
            .map(|token| QueryTerm::new(token, Occur::Required))
            .collect();

        Query {
            is_phrase: quoted && !terms.is_empty(),
            terms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Query {
        let analyzer = Analyzer::default();
        QueryParser::new(&analyzer).parse(text)
    }

    #[test]
    fn test_quoted_phrase() {
        let query = parse("\"a b\"");
        assert!(query.is_phrase);
        assert_eq!(query.texts(), vec!["a", "b"]);
    }

    #[test]
    fn test_empty_input() {
        let query = parse("");
        assert!(query.terms.is_empty());
        assert!(!query.is_phrase);

        let quoted_empty = parse("\"\"");
        assert!(quoted_empty.terms.is_empty());
        assert!(!quoted_empty.is_phrase);
    }

    #[test]
    fn test_plain_terms_are_required() {
        let query = parse("a b");
        assert!(!query.is_phrase);
        assert_eq!(query.terms.len(), 2);
        assert!(query.terms.iter().all(|t| t.required));
    }

    #[test]
    fn test_normalization_matches_index_side() {
        let query = parse("  Running CATS ");
        assert_eq!(query.texts(), vec!["run", "cat"]);
    }

    #[test]
    fn test_single_quote_char_is_not_a_phrase() {
        let query = parse("\"cat");
        assert!(!query.is_phrase);
        assert_eq!(query.texts(), vec!["cat"]);
    }
}
