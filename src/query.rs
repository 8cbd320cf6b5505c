//! Parsed queries.
//!
//! A [`Query`] is an ordered list of normalized terms, each either required
//! (all required terms must match, AND semantics) or optional (contributes
//! score only). A phrase query additionally requires its terms to appear
//! contiguously and in order in the matched document.

pub mod parser;

use ahash::RandomState;
use lazy_static::lazy_static;

pub use parser::QueryParser;

lazy_static! {
    static ref TERM_HASHER: RandomState = RandomState::with_seeds(
        0x243f_6a88_85a3_08d3,
        0x1319_8a2e_0370_7344,
        0xa409_3822_299f_31d0,
        0x082e_fa98_ec4e_6c89,
    );
}

/// Fixed-seed 64-bit hash of a normalized term.
///
/// Stable for the lifetime of the process, which is all the in-memory term
/// tables keyed by it need.
pub fn term_hash(text: &str) -> u64 {
    TERM_HASHER.hash_one(text)
}

/// Whether a term must match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Occur {
    Required,
    Optional,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTerm {
    pub text: String,
    pub hash: u64,
    pub required: bool,
}

impl QueryTerm {
    pub fn new<S: Into<String>>(text: S, occur: Occur) -> Self {
        let text = text.into();
        QueryTerm {
            hash: term_hash(&text),
            text,
            required: occur == Occur::Required,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub terms: Vec<QueryTerm>,
    pub is_phrase: bool,
}

impl Query {
    pub fn builder() -> QueryBuilder {
        QueryBuilder::default()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn has_required(&self) -> bool {
        self.terms.iter().any(|t| t.required)
    }

    /// Terms with duplicates removed, in order of first appearance.
    ///
    /// A term repeated with mixed occurrences is required.
    pub fn unique_terms(&self) -> Vec<QueryTerm> {
        let mut unique: Vec<QueryTerm> = Vec::with_capacity(self.terms.len());
        for term in &self.terms {
            match unique.iter_mut().find(|t| t.text == term.text) {
                Some(existing) => existing.required |= term.required,
                None => unique.push(term.clone()),
            }
        }
        unique
    }

    /// The ordered term texts, duplicates included.
    pub fn texts(&self) -> Vec<&str> {
        self.terms.iter().map(|t| t.text.as_str()).collect()
    }
}

/// Programmatic construction of queries from already-normalized terms.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    terms: Vec<QueryTerm>,
    is_phrase: bool,
}

impl QueryBuilder {
    pub fn term<S: Into<String>>(mut self, text: S, occur: Occur) -> Self {
        self.terms.push(QueryTerm::new(text, occur));
        self
    }

    pub fn required<S: Into<String>>(self, text: S) -> Self {
        self.term(text, Occur::Required)
    }

    pub fn optional<S: Into<String>>(self, text: S) -> Self {
        self.term(text, Occur::Optional)
    }

    pub fn phrase(mut self, is_phrase: bool) -> Self {
        self.is_phrase = is_phrase;
        self
    }

    /// Finish the query. Every term of a phrase is required.
    pub fn build(self) -> Query {
        let mut terms = self.terms;
        let is_phrase = self.is_phrase && !terms.is_empty();
        if is_phrase {
            terms.iter_mut().for_each(|t| t.required = true);
        }
        Query { terms, is_phrase }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_occurs() {
        let query = Query::builder().required("cat").optional("dog").build();
        assert!(query.terms[0].required);
        assert!(!query.terms[1].required);
        assert!(query.has_required());
        assert!(!query.is_phrase);
    }

    #[test]
    fn test_phrase_forces_required() {
        let query = Query::builder().optional("a").optional("b").phrase(true).build();
        assert!(query.is_phrase);
        assert!(query.terms.iter().all(|t| t.required));

        let empty = Query::builder().phrase(true).build();
        assert!(!empty.is_phrase);
    }

    #[test]
    fn test_unique_terms() {
        let query = Query::builder()
            .optional("rose")
            .required("is")
            .required("rose")
            .build();
        let unique = query.unique_terms();
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].text, "rose");
        assert!(unique[0].required);
        assert_eq!(query.texts(), vec!["rose", "is", "rose"]);
    }

    #[test]
    fn test_term_hash_is_stable() {
        assert_eq!(term_hash("cat"), QueryTerm::new("cat", Occur::Required).hash);
        assert_ne!(term_hash("cat"), term_hash("dog"));
    }
}
