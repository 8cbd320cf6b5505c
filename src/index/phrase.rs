//! Phrase verification against stored text.
//!
//! Postings carry no positions, so a phrase candidate is confirmed by
//! re-tokenizing the document with the index analyzer and looking for the
//! query terms as one contiguous run.

use crate::analysis::Analyzer;
use crate::error::Result;
use crate::index::store::DocumentStore;
use crate::query::Query;

pub(crate) fn contains_phrase(analyzer: &Analyzer, text: &str, phrase: &[&str]) -> bool {
    if phrase.is_empty() {
        return true;
    }
    let tokens = analyzer.tokenize(text);
    tokens
        .windows(phrase.len())
        .any(|window| window.iter().zip(phrase).all(|(t, p)| t == p))
}

/// Match filter for a query: accepts everything unless the query is a
/// phrase, in which case the stored text must contain the phrase.
pub(crate) fn acceptor<'a>(
    query: &'a Query,
    analyzer: &'a Analyzer,
    store: &'a DocumentStore,
) -> impl FnMut(u32) -> Result<bool> + 'a {
    let phrase = query.texts();
    move |doc| {
        if !query.is_phrase {
            return Ok(true);
        }
        Ok(contains_phrase(analyzer, &store.text(doc)?, &phrase))
    }
}
