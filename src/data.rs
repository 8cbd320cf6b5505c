//! Documents and document sources.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FtsError, Result};

/// A corpus document.
///
/// `score` is only meaningful on search results; it is zero for documents
/// being imported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub url: String,
    pub text: String,
    #[serde(default)]
    pub dump: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub language_score: f64,
    #[serde(default)]
    pub score: f64,
}

impl Document {
    pub fn new<I: Into<String>, T: Into<String>>(id: I, text: T) -> Self {
        Document {
            id: id.into(),
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_url<S: Into<String>>(mut self, url: S) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_language<S: Into<String>>(mut self, language: S, score: f64) -> Self {
        self.language = language.into();
        self.language_score = score;
        self
    }
}

/// A lazy, single-pass sequence of documents.
///
/// The first `Err` element aborts the import that consumes it. Dropping the
/// source releases whatever it reads from.
pub type DocumentSource = Box<dyn Iterator<Item = Result<Document>> + Send>;

/// Wrap an in-memory collection as a [`DocumentSource`].
pub fn from_documents(documents: Vec<Document>) -> DocumentSource {
    Box::new(documents.into_iter().map(Ok))
}

/// Stream documents from a JSON-lines file, one document object per line.
///
/// Blank lines are skipped. A line that fails to parse yields a
/// [`FtsError::Source`] naming the line number.
pub fn from_jsonl<P: AsRef<Path>>(path: P) -> Result<DocumentSource> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);

    let iter = reader
        .lines()
        .enumerate()
        .filter_map(|(line_no, line)| match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => Some(serde_json::from_str::<Document>(&line).map_err(|e| {
                FtsError::source(format!("line {}: {e}", line_no + 1))
            })),
            Err(e) => Some(Err(FtsError::source(format!("line {}: {e}", line_no + 1)))),
        });

    Ok(Box::new(iter))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_from_jsonl() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id":"a","text":"first doc","language":"en"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"id":"b","text":"second","url":"http://x"}}"#).unwrap();
        writeln!(file, "not json").unwrap();

        let docs: Vec<Result<Document>> = from_jsonl(file.path()).unwrap().collect();
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].as_ref().unwrap().id, "a");
        assert_eq!(docs[1].as_ref().unwrap().url, "http://x");
        match &docs[2] {
            Err(FtsError::Source(msg)) => assert!(msg.starts_with("line 4")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_from_documents() {
        let docs = vec![Document::new("1", "one"), Document::new("2", "two")];
        let ids: Vec<String> = from_documents(docs).map(|d| d.unwrap().id).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }
}
