//! Manticore Search over its HTTP JSON API.
//!
//! Tables are managed with SQL sent to `/cli_json`, documents are loaded
//! through `/bulk` as NDJSON and queries go to `/search` with the BM25
//! ranker. Manticore ids are positive integers, so each document gets its
//! import position as id and keeps its own id in `doc_id`.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{Batcher, batch_size, check_response, collection_name, decode_error, http_client, request_error};
use crate::data::{Document, DocumentSource};
use crate::driver::{Driver, DriverConfig, DriverInfo, SearchResult};
use crate::error::{ErrorKind, FtsError, Result};
use crate::indexer::ProgressFn;
use crate::util::cancel::CancelToken;

const DEFAULT_HOST: &str = "http://localhost:9308";
const MIN_MAX_MATCHES: usize = 1000;

#[derive(Debug, Default, Deserialize)]
struct Source {
    #[serde(default)]
    doc_id: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    dump: String,
    #[serde(default)]
    date: String,
    #[serde(default)]
    language: String,
    #[serde(default)]
    language_score: f64,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_score", default)]
    score: f64,
    #[serde(rename = "_source", default)]
    source: Source,
}

#[derive(Debug, Deserialize)]
struct Hits {
    #[serde(default)]
    total: u64,
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<Value>,
}

/// Whether the query asks for an exact phrase.
fn is_phrase(query: &str) -> bool {
    let query = query.trim();
    query.len() >= 2 && query.starts_with('"') && query.ends_with('"')
}

/// Body of a `/search` request for ranks `[offset, offset + limit)`.
fn search_body(table: &str, query: &str, limit: usize, offset: usize) -> Value {
    let matcher = if is_phrase(query) {
        json!({ "match_phrase": { "text": query.trim().trim_matches('"') } })
    } else {
        // Every term must match, like the in-process profiles.
        json!({ "match": { "text": { "query": query, "operator": "and" } } })
    };
    json!({
        "index": table,
        "query": matcher,
        "limit": limit,
        "offset": offset,
        "options": {
            "ranker": "bm25",
            "max_matches": offset.saturating_add(limit).max(MIN_MAX_MATCHES),
        },
    })
}

fn create_table_sql(table: &str, language: &str) -> String {
    let mut sql = format!(
        "CREATE TABLE {table} (doc_id string, url string, text text, dump string, \
         date string, language string, language_score float)"
    );
    if language.eq_ignore_ascii_case("en") || language.to_ascii_lowercase().starts_with("eng") {
        sql.push_str(" morphology='stem_en'");
    }
    sql
}

/// One NDJSON line per document, ids starting at `first_id`.
fn bulk_body(table: &str, documents: &[Document], first_id: u64) -> Result<String> {
    let mut body = String::new();
    for (i, doc) in documents.iter().enumerate() {
        let line = json!({
            "insert": {
                "index": table,
                "id": first_id + i as u64,
                "doc": {
                    "doc_id": doc.id,
                    "url": doc.url,
                    "text": doc.text,
                    "dump": doc.dump,
                    "date": doc.date,
                    "language": doc.language,
                    "language_score": doc.language_score,
                },
            }
        });
        let _ = writeln!(body, "{}", serde_json::to_string(&line)?);
    }
    Ok(body)
}

#[derive(Debug)]
pub struct ManticoreDriver {
    client: reqwest::Client,
    host: String,
    table: String,
    language: String,
    batch_size: usize,
    closed: AtomicBool,
}

impl ManticoreDriver {
    pub const NAME: &'static str = "manticore";

    pub fn new(config: DriverConfig) -> Result<Self> {
        let host = config
            .option_str("host")
            .unwrap_or(DEFAULT_HOST)
            .trim_end_matches('/')
            .to_string();
        Ok(ManticoreDriver {
            client: http_client(Self::NAME)?,
            host,
            table: collection_name(&config)?,
            language: config.language().to_string(),
            batch_size: batch_size(&config)?,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(FtsError::Closed(Self::NAME.to_string()))
        } else {
            Ok(())
        }
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let response = self
            .client
            .post(format!("{}{path}", self.host))
            .json(body)
            .send()
            .await
            .map_err(|e| request_error(Self::NAME, e))?;
        let bytes = check_response(Self::NAME, response)
            .await?
            .bytes()
            .await
            .map_err(|e| request_error(Self::NAME, e))?;
        serde_json::from_slice(&bytes).map_err(|e| decode_error(Self::NAME, e))
    }

    /// Run one SQL statement through `/cli_json`.
    async fn sql(&self, statement: &str) -> Result<()> {
        debug!("manticore: {statement}");
        let response = self
            .client
            .post(format!("{}/cli_json", self.host))
            .body(statement.to_string())
            .send()
            .await
            .map_err(|e| request_error(Self::NAME, e))?;
        let bytes = check_response(Self::NAME, response)
            .await?
            .bytes()
            .await
            .map_err(|e| request_error(Self::NAME, e))?;
        let body: Value = serde_json::from_slice(&bytes).map_err(|e| decode_error(Self::NAME, e))?;
        let statements = match &body {
            Value::Array(items) => items.as_slice(),
            other => std::slice::from_ref(other),
        };
        for result in statements {
            if let Some(error) = result.get("error").and_then(Value::as_str)
                && !error.is_empty()
            {
                return Err(FtsError::backend(
                    Self::NAME,
                    ErrorKind::Configuration,
                    format!("{statement}: {error}"),
                ));
            }
        }
        Ok(())
    }

    async fn bulk(&self, body: String) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/bulk", self.host))
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|e| request_error(Self::NAME, e))?;
        let bytes = check_response(Self::NAME, response)
            .await?
            .bytes()
            .await
            .map_err(|e| request_error(Self::NAME, e))?;
        let response: BulkResponse = serde_json::from_slice(&bytes).map_err(|e| decode_error(Self::NAME, e))?;
        if response.errors {
            let first = response
                .items
                .iter()
                .find_map(|item| item.pointer("/bulk/error").or_else(|| item.pointer("/insert/error")))
                .map(Value::to_string)
                .unwrap_or_else(|| "bulk insert reported errors".to_string());
            return Err(FtsError::backend(Self::NAME, ErrorKind::Format, first));
        }
        Ok(())
    }
}

#[async_trait]
impl Driver for ManticoreDriver {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn info(&self) -> DriverInfo {
        DriverInfo {
            name: Self::NAME.to_string(),
            description: "Manticore Search with the BM25 ranker over HTTP JSON".to_string(),
            features: vec!["bm25".to_string(), "phrase".to_string(), "stemming".to_string()],
            external: true,
        }
    }

    async fn search(&self, query: &str, limit: usize, offset: usize) -> Result<SearchResult> {
        self.ensure_open()?;
        let started = Instant::now();
        let body = search_body(&self.table, query, limit, offset);
        let value = self.post_json("/search", &body).await?;
        let response: SearchResponse = serde_json::from_value(value).map_err(|e| decode_error(Self::NAME, e))?;

        let documents = response
            .hits
            .hits
            .into_iter()
            .map(|hit| Document {
                id: hit.source.doc_id,
                url: hit.source.url,
                text: hit.source.text,
                dump: hit.source.dump,
                date: hit.source.date,
                language: hit.source.language,
                language_score: hit.source.language_score,
                score: hit.score,
            })
            .collect();

        Ok(SearchResult {
            documents,
            duration: started.elapsed(),
            method: Self::NAME.to_string(),
            total: response.hits.total,
        })
    }

    async fn import(
        &self,
        source: DocumentSource,
        progress: Option<ProgressFn>,
        cancel: &CancelToken,
    ) -> Result<()> {
        self.ensure_open()?;
        let started = Instant::now();
        self.sql(&format!("DROP TABLE IF EXISTS {}", self.table)).await?;
        self.sql(&create_table_sql(&self.table, &self.language)).await?;

        let mut batcher = Batcher::new(source, self.batch_size, progress, cancel);
        let mut next_id = 1u64;
        loop {
            let batch = batcher.next_batch()?;
            if batch.is_empty() {
                break;
            }
            self.bulk(bulk_body(&self.table, &batch, next_id)?).await?;
            next_id += batch.len() as u64;
            batcher.sent(batch.len());
        }

        let imported = batcher.finish();
        info!(
            "manticore: imported {imported} documents into {} in {:?}",
            self.table,
            started.elapsed()
        );
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        self.ensure_open()?;
        let body = json!({
            "index": self.table,
            "query": { "match_all": {} },
            "limit": 0,
        });
        let value = self.post_json("/search", &body).await?;
        let response: SearchResponse = serde_json::from_value(value).map_err(|e| decode_error(Self::NAME, e))?;
        Ok(response.hits.total)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    async fn is_available(&self) -> bool {
        match self.client.get(format!("{}/", self.host)).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("manticore health check failed: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_body() {
        let body = search_body("fineweb_en", "rust search", 10, 20);
        assert_eq!(body["query"]["match"]["text"]["query"], "rust search");
        assert_eq!(body["query"]["match"]["text"]["operator"], "and");
        assert_eq!(body["offset"], 20);
        assert_eq!(body["options"]["ranker"], "bm25");
        assert_eq!(body["options"]["max_matches"], 1000);

        let body = search_body("t", "\"search engine\"", 500, 900);
        assert_eq!(body["query"]["match_phrase"]["text"], "search engine");
        assert_eq!(body["options"]["max_matches"], 1400);

        let body = search_body("t", "rust", usize::MAX, 10);
        assert_eq!(body["options"]["max_matches"], usize::MAX as u64);
    }

    #[test]
    fn test_bulk_body() {
        let docs = vec![Document::new("<urn:a>", "first"), Document::new("b", "second \"quoted\"")];
        let body = bulk_body("t", &docs, 41).unwrap();
        let lines: Vec<Value> = body
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["insert"]["id"], 41);
        assert_eq!(lines[0]["insert"]["doc"]["doc_id"], "<urn:a>");
        assert_eq!(lines[1]["insert"]["id"], 42);
        assert_eq!(lines[1]["insert"]["doc"]["text"], "second \"quoted\"");
    }

    #[test]
    fn test_create_table_sql() {
        assert!(create_table_sql("t", "en").ends_with("morphology='stem_en'"));
        assert!(!create_table_sql("t", "vie_Latn").contains("morphology"));
    }

    #[test]
    fn test_decode_search_response() {
        let body = r#"{"took": 1, "timed_out": false, "hits": {"total": 3, "hits": [
            {"_id": 7, "_score": 2510, "_source": {"doc_id": "x", "text": "t"}}
        ]}}"#;
        let response: SearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.hits.total, 3);
        assert_eq!(response.hits.hits[0].source.doc_id, "x");
        assert_eq!(response.hits.hits[0].score, 2510.0);
    }
}
