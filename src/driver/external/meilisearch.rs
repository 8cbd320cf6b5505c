//! MeiliSearch over its REST API.
//!
//! Writes in MeiliSearch are asynchronous: every mutating request returns a
//! task id that is polled until the task succeeds or fails. Primary keys may
//! only hold ASCII letters, digits, `-` and `_`, so documents are keyed by a
//! sanitized id and keep the original one in `doc_id`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{Batcher, batch_size, check_response, collection_name, decode_error, http_client, request_error};
use crate::data::{Document, DocumentSource};
use crate::driver::{Driver, DriverConfig, DriverInfo, SearchResult};
use crate::error::{ErrorKind, FtsError, Result};
use crate::indexer::ProgressFn;
use crate::query::term_hash;
use crate::util::cancel::CancelToken;

const DEFAULT_HOST: &str = "http://localhost:7700";
const TASK_POLL: Duration = Duration::from_millis(200);
const TASK_TIMEOUT: Duration = Duration::from_secs(600);
const MAX_ID_LEN: usize = 511;

#[derive(Debug, Serialize)]
struct MeiliDocument<'a> {
    id: String,
    doc_id: &'a str,
    url: &'a str,
    text: &'a str,
    dump: &'a str,
    date: &'a str,
    language: &'a str,
    language_score: f64,
}

#[derive(Debug, Deserialize)]
struct Hit {
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
    #[serde(rename = "_rankingScore", default)]
    ranking_score: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    hits: Vec<Hit>,
    #[serde(default)]
    estimated_total_hits: Option<u64>,
    #[serde(default)]
    total_hits: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskRef {
    task_uid: u64,
}

#[derive(Debug, Deserialize)]
struct Task {
    status: String,
    #[serde(default)]
    error: Option<TaskError>,
}

#[derive(Debug, Deserialize)]
struct TaskError {
    message: String,
    #[serde(default)]
    code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexStats {
    number_of_documents: u64,
}

/// Primary key for `id`: kept as-is when already valid, otherwise invalid
/// characters become `_` and a hash of the original id is appended so
/// distinct ids stay distinct.
pub(crate) fn sanitize_id(id: &str) -> String {
    let valid = !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        return id.to_string();
    }
    let mut clean: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(MAX_ID_LEN - 17)
        .collect();
    clean.push('_');
    clean.push_str(&format!("{:016x}", term_hash(id)));
    clean
}

#[derive(Debug)]
pub struct MeiliSearchDriver {
    client: reqwest::Client,
    host: String,
    api_key: Option<String>,
    uid: String,
    batch_size: usize,
    closed: AtomicBool,
}

impl MeiliSearchDriver {
    pub const NAME: &'static str = "meilisearch";

    pub fn new(config: DriverConfig) -> Result<Self> {
        let host = config
            .option_str("host")
            .unwrap_or(DEFAULT_HOST)
            .trim_end_matches('/')
            .to_string();
        Ok(MeiliSearchDriver {
            client: http_client(Self::NAME)?,
            host,
            api_key: config.option_str("api_key").map(str::to_string),
            uid: collection_name(&config)?,
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

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.request(method, format!("{}{path}", self.host));
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| request_error(Self::NAME, e))?;
        check_response(Self::NAME, response).await
    }

    async fn json<T: for<'de> Deserialize<'de>>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let bytes = self
            .send(request)
            .await?
            .bytes()
            .await
            .map_err(|e| request_error(Self::NAME, e))?;
        serde_json::from_slice(&bytes).map_err(|e| decode_error(Self::NAME, e))
    }

    /// Poll a task until it leaves the queue.
    async fn wait_task(&self, task: TaskRef, cancel: &CancelToken) -> Result<()> {
        let started = Instant::now();
        loop {
            cancel.check()?;
            let state: Task = self
                .json(self.request(reqwest::Method::GET, &format!("/tasks/{}", task.task_uid)))
                .await?;
            match state.status.as_str() {
                "succeeded" => return Ok(()),
                "failed" | "canceled" => {
                    let (message, code) = state
                        .error
                        .map(|e| (e.message, e.code))
                        .unwrap_or_else(|| (format!("task {}", state.status), String::new()));
                    // A task deleting an index that does not exist is fine.
                    if code == "index_not_found" {
                        return Ok(());
                    }
                    return Err(FtsError::backend(
                        Self::NAME,
                        ErrorKind::Configuration,
                        format!("task {} {}: {message}", task.task_uid, state.status),
                    ));
                }
                _ => {}
            }
            if started.elapsed() > TASK_TIMEOUT {
                return Err(FtsError::Timeout(format!(
                    "meilisearch task {} still pending",
                    task.task_uid
                )));
            }
            tokio::time::sleep(TASK_POLL).await;
        }
    }

    async fn recreate_index(&self, cancel: &CancelToken) -> Result<()> {
        let delete = self.request(reqwest::Method::DELETE, &format!("/indexes/{}", self.uid));
        let task: TaskRef = self.json(delete).await?;
        self.wait_task(task, cancel).await?;

        let create = self
            .request(reqwest::Method::POST, "/indexes")
            .json(&json!({ "uid": self.uid, "primaryKey": "id" }));
        let task: TaskRef = self.json(create).await?;
        self.wait_task(task, cancel).await?;

        let settings = self
            .request(reqwest::Method::PATCH, &format!("/indexes/{}/settings", self.uid))
            .json(&json!({
                "searchableAttributes": ["text"],
                "displayedAttributes": ["*"],
            }));
        let task: TaskRef = self.json(settings).await?;
        self.wait_task(task, cancel).await
    }
}

#[async_trait]
impl Driver for MeiliSearchDriver {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn info(&self) -> DriverInfo {
        DriverInfo {
            name: Self::NAME.to_string(),
            description: "MeiliSearch REST engine with typo-tolerant ranking".to_string(),
            features: vec!["typo-tolerance".to_string(), "prefix-search".to_string()],
            external: true,
        }
    }

    async fn search(&self, query: &str, limit: usize, offset: usize) -> Result<SearchResult> {
        self.ensure_open()?;
        let started = Instant::now();
        let request = self
            .request(reqwest::Method::POST, &format!("/indexes/{}/search", self.uid))
            .json(&json!({
                "q": query,
                "limit": limit,
                "offset": offset,
                "showRankingScore": true,
            }));
        let response: SearchResponse = self.json(request).await?;

        let total = response
            .total_hits
            .or(response.estimated_total_hits)
            .unwrap_or(response.hits.len() as u64);
        let documents = response
            .hits
            .into_iter()
            .map(|hit| Document {
                id: hit.doc_id,
                url: hit.url,
                text: hit.text,
                dump: hit.dump,
                date: hit.date,
                language: hit.language,
                language_score: hit.language_score,
                score: hit.ranking_score,
            })
            .collect();

        Ok(SearchResult {
            documents,
            duration: started.elapsed(),
            method: Self::NAME.to_string(),
            total,
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
        self.recreate_index(cancel).await?;

        let mut batcher = Batcher::new(source, self.batch_size, progress, cancel);
        loop {
            let batch = batcher.next_batch()?;
            if batch.is_empty() {
                break;
            }
            let payload: Vec<MeiliDocument<'_>> = batch
                .iter()
                .map(|doc| MeiliDocument {
                    id: sanitize_id(&doc.id),
                    doc_id: &doc.id,
                    url: &doc.url,
                    text: &doc.text,
                    dump: &doc.dump,
                    date: &doc.date,
                    language: &doc.language,
                    language_score: doc.language_score,
                })
                .collect();
            let request = self
                .request(reqwest::Method::POST, &format!("/indexes/{}/documents", self.uid))
                .json(&payload);
            let task: TaskRef = self.json(request).await?;
            self.wait_task(task, cancel).await?;
            batcher.sent(batch.len());
            debug!("meilisearch: indexed batch of {}", batch.len());
        }

        let imported = batcher.finish();
        info!(
            "meilisearch: imported {imported} documents into {} in {:?}",
            self.uid,
            started.elapsed()
        );
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        self.ensure_open()?;
        let response = self
            .request(reqwest::Method::GET, &format!("/indexes/{}/stats", self.uid))
            .send()
            .await
            .map_err(|e| request_error(Self::NAME, e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(0);
        }
        let bytes = check_response(Self::NAME, response)
            .await?
            .bytes()
            .await
            .map_err(|e| request_error(Self::NAME, e))?;
        let stats: IndexStats = serde_json::from_slice(&bytes).map_err(|e| decode_error(Self::NAME, e))?;
        Ok(stats.number_of_documents)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    async fn is_available(&self) -> bool {
        match self.json::<Value>(self.request(reqwest::Method::GET, "/health")).await {
            Ok(body) => body.get("status").and_then(Value::as_str) == Some("available"),
            Err(e) => {
                debug!("meilisearch health check failed: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_id() {
        assert_eq!(sanitize_id("abc-123_x"), "abc-123_x");

        let urn = "<urn:uuid:1b2c3d4e>";
        let clean = sanitize_id(urn);
        assert!(clean.starts_with("_urn_uuid_1b2c3d4e__"));
        assert!(clean.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(sanitize_id("a.b"), sanitize_id("a/b"));
        assert_eq!(sanitize_id(urn), clean);

        let long = "x".repeat(2_000);
        assert!(sanitize_id(&long).len() <= MAX_ID_LEN);
        assert!(!sanitize_id("").is_empty());
    }

    #[test]
    fn test_decode_search_response() {
        let body = r#"{
            "hits": [{"id": "a", "doc_id": "<a>", "text": "hello", "_rankingScore": 0.9}],
            "estimatedTotalHits": 12,
            "processingTimeMs": 1
        }"#;
        let response: SearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.estimated_total_hits, Some(12));
        assert_eq!(response.hits[0].doc_id, "<a>");
        assert_eq!(response.hits[0].ranking_score, 0.9);
    }

    #[test]
    fn test_options() {
        let config = DriverConfig::new(MeiliSearchDriver::NAME)
            .with_option("host", "http://meili:7700/")
            .with_option("api_key", "secret");
        let driver = MeiliSearchDriver::new(config).unwrap();
        assert_eq!(driver.host, "http://meili:7700");
        assert_eq!(driver.uid, "fineweb_en");
        assert_eq!(driver.batch_size, super::super::DEFAULT_BATCH_SIZE);
    }
}
