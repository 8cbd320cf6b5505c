//! Adapters that put search engines running outside the process behind the
//! [`Driver`](crate::driver::Driver) contract.
//!
//! Backend failures are reported as [`FtsError::Backend`] carrying an
//! [`ErrorKind`]: transport failures, timeouts, HTTP 5xx/429 and transient
//! database conditions are `Io` (worth retrying), rejected requests are
//! `Configuration`, and responses that cannot be decoded are `Format`.

mod manticore;
mod meilisearch;
mod postgres;

use std::time::Duration;

use reqwest::StatusCode;

use crate::data::{Document, DocumentSource};
use crate::driver::DriverConfig;
use crate::error::{ErrorKind, FtsError, Result};
use crate::indexer::{ProgressFn, report};
use crate::util::cancel::CancelToken;

pub use manticore::ManticoreDriver;
pub use meilisearch::MeiliSearchDriver;
pub use postgres::PostgresDriver;

/// Documents sent per request unless the `batch_size` option says otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 5000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const PROGRESS_INTERVAL: u64 = 10_000;

pub(crate) fn http_client(driver: &str) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .pool_max_idle_per_host(8)
        .build()
        .map_err(|e| FtsError::backend(driver, ErrorKind::Internal, e.to_string()))
}

pub(crate) fn status_kind(status: StatusCode) -> ErrorKind {
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        ErrorKind::Io
    } else if status.is_client_error() {
        ErrorKind::Configuration
    } else {
        ErrorKind::Format
    }
}

pub(crate) fn request_error(driver: &str, err: reqwest::Error) -> FtsError {
    let kind = if err.is_decode() {
        ErrorKind::Format
    } else if let Some(status) = err.status() {
        status_kind(status)
    } else {
        ErrorKind::Io
    };
    FtsError::backend(driver, kind, err.to_string())
}

/// Pass successful responses through; turn anything else into an error that
/// quotes the start of the body.
pub(crate) async fn check_response(driver: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(512).collect();
    Err(FtsError::backend(
        driver,
        status_kind(status),
        format!("HTTP {status}: {body}"),
    ))
}

pub(crate) fn decode_error(driver: &str, err: serde_json::Error) -> FtsError {
    FtsError::backend(driver, ErrorKind::Format, format!("unexpected response: {err}"))
}

/// Table or index name: the `index` (or `table`) option, else
/// `fineweb_<language>`. Only ASCII letters, digits and `_` are kept.
pub(crate) fn collection_name(config: &DriverConfig) -> Result<String> {
    let name = match config.option_str("index").or_else(|| config.option_str("table")) {
        Some(name) => name.to_string(),
        None => {
            let language: String = config
                .language()
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
                .collect();
            format!("fineweb_{language}")
        }
    };

    let valid = !name.is_empty()
        && name.len() <= 63
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if !valid {
        return Err(FtsError::invalid_config(format!(
            "'{name}' is not a valid index or table name"
        )));
    }
    Ok(name)
}

pub(crate) fn batch_size(config: &DriverConfig) -> Result<usize> {
    match config.option_usize("batch_size")? {
        Some(0) => Err(FtsError::invalid_config("batch_size must be at least 1")),
        Some(n) => Ok(n),
        None => Ok(DEFAULT_BATCH_SIZE),
    }
}

/// Pulls fixed-size batches from a document source and reports progress.
pub(crate) struct Batcher<'a> {
    source: DocumentSource,
    size: usize,
    cancel: &'a CancelToken,
    progress: Option<ProgressFn>,
    imported: u64,
}

impl<'a> Batcher<'a> {
    pub(crate) fn new(
        source: DocumentSource,
        size: usize,
        progress: Option<ProgressFn>,
        cancel: &'a CancelToken,
    ) -> Self {
        Batcher {
            source,
            size,
            cancel,
            progress,
            imported: 0,
        }
    }

    /// Next batch, empty once the source is exhausted.
    pub(crate) fn next_batch(&mut self) -> Result<Vec<Document>> {
        let mut batch = Vec::with_capacity(self.size.min(DEFAULT_BATCH_SIZE));
        while batch.len() < self.size {
            self.cancel.check()?;
            match self.source.next() {
                Some(doc) => batch.push(doc?),
                None => break,
            }
        }
        Ok(batch)
    }

    /// Record `n` documents accepted by the backend.
    pub(crate) fn sent(&mut self, n: usize) {
        let before = self.imported / PROGRESS_INTERVAL;
        self.imported += n as u64;
        if self.imported / PROGRESS_INTERVAL > before {
            report(self.progress.as_ref(), self.imported, 0);
        }
    }

    pub(crate) fn finish(&self) -> u64 {
        report(self.progress.as_ref(), self.imported, self.imported);
        self.imported
    }
}
