//! PostgreSQL with the `pg_textsearch` BM25 index access method.
//!
//! Documents are streamed into the table with `COPY ... FROM STDIN` and the
//! BM25 index is built once the table is loaded. Queries order by the `<@>`
//! distance operator, which is the negated BM25 score.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use futures::SinkExt;
use log::{debug, error, info};
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls};

use super::{Batcher, batch_size, collection_name};
use crate::data::{Document, DocumentSource};
use crate::driver::{Driver, DriverConfig, DriverInfo, SearchResult};
use crate::error::{ErrorKind, FtsError, Result};
use crate::indexer::ProgressFn;
use crate::util::cancel::CancelToken;

const DEFAULT_DSN: &str = "host=localhost user=postgres";
const UNDEFINED_TABLE: &str = "42P01";

/// Classify a SQLSTATE code.
///
/// Connection exceptions (08), insufficient resources (53) and operator
/// intervention (57) are transient; syntax and access rule violations (42)
/// mean the setup is wrong.
pub(crate) fn sqlstate_kind(code: &str) -> ErrorKind {
    match code.get(..2) {
        Some("08" | "53" | "57") => ErrorKind::Io,
        Some("42") => ErrorKind::Configuration,
        Some("22" | "23") => ErrorKind::Format,
        _ => ErrorKind::Internal,
    }
}

fn pg_error(err: tokio_postgres::Error) -> FtsError {
    let kind = match err.code() {
        Some(state) => sqlstate_kind(state.code()),
        None => ErrorKind::Io,
    };
    let message = match err.as_db_error() {
        Some(db) => format!("{}: {}", db.code().code(), db.message()),
        None => err.to_string(),
    };
    FtsError::backend(PostgresDriver::NAME, kind, message)
}

fn is_undefined_table(err: &tokio_postgres::Error) -> bool {
    err.code().map(|state| state.code()) == Some(UNDEFINED_TABLE)
}

/// Escape a value for the COPY text format.
fn escape_copy(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
}

/// COPY text rows for `documents`, in the column order of [`COPY_COLUMNS`].
fn copy_rows(documents: &[Document]) -> String {
    let mut out = String::new();
    for doc in documents {
        for field in [&doc.id, &doc.url, &doc.text, &doc.dump, &doc.date, &doc.language] {
            escape_copy(field, &mut out);
            out.push('\t');
        }
        out.push_str(&doc.language_score.to_string());
        out.push('\n');
    }
    out
}

const COPY_COLUMNS: &str = "doc_id, url, text, dump, date, language, language_score";

/// Text search configuration for the BM25 index.
fn text_config(language: &str) -> &'static str {
    let language = language.to_ascii_lowercase();
    if language == "en" || language.starts_with("eng") {
        "english"
    } else {
        "simple"
    }
}

pub struct PostgresDriver {
    dsn: String,
    table: String,
    index: String,
    text_config: &'static str,
    batch_size: usize,
    client: Mutex<Option<Arc<Client>>>,
    closed: AtomicBool,
}

impl fmt::Debug for PostgresDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresDriver")
            .field("table", &self.table)
            .field("index", &self.index)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl PostgresDriver {
    pub const NAME: &'static str = "postgres";

    pub fn new(config: DriverConfig) -> Result<Self> {
        let table = collection_name(&config)?;
        Ok(PostgresDriver {
            dsn: config.option_str("dsn").unwrap_or(DEFAULT_DSN).to_string(),
            index: format!("{table}_bm25_idx"),
            table,
            text_config: text_config(config.language()),
            batch_size: batch_size(&config)?,
            client: Mutex::new(None),
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

    /// Shared connection, reconnecting when the previous one has dropped.
    async fn client(&self) -> Result<Arc<Client>> {
        let mut slot = self.client.lock().await;
        if let Some(client) = slot.as_ref()
            && !client.is_closed()
        {
            return Ok(client.clone());
        }

        let (client, connection) = tokio_postgres::connect(&self.dsn, NoTls)
            .await
            .map_err(pg_error)?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("postgres connection error: {e}");
            }
        });
        let client = Arc::new(client);
        *slot = Some(client.clone());
        Ok(client)
    }

    fn search_sql(&self) -> String {
        format!(
            "SELECT doc_id, url, text, dump, date, language, language_score, \
             text <@> to_bm25query($1, '{index}') AS distance \
             FROM {table} \
             WHERE text <@> to_bm25query($1, '{index}') < 0 \
             ORDER BY distance \
             LIMIT $2 OFFSET $3",
            index = self.index,
            table = self.table,
        )
    }
}

#[async_trait]
impl Driver for PostgresDriver {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn info(&self) -> DriverInfo {
        DriverInfo {
            name: Self::NAME.to_string(),
            description: "PostgreSQL with the pg_textsearch BM25 index".to_string(),
            features: vec!["bm25".to_string(), "sql".to_string()],
            external: true,
        }
    }

    async fn search(&self, query: &str, limit: usize, offset: usize) -> Result<SearchResult> {
        self.ensure_open()?;
        let started = Instant::now();
        let client = self.client().await?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let offset_param = i64::try_from(offset).unwrap_or(i64::MAX);
        let rows = client
            .query(&self.search_sql(), &[&query, &limit, &offset_param])
            .await
            .map_err(pg_error)?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let distance: f64 = row.try_get("distance").map_err(pg_error)?;
            documents.push(Document {
                id: row.try_get("doc_id").map_err(pg_error)?,
                url: row.try_get("url").map_err(pg_error)?,
                text: row.try_get("text").map_err(pg_error)?,
                dump: row.try_get("dump").map_err(pg_error)?,
                date: row.try_get("date").map_err(pg_error)?,
                language: row.try_get("language").map_err(pg_error)?,
                language_score: row.try_get("language_score").map_err(pg_error)?,
                score: -distance,
            });
        }

        // The extension does not report a match count.
        let total = (offset + documents.len()) as u64;
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
        let client = self.client().await?;
        client
            .batch_execute(&format!(
                "CREATE EXTENSION IF NOT EXISTS pg_textsearch;\n\
                 DROP TABLE IF EXISTS {table};\n\
                 CREATE TABLE {table} (\n\
                   id bigint GENERATED ALWAYS AS IDENTITY PRIMARY KEY,\n\
                   doc_id text NOT NULL,\n\
                   url text NOT NULL DEFAULT '',\n\
                   text text NOT NULL,\n\
                   dump text NOT NULL DEFAULT '',\n\
                   date text NOT NULL DEFAULT '',\n\
                   language text NOT NULL DEFAULT '',\n\
                   language_score double precision NOT NULL DEFAULT 0\n\
                 );",
                table = self.table
            ))
            .await
            .map_err(pg_error)?;

        let sink = client
            .copy_in(&format!(
                "COPY {} ({COPY_COLUMNS}) FROM STDIN",
                self.table
            ))
            .await
            .map_err(pg_error)?;
        let mut sink = Box::pin(sink);

        let mut batcher = Batcher::new(source, self.batch_size, progress, cancel);
        loop {
            let batch = batcher.next_batch()?;
            if batch.is_empty() {
                break;
            }
            sink.send(Bytes::from(copy_rows(&batch)))
                .await
                .map_err(pg_error)?;
            batcher.sent(batch.len());
        }
        let copied = sink.as_mut().finish().await.map_err(pg_error)?;
        debug!("postgres: copied {copied} rows into {}", self.table);

        cancel.check()?;
        client
            .batch_execute(&format!(
                "CREATE INDEX {index} ON {table} USING bm25(text) WITH (text_config='{config}');\n\
                 ANALYZE {table};",
                index = self.index,
                table = self.table,
                config = self.text_config,
            ))
            .await
            .map_err(pg_error)?;

        let imported = batcher.finish();
        info!(
            "postgres: imported {imported} documents into {} in {:?}",
            self.table,
            started.elapsed()
        );
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        self.ensure_open()?;
        let client = self.client().await?;
        match client
            .query_one(&format!("SELECT count(*) FROM {}", self.table), &[])
            .await
        {
            Ok(row) => {
                let n: i64 = row.try_get(0).map_err(pg_error)?;
                Ok(n.max(0) as u64)
            }
            Err(e) if is_undefined_table(&e) => Ok(0),
            Err(e) => Err(pg_error(e)),
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.client.lock().await.take();
        Ok(())
    }

    async fn is_available(&self) -> bool {
        match self.client().await {
            Ok(client) => client.simple_query("SELECT 1").await.is_ok(),
            Err(e) => {
                debug!("postgres health check failed: {e}");
                false
            }
        }
    }
}
