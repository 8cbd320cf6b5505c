//! The driver contract shared by in-process indexes and external engines.
//!
//! A [`Driver`] owns one searchable corpus. Drivers are opened by name
//! through the [`registry`] from a [`DriverConfig`], fed once with
//! [`Driver::import`] and then queried concurrently. Every driver returns the
//! same [`SearchResult`] shape so runs against different engines can be
//! compared directly with [`compare_results`].

pub mod config;
#[cfg(feature = "external")]
pub mod external;
pub mod local;
pub mod registry;

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::data::{Document, DocumentSource};
use crate::error::{FtsError, Result};
use crate::index::IndexStats;
use crate::indexer::ProgressFn;
use crate::util::cancel::CancelToken;

pub use config::DriverConfig;
pub use local::LocalDriver;
pub use registry::{DriverFactory, factory, get, list, open, register};

/// Interval between liveness probes in [`Driver::wait_for_service`].
pub const PROBE_INTERVAL: Duration = Duration::from_millis(500);

/// Read-only description of a driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverInfo {
    pub name: String,
    pub description: String,
    pub features: Vec<String>,
    /// Whether the engine runs outside this process.
    pub external: bool,
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub documents: Vec<Document>,
    pub duration: Duration,
    /// Driver name or search variant that produced the page.
    pub method: String,
    /// Matching documents as reported by the engine.
    pub total: u64,
}

/// Footprint of a driver's corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverStats {
    pub documents: u64,
    pub index: Option<IndexStats>,
    /// Size of the persisted index, when there is one.
    pub disk_bytes: Option<u64>,
}

#[async_trait]
pub trait Driver: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn info(&self) -> DriverInfo;

    /// Rank documents for `query`, returning ranks `[offset, offset + limit)`.
    async fn search(&self, query: &str, limit: usize, offset: usize) -> Result<SearchResult>;

    /// Replace the corpus with the documents of `source`.
    ///
    /// The first source error aborts the import. A failed or cancelled import
    /// leaves the previously imported corpus searchable.
    async fn import(
        &self,
        source: DocumentSource,
        progress: Option<ProgressFn>,
        cancel: &CancelToken,
    ) -> Result<()>;

    async fn count(&self) -> Result<u64>;

    /// Release the corpus. Later calls fail with [`FtsError::Closed`].
    async fn close(&self) -> Result<()>;

    async fn stats(&self) -> Option<DriverStats> {
        None
    }

    /// Whether the engine can serve requests right now.
    async fn is_available(&self) -> bool {
        true
    }

    /// Poll [`Driver::is_available`] every [`PROBE_INTERVAL`] until it
    /// succeeds or `timeout` elapses.
    async fn wait_for_service(&self, timeout: Duration) -> Result<()> {
        let started = tokio::time::Instant::now();
        loop {
            if self.is_available().await {
                debug!("{} available after {:?}", self.name(), started.elapsed());
                return Ok(());
            }
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(FtsError::Timeout(format!(
                    "{} not available after {timeout:?}",
                    self.name()
                )));
            }
            debug!("{} not ready yet, retrying", self.name());
            tokio::time::sleep(PROBE_INTERVAL.min(timeout - elapsed)).await;
        }
    }
}

/// How two result pages for the same query relate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResultComparison {
    /// Document ids present in both pages.
    pub overlap: usize,
    /// `overlap` as a percentage of the smaller page.
    pub overlap_pct: f64,
    /// How much faster `a` was than `b`, in percent of `b`'s duration.
    /// Negative when `a` was slower.
    pub speedup_pct: f64,
}

pub fn compare_results(a: &SearchResult, b: &SearchResult) -> ResultComparison {
    let ids: HashSet<&str> = b.documents.iter().map(|d| d.id.as_str()).collect();
    let overlap = a
        .documents
        .iter()
        .filter(|d| ids.contains(d.id.as_str()))
        .count();

    let smaller = a.documents.len().min(b.documents.len());
    let overlap_pct = if smaller == 0 {
        0.0
    } else {
        overlap as f64 / smaller as f64 * 100.0
    };

    let base = b.duration.as_secs_f64();
    let speedup_pct = if base > 0.0 {
        (base - a.duration.as_secs_f64()) / base * 100.0
    } else {
        0.0
    };

    ResultComparison {
        overlap,
        overlap_pct,
        speedup_pct,
    }
}
