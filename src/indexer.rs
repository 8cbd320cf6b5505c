//! Parallel document inversion.
//!
//! ```text
//! source ──► reader ──(seq, chunk)──► workers × N ──(seq, part)──► merger
//!            (calling thread)          analyze + invert              reorder by seq
//! ```
//!
//! The reader pulls documents from the source and cuts them into chunks of
//! `batch_size`. Workers invert chunks independently with doc ids local to
//! the chunk. The merger puts parts back in sequence order and rebases their
//! ids, so the final doc ids follow source order no matter which worker
//! finished first. Both channels are bounded, which keeps the reader at most
//! `queue_depth` chunks per worker ahead of the analysis.
//!
//! The resulting [`InvertedBatch`] is handed to a profile builder running on
//! the indexer's rayon pool.

use std::collections::BTreeMap;
use std::mem;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use ahash::AHashMap;
use crossbeam_channel::{Receiver, Sender, bounded};
use log::{debug, info, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::analysis::{Analyzer, AnalyzerConfig};
use crate::data::{self, Document, DocumentSource};
use crate::error::{FtsError, Result};
use crate::index::{IndexSettings, Profile, SearchIndex, build_index};
use crate::util::cancel::CancelToken;

/// Largest number of documents one index can hold.
pub const MAX_DOCUMENTS: u64 = i32::MAX as u64;

/// Progress callback receiving `(imported, total)`.
///
/// `total` is 0 while the source is still being read and equals `imported`
/// on the final report.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct IndexerConfig {
    /// Analysis threads, also the size of the build pool.
    pub workers: usize,
    /// Documents per chunk handed to a worker.
    pub batch_size: usize,
    /// Report progress every this many documents; 0 disables intermediate reports.
    pub progress_interval: u64,
    /// Chunks in flight per worker.
    pub queue_depth: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        IndexerConfig {
            workers: num_cpus::get().clamp(1, 8),
            batch_size: 512,
            progress_interval: 10_000,
            queue_depth: 2,
        }
    }
}

impl IndexerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(FtsError::invalid_config("workers must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(FtsError::invalid_config("batch_size must be at least 1"));
        }
        if self.queue_depth == 0 {
            return Err(FtsError::invalid_config("queue_depth must be at least 1"));
        }
        Ok(())
    }
}

/// Postings of one term: ascending doc ids and matching frequencies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostingBuf {
    pub docs: Vec<u32>,
    pub freqs: Vec<u32>,
}

/// Documents analyzed and inverted, ready for a profile builder.
#[derive(Debug, Default)]
pub struct InvertedBatch {
    pub analyzer: AnalyzerConfig,
    pub documents: Vec<Document>,
    /// Token count per document, unclamped.
    pub doc_lens: Vec<u32>,
    pub postings: AHashMap<String, PostingBuf>,
    pub total_tokens: u64,
}

impl InvertedBatch {
    fn new(analyzer: AnalyzerConfig) -> Self {
        InvertedBatch {
            analyzer,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn num_terms(&self) -> usize {
        self.postings.len()
    }

    /// Invert `documents` with ids starting at 0.
    fn invert(analyzer: &Analyzer, documents: Vec<Document>) -> Self {
        let mut batch = InvertedBatch::new(analyzer.config().clone());
        batch.doc_lens.reserve(documents.len());

        for (local, doc) in documents.iter().enumerate() {
            let tf = analyzer.term_frequencies(&doc.text);
            for (term, freq) in tf.terms {
                let buf = batch.postings.entry(term).or_default();
                buf.docs.push(local as u32);
                buf.freqs.push(freq);
            }
            batch.doc_lens.push(tf.length);
            batch.total_tokens += tf.length as u64;
        }
        batch.documents = documents;
        batch
    }

    /// Append a part whose ids start at 0, shifting them past our last doc.
    fn append(&mut self, part: InvertedBatch) -> Result<()> {
        let base = self.documents.len() as u64;
        if base + part.documents.len() as u64 > MAX_DOCUMENTS {
            return Err(FtsError::index(format!(
                "an index holds at most {MAX_DOCUMENTS} documents"
            )));
        }
        let base = base as u32;

        for (term, buf) in part.postings {
            let merged = self.postings.entry(term).or_default();
            merged.docs.extend(buf.docs.iter().map(|&d| d + base));
            merged.freqs.extend(buf.freqs);
        }
        self.documents.extend(part.documents);
        self.doc_lens.extend(part.doc_lens);
        self.total_tokens += part.total_tokens;
        Ok(())
    }
}

/// Invoke a progress callback, containing any panic it raises.
pub(crate) fn report(progress: Option<&ProgressFn>, imported: u64, total: u64) {
    if let Some(callback) = progress {
        if catch_unwind(AssertUnwindSafe(|| callback(imported, total))).is_err() {
            warn!("Progress callback panicked at {imported} documents; ignoring");
        }
    }
}

/// Turns document sources into inverted batches and built indexes.
#[derive(Debug)]
pub struct ParallelIndexer {
    config: IndexerConfig,
    pool: ThreadPool,
}

impl ParallelIndexer {
    pub fn new(config: IndexerConfig) -> Result<Self> {
        config.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("fts-build-{i}"))
            .build()
            .map_err(|e| FtsError::other(format!("failed to start build pool: {e}")))?;
        Ok(ParallelIndexer { config, pool })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(IndexerConfig::default())
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Pool used by profile builders.
    pub fn pool(&self) -> &ThreadPool {
        &self.pool
    }

    /// Analyze and invert every document of `source`.
    ///
    /// Fails with the first source error, or with [`FtsError::Cancelled`]
    /// when `cancel` fires before the batch is complete.
    pub fn invert(
        &self,
        source: DocumentSource,
        analyzer_config: &AnalyzerConfig,
        progress: Option<&ProgressFn>,
        cancel: &CancelToken,
    ) -> Result<InvertedBatch> {
        let started = Instant::now();
        let analyzer = Analyzer::new(analyzer_config.clone());
        let depth = self.config.queue_depth * self.config.workers;
        let (task_tx, task_rx) = bounded::<(u64, Vec<Document>)>(depth);
        let (done_tx, done_rx) = bounded::<(u64, InvertedBatch)>(depth);

        let (read, merged) = thread::scope(|scope| {
            for _ in 0..self.config.workers {
                let task_rx = task_rx.clone();
                let done_tx = done_tx.clone();
                let analyzer = &analyzer;
                scope.spawn(move || {
                    for (seq, chunk) in task_rx.iter() {
                        // Keep draining so the reader never blocks on a full queue.
                        if cancel.is_cancelled() {
                            continue;
                        }
                        if done_tx.send((seq, InvertedBatch::invert(analyzer, chunk))).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(task_rx);
            drop(done_tx);

            let merger = scope.spawn(|| merge_in_order(done_rx, analyzer_config.clone()));
            let read = self.read_source(source, task_tx, progress, cancel);
            let merged = merger
                .join()
                .unwrap_or_else(|_| Err(FtsError::other("merger thread panicked")));
            (read, merged)
        });

        let imported = read?;
        let batch = merged?;
        cancel.check()?;
        report(progress, imported, imported);

        info!(
            "Inverted {} documents ({} terms, {} tokens) in {:?}",
            batch.len(),
            batch.num_terms(),
            batch.total_tokens,
            started.elapsed()
        );
        Ok(batch)
    }

    /// Feed `source` to the workers in numbered chunks. Returns the number of
    /// documents read.
    fn read_source(
        &self,
        source: DocumentSource,
        tasks: Sender<(u64, Vec<Document>)>,
        progress: Option<&ProgressFn>,
        cancel: &CancelToken,
    ) -> Result<u64> {
        let batch_size = self.config.batch_size;
        let interval = self.config.progress_interval;
        let mut chunk = Vec::with_capacity(batch_size);
        let mut seq = 0u64;
        let mut imported = 0u64;

        for doc in source {
            cancel.check()?;
            chunk.push(doc?);
            imported += 1;
            if imported > MAX_DOCUMENTS {
                return Err(FtsError::index(format!(
                    "an index holds at most {MAX_DOCUMENTS} documents"
                )));
            }
            if interval > 0 && imported % interval == 0 {
                report(progress, imported, 0);
            }
            if chunk.len() == batch_size {
                let full = mem::replace(&mut chunk, Vec::with_capacity(batch_size));
                if tasks.send((seq, full)).is_err() {
                    debug!("Workers stopped early; ending read at {imported} documents");
                    return Ok(imported);
                }
                seq += 1;
            }
        }

        cancel.check()?;
        if !chunk.is_empty() {
            // A closed queue means the merger already failed and reports it.
            let _ = tasks.send((seq, chunk));
        }
        Ok(imported)
    }

    /// Invert in-memory documents without progress or cancellation.
    pub fn invert_documents(
        &self,
        documents: Vec<Document>,
        analyzer_config: &AnalyzerConfig,
    ) -> Result<InvertedBatch> {
        self.invert(
            data::from_documents(documents),
            analyzer_config,
            None,
            &CancelToken::new(),
        )
    }

    /// Invert `source` and build an index of `profile` from it.
    pub fn build(
        &self,
        profile: Profile,
        source: DocumentSource,
        settings: &IndexSettings,
        progress: Option<&ProgressFn>,
        cancel: &CancelToken,
    ) -> Result<Box<dyn SearchIndex>> {
        settings.bm25.validate()?;
        let batch = self.invert(source, &settings.analyzer, progress, cancel)?;
        let started = Instant::now();
        let index = build_index(profile, batch, settings.bm25, &self.pool, cancel)?;
        info!(
            "Built {profile} index of {} documents in {:?}",
            index.count(),
            started.elapsed()
        );
        Ok(index)
    }

    pub fn build_from_documents(
        &self,
        profile: Profile,
        documents: Vec<Document>,
        settings: &IndexSettings,
    ) -> Result<Box<dyn SearchIndex>> {
        self.build(
            profile,
            data::from_documents(documents),
            settings,
            None,
            &CancelToken::new(),
        )
    }
}

fn merge_in_order(
    parts: Receiver<(u64, InvertedBatch)>,
    analyzer: AnalyzerConfig,
) -> Result<InvertedBatch> {
    let mut merged = InvertedBatch::new(analyzer);
    let mut pending = BTreeMap::new();
    let mut next = 0u64;

    for (seq, part) in parts.iter() {
        pending.insert(seq, part);
        while let Some(part) = pending.remove(&next) {
            merged.append(part)?;
            next += 1;
        }
    }
    Ok(merged)
}
