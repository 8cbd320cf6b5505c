//! # fineweb-fts
//!
//! Full-text indexing and BM25 ranking engines built to compare space and
//! latency tradeoffs on large web corpora.
//!
//! ## Features
//!
//! - Unicode-aware analysis with optional stemming and accent folding
//! - Three in-process index profiles: `Speed`, `Balanced` (block-max WAND)
//!   and `Compact` (Elias-Fano, StreamVByte and an FST dictionary)
//! - Parallel indexing with ordered merge, progress and cancellation
//! - Versioned, checksummed on-disk format
//! - A uniform [`Driver`] contract with a process-wide registry, including
//!   adapters for Manticore, MeiliSearch and PostgreSQL (`external` feature)

pub mod analysis;
pub mod codec;
pub mod collector;
pub mod data;
pub mod driver;
pub mod error;
pub mod index;
pub mod indexer;
pub mod query;
pub mod scoring;
pub mod util;

pub use analysis::{Analyzer, AnalyzerConfig};
pub use collector::{ScoredDoc, TopKCollector};
pub use data::{Document, DocumentSource};
pub use driver::{Driver, DriverConfig, DriverInfo, DriverStats, SearchResult, compare_results};
pub use error::{ErrorKind, FtsError, Result};
pub use index::{IndexSettings, IndexStats, Profile, SearchIndex, TopHits, load_index, save_index};
pub use indexer::{IndexerConfig, ParallelIndexer, ProgressFn};
pub use query::{Query, QueryParser};
pub use scoring::{Bm25Params, Bm25Scorer};
pub use util::cancel::CancelToken;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
