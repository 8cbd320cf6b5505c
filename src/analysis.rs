//! Text analysis shared by index construction and query parsing.
//!
//! Both sides of a search run text through the same [`Analyzer`], so a query
//! term matches exactly the terms produced when the corpus was indexed.
//!
//! ```text
//! Text → word segmentation → lowercase → (accent folding) → length filter → (stemming) → terms
//! ```

pub mod analyzer;
pub mod language;

pub use analyzer::{Analyzer, AnalyzerConfig, TermFrequencies};
