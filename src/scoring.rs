//! BM25 scoring.
//!
//! ```text
//! idf   = ln((N - df + 0.5) / (df + 0.5) + 1)
//! norm  = 1 - b + b * dl / avg_dl
//! score = idf * tf / (tf + k1 * norm)
//! ```
//!
//! The numerator carries no `(k1 + 1)` factor. Rankings are unaffected by it,
//! but absolute scores produced here are not comparable with engines that
//! include it.

use serde::{Deserialize, Serialize};

use crate::error::{FtsError, Result};
use crate::util::simd::numeric;

/// BM25 parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    /// Term frequency saturation.
    pub k1: f32,
    /// Length normalization strength, between 0 and 1.
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Bm25Params { k1: 1.2, b: 0.75 }
    }
}

impl Bm25Params {
    pub fn validate(&self) -> Result<()> {
        if !self.k1.is_finite() || self.k1 < 0.0 {
            return Err(FtsError::invalid_config(format!(
                "k1 must be a non-negative number, got {}",
                self.k1
            )));
        }
        if !(0.0..=1.0).contains(&self.b) {
            return Err(FtsError::invalid_config(format!(
                "b must be within [0, 1], got {}",
                self.b
            )));
        }
        Ok(())
    }
}

/// Inverse document frequency of a term found in `doc_freq` of `num_docs` documents.
pub fn idf(num_docs: u64, doc_freq: u64) -> f32 {
    let n = num_docs as f64;
    let df = doc_freq as f64;
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln() as f32
}

/// Scores postings against the statistics of one index.
#[derive(Debug, Clone, Copy)]
pub struct Bm25Scorer {
    params: Bm25Params,
    avg_doc_len: f32,
}

impl Bm25Scorer {
    pub fn new(params: Bm25Params, avg_doc_len: f64) -> Self {
        // An index of empty documents has no postings to score.
        let avg_doc_len = if avg_doc_len > 0.0 { avg_doc_len as f32 } else { 1.0 };
        Bm25Scorer {
            params,
            avg_doc_len,
        }
    }

    pub fn params(&self) -> Bm25Params {
        self.params
    }

    pub fn avg_doc_len(&self) -> f32 {
        self.avg_doc_len
    }

    /// Contribution of one term to one document.
    #[inline]
    pub fn score(&self, idf: f32, tf: u32, doc_len: u16) -> f32 {
        let Bm25Params { k1, b } = self.params;
        let tf = tf as f32;
        let norm = (1.0 - b) + b * (doc_len as f32 / self.avg_doc_len);
        idf * tf / (tf + k1 * norm)
    }

    /// Score a run of postings of one term, appending one score per posting.
    ///
    /// `docs` and `freqs` are parallel; `doc_lens` is indexed by doc id.
    pub fn score_postings(
        &self,
        idf: f32,
        docs: &[u32],
        freqs: &[u32],
        doc_lens: &[u16],
        out: &mut Vec<f32>,
    ) {
        let tfs: Vec<f32> = freqs.iter().map(|&tf| tf as f32).collect();
        let dls: Vec<f32> = docs
            .iter()
            .map(|&doc| doc_lens.get(doc as usize).copied().unwrap_or(0) as f32)
            .collect();
        numeric::batch_bm25(
            idf,
            self.params.k1,
            self.params.b,
            self.avg_doc_len,
            &tfs,
            &dls,
            out,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idf_monotonic_in_df() {
        for &n in &[1u64, 10, 1_000, 1_000_000] {
            let mut prev = f32::INFINITY;
            for df in 1..=n.min(2_000) {
                let value = idf(n, df);
                assert!(value <= prev, "idf({n}, {df}) = {value} > {prev}");
                assert!(value > 0.0);
                prev = value;
            }
        }
    }

    #[test]
    fn test_score_monotonic_in_tf() {
        let scorer = Bm25Scorer::new(Bm25Params::default(), 42.0);
        let w = idf(1_000, 17);
        for &dl in &[1u16, 10, 42, 500, u16::MAX] {
            let mut prev = 0.0f32;
            for tf in 1..200 {
                let s = scorer.score(w, tf, dl);
                assert!(s >= prev);
                prev = s;
            }
        }
    }

    #[test]
    fn test_shorter_documents_score_higher() {
        let scorer = Bm25Scorer::new(Bm25Params::default(), 3.0);
        let w = idf(3, 2);
        assert!(scorer.score(w, 1, 3) > scorer.score(w, 1, 4));
    }

    #[test]
    fn test_batch_matches_scalar() {
        let scorer = Bm25Scorer::new(Bm25Params { k1: 0.9, b: 0.4 }, 57.25);
        let doc_lens: Vec<u16> = (0..100).map(|i| (i * 13 % 97 + 1) as u16).collect();
        let docs: Vec<u32> = (0..100).step_by(3).collect();
        let freqs: Vec<u32> = docs.iter().map(|d| d % 7 + 1).collect();
        let w = idf(100, docs.len() as u64);

        let mut batch = Vec::new();
        scorer.score_postings(w, &docs, &freqs, &doc_lens, &mut batch);

        assert_eq!(batch.len(), docs.len());
        for (i, &doc) in docs.iter().enumerate() {
            let scalar = scorer.score(w, freqs[i], doc_lens[doc as usize]);
            assert!((batch[i] - scalar).abs() <= 1e-5 * scalar.abs().max(1.0));
        }
    }

    #[test]
    fn test_param_validation() {
        assert!(Bm25Params::default().validate().is_ok());
        assert!(Bm25Params { k1: -1.0, b: 0.5 }.validate().is_err());
        assert!(Bm25Params { k1: 1.0, b: 1.5 }.validate().is_err());
    }
}
