//! Bounded top-K selection.
//!
//! [`TopKCollector`] keeps the `K` best `(doc, score)` pairs in an array-backed
//! binary min-heap whose root is the weakest retained hit. Once the heap is
//! full the root score is the pruning threshold: a candidate that cannot score
//! strictly above it can be skipped without being scored.
//!
//! Ties: among equal scores the lower doc id ranks first, and a full heap
//! never replaces its root with a candidate of equal score. When candidates
//! arrive in increasing doc id order this keeps the lowest doc ids among tied
//! hits.

use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredDoc {
    pub doc: u32,
    pub score: f32,
}

impl ScoredDoc {
    /// Ranking order: higher score first, then lower doc id.
    pub fn rank_cmp(&self, other: &ScoredDoc) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.doc.cmp(&other.doc))
    }
}

/// `a` ranks below `b`.
#[inline]
fn weaker(a: &ScoredDoc, b: &ScoredDoc) -> bool {
    a.score < b.score || (a.score == b.score && a.doc > b.doc)
}

#[derive(Debug, Clone)]
pub struct TopKCollector {
    k: usize,
    heap: Vec<ScoredDoc>,
    pushed: u64,
}

impl TopKCollector {
    pub fn new(k: usize) -> Self {
        TopKCollector {
            k,
            heap: Vec::with_capacity(k.min(4096)),
            pushed: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.k
    }

    /// Number of candidates offered so far, retained or not.
    pub fn total(&self) -> u64 {
        self.pushed
    }

    /// Score of the weakest retained hit.
    pub fn min_score(&self) -> Option<f32> {
        self.heap.first().map(|d| d.score)
    }

    /// Score a candidate must strictly exceed to enter the heap.
    #[inline]
    pub fn threshold(&self) -> f32 {
        if self.is_full() {
            self.heap.first().map_or(f32::INFINITY, |d| d.score)
        } else {
            f32::NEG_INFINITY
        }
    }

    /// Offer a candidate. Returns whether it was retained.
    pub fn push(&mut self, doc: u32, score: f32) -> bool {
        self.pushed += 1;
        if self.k == 0 {
            return false;
        }

        let entry = ScoredDoc { doc, score };
        if self.heap.len() < self.k {
            self.heap.push(entry);
            self.sift_up(self.heap.len() - 1);
            return true;
        }

        if score > self.heap[0].score {
            self.heap[0] = entry;
            self.sift_down(0);
            return true;
        }
        false
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if weaker(&self.heap[idx], &self.heap[parent]) {
                self.heap.swap(idx, parent);
                idx = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * idx + 1;
            let right = left + 1;
            let mut smallest = idx;

            if left < len && weaker(&self.heap[left], &self.heap[smallest]) {
                smallest = left;
            }
            if right < len && weaker(&self.heap[right], &self.heap[smallest]) {
                smallest = right;
            }
            if smallest == idx {
                break;
            }
            self.heap.swap(idx, smallest);
            idx = smallest;
        }
    }

    /// Retained hits in ranking order, without consuming the collector.
    pub fn results(&self) -> Vec<ScoredDoc> {
        let mut out = self.heap.clone();
        out.sort_by(ScoredDoc::rank_cmp);
        out
    }

    /// Retained hits in ranking order, sorting the backing array in place.
    pub fn into_results(self) -> Vec<ScoredDoc> {
        let mut out = self.heap;
        out.sort_by(ScoredDoc::rank_cmp);
        out
    }
}
