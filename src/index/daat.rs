//! Document-at-a-time merging of fully scored posting lists.
//!
//! Used by the profiles that materialize a whole posting list per query term
//! (speed and compact). Each list arrives with one precomputed BM25
//! contribution per posting. Required lists are intersected, driven by the
//! shortest one; optional lists add their contribution wherever they match.
//! With no required list the optional lists are unioned.

use std::borrow::Cow;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::collector::TopKCollector;
use crate::error::Result;

#[derive(Debug)]
pub(crate) struct ScoredList<'a> {
    pub docs: Cow<'a, [u32]>,
    pub scores: Vec<f32>,
    pub required: bool,
}

/// Move `pos` to the first posting of `docs` at or after `target`.
#[inline]
fn seek(docs: &[u32], pos: &mut usize, target: u32) {
    if *pos < docs.len() && docs[*pos] < target {
        *pos += docs[*pos..].partition_point(|&d| d < target);
    }
}

/// Merge `lists` into `collector`.
///
/// `accept` is consulted for every matching document before it is counted
/// (used for phrase verification). Returns the number of accepted matches.
pub(crate) fn collect<F>(
    lists: &[ScoredList<'_>],
    collector: &mut TopKCollector,
    mut accept: F,
) -> Result<u64>
where
    F: FnMut(u32) -> Result<bool>,
{
    let mut required: Vec<&ScoredList<'_>> = lists.iter().filter(|l| l.required).collect();
    let optional: Vec<&ScoredList<'_>> = lists.iter().filter(|l| !l.required).collect();
    let mut total = 0u64;

    if !required.is_empty() {
        required.sort_by_key(|l| l.docs.len());
        let (lead, rest) = (required[0], &required[1..]);
        let mut rest_pos = vec![0usize; rest.len()];
        let mut opt_pos = vec![0usize; optional.len()];

        'lead: for (i, &doc) in lead.docs.iter().enumerate() {
            let mut score = lead.scores[i];
            for (list, pos) in rest.iter().zip(rest_pos.iter_mut()) {
                seek(&list.docs, pos, doc);
                match list.docs.get(*pos) {
                    Some(&d) if d == doc => score += list.scores[*pos],
                    Some(_) => continue 'lead,
                    None => break 'lead,
                }
            }
            for (list, pos) in optional.iter().zip(opt_pos.iter_mut()) {
                seek(&list.docs, pos, doc);
                if list.docs.get(*pos) == Some(&doc) {
                    score += list.scores[*pos];
                }
            }
            if accept(doc)? {
                total += 1;
                collector.push(doc, score);
            }
        }
        return Ok(total);
    }

    let mut heap: BinaryHeap<Reverse<(u32, usize)>> = BinaryHeap::with_capacity(optional.len());
    let mut positions = vec![0usize; optional.len()];
    for (idx, list) in optional.iter().enumerate() {
        if let Some(&doc) = list.docs.first() {
            heap.push(Reverse((doc, idx)));
        }
    }

    while let Some(Reverse((doc, idx))) = heap.pop() {
        let mut score = optional[idx].scores[positions[idx]];
        advance(&optional, &mut positions, &mut heap, idx);

        while let Some(&Reverse((next_doc, next_idx))) = heap.peek() {
            if next_doc != doc {
                break;
            }
            heap.pop();
            score += optional[next_idx].scores[positions[next_idx]];
            advance(&optional, &mut positions, &mut heap, next_idx);
        }

        if accept(doc)? {
            total += 1;
            collector.push(doc, score);
        }
    }
    Ok(total)
}

fn advance(
    lists: &[&ScoredList<'_>],
    positions: &mut [usize],
    heap: &mut BinaryHeap<Reverse<(u32, usize)>>,
    idx: usize,
) {
    positions[idx] += 1;
    if let Some(&doc) = lists[idx].docs.get(positions[idx]) {
        heap.push(Reverse((doc, idx)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(docs: &[u32], required: bool) -> ScoredList<'static> {
        ScoredList {
            docs: Cow::Owned(docs.to_vec()),
            scores: docs.iter().map(|&d| d as f32 / 10.0 + 1.0).collect(),
            required,
        }
    }

    fn run(lists: &[ScoredList<'_>]) -> (Vec<(u32, f32)>, u64) {
        let mut collector = TopKCollector::new(100);
        let total = collect(lists, &mut collector, |_| Ok(true)).unwrap();
        let mut hits: Vec<(u32, f32)> = collector
            .into_results()
            .iter()
            .map(|h| (h.doc, h.score))
            .collect();
        hits.sort_by_key(|h| h.0);
        (hits, total)
    }

    #[test]
    fn test_intersection() {
        let (hits, total) = run(&[list(&[1, 3, 5, 7], true), list(&[3, 4, 7, 9], true)]);
        assert_eq!(total, 2);
        assert_eq!(hits.iter().map(|h| h.0).collect::<Vec<_>>(), vec![3, 7]);
        assert!((hits[0].1 - 2.6).abs() < 1e-6);
    }

    #[test]
    fn test_optional_adds_score_only() {
        let (hits, total) = run(&[list(&[2, 4], true), list(&[4, 8], false)]);
        assert_eq!(total, 2);
        assert!((hits[0].1 - 1.2).abs() < 1e-6);
        assert!((hits[1].1 - 2.8).abs() < 1e-6);
    }

    #[test]
    fn test_union_of_optional() {
        let (hits, total) = run(&[list(&[1, 5], false), list(&[5, 6], false), list(&[], false)]);
        assert_eq!(total, 3);
        assert_eq!(hits.iter().map(|h| h.0).collect::<Vec<_>>(), vec![1, 5, 6]);
        assert!((hits[1].1 - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_accept_filters_matches() {
        let mut collector = TopKCollector::new(10);
        let lists = [list(&[1, 2, 3], true)];
        let total = collect(&lists, &mut collector, |doc| Ok(doc != 2)).unwrap();
        assert_eq!(total, 2);
        assert_eq!(collector.len(), 2);
    }
}
