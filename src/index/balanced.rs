//! Balanced profile: block-compressed postings with Block-Max WAND.
//!
//! Each posting list is cut into blocks of [`BLOCK_SIZE`] postings. Doc ids
//! are VByte gaps from the previous block's last doc, frequencies plain VByte.
//! Per block the index keeps the last doc id, the byte offsets of both
//! streams and the largest BM25 contribution of any posting in the block.
//!
//! ```text
//! blocks  : [last=212 | off 0 | max 1.9] [last=530 | off 131 | max 2.4] ...
//! docs    : |<- 128 gaps ->|<- 128 gaps ->| ...
//! freqs   : |<- 128 tfs  ->|<- 128 tfs  ->| ...
//! ```
//!
//! Conjunctive queries walk the shortest required list and skip every doc
//! range whose summed block maxima cannot beat the collector threshold,
//! without decoding the blocks involved. Disjunctive queries use WAND
//! pivoting on list maxima plus the same block-max check at the pivot.
//!
//! Because of that pruning `total` counts the documents actually evaluated;
//! it equals the number of matches whenever no range was skipped. A request
//! for an empty page (`limit == 0`) never prunes, so it counts every match.

use std::fs;
use std::path::Path;

use rayon::ThreadPool;
use rayon::prelude::*;

use crate::codec::{TermDictionary, vbyte};
use crate::collector::TopKCollector;
use crate::data::Document;
use crate::error::{FtsError, Result};
use crate::index::phrase;
use crate::index::store::DocumentStore;
use crate::index::{
    IndexCore, IndexSettings, IndexStats, Profile, SearchIndex, TopHits, decode_as, save_index,
};
use crate::indexer::{InvertedBatch, ParallelIndexer};
use crate::query::Query;
use crate::scoring::{Bm25Scorer, idf};
use crate::util::binary::{BinaryReader, BinaryWriter};
use crate::util::cancel::CancelToken;

/// Postings per block.
pub const BLOCK_SIZE: usize = 128;

const END: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq)]
struct BlockMeta {
    last_doc: u32,
    doc_offset: u32,
    freq_offset: u32,
    max_score: f32,
}

#[derive(Debug)]
struct BlockPostings {
    doc_freq: u32,
    idf: f32,
    max_score: f32,
    blocks: Vec<BlockMeta>,
    doc_bytes: Vec<u8>,
    freq_bytes: Vec<u8>,
}

impl BlockPostings {
    fn encode(
        docs: &[u32],
        freqs: &[u32],
        idf: f32,
        scorer: &Bm25Scorer,
        doc_lens: &[u16],
    ) -> Result<Self> {
        let doc_freq = u32::try_from(docs.len())
            .map_err(|_| FtsError::index("posting list too long"))?;
        let mut blocks = Vec::with_capacity(docs.len().div_ceil(BLOCK_SIZE));
        let mut doc_bytes = Vec::with_capacity(docs.len());
        let mut freq_bytes = Vec::with_capacity(docs.len());
        let mut base = 0u32;
        let mut max_score = 0.0f32;

        for (doc_chunk, freq_chunk) in docs.chunks(BLOCK_SIZE).zip(freqs.chunks(BLOCK_SIZE)) {
            let doc_offset = doc_bytes.len() as u32;
            let freq_offset = freq_bytes.len() as u32;
            vbyte::encode_deltas(doc_chunk, base, &mut doc_bytes)?;
            vbyte::encode(freq_chunk, &mut freq_bytes);

            let block_max = doc_chunk
                .iter()
                .zip(freq_chunk)
                .map(|(&doc, &tf)| scorer.score(idf, tf, doc_lens[doc as usize]))
                .fold(0.0f32, f32::max);
            max_score = max_score.max(block_max);

            let last_doc = doc_chunk[doc_chunk.len() - 1];
            blocks.push(BlockMeta {
                last_doc,
                doc_offset,
                freq_offset,
                max_score: block_max,
            });
            base = last_doc;
        }

        Ok(BlockPostings {
            doc_freq,
            idf,
            max_score,
            blocks,
            doc_bytes,
            freq_bytes,
        })
    }

    fn block_len(&self, block: usize) -> usize {
        if block + 1 < self.blocks.len() {
            BLOCK_SIZE
        } else {
            self.doc_freq as usize - block * BLOCK_SIZE
        }
    }

    fn decode_block(&self, block: usize, docs: &mut Vec<u32>, freqs: &mut Vec<u32>) -> Result<()> {
        let meta = &self.blocks[block];
        let len = self.block_len(block);
        let base = if block == 0 {
            0
        } else {
            self.blocks[block - 1].last_doc
        };

        docs.clear();
        freqs.clear();
        let mut pos = meta.doc_offset as usize;
        vbyte::decode_deltas(&self.doc_bytes, &mut pos, len, base, docs)?;
        let mut pos = meta.freq_offset as usize;
        vbyte::decode(&self.freq_bytes, &mut pos, len, freqs)?;

        if docs.last() != Some(&meta.last_doc) {
            return Err(FtsError::corrupt(format!(
                "block {block} decodes to a different last doc than recorded"
            )));
        }
        Ok(())
    }

    fn size_bytes(&self) -> usize {
        self.doc_bytes.len() + self.freq_bytes.len() + self.blocks.len() * 16 + 12
    }

    fn write_to(&self, writer: &mut BinaryWriter) -> Result<()> {
        writer.write_u32(self.doc_freq)?;
        writer.write_f32(self.idf)?;
        writer.write_f32(self.max_score)?;
        writer.write_u64(self.blocks.len() as u64)?;
        for block in &self.blocks {
            writer.write_u32(block.last_doc)?;
            writer.write_u32(block.doc_offset)?;
            writer.write_u32(block.freq_offset)?;
            writer.write_f32(block.max_score)?;
        }
        writer.write_bytes(&self.doc_bytes)?;
        writer.write_bytes(&self.freq_bytes)?;
        Ok(())
    }

    fn read_from(reader: &mut BinaryReader<'_>, num_docs: u32) -> Result<Self> {
        let doc_freq = reader.read_u32()?;
        let idf = reader.read_f32()?;
        let max_score = reader.read_f32()?;
        let num_blocks = reader.read_u64()?;
        if doc_freq == 0 || doc_freq > num_docs || num_blocks != (doc_freq as u64).div_ceil(BLOCK_SIZE as u64)
        {
            return Err(FtsError::corrupt(format!(
                "posting list with {doc_freq} postings cannot have {num_blocks} blocks"
            )));
        }

        let mut blocks = Vec::with_capacity(num_blocks as usize);
        for _ in 0..num_blocks {
            blocks.push(BlockMeta {
                last_doc: reader.read_u32()?,
                doc_offset: reader.read_u32()?,
                freq_offset: reader.read_u32()?,
                max_score: reader.read_f32()?,
            });
        }
        let doc_bytes = reader.read_bytes()?.to_vec();
        let freq_bytes = reader.read_bytes()?.to_vec();

        let mut prev: Option<&BlockMeta> = None;
        for block in &blocks {
            let ordered = match prev {
                Some(p) => {
                    block.last_doc > p.last_doc
                        && block.doc_offset > p.doc_offset
                        && block.freq_offset > p.freq_offset
                }
                None => block.doc_offset == 0 && block.freq_offset == 0,
            };
            if !ordered
                || block.last_doc >= num_docs
                || block.doc_offset as usize >= doc_bytes.len()
                || block.freq_offset as usize >= freq_bytes.len()
                || !(block.max_score.is_finite() && block.max_score <= max_score)
            {
                return Err(FtsError::corrupt("inconsistent block metadata"));
            }
            prev = Some(block);
        }
        if !idf.is_finite() {
            return Err(FtsError::corrupt("posting list has invalid idf"));
        }

        Ok(BlockPostings {
            doc_freq,
            idf,
            max_score,
            blocks,
            doc_bytes,
            freq_bytes,
        })
    }
}

/// Forward-only iterator over one posting list.
///
/// Blocks are decoded lazily: a shallow move only changes the current block
/// so its metadata can be inspected without touching the compressed bytes.
struct Cursor<'a> {
    list: &'a BlockPostings,
    block: usize,
    decoded: bool,
    pos: usize,
    docs: Vec<u32>,
    freqs: Vec<u32>,
}

impl<'a> Cursor<'a> {
    fn new(list: &'a BlockPostings) -> Result<Self> {
        let mut cursor = Cursor {
            list,
            block: 0,
            decoded: false,
            pos: 0,
            docs: Vec::with_capacity(BLOCK_SIZE),
            freqs: Vec::with_capacity(BLOCK_SIZE),
        };
        cursor.ensure_decoded()?;
        Ok(cursor)
    }

    #[inline]
    fn exhausted(&self) -> bool {
        self.block >= self.list.blocks.len()
    }

    fn ensure_decoded(&mut self) -> Result<()> {
        if !self.decoded && !self.exhausted() {
            self.list
                .decode_block(self.block, &mut self.docs, &mut self.freqs)?;
            self.pos = 0;
            self.decoded = true;
        }
        Ok(())
    }

    /// Current doc id. Only valid after a decoding move.
    #[inline]
    fn doc(&self) -> u32 {
        if self.exhausted() {
            END
        } else {
            self.docs[self.pos]
        }
    }

    #[inline]
    fn freq(&self) -> u32 {
        self.freqs[self.pos]
    }

    fn next(&mut self) -> Result<()> {
        if self.exhausted() {
            return Ok(());
        }
        self.pos += 1;
        if self.pos >= self.docs.len() {
            self.block += 1;
            self.decoded = false;
            self.ensure_decoded()?;
        }
        Ok(())
    }

    /// Move the block pointer to the first block that may hold `target`.
    fn shallow(&mut self, target: u32) {
        while !self.exhausted() && self.list.blocks[self.block].last_doc < target {
            self.block += 1;
            self.decoded = false;
        }
    }

    /// Move to the first posting at or after `target`.
    fn seek(&mut self, target: u32) -> Result<()> {
        if self.exhausted() || (self.decoded && self.docs[self.pos] >= target) {
            return Ok(());
        }
        self.shallow(target);
        self.ensure_decoded()?;
        if !self.exhausted() {
            self.pos += self.docs[self.pos..].partition_point(|&d| d < target);
        }
        Ok(())
    }

    #[inline]
    fn block_max(&self) -> f32 {
        if self.exhausted() {
            0.0
        } else {
            self.list.blocks[self.block].max_score
        }
    }

    #[inline]
    fn block_last(&self) -> u32 {
        if self.exhausted() {
            END
        } else {
            self.list.blocks[self.block].last_doc
        }
    }

    #[inline]
    fn score(&self, scorer: &Bm25Scorer, doc_lens: &[u16]) -> f32 {
        scorer.score(self.list.idf, self.freq(), doc_lens[self.doc() as usize])
    }
}

#[derive(Debug)]
pub struct BalancedIndex {
    core: IndexCore,
    dictionary: TermDictionary,
    postings: Vec<BlockPostings>,
    documents: DocumentStore,
}

impl BalancedIndex {
    /// Build an index from in-memory documents with a default indexer.
    pub fn build(documents: Vec<Document>, settings: IndexSettings) -> Result<Self> {
        let indexer = ParallelIndexer::with_defaults()?;
        let batch = indexer.invert_documents(documents, &settings.analyzer)?;
        Self::from_batch(batch, settings, indexer.pool(), &CancelToken::new())
    }

    pub(crate) fn from_batch(
        batch: InvertedBatch,
        settings: IndexSettings,
        pool: &ThreadPool,
        cancel: &CancelToken,
    ) -> Result<Self> {
        let core = IndexCore::from_batch(&batch, settings);
        let num_docs = core.num_docs() as u64;
        let scorer = core.scorer();
        let InvertedBatch {
            documents,
            postings,
            ..
        } = batch;

        let mut entries: Vec<_> = postings.into_iter().collect();
        pool.install(|| entries.par_sort_unstable_by(|a, b| a.0.cmp(&b.0)));
        cancel.check()?;

        let doc_lens = core.doc_lens();
        let lists = pool.install(|| {
            entries
                .par_iter()
                .map(|(_, buf)| {
                    let idf = idf(num_docs, buf.docs.len() as u64);
                    BlockPostings::encode(&buf.docs, &buf.freqs, idf, &scorer, doc_lens)
                })
                .collect::<Result<Vec<_>>>()
        })?;
        cancel.check()?;

        let dictionary = TermDictionary::build(entries.iter().map(|(term, _)| term.as_bytes()))?;

        Ok(BalancedIndex {
            core,
            dictionary,
            postings: lists,
            documents: DocumentStore::plain(documents),
        })
    }

    pub fn num_terms(&self) -> usize {
        self.postings.len()
    }

    pub fn save(&self, path: &Path) -> Result<u64> {
        save_index(self, path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        decode_as(&fs::read(path)?, Profile::Balanced, Self::read_body)
    }

    pub(crate) fn read_body(core: IndexCore, reader: &mut BinaryReader<'_>) -> Result<Self> {
        let num_docs = core.num_docs();
        let documents = DocumentStore::read_from(reader, num_docs as usize)?;
        let dictionary = TermDictionary::from_bytes(reader.read_bytes()?.to_vec())?;
        let num_lists = reader.read_u64()?;
        if num_lists != dictionary.len() as u64
            || dictionary.max_id().is_some_and(|max| max >= num_lists)
        {
            return Err(FtsError::corrupt(format!(
                "dictionary of {} terms does not match {num_lists} posting lists",
                dictionary.len()
            )));
        }

        let mut postings = Vec::with_capacity(num_lists as usize);
        for _ in 0..num_lists {
            postings.push(BlockPostings::read_from(reader, num_docs)?);
        }

        Ok(BalancedIndex {
            core,
            dictionary,
            postings,
            documents,
        })
    }

    fn search_conjunctive<F>(
        &self,
        required: &mut [Cursor<'_>],
        optional: &mut [Cursor<'_>],
        collector: &mut TopKCollector,
        prune: bool,
        accept: &mut F,
    ) -> Result<u64>
    where
        F: FnMut(u32) -> Result<bool>,
    {
        let scorer = self.core.scorer();
        let doc_lens = self.core.doc_lens();
        let mut total = 0u64;
        let prune = prune && collector.capacity() > 0;
        required.sort_by_key(|c| c.list.doc_freq);

        'outer: loop {
            let doc = required[0].doc();
            if doc == END {
                break;
            }

            if prune && collector.is_full() {
                let threshold = collector.threshold();
                let mut upper = 0.0f32;
                let mut boundary = END;
                for cursor in required.iter_mut() {
                    cursor.shallow(doc);
                    if cursor.exhausted() {
                        break 'outer;
                    }
                    upper += cursor.block_max();
                    boundary = boundary.min(cursor.block_last());
                }
                for cursor in optional.iter_mut() {
                    cursor.shallow(doc);
                    upper += cursor.block_max();
                    boundary = boundary.min(cursor.block_last());
                }
                if upper <= threshold {
                    required[0].seek(boundary.saturating_add(1))?;
                    continue;
                }
            }

            for i in 1..required.len() {
                required[i].seek(doc)?;
                let other = required[i].doc();
                if other == END {
                    break 'outer;
                }
                if other > doc {
                    required[0].seek(other)?;
                    continue 'outer;
                }
            }

            let mut score = 0.0f32;
            for cursor in required.iter() {
                score += cursor.score(&scorer, doc_lens);
            }
            for cursor in optional.iter_mut() {
                cursor.seek(doc)?;
                if cursor.doc() == doc {
                    score += cursor.score(&scorer, doc_lens);
                }
            }

            if accept(doc)? {
                total += 1;
                collector.push(doc, score);
            }
            required[0].next()?;
        }
        Ok(total)
    }

    fn search_disjunctive<F>(
        &self,
        mut cursors: Vec<Cursor<'_>>,
        collector: &mut TopKCollector,
        prune: bool,
        accept: &mut F,
    ) -> Result<u64>
    where
        F: FnMut(u32) -> Result<bool>,
    {
        let scorer = self.core.scorer();
        let doc_lens = self.core.doc_lens();
        let mut total = 0u64;
        let prune = prune && collector.capacity() > 0;

        loop {
            cursors.retain(|c| !c.exhausted());
            if cursors.is_empty() {
                break;
            }
            cursors.sort_by_key(|c| c.doc());

            let threshold = if prune {
                collector.threshold()
            } else {
                f32::NEG_INFINITY
            };
            let mut acc = 0.0f32;
            let mut pivot = None;
            for (i, cursor) in cursors.iter().enumerate() {
                acc += cursor.list.max_score;
                if acc > threshold {
                    pivot = Some(i);
                    break;
                }
            }
            let Some(pivot) = pivot else {
                break;
            };
            let pivot_doc = cursors[pivot].doc();

            if cursors[0].doc() != pivot_doc {
                for cursor in cursors[..pivot].iter_mut() {
                    cursor.seek(pivot_doc)?;
                }
                continue;
            }

            let matching = cursors.iter().take_while(|c| c.doc() == pivot_doc).count();
            let upper: f32 = cursors[..matching].iter().map(|c| c.block_max()).sum();
            if !(prune && collector.is_full()) || upper > threshold {
                let mut score = 0.0f32;
                for cursor in &cursors[..matching] {
                    score += cursor.score(&scorer, doc_lens);
                }
                if accept(pivot_doc)? {
                    total += 1;
                    collector.push(pivot_doc, score);
                }
            }
            for cursor in cursors[..matching].iter_mut() {
                cursor.next()?;
            }
        }
        Ok(total)
    }
}

impl SearchIndex for BalancedIndex {
    fn profile(&self) -> Profile {
        Profile::Balanced
    }

    fn core(&self) -> &IndexCore {
        &self.core
    }

    fn search_query(&self, query: &Query, limit: usize, offset: usize) -> Result<TopHits> {
        if query.is_empty() || self.core.num_docs() == 0 {
            return Ok(TopHits::default());
        }

        let mut required = Vec::new();
        let mut optional = Vec::new();
        for term in query.unique_terms() {
            match self.dictionary.get(&term.text) {
                Some(id) => {
                    let list = self
                        .postings
                        .get(id as usize)
                        .ok_or_else(|| FtsError::corrupt(format!("term id {id} out of range")))?;
                    let cursor = Cursor::new(list)?;
                    if term.required {
                        required.push(cursor);
                    } else {
                        optional.push(cursor);
                    }
                }
                None if term.required => return Ok(TopHits::default()),
                None => {}
            }
        }

        let mut collector = TopKCollector::new(offset.saturating_add(limit));
        // An empty page still counts every match.
        let prune = limit > 0;
        let mut accept = phrase::acceptor(query, self.core.analyzer(), &self.documents);
        let total = if !required.is_empty() {
            self.search_conjunctive(&mut required, &mut optional, &mut collector, prune, &mut accept)?
        } else if !optional.is_empty() {
            self.search_disjunctive(optional, &mut collector, prune, &mut accept)?
        } else {
            0
        };
        Ok(TopHits::page(collector, total, offset, limit))
    }

    fn document(&self, doc: u32) -> Result<Document> {
        self.documents.get(doc)
    }

    fn stats(&self) -> IndexStats {
        IndexStats {
            profile: Profile::Balanced,
            num_docs: self.core.num_docs() as u64,
            num_terms: self.postings.len() as u64,
            avg_doc_len: self.core.avg_doc_len(),
            postings_bytes: self.postings.iter().map(|p| p.size_bytes() as u64).sum(),
            dictionary_bytes: self.dictionary.as_bytes().len() as u64,
            documents_bytes: self.documents.size_bytes(),
        }
    }

    fn write_body(&self, writer: &mut BinaryWriter) -> Result<()> {
        self.documents.write_to(writer)?;
        writer.write_bytes(self.dictionary.as_bytes())?;
        writer.write_u64(self.postings.len() as u64)?;
        for list in &self.postings {
            list.write_to(writer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::index::SpeedIndex;

    const WORDS: [&str; 8] = ["alpha", "bravo", "charlie", "delta", "echo", "foxtrot", "golf", "hotel"];

    fn corpus(n: usize, seed: u64) -> Vec<Document> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|i| {
                let len = rng.random_range(1..30);
                let words: Vec<&str> = (0..len)
                    .map(|_| {
                        // Skewed so early words are frequent.
                        let idx = rng.random_range(0..WORDS.len()).min(rng.random_range(0..WORDS.len()));
                        WORDS[idx]
                    })
                    .collect();
                Document::new(i.to_string(), words.join(" "))
            })
            .collect()
    }

    #[test]
    fn test_block_roundtrip() {
        let docs: Vec<u32> = (0..1000).map(|i| i * 3).collect();
        let freqs: Vec<u32> = (0..1000).map(|i| i % 5 + 1).collect();
        let doc_lens = vec![10u16; 3000];
        let scorer = Bm25Scorer::new(Default::default(), 10.0);
        let list = BlockPostings::encode(&docs, &freqs, 1.5, &scorer, &doc_lens).unwrap();
        assert_eq!(list.blocks.len(), 8);
        assert_eq!(list.block_len(7), 1000 - 7 * BLOCK_SIZE);

        let mut cursor = Cursor::new(&list).unwrap();
        let mut seen = Vec::new();
        while cursor.doc() != END {
            seen.push((cursor.doc(), cursor.freq()));
            cursor.next().unwrap();
        }
        let expected: Vec<(u32, u32)> = docs.iter().copied().zip(freqs.iter().copied()).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_cursor_seek_and_shallow() {
        let docs: Vec<u32> = (0..600).map(|i| i * 2).collect();
        let freqs = vec![1u32; 600];
        let doc_lens = vec![5u16; 1200];
        let scorer = Bm25Scorer::new(Default::default(), 5.0);
        let list = BlockPostings::encode(&docs, &freqs, 1.0, &scorer, &doc_lens).unwrap();

        let mut cursor = Cursor::new(&list).unwrap();
        cursor.seek(501).unwrap();
        assert_eq!(cursor.doc(), 502);
        cursor.shallow(900);
        assert_eq!(cursor.block_last(), docs[4 * BLOCK_SIZE - 1]);
        cursor.seek(901).unwrap();
        assert_eq!(cursor.doc(), 902);
        cursor.seek(5_000).unwrap();
        assert_eq!(cursor.doc(), END);
    }

    #[test]
    fn test_matches_exhaustive_ranking() {
        let docs = corpus(2_000, 5);
        let speed = SpeedIndex::build(docs.clone(), IndexSettings::default()).unwrap();
        let balanced = BalancedIndex::build(docs, IndexSettings::default()).unwrap();

        // Summation order differs between the two traversals.
        let assert_close = |got: &TopHits, expected: &TopHits| {
            assert_eq!(got.hits.len(), expected.hits.len());
            for (g, e) in got.hits.iter().zip(&expected.hits) {
                assert!((g.score - e.score).abs() < 1e-4, "{} vs {}", g.score, e.score);
            }
            assert!(got.total <= expected.total);
        };

        for q in ["alpha", "alpha bravo", "golf hotel", "charlie delta echo", "hotel"] {
            assert_close(&balanced.search(q, 10, 0).unwrap(), &speed.search(q, 10, 0).unwrap());
        }

        let query = Query::builder().optional("golf").optional("hotel").optional("alpha").build();
        assert_close(
            &balanced.search_query(&query, 5, 0).unwrap(),
            &speed.search_query(&query, 5, 0).unwrap(),
        );
    }

    #[test]
    fn test_exact_total_without_pruning() {
        let docs = corpus(300, 9);
        let speed = SpeedIndex::build(docs.clone(), IndexSettings::default()).unwrap();
        let balanced = BalancedIndex::build(docs, IndexSettings::default()).unwrap();
        let expected = speed.search("alpha bravo", 1_000, 0).unwrap();
        let got = balanced.search("alpha bravo", 1_000, 0).unwrap();
        assert_eq!(got.total, expected.total);
        assert_eq!(got.hits.len(), expected.hits.len());
    }

    #[test]
    fn test_empty_page_counts_every_match() {
        let docs: Vec<Document> = (0..5_000)
            .map(|i| Document::new(i.to_string(), format!("alpha {}", "bravo ".repeat(i % 7))))
            .collect();
        let speed = SpeedIndex::build(docs.clone(), IndexSettings::default()).unwrap();
        let balanced = BalancedIndex::build(docs, IndexSettings::default()).unwrap();
        let expected = speed.search("alpha", 0, 0).unwrap().total;
        assert_eq!(expected, 5_000);

        for (limit, offset) in [(0, 0), (0, 5), (0, 10)] {
            let got = balanced.search("alpha", limit, offset).unwrap();
            assert!(got.hits.is_empty());
            assert_eq!(got.total, expected, "limit={limit} offset={offset}");
        }
        let query = Query::builder().optional("alpha").optional("bravo").build();
        let got = balanced.search_query(&query, 0, 10).unwrap();
        assert_eq!(got.total, speed.search_query(&query, 0, 10).unwrap().total);
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("balanced.bin");
        let index = BalancedIndex::build(corpus(500, 1), IndexSettings::default()).unwrap();
        index.save(&path).unwrap();

        let loaded = BalancedIndex::load(&path).unwrap();
        assert_eq!(loaded.num_terms(), index.num_terms());
        for q in ["alpha", "echo foxtrot", "\"alpha alpha\""] {
            assert_eq!(loaded.search(q, 10, 0).unwrap(), index.search(q, 10, 0).unwrap());
        }
        assert!(SpeedIndex::load(&path).is_err());
    }
}
