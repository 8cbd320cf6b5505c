//! Speed profile: uncompressed posting arrays behind a hash table.
//!
//! Each posting list is a pair of parallel `u32` arrays (doc ids and term
//! frequencies). Terms are found through a table keyed by the 64-bit query
//! term hash; the rare colliding terms share a bucket and are told apart by
//! their text. Search scores whole lists with the batched scorer and merges
//! them document-at-a-time.

use std::borrow::Cow;
use std::fs;
use std::path::Path;

use ahash::AHashMap;
use rayon::ThreadPool;
use rayon::prelude::*;

use crate::collector::TopKCollector;
use crate::data::Document;
use crate::error::{FtsError, Result};
use crate::index::daat::{self, ScoredList};
use crate::index::phrase;
use crate::index::store::DocumentStore;
use crate::index::{
    IndexCore, IndexSettings, IndexStats, Profile, SearchIndex, TopHits, decode_as, save_index,
};
use crate::indexer::{InvertedBatch, ParallelIndexer};
use crate::query::{Query, QueryTerm, term_hash};
use crate::scoring::idf;
use crate::util::binary::{BinaryReader, BinaryWriter};
use crate::util::cancel::CancelToken;

#[derive(Debug)]
struct SpeedPostings {
    docs: Vec<u32>,
    freqs: Vec<u32>,
    idf: f32,
}

#[derive(Debug)]
pub struct SpeedIndex {
    core: IndexCore,
    terms: Vec<String>,
    buckets: AHashMap<u64, Vec<u32>>,
    postings: Vec<SpeedPostings>,
    documents: DocumentStore,
}

fn hash_buckets(terms: &[String]) -> AHashMap<u64, Vec<u32>> {
    let mut buckets: AHashMap<u64, Vec<u32>> = AHashMap::with_capacity(terms.len());
    for (id, term) in terms.iter().enumerate() {
        buckets.entry(term_hash(term)).or_default().push(id as u32);
    }
    buckets
}

impl SpeedIndex {
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
        let InvertedBatch {
            documents,
            postings,
            ..
        } = batch;

        let mut entries: Vec<_> = postings.into_iter().collect();
        pool.install(|| entries.par_sort_unstable_by(|a, b| a.0.cmp(&b.0)));
        cancel.check()?;

        let (terms, postings): (Vec<String>, Vec<SpeedPostings>) = pool.install(|| {
            entries
                .into_par_iter()
                .map(|(term, buf)| {
                    let idf = idf(num_docs, buf.docs.len() as u64);
                    let list = SpeedPostings {
                        docs: buf.docs,
                        freqs: buf.freqs,
                        idf,
                    };
                    (term, list)
                })
                .unzip()
        });
        cancel.check()?;

        Ok(SpeedIndex {
            buckets: hash_buckets(&terms),
            core,
            terms,
            postings,
            documents: DocumentStore::plain(documents),
        })
    }

    fn term_id(&self, term: &QueryTerm) -> Option<usize> {
        self.buckets.get(&term.hash).and_then(|ids| {
            ids.iter()
                .map(|&id| id as usize)
                .find(|&id| self.terms[id] == term.text)
        })
    }

    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }

    pub fn save(&self, path: &Path) -> Result<u64> {
        save_index(self, path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        decode_as(&fs::read(path)?, Profile::Speed, Self::read_body)
    }

    pub(crate) fn read_body(core: IndexCore, reader: &mut BinaryReader<'_>) -> Result<Self> {
        let num_docs = core.num_docs();
        let documents = DocumentStore::read_from(reader, num_docs as usize)?;

        let num_terms = reader.read_u64()?;
        let mut terms: Vec<String> = Vec::new();
        let mut postings = Vec::new();
        for _ in 0..num_terms {
            let term = reader.read_string()?;
            if terms.last().is_some_and(|prev| *prev >= term) {
                return Err(FtsError::corrupt(format!("term '{term}' out of order")));
            }
            let idf = reader.read_f32()?;
            let docs = reader.read_u32_vec()?;
            let freqs = reader.read_u32_vec()?;
            validate_postings(&term, &docs, &freqs, num_docs)?;
            if !idf.is_finite() {
                return Err(FtsError::corrupt(format!("term '{term}' has invalid idf")));
            }
            terms.push(term);
            postings.push(SpeedPostings { docs, freqs, idf });
        }

        Ok(SpeedIndex {
            buckets: hash_buckets(&terms),
            core,
            terms,
            postings,
            documents,
        })
    }
}

/// Reject posting lists that are empty, unsorted, misaligned or point past
/// the last document.
pub(crate) fn validate_postings(term: &str, docs: &[u32], freqs: &[u32], num_docs: u32) -> Result<()> {
    if docs.is_empty() || docs.len() != freqs.len() {
        return Err(FtsError::corrupt(format!(
            "term '{term}' has {} doc ids and {} frequencies",
            docs.len(),
            freqs.len()
        )));
    }
    if docs.windows(2).any(|w| w[0] >= w[1]) || docs.last().is_some_and(|&d| d >= num_docs) {
        return Err(FtsError::corrupt(format!("term '{term}' has invalid doc ids")));
    }
    if freqs.contains(&0) {
        return Err(FtsError::corrupt(format!("term '{term}' has a zero frequency")));
    }
    Ok(())
}

impl SearchIndex for SpeedIndex {
    fn profile(&self) -> Profile {
        Profile::Speed
    }

    fn core(&self) -> &IndexCore {
        &self.core
    }

    fn search_query(&self, query: &Query, limit: usize, offset: usize) -> Result<TopHits> {
        if query.is_empty() || self.core.num_docs() == 0 {
            return Ok(TopHits::default());
        }

        let scorer = self.core.scorer();
        let mut lists = Vec::new();
        for term in query.unique_terms() {
            match self.term_id(&term) {
                Some(id) => {
                    let list = &self.postings[id];
                    let mut scores = Vec::with_capacity(list.docs.len());
                    scorer.score_postings(
                        list.idf,
                        &list.docs,
                        &list.freqs,
                        self.core.doc_lens(),
                        &mut scores,
                    );
                    lists.push(ScoredList {
                        docs: Cow::Borrowed(&list.docs),
                        scores,
                        required: term.required,
                    });
                }
                None if term.required => return Ok(TopHits::default()),
                None => {}
            }
        }
        if lists.is_empty() {
            return Ok(TopHits::default());
        }

        let mut collector = TopKCollector::new(offset.saturating_add(limit));
        let accept = phrase::acceptor(query, self.core.analyzer(), &self.documents);
        let total = daat::collect(&lists, &mut collector, accept)?;
        Ok(TopHits::page(collector, total, offset, limit))
    }

    fn document(&self, doc: u32) -> Result<Document> {
        self.documents.get(doc)
    }

    fn stats(&self) -> IndexStats {
        IndexStats {
            profile: Profile::Speed,
            num_docs: self.core.num_docs() as u64,
            num_terms: self.terms.len() as u64,
            avg_doc_len: self.core.avg_doc_len(),
            postings_bytes: self
                .postings
                .iter()
                .map(|p| (p.docs.len() * 8 + 4) as u64)
                .sum(),
            dictionary_bytes: self.terms.iter().map(|t| (t.len() + 12) as u64).sum(),
            documents_bytes: self.documents.size_bytes(),
        }
    }

    fn write_body(&self, writer: &mut BinaryWriter) -> Result<()> {
        self.documents.write_to(writer)?;
        writer.write_u64(self.terms.len() as u64)?;
        for (term, list) in self.terms.iter().zip(&self.postings) {
            writer.write_str(term)?;
            writer.write_f32(list.idf)?;
            writer.write_u32_slice(&list.docs)?;
            writer.write_u32_slice(&list.freqs)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Occur;

    fn index() -> SpeedIndex {
        SpeedIndex::build(
            vec![
                Document::new("0", "the quick brown fox"),
                Document::new("1", "the lazy dog"),
                Document::new("2", "quick quick dog"),
                Document::new("3", "brown dog and brown fox"),
            ],
            IndexSettings::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_conjunctive_search() {
        let index = index();
        let hits = index.search("quick dog", 10, 0).unwrap();
        assert_eq!(hits.total, 1);
        assert_eq!(hits.hits[0].doc, 2);
    }

    #[test]
    fn test_missing_required_term() {
        let index = index();
        let hits = index.search("dog unicorn", 10, 0).unwrap();
        assert_eq!(hits, TopHits::default());
    }

    #[test]
    fn test_optional_terms() {
        let index = index();
        let query = Query::builder()
            .optional("fox")
            .optional("lazi")
            .optional("unicorn")
            .build();
        let hits = index.search_query(&query, 10, 0).unwrap();
        let mut docs: Vec<u32> = hits.hits.iter().map(|h| h.doc).collect();
        docs.sort_unstable();
        assert_eq!(docs, vec![0, 1, 3]);

        let query = Query::builder()
            .term("dog", Occur::Required)
            .term("brown", Occur::Optional)
            .build();
        let hits = index.search_query(&query, 10, 0).unwrap();
        assert_eq!(hits.total, 3);
        assert_eq!(hits.hits[0].doc, 3);
    }

    #[test]
    fn test_phrase() {
        let index = index();
        let hits = index.search("\"brown fox\"", 10, 0).unwrap();
        let mut docs: Vec<u32> = hits.hits.iter().map(|h| h.doc).collect();
        docs.sort_unstable();
        assert_eq!(docs, vec![0, 3]);
        assert_eq!(hits.total, 2);

        let hits = index.search("\"fox brown\"", 10, 0).unwrap();
        assert_eq!(hits.total, 0);
    }

    #[test]
    fn test_offset_and_limit() {
        let index = index();
        let all = index.search("dog", 10, 0).unwrap();
        assert_eq!(all.total, 3);

        let page = index.search("dog", 1, 1).unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.hits, all.hits[1..2].to_vec());

        let none = index.search("dog", 0, 0).unwrap();
        assert!(none.hits.is_empty());
        assert_eq!(none.total, 3);
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("speed.bin");
        let index = index();
        index.save(&path).unwrap();

        let loaded = SpeedIndex::load(&path).unwrap();
        assert_eq!(loaded.num_terms(), index.num_terms());
        assert_eq!(loaded.search("brown", 10, 0).unwrap(), index.search("brown", 10, 0).unwrap());
        assert_eq!(loaded.document(3).unwrap().text, "brown dog and brown fox");
    }

    #[test]
    fn test_empty_index() {
        let index = SpeedIndex::build(Vec::new(), IndexSettings::default()).unwrap();
        assert_eq!(index.count(), 0);
        let hits = index.search("anything", 10, 0).unwrap();
        assert!(hits.hits.is_empty());
        assert_eq!(hits.total, 0);
    }
}
