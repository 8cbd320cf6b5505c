//! Compact profile: Elias-Fano doc ids, StreamVByte frequencies and an FST
//! dictionary, with LZ4-compressed stored documents.
//!
//! Nothing is decoded ahead of time. A query decodes the posting lists of its
//! own terms in full, scores them with the batched scorer and merges them
//! document-at-a-time, like the speed profile does with its raw arrays.

use std::borrow::Cow;
use std::fs;
use std::path::Path;

use rayon::ThreadPool;
use rayon::prelude::*;

use crate::codec::{EliasFano, StreamVByte, TermDictionary};
use crate::collector::TopKCollector;
use crate::data::Document;
use crate::error::{FtsError, Result};
use crate::index::daat::{self, ScoredList};
use crate::index::phrase;
use crate::index::speed::validate_postings;
use crate::index::store::DocumentStore;
use crate::index::{
    IndexCore, IndexSettings, IndexStats, Profile, SearchIndex, TopHits, decode_as, save_index,
};
use crate::indexer::{InvertedBatch, ParallelIndexer};
use crate::query::Query;
use crate::scoring::idf;
use crate::util::binary::{BinaryReader, BinaryWriter};
use crate::util::cancel::CancelToken;

#[derive(Debug)]
struct CompressedPostings {
    idf: f32,
    docs: EliasFano,
    freqs: StreamVByte,
}

impl CompressedPostings {
    fn size_bytes(&self) -> usize {
        self.docs.size_bytes() + self.freqs.size_bytes() + 4
    }
}

#[derive(Debug)]
pub struct CompactIndex {
    core: IndexCore,
    dictionary: TermDictionary,
    postings: Vec<CompressedPostings>,
    documents: DocumentStore,
}

impl CompactIndex {
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

        let lists = pool.install(|| {
            entries
                .par_iter()
                .map(|(_, buf)| {
                    Ok(CompressedPostings {
                        idf: idf(num_docs, buf.docs.len() as u64),
                        docs: EliasFano::from_sorted(&buf.docs)?,
                        freqs: StreamVByte::encode(&buf.freqs)?,
                    })
                })
                .collect::<Result<Vec<_>>>()
        })?;
        cancel.check()?;

        let dictionary = TermDictionary::build(entries.iter().map(|(term, _)| term.as_bytes()))?;
        drop(entries);
        let documents = DocumentStore::compressed(documents, pool)?;
        cancel.check()?;

        Ok(CompactIndex {
            core,
            dictionary,
            postings: lists,
            documents,
        })
    }

    pub fn num_terms(&self) -> usize {
        self.postings.len()
    }

    pub fn save(&self, path: &Path) -> Result<u64> {
        save_index(self, path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        decode_as(&fs::read(path)?, Profile::Compact, Self::read_body)
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
        for id in 0..num_lists {
            let idf = reader.read_f32()?;
            let docs = EliasFano::read_from(reader)?;
            let freqs = StreamVByte::read_from(reader)?;
            if !idf.is_finite() {
                return Err(FtsError::corrupt(format!("term {id} has invalid idf")));
            }
            validate_postings(&format!("#{id}"), &docs.decode(), &freqs.decode(), num_docs)?;
            postings.push(CompressedPostings { idf, docs, freqs });
        }

        Ok(CompactIndex {
            core,
            dictionary,
            postings,
            documents,
        })
    }
}

impl SearchIndex for CompactIndex {
    fn profile(&self) -> Profile {
        Profile::Compact
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
        let mut freqs = Vec::new();
        for term in query.unique_terms() {
            let Some(id) = self.dictionary.get(&term.text) else {
                if term.required {
                    return Ok(TopHits::default());
                }
                continue;
            };
            let list = self
                .postings
                .get(id as usize)
                .ok_or_else(|| FtsError::corrupt(format!("term id {id} out of range")))?;

            let docs = list.docs.decode();
            freqs.clear();
            list.freqs.decode_into(&mut freqs);
            let mut scores = Vec::with_capacity(docs.len());
            scorer.score_postings(list.idf, &docs, &freqs, self.core.doc_lens(), &mut scores);
            lists.push(ScoredList {
                docs: Cow::Owned(docs),
                scores,
                required: term.required,
            });
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
            profile: Profile::Compact,
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
            writer.write_f32(list.idf)?;
            list.docs.write_to(writer)?;
            list.freqs.write_to(writer)?;
        }
        Ok(())
    }
}
