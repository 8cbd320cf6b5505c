//! Read-only inverted indexes in three storage profiles.
//!
//! | Profile | Postings | Term lookup | Documents |
//! |---|---|---|---|
//! | [`Profile::Speed`] | fixed-width `u32` arrays | hash table | plain |
//! | [`Profile::Balanced`] | VByte blocks with block-max metadata | FST | plain |
//! | [`Profile::Compact`] | Elias-Fano ids + StreamVByte freqs | FST | LZ4 payloads |
//!
//! Every profile is built once from an [`InvertedBatch`] and never mutated
//! afterwards. Dense doc ids follow import order and index `doc_lens` and the
//! document store alike.
//!
//! # Document lengths
//!
//! Lengths are stored as `u16`. Documents longer than 65535 tokens are scored
//! as if they had exactly 65535; the average length still uses true lengths.
//!
//! # On-disk container
//!
//! ```text
//! "FWIX" | version u16 | profile u8 | header JSON (len-prefixed) | body (len-prefixed) | crc32
//! ```
//!
//! The body starts with the shared statistics
//! `{doc_count i32, avg_doc_len f64, doc_lens u16 × doc_count}` followed by the
//! profile's documents and posting lists.

pub mod balanced;
pub mod compact;
mod daat;
mod phrase;
pub mod speed;
pub mod store;

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use log::{debug, info};
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};

use crate::analysis::{Analyzer, AnalyzerConfig};
use crate::collector::{ScoredDoc, TopKCollector};
use crate::data::Document;
use crate::error::{FtsError, Result};
use crate::indexer::InvertedBatch;
use crate::query::{Query, QueryParser};
use crate::scoring::{Bm25Params, Bm25Scorer};
use crate::util::binary::{BinaryReader, BinaryWriter};
use crate::util::cancel::CancelToken;

pub use balanced::BalancedIndex;
pub use compact::CompactIndex;
pub use speed::SpeedIndex;

const MAGIC: &[u8; 4] = b"FWIX";
const FORMAT_VERSION: u16 = 1;

/// Storage profile of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Speed,
    Balanced,
    Compact,
}

impl Profile {
    pub const ALL: [Profile; 3] = [Profile::Speed, Profile::Balanced, Profile::Compact];

    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Speed => "speed",
            Profile::Balanced => "balanced",
            Profile::Compact => "compact",
        }
    }

    fn tag(&self) -> u8 {
        match self {
            Profile::Speed => 1,
            Profile::Balanced => 2,
            Profile::Compact => 3,
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(Profile::Speed),
            2 => Ok(Profile::Balanced),
            3 => Ok(Profile::Compact),
            _ => Err(FtsError::corrupt(format!("unknown profile tag {tag}"))),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = FtsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "speed" => Ok(Profile::Speed),
            "balanced" => Ok(Profile::Balanced),
            "compact" => Ok(Profile::Compact),
            other => Err(FtsError::invalid_config(format!("unknown profile '{other}'"))),
        }
    }
}

/// Settings fixed at build time and persisted with the index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexSettings {
    pub bm25: Bm25Params,
    pub analyzer: AnalyzerConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexHeader {
    profile: Profile,
    settings: IndexSettings,
    created_by: String,
}

/// Footprint and shape of an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub profile: Profile,
    pub num_docs: u64,
    pub num_terms: u64,
    pub avg_doc_len: f64,
    pub postings_bytes: u64,
    pub dictionary_bytes: u64,
    pub documents_bytes: u64,
}

impl IndexStats {
    pub fn memory_bytes(&self) -> u64 {
        self.postings_bytes + self.dictionary_bytes + self.documents_bytes + self.num_docs * 2
    }
}

/// One page of ranked hits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopHits {
    pub hits: Vec<ScoredDoc>,
    pub total: u64,
}

impl TopHits {
    pub(crate) fn page(collector: TopKCollector, total: u64, offset: usize, limit: usize) -> Self {
        let hits = collector
            .into_results()
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect();
        TopHits { hits, total }
    }
}

/// Statistics and analysis shared by all profiles.
#[derive(Debug)]
pub struct IndexCore {
    settings: IndexSettings,
    analyzer: Analyzer,
    avg_doc_len: f64,
    doc_lens: Vec<u16>,
}

impl IndexCore {
    fn new(settings: IndexSettings, avg_doc_len: f64, doc_lens: Vec<u16>) -> Self {
        IndexCore {
            analyzer: Analyzer::new(settings.analyzer.clone()),
            settings,
            avg_doc_len,
            doc_lens,
        }
    }

    pub(crate) fn from_batch(batch: &InvertedBatch, settings: IndexSettings) -> Self {
        let n = batch.doc_lens.len();
        let avg_doc_len = if n == 0 {
            0.0
        } else {
            batch.total_tokens as f64 / n as f64
        };
        let doc_lens = batch
            .doc_lens
            .iter()
            .map(|&len| len.min(u16::MAX as u32) as u16)
            .collect();
        IndexCore::new(settings, avg_doc_len, doc_lens)
    }

    pub fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn num_docs(&self) -> u32 {
        self.doc_lens.len() as u32
    }

    pub fn avg_doc_len(&self) -> f64 {
        self.avg_doc_len
    }

    pub fn doc_lens(&self) -> &[u16] {
        &self.doc_lens
    }

    pub fn scorer(&self) -> Bm25Scorer {
        Bm25Scorer::new(self.settings.bm25, self.avg_doc_len)
    }

    fn write_to(&self, writer: &mut BinaryWriter) -> Result<()> {
        let doc_count = i32::try_from(self.doc_lens.len())
            .map_err(|_| FtsError::index("too many documents for the on-disk format"))?;
        writer.write_i32(doc_count)?;
        writer.write_f64(self.avg_doc_len)?;
        writer.write_u16_slice(&self.doc_lens)?;
        Ok(())
    }

    fn read_from(reader: &mut BinaryReader<'_>, settings: IndexSettings) -> Result<Self> {
        let doc_count = reader.read_i32()?;
        let avg_doc_len = reader.read_f64()?;
        let doc_lens = reader.read_u16_vec()?;
        if doc_count < 0 || doc_lens.len() != doc_count as usize {
            return Err(FtsError::corrupt(format!(
                "doc_count {doc_count} does not match {} stored lengths",
                doc_lens.len()
            )));
        }
        if !avg_doc_len.is_finite() || avg_doc_len < 0.0 {
            return Err(FtsError::corrupt(format!("invalid avg_doc_len {avg_doc_len}")));
        }
        Ok(IndexCore::new(settings, avg_doc_len, doc_lens))
    }
}

/// A built, read-only index.
pub trait SearchIndex: Send + Sync + fmt::Debug {
    fn profile(&self) -> Profile;

    fn core(&self) -> &IndexCore;

    /// Rank documents for an already-parsed query.
    ///
    /// Returns the hits at ranks `[offset, offset + limit)` and the number of
    /// matching documents.
    fn search_query(&self, query: &Query, limit: usize, offset: usize) -> Result<TopHits>;

    /// Stored document by dense id.
    fn document(&self, doc: u32) -> Result<Document>;

    fn stats(&self) -> IndexStats;

    /// Serialize the profile body (statistics, documents, postings).
    fn write_body(&self, writer: &mut BinaryWriter) -> Result<()>;

    fn count(&self) -> u64 {
        self.core().num_docs() as u64
    }

    fn analyzer(&self) -> &Analyzer {
        self.core().analyzer()
    }

    fn parse(&self, text: &str) -> Query {
        QueryParser::new(self.analyzer()).parse(text)
    }

    /// Parse `text` with the index analyzer and rank documents for it.
    fn search(&self, text: &str, limit: usize, offset: usize) -> Result<TopHits> {
        self.search_query(&self.parse(text), limit, offset)
    }
}

/// Build an index of the given profile from inverted documents.
pub fn build_index(
    profile: Profile,
    batch: InvertedBatch,
    bm25: Bm25Params,
    pool: &ThreadPool,
    cancel: &CancelToken,
) -> Result<Box<dyn SearchIndex>> {
    bm25.validate()?;
    let settings = IndexSettings {
        bm25,
        analyzer: batch.analyzer.clone(),
    };
    let index: Box<dyn SearchIndex> = match profile {
        Profile::Speed => Box::new(SpeedIndex::from_batch(batch, settings, pool, cancel)?),
        Profile::Balanced => Box::new(BalancedIndex::from_batch(batch, settings, pool, cancel)?),
        Profile::Compact => Box::new(CompactIndex::from_batch(batch, settings, pool, cancel)?),
    };
    Ok(index)
}

/// Serialize an index into the versioned, checksummed container.
pub fn encode_index(index: &dyn SearchIndex) -> Result<Vec<u8>> {
    let header = IndexHeader {
        profile: index.profile(),
        settings: index.core().settings().clone(),
        created_by: format!("fineweb-fts {}", crate::VERSION),
    };

    let mut body = BinaryWriter::new();
    index.core().write_to(&mut body)?;
    index.write_body(&mut body)?;
    let body = body.into_inner();

    let mut writer = BinaryWriter::with_capacity(body.len() + 256);
    for &b in MAGIC {
        writer.write_u8(b)?;
    }
    writer.write_u16(FORMAT_VERSION)?;
    writer.write_u8(index.profile().tag())?;
    writer.write_bytes(&serde_json::to_vec(&header)?)?;
    writer.write_bytes(&body)?;

    let mut bytes = writer.into_inner();
    let checksum = crc32fast::hash(&bytes);
    bytes.extend_from_slice(&checksum.to_le_bytes());
    Ok(bytes)
}

/// Validate the container framing and return the profile, shared statistics
/// and a reader positioned at the profile-specific part of the body.
fn open_container(bytes: &[u8]) -> Result<(Profile, IndexCore, BinaryReader<'_>)> {
    if bytes.len() < MAGIC.len() + 2 + 1 + 4 {
        return Err(FtsError::corrupt("index file is truncated"));
    }
    let (payload, checksum) = bytes.split_at(bytes.len() - 4);
    let expected = u32::from_le_bytes([checksum[0], checksum[1], checksum[2], checksum[3]]);
    let actual = crc32fast::hash(payload);
    if expected != actual {
        return Err(FtsError::corrupt(format!(
            "checksum mismatch: stored {expected:08x}, computed {actual:08x}"
        )));
    }

    let mut reader = BinaryReader::new(payload);
    let mut magic = [0u8; 4];
    for b in magic.iter_mut() {
        *b = reader.read_u8()?;
    }
    if &magic != MAGIC {
        return Err(FtsError::corrupt("not an index file (bad magic)"));
    }
    let version = reader.read_u16()?;
    if version != FORMAT_VERSION {
        return Err(FtsError::corrupt(format!(
            "unsupported index format version {version}"
        )));
    }
    let profile = Profile::from_tag(reader.read_u8()?)?;
    let header: IndexHeader = serde_json::from_slice(reader.read_bytes()?)
        .map_err(|e| FtsError::corrupt(format!("invalid index header: {e}")))?;
    if header.profile != profile {
        return Err(FtsError::corrupt(format!(
            "header profile {} does not match tag {profile}",
            header.profile
        )));
    }
    header
        .settings
        .bm25
        .validate()
        .map_err(|e| FtsError::corrupt(e.to_string()))?;

    let body = reader.read_bytes()?;
    if !reader.is_exhausted() {
        return Err(FtsError::corrupt("trailing bytes after index body"));
    }

    let mut body = BinaryReader::new(body);
    let core = IndexCore::read_from(&mut body, header.settings)?;
    Ok((profile, core, body))
}

fn finish_body<T>(profile: Profile, body: &BinaryReader<'_>, index: T) -> Result<T> {
    if !body.is_exhausted() {
        return Err(FtsError::corrupt(format!(
            "{} bytes left over after {profile} body",
            body.remaining()
        )));
    }
    Ok(index)
}

/// Parse a container produced by [`encode_index`].
pub fn decode_index(bytes: &[u8]) -> Result<Box<dyn SearchIndex>> {
    let (profile, core, mut body) = open_container(bytes)?;
    let index: Box<dyn SearchIndex> = match profile {
        Profile::Speed => Box::new(SpeedIndex::read_body(core, &mut body)?),
        Profile::Balanced => Box::new(BalancedIndex::read_body(core, &mut body)?),
        Profile::Compact => Box::new(CompactIndex::read_body(core, &mut body)?),
    };
    finish_body(profile, &body, index)
}

/// Parse a container that must hold an index of `expected` profile.
pub(crate) fn decode_as<T, F>(bytes: &[u8], expected: Profile, read_body: F) -> Result<T>
where
    F: FnOnce(IndexCore, &mut BinaryReader<'_>) -> Result<T>,
{
    let (profile, core, mut body) = open_container(bytes)?;
    if profile != expected {
        return Err(FtsError::invalid_argument(format!(
            "expected a {expected} index, found {profile}"
        )));
    }
    let index = read_body(core, &mut body)?;
    finish_body(profile, &body, index)
}

/// Write an index to `path`, replacing any previous file atomically.
pub fn save_index(index: &dyn SearchIndex, path: &Path) -> Result<u64> {
    let bytes = encode_index(index)?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| FtsError::Io(e.error))?;

    info!(
        "Saved {} index ({} docs, {} bytes) to {}",
        index.profile(),
        index.count(),
        bytes.len(),
        path.display()
    );
    Ok(bytes.len() as u64)
}

/// Read an index of any profile from `path`.
pub fn load_index(path: &Path) -> Result<Box<dyn SearchIndex>> {
    let bytes = fs::read(path)?;
    let index = decode_index(&bytes)?;
    debug!(
        "Loaded {} index ({} docs, {} bytes) from {}",
        index.profile(),
        index.count(),
        bytes.len(),
        path.display()
    );
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::{IndexerConfig, ParallelIndexer};

    fn sample_docs() -> Vec<Document> {
        vec![
            Document::new("a", "the cat sat"),
            Document::new("b", "the dog ran"),
            Document::new("c", "cats and dogs"),
        ]
    }

    #[test]
    fn test_profile_parsing() {
        assert_eq!("Speed".parse::<Profile>().unwrap(), Profile::Speed);
        assert_eq!("compact".parse::<Profile>().unwrap(), Profile::Compact);
        assert!("fast".parse::<Profile>().is_err());
        for p in Profile::ALL {
            assert_eq!(Profile::from_tag(p.tag()).unwrap(), p);
        }
    }

    #[test]
    fn test_container_roundtrip_every_profile() {
        let indexer = ParallelIndexer::new(IndexerConfig::default()).unwrap();
        for profile in Profile::ALL {
            let index = indexer
                .build_from_documents(profile, sample_docs(), &IndexSettings::default())
                .unwrap();
            let bytes = encode_index(index.as_ref()).unwrap();
            let loaded = decode_index(&bytes).unwrap();

            assert_eq!(loaded.profile(), profile);
            assert_eq!(loaded.count(), 3);
            for q in ["cat", "dog", "the", "\"the cat\"", "missing"] {
                assert_eq!(
                    loaded.search(q, 10, 0).unwrap(),
                    index.search(q, 10, 0).unwrap(),
                    "{profile} query {q}"
                );
            }
        }
    }

    #[test]
    fn test_corruption_detected() {
        let indexer = ParallelIndexer::new(IndexerConfig::default()).unwrap();
        let index = indexer
            .build_from_documents(Profile::Compact, sample_docs(), &IndexSettings::default())
            .unwrap();
        let bytes = encode_index(index.as_ref()).unwrap();

        let mut flipped = bytes.clone();
        let mid = flipped.len() / 2;
        flipped[mid] ^= 0xFF;
        assert!(matches!(decode_index(&flipped), Err(FtsError::Corrupt(_))));

        assert!(matches!(
            decode_index(&bytes[..bytes.len() - 10]),
            Err(FtsError::Corrupt(_))
        ));
        assert!(decode_index(b"nope").is_err());
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("index.bin");

        let indexer = ParallelIndexer::new(IndexerConfig::default()).unwrap();
        let index = indexer
            .build_from_documents(Profile::Speed, sample_docs(), &IndexSettings::default())
            .unwrap();
        let written = save_index(index.as_ref(), &path).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), written);

        let loaded = load_index(&path).unwrap();
        assert_eq!(loaded.search("cat", 10, 0).unwrap(), index.search("cat", 10, 0).unwrap());
    }

    #[test]
    fn test_long_documents_are_clamped() {
        let long_text = vec!["word"; 70_000].join(" ");
        let docs = vec![Document::new("long", long_text), Document::new("short", "word")];
        let indexer = ParallelIndexer::new(IndexerConfig::default()).unwrap();
        let index = indexer
            .build_from_documents(Profile::Speed, docs, &IndexSettings::default())
            .unwrap();

        assert_eq!(index.core().doc_lens(), &[u16::MAX, 1]);
        assert!((index.core().avg_doc_len() - 35_000.5).abs() < 1e-9);
    }
}
