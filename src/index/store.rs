//! Stored documents, addressed by dense doc id.

use rayon::ThreadPool;
use rayon::prelude::*;

use crate::data::Document;
use crate::error::{FtsError, Result};
use crate::util::binary::{BinaryReader, BinaryWriter};

const PLAIN: u8 = 0;
const COMPRESSED: u8 = 1;

/// Documents kept either as-is or as LZ4-compressed payloads.
#[derive(Debug)]
pub enum DocumentStore {
    Plain(Vec<Document>),
    Compressed(Vec<Box<[u8]>>),
}

fn write_fields(writer: &mut BinaryWriter, doc: &Document) -> Result<()> {
    writer.write_str(&doc.id)?;
    writer.write_str(&doc.url)?;
    writer.write_str(&doc.text)?;
    writer.write_str(&doc.dump)?;
    writer.write_str(&doc.date)?;
    writer.write_str(&doc.language)?;
    writer.write_f64(doc.language_score)?;
    Ok(())
}

fn read_fields(reader: &mut BinaryReader<'_>) -> Result<Document> {
    Ok(Document {
        id: reader.read_string()?,
        url: reader.read_string()?,
        text: reader.read_string()?,
        dump: reader.read_string()?,
        date: reader.read_string()?,
        language: reader.read_string()?,
        language_score: reader.read_f64()?,
        score: 0.0,
    })
}

fn compress(doc: &Document) -> Result<Box<[u8]>> {
    let mut writer = BinaryWriter::with_capacity(doc.text.len() + 128);
    write_fields(&mut writer, doc)?;
    Ok(lz4_flex::compress_prepend_size(&writer.into_inner()).into_boxed_slice())
}

fn decompress(payload: &[u8]) -> Result<Document> {
    let raw = lz4_flex::decompress_size_prepended(payload)
        .map_err(|e| FtsError::corrupt(format!("document payload: {e}")))?;
    let mut reader = BinaryReader::new(&raw);
    let doc = read_fields(&mut reader)?;
    if !reader.is_exhausted() {
        return Err(FtsError::corrupt("trailing bytes in document payload"));
    }
    Ok(doc)
}

impl DocumentStore {
    pub fn plain(documents: Vec<Document>) -> Self {
        DocumentStore::Plain(documents)
    }

    /// Compress every document on `pool`, preserving order.
    pub fn compressed(documents: Vec<Document>, pool: &ThreadPool) -> Result<Self> {
        let payloads = pool.install(|| {
            documents
                .par_iter()
                .map(compress)
                .collect::<Result<Vec<_>>>()
        })?;
        Ok(DocumentStore::Compressed(payloads))
    }

    pub fn len(&self) -> usize {
        match self {
            DocumentStore::Plain(docs) => docs.len(),
            DocumentStore::Compressed(payloads) => payloads.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, doc: u32) -> Result<Document> {
        let missing = || FtsError::index(format!("document {doc} does not exist"));
        match self {
            DocumentStore::Plain(docs) => docs.get(doc as usize).cloned().ok_or_else(missing),
            DocumentStore::Compressed(payloads) => {
                decompress(payloads.get(doc as usize).ok_or_else(missing)?)
            }
        }
    }

    /// Text of a stored document.
    pub fn text(&self, doc: u32) -> Result<String> {
        match self {
            DocumentStore::Plain(docs) => docs
                .get(doc as usize)
                .map(|d| d.text.clone())
                .ok_or_else(|| FtsError::index(format!("document {doc} does not exist"))),
            DocumentStore::Compressed(_) => self.get(doc).map(|d| d.text),
        }
    }

    pub fn size_bytes(&self) -> u64 {
        match self {
            DocumentStore::Plain(docs) => docs
                .iter()
                .map(|d| {
                    (d.id.len() + d.url.len() + d.text.len() + d.dump.len() + d.date.len()
                        + d.language.len()
                        + 8) as u64
                })
                .sum(),
            DocumentStore::Compressed(payloads) => {
                payloads.iter().map(|p| p.len() as u64).sum()
            }
        }
    }

    pub fn write_to(&self, writer: &mut BinaryWriter) -> Result<()> {
        match self {
            DocumentStore::Plain(docs) => {
                writer.write_u8(PLAIN)?;
                writer.write_u64(docs.len() as u64)?;
                for doc in docs {
                    write_fields(writer, doc)?;
                }
            }
            DocumentStore::Compressed(payloads) => {
                writer.write_u8(COMPRESSED)?;
                writer.write_u64(payloads.len() as u64)?;
                for payload in payloads {
                    writer.write_bytes(payload)?;
                }
            }
        }
        Ok(())
    }

    /// Read a store holding exactly `expected` documents.
    pub fn read_from(reader: &mut BinaryReader<'_>, expected: usize) -> Result<Self> {
        let kind = reader.read_u8()?;
        let count = reader.read_u64()?;
        if count != expected as u64 {
            return Err(FtsError::corrupt(format!(
                "document store holds {count} documents, index has {expected}"
            )));
        }

        match kind {
            PLAIN => {
                let mut docs = Vec::with_capacity(expected);
                for _ in 0..expected {
                    docs.push(read_fields(reader)?);
                }
                Ok(DocumentStore::Plain(docs))
            }
            COMPRESSED => {
                let mut payloads = Vec::with_capacity(expected);
                for _ in 0..expected {
                    payloads.push(reader.read_bytes()?.to_vec().into_boxed_slice());
                }
                Ok(DocumentStore::Compressed(payloads))
            }
            other => Err(FtsError::corrupt(format!("unknown document store kind {other}"))),
        }
    }
}
