//! FST term dictionary.
//!
//! Maps every indexed term to its dense term id, which is the position of the
//! term's posting list. The FST must be built from terms in lexicographic byte
//! order with increasing ids, so assembly is a single sequential pass even
//! when posting lists are built in parallel.

use fst::{Map, MapBuilder, Streamer};

use crate::error::{FtsError, Result};

pub struct TermDictionary {
    map: Map<Vec<u8>>,
}

impl std::fmt::Debug for TermDictionary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TermDictionary")
            .field("terms", &self.map.len())
            .field("bytes", &self.map.as_fst().as_bytes().len())
            .finish()
    }
}

impl TermDictionary {
    /// Build from terms already in sorted order; the i-th term gets id `i`.
    pub fn build<I, S>(sorted_terms: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let mut builder = MapBuilder::memory();
        for (id, term) in sorted_terms.into_iter().enumerate() {
            builder
                .insert(term, id as u64)
                .map_err(|e| FtsError::index(format!("Failed to build term dictionary: {e}")))?;
        }
        let bytes = builder
            .into_inner()
            .map_err(|e| FtsError::index(format!("Failed to finish term dictionary: {e}")))?;
        Self::from_bytes(bytes)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let map = Map::new(bytes)
            .map_err(|e| FtsError::corrupt(format!("Invalid term dictionary: {e}")))?;
        Ok(TermDictionary { map })
    }

    pub fn get(&self, term: &str) -> Option<u32> {
        self.map.get(term.as_bytes()).map(|id| id as u32)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.map.as_fst().as_bytes()
    }

    /// Largest term id stored, if any.
    pub fn max_id(&self) -> Option<u64> {
        let mut stream = self.map.stream();
        let mut max = None;
        while let Some((_, id)) = stream.next() {
            max = Some(max.map_or(id, |m: u64| m.max(id)));
        }
        max
    }

    /// All terms in sorted order with their ids.
    pub fn terms(&self) -> Vec<(String, u32)> {
        let mut stream = self.map.stream();
        let mut out = Vec::with_capacity(self.map.len());
        while let Some((key, id)) = stream.next() {
            out.push((String::from_utf8_lossy(key).into_owned(), id as u32));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_lookup() {
        let dict = TermDictionary::build(["apple", "banana", "cherry"]).unwrap();
        assert_eq!(dict.len(), 3);
        assert_eq!(dict.get("apple"), Some(0));
        assert_eq!(dict.get("cherry"), Some(2));
        assert_eq!(dict.get("durian"), None);
        assert_eq!(dict.max_id(), Some(2));
    }

    #[test]
    fn test_unsorted_input_fails() {
        assert!(TermDictionary::build(["b", "a"]).is_err());
        assert!(TermDictionary::build(["a", "a"]).is_err());
    }

    #[test]
    fn test_bytes_roundtrip() {
        let dict = TermDictionary::build(["café", "cat", "dog"]).unwrap();
        let copy = TermDictionary::from_bytes(dict.as_bytes().to_vec()).unwrap();
        assert_eq!(copy.get("café"), Some(0));
        assert_eq!(
            copy.terms(),
            vec![
                ("café".to_string(), 0),
                ("cat".to_string(), 1),
                ("dog".to_string(), 2)
            ]
        );
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(TermDictionary::from_bytes(vec![1, 2, 3]).is_err());
    }

    #[test]
    fn test_empty() {
        let dict = TermDictionary::build(Vec::<String>::new()).unwrap();
        assert!(dict.is_empty());
        assert_eq!(dict.max_id(), None);
    }
}
