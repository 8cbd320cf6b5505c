//! Elias-Fano coding of non-decreasing integer sequences.
//!
//! Each value `v` of a sequence of `n` values below universe `u` is split into
//! `l = floor(log2(u / n))` low bits, stored verbatim in a packed array, and
//! the remaining high bits, stored in unary as a bitmap in which value `i`
//! sets bit `(v >> l) + i`. The total is at most `n * (2 + l)` bits, close to
//! the `log2(C(u, n))` lower bound.
//!
//! ```text
//! values  : 3   5   9   14      (n = 4, u = 15, l = 1)
//! lows    : 1   1   1   0
//! highs   : 1   2   4   7   →   bits 1, 3, 6, 10 set
//! ```
//!
//! Callers decode a whole list at once; there is no random access.

use crate::error::{FtsError, Result};
use crate::util::binary::{BinaryReader, BinaryWriter};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EliasFano {
    len: u32,
    universe: u64,
    low_bits: u8,
    lows: Vec<u64>,
    highs: Vec<u64>,
}

#[inline]
fn words_for(bits: u64) -> usize {
    bits.div_ceil(64) as usize
}

fn low_bits_for(len: u64, universe: u64) -> u8 {
    if len == 0 || universe <= len {
        0
    } else {
        (63 - (universe / len).leading_zeros()) as u8
    }
}

impl EliasFano {
    /// Encode a non-decreasing sequence.
    pub fn from_sorted(values: &[u32]) -> Result<Self> {
        let len = u32::try_from(values.len())
            .map_err(|_| FtsError::invalid_argument("Elias-Fano sequence too long"))?;
        if values.windows(2).any(|w| w[0] > w[1]) {
            return Err(FtsError::invalid_argument(
                "Elias-Fano input must be non-decreasing",
            ));
        }

        let universe = values.last().map_or(0, |&last| last as u64 + 1);
        let n = len as u64;
        let low_bits = low_bits_for(n, universe);
        let low_mask = (1u64 << low_bits) - 1;

        let mut lows = vec![0u64; words_for(n * low_bits as u64)];
        let high_len = n + (universe >> low_bits) + 1;
        let mut highs = vec![0u64; words_for(high_len)];

        for (i, &value) in values.iter().enumerate() {
            let value = value as u64;

            if low_bits > 0 {
                let low = value & low_mask;
                let bit = i as u64 * low_bits as u64;
                let word = (bit / 64) as usize;
                let shift = bit % 64;
                lows[word] |= low << shift;
                if shift + low_bits as u64 > 64 {
                    lows[word + 1] |= low >> (64 - shift);
                }
            }

            let pos = (value >> low_bits) + i as u64;
            highs[(pos / 64) as usize] |= 1u64 << (pos % 64);
        }

        Ok(EliasFano {
            len,
            universe,
            low_bits,
            lows,
            highs,
        })
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes used by the encoded bit arrays.
    pub fn size_bytes(&self) -> usize {
        (self.lows.len() + self.highs.len()) * 8
    }

    #[inline]
    fn low(&self, i: u64) -> u64 {
        if self.low_bits == 0 {
            return 0;
        }
        let bits = self.low_bits as u64;
        let bit = i * bits;
        let word = (bit / 64) as usize;
        let shift = bit % 64;
        let mut value = self.lows[word] >> shift;
        if shift + bits > 64 {
            value |= self.lows[word + 1] << (64 - shift);
        }
        value & ((1u64 << bits) - 1)
    }

    /// Decode the whole sequence into `out`.
    pub fn decode_into(&self, out: &mut Vec<u32>) {
        out.clear();
        out.reserve(self.len as usize);

        let mut i = 0u64;
        for (word_idx, &word) in self.highs.iter().enumerate() {
            let mut bits = word;
            while bits != 0 && i < self.len as u64 {
                let pos = word_idx as u64 * 64 + bits.trailing_zeros() as u64;
                let high = pos - i;
                out.push(((high << self.low_bits) | self.low(i)) as u32);
                bits &= bits - 1;
                i += 1;
            }
        }
    }

    pub fn decode(&self) -> Vec<u32> {
        let mut out = Vec::with_capacity(self.len as usize);
        self.decode_into(&mut out);
        out
    }

    pub fn write_to(&self, writer: &mut BinaryWriter) -> Result<()> {
        writer.write_u32(self.len)?;
        writer.write_u64(self.universe)?;
        writer.write_u8(self.low_bits)?;
        writer.write_u64_slice(&self.lows)?;
        writer.write_u64_slice(&self.highs)?;
        Ok(())
    }

    pub fn read_from(reader: &mut BinaryReader<'_>) -> Result<Self> {
        let len = reader.read_u32()?;
        let universe = reader.read_u64()?;
        let low_bits = reader.read_u8()?;
        if universe > u32::MAX as u64 + 1 || low_bits != low_bits_for(len as u64, universe) {
            return Err(FtsError::corrupt(format!(
                "inconsistent Elias-Fano header (len {len}, universe {universe}, low bits {low_bits})"
            )));
        }

        let lows = reader.read_u64_vec()?;
        let highs = reader.read_u64_vec()?;
        let n = len as u64;
        if lows.len() != words_for(n * low_bits as u64)
            || highs.len() != words_for(n + (universe >> low_bits) + 1)
        {
            return Err(FtsError::corrupt("Elias-Fano bit arrays have the wrong size"));
        }
        let ones: u64 = highs.iter().map(|w| w.count_ones() as u64).sum();
        if ones != n {
            return Err(FtsError::corrupt(format!(
                "Elias-Fano upper bits encode {ones} values, header says {n}"
            )));
        }

        Ok(EliasFano {
            len,
            universe,
            low_bits,
            lows,
            highs,
        })
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    #[test]
    fn test_small_sequence() {
        let values = vec![3, 5, 9, 14];
        let ef = EliasFano::from_sorted(&values).unwrap();
        assert_eq!(ef.low_bits, 1);
        assert_eq!(ef.decode(), values);
    }

    #[test]
    fn test_edge_sequences() {
        for values in [
            vec![],
            vec![0],
            vec![0, 0, 0],
            vec![u32::MAX],
            vec![0, u32::MAX],
            (0..1000).collect::<Vec<u32>>(),
        ] {
            let ef = EliasFano::from_sorted(&values).unwrap();
            assert_eq!(ef.decode(), values);
            assert_eq!(ef.len(), values.len());
        }
    }

    #[test]
    fn test_random_roundtrip() {
        let mut rng = StdRng::seed_from_u64(42);
        for &(n, universe) in &[(10usize, 100u32), (1_000, 1_000_000), (5_000, 6_000), (300, u32::MAX)] {
            let mut values: Vec<u32> = (0..n).map(|_| rng.random_range(0..universe)).collect();
            values.sort_unstable();
            let ef = EliasFano::from_sorted(&values).unwrap();
            assert_eq!(ef.decode(), values);
        }
    }

    #[test]
    fn test_near_lower_bound() {
        let values: Vec<u32> = (0..10_000).map(|i| i * 100).collect();
        let ef = EliasFano::from_sorted(&values).unwrap();
        // 2 + ceil(log2(u/n)) bits per value is well under the 32 of a plain array.
        assert!(ef.size_bytes() * 8 <= values.len() * (2 + 7) + 128);
    }

    #[test]
    fn test_rejects_unsorted() {
        assert!(EliasFano::from_sorted(&[4, 2]).is_err());
    }

    #[test]
    fn test_serialization() {
        let values: Vec<u32> = (0..500).map(|i| i * 7 + 3).collect();
        let ef = EliasFano::from_sorted(&values).unwrap();

        let mut writer = BinaryWriter::new();
        ef.write_to(&mut writer).unwrap();
        let bytes = writer.into_inner();

        let mut reader = BinaryReader::new(&bytes);
        let loaded = EliasFano::read_from(&mut reader).unwrap();
        assert_eq!(loaded, ef);
        assert_eq!(loaded.decode(), values);
    }

    #[test]
    fn test_corrupt_header_rejected() {
        let ef = EliasFano::from_sorted(&[1, 2, 3]).unwrap();
        let mut writer = BinaryWriter::new();
        ef.write_to(&mut writer).unwrap();
        let mut bytes = writer.into_inner();
        bytes[0] = 9; // len

        let mut reader = BinaryReader::new(&bytes);
        assert!(EliasFano::read_from(&mut reader).is_err());
    }
}
