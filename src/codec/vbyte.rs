//! VByte coding of integer runs.
//!
//! Doc ids are stored as gaps from a base value so that dense posting lists
//! mostly take a single byte per entry.

use crate::error::{FtsError, Result};
use crate::util::varint;

/// Append `values` as VByte integers.
pub fn encode(values: &[u32], out: &mut Vec<u8>) {
    for &value in values {
        varint::write_u32(out, value);
    }
}

/// Decode `count` VByte integers starting at `*pos` into `out`.
pub fn decode(bytes: &[u8], pos: &mut usize, count: usize, out: &mut Vec<u32>) -> Result<()> {
    out.reserve(count);
    for _ in 0..count {
        out.push(varint::read_u32(bytes, pos)?);
    }
    Ok(())
}

/// Append a non-decreasing run as gaps from `base`.
///
/// The first gap is `values[0] - base`; each following gap is the
/// difference to the previous value.
pub fn encode_deltas(values: &[u32], base: u32, out: &mut Vec<u8>) -> Result<()> {
    let mut prev = base;
    for &value in values {
        let gap = value.checked_sub(prev).ok_or_else(|| {
            FtsError::invalid_argument(format!(
                "delta coding needs a non-decreasing run: {value} follows {prev}"
            ))
        })?;
        varint::write_u32(out, gap);
        prev = value;
    }
    Ok(())
}

/// Decode `count` gaps starting at `*pos`, rebuilding absolute values from `base`.
pub fn decode_deltas(
    bytes: &[u8],
    pos: &mut usize,
    count: usize,
    base: u32,
    out: &mut Vec<u32>,
) -> Result<()> {
    out.reserve(count);
    let mut prev = base;
    for _ in 0..count {
        let gap = varint::read_u32(bytes, pos)?;
        prev = prev
            .checked_add(gap)
            .ok_or_else(|| FtsError::corrupt("delta-coded value overflows u32"))?;
        out.push(prev);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    #[test]
    fn test_plain_roundtrip() {
        let values = vec![0, 1, 127, 128, 16_384, u32::MAX];
        let mut buf = Vec::new();
        encode(&values, &mut buf);

        let mut pos = 0;
        let mut decoded = Vec::new();
        decode(&buf, &mut pos, values.len(), &mut decoded).unwrap();
        assert_eq!(decoded, values);
        assert_eq!(pos, buf.len());
    }

    #[test]
    fn test_delta_roundtrip_random() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut values: Vec<u32> = (0..5_000).map(|_| rng.random_range(0..1_000_000)).collect();
        values.sort_unstable();

        let mut buf = Vec::new();
        encode_deltas(&values, 0, &mut buf).unwrap();
        assert!(buf.len() < values.len() * 4);

        let mut pos = 0;
        let mut decoded = Vec::new();
        decode_deltas(&buf, &mut pos, values.len(), 0, &mut decoded).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_delta_with_base() {
        let mut buf = Vec::new();
        encode_deltas(&[105, 110, 111], 100, &mut buf).unwrap();
        assert_eq!(buf, vec![5, 5, 1]);

        let mut pos = 0;
        let mut decoded = Vec::new();
        decode_deltas(&buf, &mut pos, 3, 100, &mut decoded).unwrap();
        assert_eq!(decoded, vec![105, 110, 111]);
    }

    #[test]
    fn test_unsorted_rejected() {
        let mut buf = Vec::new();
        assert!(encode_deltas(&[5, 3], 0, &mut buf).is_err());
        assert!(encode_deltas(&[5], 6, &mut buf).is_err());
    }

    #[test]
    fn test_truncated_block() {
        let mut buf = Vec::new();
        encode(&[300, 400], &mut buf);
        buf.pop();

        let mut pos = 0;
        let mut decoded = Vec::new();
        assert!(decode(&buf, &mut pos, 2, &mut decoded).is_err());
    }
}
