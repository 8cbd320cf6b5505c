//! StreamVByte coding of u32 sequences.
//!
//! Values are grouped by four. Each group gets one control byte holding four
//! 2-bit length codes (`bytes - 1`, lowest bits first) and the values
//! themselves go, little-endian and trimmed to their length, into a separate
//! data stream. Keeping control and data apart lets the decoder compute every
//! length from a table lookup instead of testing continuation bits.
//!
//! ```text
//! values  : 1  300  70000  5
//! control : 0b00_10_01_00
//! data    : 01 | 2c 01 | 70 11 01 | 05
//! ```

use crate::error::{FtsError, Result};
use crate::util::binary::{BinaryReader, BinaryWriter};

const fn build_length_table() -> [[u8; 4]; 256] {
    let mut table = [[0u8; 4]; 256];
    let mut control = 0;
    while control < 256 {
        let mut i = 0;
        while i < 4 {
            table[control][i] = ((control >> (2 * i)) & 0b11) as u8 + 1;
            i += 1;
        }
        control += 1;
    }
    table
}

/// Byte length of each of the four values described by a control byte.
static LENGTHS: [[u8; 4]; 256] = build_length_table();

#[inline]
fn byte_len(value: u32) -> usize {
    match value {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFF_FFFF => 3,
        _ => 4,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamVByte {
    count: u32,
    control: Vec<u8>,
    data: Vec<u8>,
}

impl StreamVByte {
    pub fn encode(values: &[u32]) -> Result<Self> {
        let count = u32::try_from(values.len())
            .map_err(|_| FtsError::invalid_argument("StreamVByte sequence too long"))?;
        let mut control = Vec::with_capacity(values.len().div_ceil(4));
        let mut data = Vec::with_capacity(values.len());

        for group in values.chunks(4) {
            let mut ctrl = 0u8;
            for (i, &value) in group.iter().enumerate() {
                let len = byte_len(value);
                ctrl |= ((len - 1) as u8) << (2 * i);
                data.extend_from_slice(&value.to_le_bytes()[..len]);
            }
            control.push(ctrl);
        }

        Ok(StreamVByte {
            count,
            control,
            data,
        })
    }

    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn size_bytes(&self) -> usize {
        self.control.len() + self.data.len()
    }

    /// Decode every value into `out`.
    pub fn decode_into(&self, out: &mut Vec<u32>) {
        out.clear();
        out.reserve(self.count as usize);

        let mut remaining = self.count as usize;
        let mut pos = 0usize;
        for &ctrl in &self.control {
            let lengths = &LENGTHS[ctrl as usize];
            let in_group = remaining.min(4);
            for &len in &lengths[..in_group] {
                let len = len as usize;
                let mut bytes = [0u8; 4];
                bytes[..len].copy_from_slice(&self.data[pos..pos + len]);
                out.push(u32::from_le_bytes(bytes));
                pos += len;
            }
            remaining -= in_group;
        }
    }

    pub fn decode(&self) -> Vec<u32> {
        let mut out = Vec::with_capacity(self.count as usize);
        self.decode_into(&mut out);
        out
    }

    pub fn write_to(&self, writer: &mut BinaryWriter) -> Result<()> {
        writer.write_u32(self.count)?;
        writer.write_bytes(&self.control)?;
        writer.write_bytes(&self.data)?;
        Ok(())
    }

    /// Read an encoded sequence, checking that the control stream accounts
    /// for exactly the bytes of the data stream.
    pub fn read_from(reader: &mut BinaryReader<'_>) -> Result<Self> {
        let count = reader.read_u32()?;
        let control = reader.read_bytes()?.to_vec();
        let data = reader.read_bytes()?.to_vec();

        if control.len() != (count as usize).div_ceil(4) {
            return Err(FtsError::corrupt(format!(
                "StreamVByte control stream has {} bytes for {count} values",
                control.len()
            )));
        }

        let mut remaining = count as usize;
        let mut expected = 0usize;
        for &ctrl in &control {
            let in_group = remaining.min(4);
            expected += LENGTHS[ctrl as usize][..in_group]
                .iter()
                .map(|&l| l as usize)
                .sum::<usize>();
            remaining -= in_group;
        }
        if expected != data.len() {
            return Err(FtsError::corrupt(format!(
                "StreamVByte data stream has {} bytes, control stream describes {expected}",
                data.len()
            )));
        }

        Ok(StreamVByte {
            count,
            control,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    #[test]
    fn test_layout() {
        let svb = StreamVByte::encode(&[1, 300, 70_000, 5]).unwrap();
        assert_eq!(svb.control, vec![0b00_10_01_00]);
        assert_eq!(svb.data, vec![0x01, 0x2c, 0x01, 0x70, 0x11, 0x01, 0x05]);
    }

    #[test]
    fn test_roundtrip_partial_groups() {
        for n in 0..10u32 {
            let values: Vec<u32> = (0..n).map(|i| i * 1_000_003).collect();
            let svb = StreamVByte::encode(&values).unwrap();
            assert_eq!(svb.decode(), values);
        }
    }

    #[test]
    fn test_random_roundtrip() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut values: Vec<u32> = (0..10_000).map(|_| rng.random_range(1..20)).collect();
        values.extend((0..100).map(|_| rng.random::<u32>()));
        values.push(u32::MAX);

        let svb = StreamVByte::encode(&values).unwrap();
        assert_eq!(svb.decode(), values);
        // Small frequencies take about 1.25 bytes each.
        assert!(svb.size_bytes() < values.len() * 2);
    }

    #[test]
    fn test_serialization_and_validation() {
        let values = vec![7, 1, 65_536, 2, 3];
        let svb = StreamVByte::encode(&values).unwrap();

        let mut writer = BinaryWriter::new();
        svb.write_to(&mut writer).unwrap();
        let bytes = writer.into_inner();

        let mut reader = BinaryReader::new(&bytes);
        let loaded = StreamVByte::read_from(&mut reader).unwrap();
        assert_eq!(loaded.decode(), values);

        let mut bad = svb.clone();
        bad.data.pop();
        let mut writer = BinaryWriter::new();
        bad.write_to(&mut writer).unwrap();
        let bytes = writer.into_inner();
        assert!(StreamVByte::read_from(&mut BinaryReader::new(&bytes)).is_err());
    }
}
