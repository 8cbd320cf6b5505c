//! Little-endian binary buffers with length-prefixed sections.
//!
//! Indexes are serialized into a single in-memory arena by [`BinaryWriter`]
//! and parsed back by [`BinaryReader`], which validates every length against
//! the bytes actually remaining so a truncated or corrupt file surfaces as
//! [`FtsError::Corrupt`] instead of a panic or a huge allocation.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::error::{FtsError, Result};

/// Append-only binary buffer.
#[derive(Debug, Default)]
pub struct BinaryWriter {
    buf: Vec<u8>,
}

impl BinaryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        BinaryWriter {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.buf.write_u8(value)?;
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.buf.write_u16::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.buf.write_u32::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.buf.write_i32::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.buf.write_u64::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        self.buf.write_f32::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.buf.write_f64::<LittleEndian>(value)?;
        Ok(())
    }

    /// Write a u64 length followed by the raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_u64(bytes.len() as u64)?;
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    pub fn write_str(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Write a u64 element count followed by the packed values.
    pub fn write_u16_slice(&mut self, values: &[u16]) -> Result<()> {
        self.write_u64(values.len() as u64)?;
        for &v in values {
            self.buf.write_u16::<LittleEndian>(v)?;
        }
        Ok(())
    }

    /// Write a u64 element count followed by the packed values.
    pub fn write_u32_slice(&mut self, values: &[u32]) -> Result<()> {
        self.write_u64(values.len() as u64)?;
        for &v in values {
            self.buf.write_u32::<LittleEndian>(v)?;
        }
        Ok(())
    }

    /// Write a u64 element count followed by the packed values.
    pub fn write_u64_slice(&mut self, values: &[u64]) -> Result<()> {
        self.write_u64(values.len() as u64)?;
        for &v in values {
            self.buf.write_u64::<LittleEndian>(v)?;
        }
        Ok(())
    }
}

/// Cursor over a serialized buffer.
#[derive(Debug)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BinaryReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        BinaryReader { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos == self.data.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(FtsError::corrupt(format!(
                "unexpected end of data at offset {}: need {} bytes, {} remaining",
                self.pos,
                n,
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_len(&mut self, elem_size: usize) -> Result<usize> {
        let len = self.read_u64()?;
        let len = usize::try_from(len)
            .map_err(|_| FtsError::corrupt(format!("length {len} does not fit in memory")))?;
        match len.checked_mul(elem_size) {
            Some(bytes) if bytes <= self.remaining() => Ok(len),
            _ => Err(FtsError::corrupt(format!(
                "section of {len} elements exceeds remaining {} bytes",
                self.remaining()
            ))),
        }
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(LittleEndian::read_f64(self.take(8)?))
    }

    /// Read a length-prefixed byte section without copying.
    pub fn read_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_len(1)?;
        self.take(len)
    }

    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| FtsError::corrupt(format!("invalid UTF-8 string: {e}")))
    }

    pub fn read_u16_vec(&mut self) -> Result<Vec<u16>> {
        let len = self.read_len(2)?;
        let bytes = self.take(len * 2)?;
        let mut values = vec![0u16; len];
        LittleEndian::read_u16_into(bytes, &mut values);
        Ok(values)
    }

    pub fn read_u32_vec(&mut self) -> Result<Vec<u32>> {
        let len = self.read_len(4)?;
        let bytes = self.take(len * 4)?;
        let mut values = vec![0u32; len];
        LittleEndian::read_u32_into(bytes, &mut values);
        Ok(values)
    }

    pub fn read_u64_vec(&mut self) -> Result<Vec<u64>> {
        let len = self.read_len(8)?;
        let bytes = self.take(len * 8)?;
        let mut values = vec![0u64; len];
        LittleEndian::read_u64_into(bytes, &mut values);
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_sections() {
        let mut writer = BinaryWriter::new();
        writer.write_i32(-7).unwrap();
        writer.write_f64(12.5).unwrap();
        writer.write_str("héllo").unwrap();
        writer.write_u16_slice(&[1, 2, u16::MAX]).unwrap();
        writer.write_u32_slice(&[]).unwrap();
        writer.write_u8(9).unwrap();
        let bytes = writer.into_inner();

        let mut reader = BinaryReader::new(&bytes);
        assert_eq!(reader.read_i32().unwrap(), -7);
        assert_eq!(reader.read_f64().unwrap(), 12.5);
        assert_eq!(reader.read_string().unwrap(), "héllo");
        assert_eq!(reader.read_u16_vec().unwrap(), vec![1, 2, u16::MAX]);
        assert!(reader.read_u32_vec().unwrap().is_empty());
        assert_eq!(reader.read_u8().unwrap(), 9);
        assert!(reader.is_exhausted());
    }

    #[test]
    fn test_truncated_input_is_corrupt() {
        let mut writer = BinaryWriter::new();
        writer.write_u32_slice(&[1, 2, 3, 4]).unwrap();
        let bytes = writer.into_inner();

        let mut reader = BinaryReader::new(&bytes[..bytes.len() - 3]);
        assert!(matches!(reader.read_u32_vec(), Err(FtsError::Corrupt(_))));
    }

    #[test]
    fn test_absurd_length_is_rejected() {
        let mut writer = BinaryWriter::new();
        writer.write_u64(u64::MAX).unwrap();
        let bytes = writer.into_inner();

        let mut reader = BinaryReader::new(&bytes);
        assert!(reader.read_bytes().is_err());
    }
}
