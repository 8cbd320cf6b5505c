//! Variable-length integer encoding utilities.
//!
//! Seven payload bits per byte, least significant group first, with the high
//! bit set on every byte except the last. This is the VByte code used by the
//! balanced posting blocks.

use crate::error::{FtsError, Result};

/// Append a u64 value to `out` using variable-length encoding.
pub fn write_u64(out: &mut Vec<u8>, value: u64) {
    let mut val = value;

    loop {
        let mut byte = (val & 0x7F) as u8;
        val >>= 7;

        if val != 0 {
            byte |= 0x80; // Set continuation bit
        }

        out.push(byte);

        if val == 0 {
            break;
        }
    }
}

/// Encode a u64 value using variable-length encoding.
pub fn encode_u64(value: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(10);
    write_u64(&mut bytes, value);
    bytes
}

/// Decode a u64 value from variable-length encoding.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_u64(bytes: &[u8]) -> Result<(u64, usize)> {
    let mut result = 0u64;
    let mut shift = 0;
    let mut bytes_read = 0;

    for &byte in bytes {
        bytes_read += 1;

        if shift >= 64 {
            return Err(FtsError::corrupt("VarInt overflow"));
        }

        result |= ((byte & 0x7F) as u64) << shift;

        if (byte & 0x80) == 0 {
            return Ok((result, bytes_read));
        }

        shift += 7;
    }

    Err(FtsError::corrupt("Incomplete VarInt"))
}

/// Append a u32 value to `out`.
#[inline]
pub fn write_u32(out: &mut Vec<u8>, value: u32) {
    write_u64(out, value as u64);
}

/// Read a u32 value at `*pos`, advancing `pos` past it.
#[inline]
pub fn read_u32(bytes: &[u8], pos: &mut usize) -> Result<u32> {
    let tail = bytes
        .get(*pos..)
        .ok_or_else(|| FtsError::corrupt("VarInt offset out of range"))?;
    let (value, read) = decode_u64(tail)?;
    let value =
        u32::try_from(value).map_err(|_| FtsError::corrupt("VarInt does not fit in u32"))?;
    *pos += read;
    Ok(value)
}
