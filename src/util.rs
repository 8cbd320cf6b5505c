//! Shared utility modules used across the engines.

pub mod binary;
pub mod cancel;
pub mod simd;
pub mod varint;
