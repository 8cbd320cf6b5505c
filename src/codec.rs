//! Integer and term codecs used by the index profiles.
//!
//! Every codec round-trips exactly over the domain it accepts:
//!
//! - [`vbyte`]: delta + variable-byte posting blocks (balanced profile)
//! - [`elias_fano`]: succinct monotone doc-id sequences (compact profile)
//! - [`stream_vbyte`]: grouped variable-byte frequencies (compact profile)
//! - [`term_dict`]: FST term → dense id dictionary

pub mod elias_fano;
pub mod stream_vbyte;
pub mod term_dict;
pub mod vbyte;

pub use elias_fano::EliasFano;
pub use stream_vbyte::StreamVByte;
pub use term_dict::TermDictionary;
