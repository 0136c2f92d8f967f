//! Pixel extraction and the binary sample-array codec.

pub mod codec;
pub mod extract;

pub use codec::{decode_samples, encode_samples, CodecError};
pub use extract::{extract, truncate_samples, ExtractError};
