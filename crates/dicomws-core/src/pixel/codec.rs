//! Binary codec for pixel sample arrays.
//!
//! Wire format: a single MessagePack array of integers.
//!
//! ```text
//! [array header: fixarray | array16 | array32][int][int]...[int]
//! ```
//!
//! The array header carries the element count, so the frame is self-delimiting.
//! Each integer is written in the smallest MessagePack integer encoding that
//! holds it, which is what makes the format compact for typical 12-bit CT
//! values (most fit in 1–3 bytes instead of 8).  Browsers decode it with any
//! MessagePack library (e.g. `msgpack-lite`).

use thiserror::Error;

/// Errors that can occur while encoding or decoding a sample array.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode samples: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("failed to decode samples: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Encodes `samples` as a MessagePack integer array.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails.
///
/// # Examples
///
/// ```rust
/// use dicomws_core::{decode_samples, encode_samples};
///
/// let bytes = encode_samples(&[1, -2, 300]).unwrap();
/// assert_eq!(decode_samples(&bytes).unwrap(), vec![1, -2, 300]);
/// ```
pub fn encode_samples(samples: &[i64]) -> Result<Vec<u8>, CodecError> {
    Ok(rmp_serde::to_vec(samples)?)
}

/// Decodes a MessagePack integer array produced by [`encode_samples`].
///
/// # Errors
///
/// Returns [`CodecError::Decode`] if `bytes` is not a MessagePack array of integers.
pub fn decode_samples(bytes: &[u8]) -> Result<Vec<i64>, CodecError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
