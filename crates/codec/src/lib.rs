//! Wire framing for the RIST transport engine.
//!
//! A packet on the wire is a GRE-style envelope (absent in the "simple"
//! profile) followed, for data packets, by a compact RTP header and then
//! the payload bytes. Encoding and decoding are pure and total: decoding
//! never panics and never returns a partially parsed packet.

pub mod compression;
pub mod crypto;
pub mod header;
pub mod ntp;
pub mod payload;

use std::array::TryFromSliceError;

#[derive(Debug)]
pub enum Error {
    /// Buffer shorter than the field layout requires.
    Truncated,
    /// A reserved bit or field carried a non-zero value.
    ReservedBitsSet,
    /// `payload_type` did not match any known variant.
    UnknownPayloadType(u8),
    /// AEAD/CTR keystream application failed or key material was invalid.
    DecryptFailed,
    /// LZ4 frame was corrupt or its declared size was absurd.
    Decompress,
    TryFromSliceError(TryFromSliceError),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<TryFromSliceError> for Error {
    fn from(value: TryFromSliceError) -> Self {
        Self::TryFromSliceError(value)
    }
}
