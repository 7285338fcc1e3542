//! LZ4 frame-per-packet compression.

use crate::Error;

/// # Test
///
/// ```
/// use rist_codec::compression::{compress, decompress};
///
/// let original = b"the quick brown fox jumps over the lazy dog".repeat(4);
/// let packed = compress(&original);
/// let unpacked = decompress(&packed, original.len()).unwrap();
///
/// assert_eq!(unpacked, original);
/// ```
pub fn compress(data: &[u8]) -> Vec<u8> {
    lz4_flex::block::compress_prepend_size(data)
}

pub fn decompress(data: &[u8], max_size: usize) -> Result<Vec<u8>, Error> {
    lz4_flex::block::decompress_size_prepended(data)
        .map_err(|_| Error::Decompress)
        .and_then(|out| {
            if out.len() > max_size {
                Err(Error::Decompress)
            } else {
                Ok(out)
            }
        })
}
