//! 32-bit modular sequence-space arithmetic.

/// Signed distance from `from` to `to`, wrapping at 2^32 with the usual
/// half-space convention: results outside `[-2^31, 2^31)` are ambiguous and
/// never occur for sequences that are actually within a reorder window.
///
/// ```
/// use rist_core::seq::signed_distance;
///
/// assert_eq!(signed_distance(10, 12), 2);
/// assert_eq!(signed_distance(12, 10), -2);
/// assert_eq!(signed_distance(u32::MAX, 1), 2);
/// ```
pub fn signed_distance(from: u32, to: u32) -> i64 {
    to.wrapping_sub(from) as i32 as i64
}

pub fn precedes(a: u32, b: u32) -> bool {
    signed_distance(a, b) > 0
}
