/// Returns the two's-complement mod-256 checksum of `bytes`.
///
/// Appending the result makes the byte sum of the whole frame `0 mod 256`.
///
/// ```
/// use zonelink::checksum;
///
/// assert_eq!(0x9D, checksum(&[0x05, 0x38, 0x00, 0x01, 0x25]));
/// ```
#[must_use]
pub fn checksum(bytes: &[u8]) -> u8 {
    byte_sum(bytes).wrapping_neg()
}

/// Returns whether a frame, including its trailing checksum, sums to zero.
#[must_use]
pub fn is_balanced(frame: &[u8]) -> bool {
    !frame.is_empty() && byte_sum(frame) == 0
}

fn byte_sum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, byte| sum.wrapping_add(*byte))
}
