/// The block check character of an information message: an additive 8-bit checksum (not a CRC)
///  over everything after the introducing SOH / STX, up to and including the ETX.
///
/// The sum is truncated to 8 bits, then incremented by one, truncating again - so an empty range
///  has a checksum of 1.
pub fn block_check_character(covered: &[u8]) -> u8 {
    covered.iter()
        .fold(0u8, |acc, &b| acc.wrapping_add(b))
        .wrapping_add(1)
}
