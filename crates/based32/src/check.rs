//! Check length arithmetic and check value generation.

/// Shortest check the format can carry.
pub const MIN_CHECK_LEN: usize = 2;

/// Longest check the format can carry.
pub const MAX_CHECK_LEN: usize = 6;

/// Returns the check length for a payload of `length` bytes.
///
/// The length is chosen so that `1 + length + check_len` (check-length
/// byte, payload, check) is a multiple of 5 bytes, which keeps the base32
/// encoding free of padding while guaranteeing at least two check bytes.
/// The result is always in `MIN_CHECK_LEN..=MAX_CHECK_LEN`.
pub fn check_len(length: usize) -> usize {
    // Two is added before the modulus to account for the check-length byte
    // and the minimum single byte of check the complement must preserve.
    let length_mod = (2 + length) % 5;

    5 - length_mod + 1
}

/// Returns the index separating payload from check in decoded data of
/// `length` bytes carrying a check of `check_len` bytes.
pub fn cut_point(length: usize, check_len: usize) -> usize {
    length - check_len - 1
}

/// Computes the check value for `payload`: the BLAKE3-256 hash truncated
/// to `check_len` bytes.
///
/// BLAKE3 is close to CRC32 in throughput at these sizes while giving the
/// full collision resistance of a cryptographic hash, and the 32-byte
/// digest covers every check length the format can ask for.
pub fn make_check(payload: &[u8], check_len: usize) -> Vec<u8> {
    blake3::hash(payload).as_bytes()[..check_len].to_vec()
}
