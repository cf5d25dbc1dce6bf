//! Error type for the transcription codec.
//!
//! Every failure a caller can hit while encoding or decoding is enumerated
//! here. Validation failures are ordinary values, never panics: a corrupt
//! string from a human transcriber is an expected input, not a bug.

pub type Result<T> = core::result::Result<T, CodecError>;

/// Unified error type for encoding and decoding transcription strings.
#[derive(Clone, PartialEq, Eq, thiserror::Error, Debug)]
pub enum CodecError {
    /// The payload to encode (or the data to check) was empty.
    #[error("input of zero length is invalid")]
    ZeroLength,

    /// The decoded data is too short to carry its declared check.
    #[error("input is not long enough to have a check value")]
    CheckTooShort,

    /// The recomputed check does not match the transmitted check.
    #[error("checksum failed, check value {found:02x?} calculated checksum {computed:02x?}")]
    CheckFailed {
        found: Vec<u8>,
        computed: Vec<u8>,
    },

    /// The string does not begin with the expected human-readable prefix.
    #[error("incorrect human readable part, expected prefix '{expected}'")]
    IncorrectPrefix { expected: &'static str },

    /// A character outside the base32 charset appeared in the data section.
    #[error("invalid base32 character {byte:#04x} at index {index}")]
    InvalidCharacter { byte: u8, index: usize },

    /// The data section length is not a whole number of 40-bit groups.
    #[error("invalid base32 length: {len}")]
    InvalidLength { len: usize },
}
