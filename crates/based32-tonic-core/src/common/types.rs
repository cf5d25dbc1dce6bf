//! Nonce access and tagged-response construction.
//!
//! Every message on a transcription stream carries a caller-assigned
//! correlation nonce. The [`Tagged`] trait gives the correlator and the
//! dispatcher a uniform way to read and stamp it without knowing which of
//! the four message types they are holding.
//!
//! Responses are sum types on the wire (`oneof`): a response carries
//! either a success payload or a typed error code, never both and never
//! neither. The constructors here are the only way the service builds
//! responses, so that exclusivity holds by construction.

use crate::proto::{
    DecodeRequest, DecodeResponse, EncodeRequest, EncodeResponse, TranscribeError,
    decode_response::Decoded, encode_response::Encoded,
};
use based32::CodecError;

/// Access to the correlation nonce carried by every stream message.
pub trait Tagged {
    /// The nonce stamped on this message.
    fn nonce(&self) -> u64;

    /// Stamps a nonce onto this message.
    fn set_nonce(&mut self, nonce: u64);
}

macro_rules! impl_tagged {
    ($($ty:ty),* $(,)?) => {
        $(impl Tagged for $ty {
            fn nonce(&self) -> u64 {
                self.id_nonce
            }

            fn set_nonce(&mut self, nonce: u64) {
                self.id_nonce = nonce;
            }
        })*
    };
}

impl_tagged!(EncodeRequest, EncodeResponse, DecodeRequest, DecodeResponse);

impl From<&CodecError> for TranscribeError {
    fn from(err: &CodecError) -> Self {
        match err {
            CodecError::ZeroLength => Self::ZeroLength,
            CodecError::CheckTooShort => Self::CheckTooShort,
            CodecError::CheckFailed { .. } => Self::CheckFailed,
            CodecError::IncorrectPrefix { .. } => Self::IncorrectPrefix,
            // A corrupt data section means the transcription cannot be
            // trusted, which callers observe as a failed check.
            CodecError::InvalidCharacter { .. } | CodecError::InvalidLength { .. } => {
                Self::CheckFailed
            }
        }
    }
}

/// Builds the tagged response for an encode call.
pub fn encode_response(id_nonce: u64, result: Result<String, CodecError>) -> EncodeResponse {
    let encoded = match result {
        Ok(encoded_string) => Encoded::EncodedString(encoded_string),
        Err(err) => Encoded::Error(TranscribeError::from(&err) as i32),
    };

    EncodeResponse {
        id_nonce,
        encoded: Some(encoded),
    }
}

/// Builds the tagged response for a decode call.
pub fn decode_response(id_nonce: u64, result: Result<Vec<u8>, CodecError>) -> DecodeResponse {
    let decoded = match result {
        Ok(data) => Decoded::Data(data.into()),
        Err(err) => Decoded::Error(TranscribeError::from(&err) as i32),
    };

    DecodeResponse {
        id_nonce,
        decoded: Some(decoded),
    }
}
