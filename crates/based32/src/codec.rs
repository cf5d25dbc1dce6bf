//! The transcription codec: prefix handling, check wrapping and the
//! [`Codec`] assembly.
//!
//! The encoding pipeline is `payload -> [check len | payload | check] ->
//! base32 -> trim leading 'q' -> prepend HRP`; decoding runs it backwards
//! and verifies the check before releasing any payload bytes.

use crate::base32;
use crate::check::{MAX_CHECK_LEN, MIN_CHECK_LEN, check_len, cut_point, make_check};
use crate::error::{CodecError, Result};
use std::sync::LazyLock;

/// The human-readable prefix every transcription string begins with. It
/// identifies the format to a human reader and doubles as a validity
/// check: a string without it is rejected before any decoding work.
pub const HRP: &str = "QNTRL";

/// Boundary for anything that can transcribe bytes to and from the
/// human-readable format.
///
/// Consumers that only need the two operations should depend on this trait
/// rather than on [`Codec`], so the concrete assembly can change without
/// touching them.
pub trait Transcribe {
    /// Encodes an arbitrary-length byte payload into a transcription
    /// string.
    fn encode(&self, input: &[u8]) -> Result<String>;

    /// Decodes a transcription string, verifying its check, and returns
    /// the original payload bytes.
    fn decode(&self, input: &str) -> Result<Vec<u8>>;
}

type EncodeFn = Box<dyn Fn(&[u8]) -> Result<String> + Send + Sync>;
type DecodeFn = Box<dyn Fn(&str) -> Result<Vec<u8>> + Send + Sync>;

/// A transcription codec assembled from its component functions.
///
/// The canonical instance is available through [`codec`]; the builder
/// exists so alternative charsets or check functions can be assembled
/// without a new type, at the cost of a construction-time contract: a
/// codec missing either function is a programmer error and panics in
/// [`CodecBuilder::build`], before any traffic is served.
pub struct Codec {
    name: &'static str,
    hrp: &'static str,
    encoder: EncodeFn,
    decoder: DecodeFn,
}

impl Codec {
    /// Starts assembling a codec with the given name and human-readable
    /// prefix.
    pub fn builder(name: &'static str, hrp: &'static str) -> CodecBuilder {
        CodecBuilder {
            name,
            hrp,
            encoder: None,
            decoder: None,
        }
    }

    /// The human-readable name of this codec.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The prefix this codec emits and expects.
    pub fn hrp(&self) -> &'static str {
        self.hrp
    }
}

impl Transcribe for Codec {
    fn encode(&self, input: &[u8]) -> Result<String> {
        (self.encoder)(input)
    }

    fn decode(&self, input: &str) -> Result<Vec<u8>> {
        (self.decoder)(input)
    }
}

/// Builder for [`Codec`].
pub struct CodecBuilder {
    name: &'static str,
    hrp: &'static str,
    encoder: Option<EncodeFn>,
    decoder: Option<DecodeFn>,
}

impl CodecBuilder {
    /// Installs the encoding function.
    pub fn encoder(
        mut self,
        f: impl Fn(&[u8]) -> Result<String> + Send + Sync + 'static,
    ) -> Self {
        self.encoder = Some(Box::new(f));
        self
    }

    /// Installs the decoding function.
    pub fn decoder(
        mut self,
        f: impl Fn(&str) -> Result<Vec<u8>> + Send + Sync + 'static,
    ) -> Self {
        self.decoder = Some(Box::new(f));
        self
    }

    /// Finishes the assembly.
    ///
    /// # Panics
    ///
    /// Panics if either the encoder or the decoder is missing. An
    /// incomplete codec cannot do anything useful, so this fails fast at
    /// construction rather than surfacing as a runtime error mid-request.
    pub fn build(self) -> Codec {
        let encoder = self
            .encoder
            .expect("programmer error: codec does not have an encoder installed");
        let decoder = self
            .decoder
            .expect("programmer error: codec does not have a decoder installed");

        Codec {
            name: self.name,
            hrp: self.hrp,
            encoder,
            decoder,
        }
    }
}

static CODEC: LazyLock<Codec> = LazyLock::new(|| {
    Codec::builder("Base32Check", HRP)
        .encoder(encode_bytes)
        .decoder(decode_string)
        .build()
});

/// Returns the canonical transcription codec.
pub fn codec() -> &'static Codec {
    &CODEC
}

/// Encodes `input` with the canonical codec.
pub fn encode(input: &[u8]) -> Result<String> {
    codec().encode(input)
}

/// Decodes `input` with the canonical codec.
pub fn decode(input: &str) -> Result<Vec<u8>> {
    codec().decode(input)
}

fn encode_bytes(input: &[u8]) -> Result<String> {
    if input.is_empty() {
        return Err(CodecError::ZeroLength);
    }

    let check_len = check_len(input.len());

    let mut bytes = Vec::with_capacity(1 + input.len() + check_len);
    bytes.push(check_len as u8);
    bytes.extend_from_slice(input);
    bytes.extend_from_slice(&make_check(input, check_len));

    let encoded = base32::encode(&bytes);

    // The check-length byte never uses its top five bits, so the first
    // character is always 'q' and can be omitted; the decoder re-adds it.
    debug_assert!(encoded.starts_with('q'));

    Ok(format!("{}{}", HRP, &encoded[1..]))
}

/// Verifies the check carried in decoded data.
///
/// `data` is the full decoded buffer: check-length byte, payload, check.
fn check_data(data: &[u8]) -> Result<()> {
    if data.is_empty() {
        return Err(CodecError::ZeroLength);
    }

    // The check length is carried in the first byte so the data can be cut
    // in the right place before the integrity comparison.
    let check_len = data[0] as usize;
    if !(MIN_CHECK_LEN..=MAX_CHECK_LEN).contains(&check_len) || data.len() < check_len + 2 {
        return Err(CodecError::CheckTooShort);
    }

    let cut = cut_point(data.len(), check_len);
    let (payload, found) = (&data[1..=cut], &data[cut + 1..]);

    let computed = make_check(payload, check_len);
    if found != computed {
        return Err(CodecError::CheckFailed {
            found: found.to_vec(),
            computed,
        });
    }

    Ok(())
}

fn decode_string(input: &str) -> Result<Vec<u8>> {
    // The prefix is a validity gate: without it the rest of the string is
    // not worth decoding.
    let Some(trimmed) = input.strip_prefix(HRP) else {
        return Err(CodecError::IncorrectPrefix { expected: HRP });
    };

    // Re-add the always-zero leading character dropped by the encoder.
    let data = base32::decode(&format!("q{trimmed}"))?;

    check_data(&data)?;

    let check_len = data[0] as usize;
    Ok(data[1..=cut_point(data.len(), check_len)].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic patterned payload so failures print something
    /// recognizable.
    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 37 + len * 11) as u8).collect()
    }

    #[test]
    fn roundtrip_all_lengths() {
        for len in 1..=80 {
            let bytes = payload(len);
            let encoded = encode(&bytes).unwrap();
            assert!(encoded.starts_with(HRP), "missing prefix in {encoded}");
            let decoded = decode(&encoded).unwrap();
            assert_eq!(decoded, bytes, "roundtrip failed for length {len}");
        }
    }

    #[test]
    fn encode_rejects_empty_payload() {
        assert_eq!(encode(&[]).unwrap_err(), CodecError::ZeroLength);
    }

    #[test]
    fn single_character_corruption_fails_the_check() {
        let bytes = payload(30);
        let encoded = encode(&bytes).unwrap();
        let data = &encoded[HRP.len()..];

        // A 30 byte payload (4 byte check) occupies bits 8..248 of the
        // decoded stream, which is characters 2..=48 counting the implicit
        // leading 'q', or 1..=47 of the transmitted data section.
        // Substituting any one of those characters corrupts only payload
        // bits.
        for index in 1..=47 {
            let original = data.as_bytes()[index];
            let substitute = if original == b'q' { b'p' } else { b'q' };

            let mut corrupted = data.as_bytes().to_vec();
            corrupted[index] = substitute;
            let corrupted = format!("{HRP}{}", String::from_utf8(corrupted).unwrap());

            match decode(&corrupted) {
                Err(CodecError::CheckFailed { .. }) => {}
                other => panic!("index {index}: expected check failure, got {other:?}"),
            }
        }
    }

    #[test]
    fn missing_prefix_is_rejected_before_decoding() {
        let encoded = encode(&payload(8)).unwrap();
        let stripped = &encoded[HRP.len()..];

        assert_eq!(
            decode(stripped).unwrap_err(),
            CodecError::IncorrectPrefix { expected: HRP },
        );
        // Case matters: the prefix is part of the format.
        assert_eq!(
            decode(&encoded.to_lowercase()).unwrap_err(),
            CodecError::IncorrectPrefix { expected: HRP },
        );
    }

    #[test]
    fn truncated_check_is_rejected() {
        // A hand-built 5 byte group claiming a 6 byte check: too short to
        // carry it.
        let bogus = crate::base32::encode(&[6, 0, 0, 0, 0]);
        let bogus = format!("{HRP}{}", &bogus[1..]);
        assert_eq!(decode(&bogus).unwrap_err(), CodecError::CheckTooShort);

        // A claimed check length of zero is equally invalid.
        let bogus = crate::base32::encode(&[0, 0, 0, 0, 0]);
        let bogus = format!("{HRP}{}", &bogus[1..]);
        assert_eq!(decode(&bogus).unwrap_err(), CodecError::CheckTooShort);
    }

    #[test]
    fn invalid_character_is_reported_with_position() {
        let encoded = encode(&payload(16)).unwrap();
        let mut corrupted = encoded.into_bytes();
        let last = corrupted.len() - 1;
        corrupted[last] = b'b';
        let corrupted = String::from_utf8(corrupted).unwrap();

        assert!(matches!(
            decode(&corrupted).unwrap_err(),
            CodecError::InvalidCharacter { byte: b'b', .. },
        ));
    }

    #[test]
    #[should_panic(expected = "programmer error")]
    fn incomplete_codec_panics_at_construction() {
        let _ = Codec::builder("Broken", HRP)
            .encoder(encode_bytes)
            .build();
    }
}
