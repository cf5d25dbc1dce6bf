#![doc = include_str!("../README.md")]

mod base32;
mod check;
mod codec;
mod error;

pub use codec::{Codec, CodecBuilder, HRP, Transcribe, codec, decode, encode};
pub use error::{CodecError, Result};
