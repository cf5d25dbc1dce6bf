#![doc = include_str!("../README.md")]

pub mod client;
pub mod correlator;
pub mod error;

pub use client::TranscribeClient;
pub use correlator::Correlator;
pub use error::ClientError;
