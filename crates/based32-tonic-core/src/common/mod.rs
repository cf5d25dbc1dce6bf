//! Types shared by the server and client sides of the transcription
//! service.
//!
//! ## Structure
//!
//! - [`error`](self) - the service [`Error`] enum and its mapping onto
//!   `tonic::Status`.
//! - [`types`](self) - nonce access ([`Tagged`]) and tagged-response
//!   constructors that preserve the oneof exclusivity invariant.

mod error;
mod types;

pub use error::*;
pub use types::*;
