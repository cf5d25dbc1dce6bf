//! Error types for the transcription service.
//!
//! This module defines the central `Error` enum, which captures the
//! recoverable and reportable error cases within the service runtime. It
//! implements `From<Error>` for `tonic::Status` to enable gRPC error
//! propagation with appropriate status codes.
//!
//! Codec validation failures are deliberately absent: those travel
//! in-band as [`TranscribeError`](crate::proto::TranscribeError) codes
//! inside responses and never terminate a stream.
//!
//! ## Error Cases
//! - `ChannelError`: An internal communication failure between tasks or
//!   workers.
//! - `StreamReceive`: The inbound half of a stream failed mid-flight.
//! - `RequestCancelled`: The client abandoned the request mid-flight.
//! - `InvalidRequest`: The client request was malformed.
//! - `ServiceShutdown`: A request arrived while the service was shutting
//!   down.

use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the transcription service runtime.
#[derive(Clone, thiserror::Error, Debug)]
pub enum Error {
    /// Internal channel send/receive failure (e.g., closed or full channel).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// Receiving from a bidirectional stream failed.
    #[error("Stream receive failed: {context}")]
    StreamReceive { context: String },

    /// The client aborted the request.
    #[error("Request cancelled by client")]
    RequestCancelled,

    /// The client request was invalid or exceeded constraints.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::ChannelError { context } => {
                Status::internal(format!("Channel error: {}", context))
            }
            Error::StreamReceive { context } => {
                Status::internal(format!("Stream receive failed: {}", context))
            }
            Error::RequestCancelled => Status::cancelled("Request was cancelled"),
            Error::InvalidRequest { reason } => Status::invalid_argument(reason),
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        }
    }
}
