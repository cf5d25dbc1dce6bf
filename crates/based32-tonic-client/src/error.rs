//! Error types for the transcription client.

use based32_tonic_core::proto::TranscribeError;

/// Unified error type for client-side calls.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    /// Dialing or maintaining the underlying connection failed.
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// Opening a stream was rejected by the server.
    #[error("rpc error: {0}")]
    Rpc(#[from] tonic::Status),

    /// An internal correlator channel is gone; the client was stopped or
    /// its stream loops have exited.
    #[error("channel closed: {context}")]
    ChannelClosed { context: String },

    /// The pending registry expired this request before a response
    /// arrived.
    #[error("request expired before a response arrived")]
    Expired,

    /// The caller's own timeout fired while the request was still
    /// pending.
    #[error("timed out waiting for a response")]
    Timeout,

    /// The server answered with a typed transcription error code.
    #[error("transcription failed: {0:?}")]
    Transcription(TranscribeError),

    /// The response oneof carried neither a payload nor an error code.
    #[error("response carried no payload")]
    EmptyResponse,
}
