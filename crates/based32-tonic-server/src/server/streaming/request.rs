use based32_tonic_core::proto::{DecodeRequest, DecodeResponse, EncodeRequest, EncodeResponse};
use tokio::sync::oneshot;

/// A message sent from the dispatcher to an individual worker task.
///
/// This enum defines the contract for inter-task communication, enabling
/// the dispatcher to hand a worker one unit of transcription work or
/// request a cooperative shutdown.
///
/// [`WorkRequest`]s are sent over bounded asynchronous channels and are
/// consumed by the worker's main event loop. Every work variant carries a
/// one-shot reply channel: a unit of work produces exactly one tagged
/// response, and dropping the sender is how a worker's failure becomes
/// observable to the relay awaiting it.
#[derive(Debug)]
pub enum WorkRequest {
    /// Encode a raw byte payload into a transcription string.
    Encode {
        request: EncodeRequest,
        reply: oneshot::Sender<EncodeResponse>,
    },

    /// Decode a transcription string back into its payload.
    Decode {
        request: DecodeRequest,
        reply: oneshot::Sender<DecodeResponse>,
    },

    /// Request the worker to shut down gracefully.
    ///
    /// - `response`: One-shot channel for acknowledging that the worker
    ///   has completed its shutdown routine.
    Shutdown { response: oneshot::Sender<()> },
}
