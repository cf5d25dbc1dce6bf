use crate::server::{pool::manager::PoolCounters, streaming::request::WorkRequest};
use based32::Transcribe;
use based32_tonic_core::{decode_response, encode_response};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::mpsc;

/// Worker task responsible for processing [`WorkRequest`] messages.
///
/// Each worker listens on its own MPSC channel and processes requests
/// until a shutdown signal is received. A worker never touches another
/// worker's channels, so the pool needs no locking.
///
/// Codec failures are carried inside the response value - a bad payload
/// produces a typed error code for its caller and the worker moves on to
/// the next request. Nothing a client sends can take a worker down.
///
/// This function is designed to be spawned as a Tokio task and runs in an
/// infinite loop until explicitly shut down.
pub async fn worker_loop(
    worker_id: usize,
    mut rx: mpsc::Receiver<WorkRequest>,
    codec: &'static (dyn Transcribe + Send + Sync),
    counters: Arc<PoolCounters>,
) {
    tracing::trace!("Worker {worker_id} started");

    while let Some(work) = rx.recv().await {
        match work {
            WorkRequest::Encode { request, reply } => {
                counters.encode_calls.fetch_add(1, Ordering::Relaxed);

                let result = codec.encode(&request.data);
                if reply
                    .send(encode_response(request.id_nonce, result))
                    .is_err()
                {
                    tracing::debug!("Worker {worker_id} encode reply receiver dropped");
                }
            }
            WorkRequest::Decode { request, reply } => {
                counters.decode_calls.fetch_add(1, Ordering::Relaxed);

                let result = codec.decode(&request.encoded_string);
                if reply
                    .send(decode_response(request.id_nonce, result))
                    .is_err()
                {
                    tracing::debug!("Worker {worker_id} decode reply receiver dropped");
                }
            }
            WorkRequest::Shutdown { response } => {
                tracing::debug!("Worker {worker_id} received shutdown signal");

                if response.send(()).is_err() {
                    tracing::error!("Worker {worker_id} failed to acknowledge shutdown");
                }
                break;
            }
        }
    }

    tracing::trace!("Worker {worker_id} stopped");
}
