//! Asynchronous worker pool for transcription work.
//!
//! This module defines the [`WorkerPool`] struct, which manages a set of
//! asynchronous workers responsible for processing [`WorkRequest`]s. It
//! distributes work using round-robin scheduling and supports coordinated
//! shutdown via a shared [`CancellationToken`].
//!
//! Each worker listens on its own bounded [`mpsc::Receiver`] and executes
//! requests independently. This model allows parallelism without
//! contention or locking.

use crate::server::{pool::worker::worker_loop, streaming::request::WorkRequest};
use based32::Transcribe;
use based32_tonic_core::Error;
use core::time::Duration;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::{
    sync::{mpsc, oneshot},
    time::timeout,
};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Aggregate call counters shared by every worker in a pool.
#[derive(Debug, Default)]
pub struct PoolCounters {
    pub encode_calls: AtomicU64,
    pub decode_calls: AtomicU64,
}

/// A snapshot of a pool's aggregate counters, reported at shutdown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolReport {
    pub encode_calls: u64,
    pub decode_calls: u64,
}

/// A cooperative pool of asynchronous workers that process
/// [`WorkRequest`]s.
///
/// Workers receive requests over bounded MPSC channels. Work is
/// distributed in round-robin fashion and the pool supports graceful,
/// cancellable shutdown.
pub struct WorkerPool {
    workers: Vec<mpsc::Sender<WorkRequest>>,
    next_worker: AtomicUsize,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
    counters: Arc<PoolCounters>,
}

impl WorkerPool {
    /// Spawns `num_workers` worker tasks and returns the pool managing
    /// them.
    ///
    /// Each worker gets its own bounded channel of depth `buffer`. The
    /// dispatcher relays one request per in-flight call, so a depth of one
    /// keeps at-most-one queued request per worker; deeper buffers trade
    /// backpressure responsiveness for queueing.
    pub fn spawn(
        num_workers: usize,
        buffer: usize,
        shutdown_timeout: Duration,
        codec: &'static (dyn Transcribe + Send + Sync),
    ) -> Self {
        let counters = Arc::new(PoolCounters::default());
        let mut workers = Vec::with_capacity(num_workers);

        for worker_id in 0..num_workers {
            let (tx, rx) = mpsc::channel(buffer);
            workers.push(tx);

            tokio::spawn(worker_loop(worker_id, rx, codec, Arc::clone(&counters)));
        }

        Self {
            workers,
            next_worker: AtomicUsize::new(0),
            shutdown_token: CancellationToken::new(),
            shutdown_timeout,
            counters,
        }
    }

    /// Returns the index of the next worker to receive work (round-robin).
    ///
    /// Modulo arithmetic keeps the index strictly within
    /// `[0, num_workers)`; the counter itself only ever advances. Uses a
    /// relaxed atomic increment to minimize contention.
    pub fn next_worker_index(&self) -> usize {
        self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len()
    }

    /// Sends a [`WorkRequest`] to the given worker.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The service is shutting down (`shutdown_token` was cancelled).
    /// - The worker's channel is closed.
    pub async fn send_to(&self, worker_idx: usize, request: WorkRequest) -> Result<(), Error> {
        if self.shutdown_token.is_cancelled() {
            return Err(Error::ServiceShutdown);
        }

        match self.workers[worker_idx].send(request).await {
            Ok(()) => Ok(()),
            Err(_) => Err(Error::ChannelError {
                context: format!("Worker {worker_idx} channel closed"),
            }),
        }
    }

    /// Sends a [`WorkRequest`] to the next worker in round-robin order.
    pub async fn send_to_next_worker(&self, request: WorkRequest) -> Result<(), Error> {
        self.send_to(self.next_worker_index(), request).await
    }

    /// Resolves when the pool begins shutting down.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.shutdown_token.cancelled()
    }

    /// Whether shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// A snapshot of the aggregate encode/decode call counters.
    pub fn report(&self) -> PoolReport {
        PoolReport {
            encode_calls: self.counters.encode_calls.load(Ordering::Relaxed),
            decode_calls: self.counters.decode_calls.load(Ordering::Relaxed),
        }
    }

    /// Gracefully shuts down all workers in the pool.
    ///
    /// - Cancels the shared [`CancellationToken`] to prevent new work.
    /// - Sends a [`WorkRequest::Shutdown`] to each worker; the per-worker
    ///   FIFO guarantees any already-queued work drains first.
    /// - Waits (up to the configured timeout per worker) for shutdown
    ///   acknowledgements.
    ///
    /// Returns the aggregate call counts processed over the pool's
    /// lifetime.
    pub async fn shutdown(&self) -> Result<PoolReport, Error> {
        // === Phase 1: Stop accepting new requests ===
        tracing::info!("Refusing new requests");
        self.shutdown_token.cancel();

        // === Phase 2: Notify workers to shut down ===
        tracing::debug!("Notifying all workers to shut down");
        let mut shutdown_handles = Vec::with_capacity(self.workers.len());

        for (i, worker) in self.workers.iter().enumerate() {
            let (tx, rx) = oneshot::channel();
            if let Err(e) = worker.send(WorkRequest::Shutdown { response: tx }).await {
                tracing::error!("Failed to send shutdown to worker {i}: {e}");
            } else {
                shutdown_handles.push((i, rx));
            }
        }

        // === Phase 3: Wait for acknowledgements ===
        tracing::debug!(
            "Waiting for up to {:?} per worker for shutdown acknowledgements",
            self.shutdown_timeout
        );

        let shutdown_timeout = self.shutdown_timeout;
        let timeout_futures = shutdown_handles.into_iter().map(|(i, rx)| async move {
            match timeout(shutdown_timeout, rx).await {
                Ok(Ok(())) => {
                    tracing::trace!("Worker {i} shutdown acknowledged");
                }
                Ok(Err(e)) => {
                    tracing::error!("Worker {i} returned error: {e}");
                }
                Err(_) => {
                    tracing::warn!("Worker {i} shutdown timed out");
                }
            }
        });

        futures::future::join_all(timeout_futures).await;

        let report = self.report();
        tracing::info!(
            "Worker pool shutdown complete: processed {} encodes and {} decodes",
            report.encode_calls,
            report.decode_calls
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use based32_tonic_core::proto::{
        DecodeRequest, EncodeRequest, encode_response::Encoded,
    };

    fn test_pool(num_workers: usize) -> Arc<WorkerPool> {
        Arc::new(WorkerPool::spawn(
            num_workers,
            1,
            Duration::from_secs(3),
            based32::codec(),
        ))
    }

    #[tokio::test]
    async fn round_robin_wraps_with_modulo() {
        let pool = test_pool(3);
        let picks: Vec<usize> = (0..7).map(|_| pool.next_worker_index()).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[tokio::test]
    async fn all_dispatched_work_completes_and_is_counted() {
        let pool = test_pool(4);
        let mut replies = Vec::new();

        for nonce in 0..64_u64 {
            let (reply, rx) = oneshot::channel();
            let request = EncodeRequest {
                id_nonce: nonce,
                data: vec![nonce as u8 + 1; (nonce as usize % 13) + 1].into(),
            };
            pool.send_to_next_worker(WorkRequest::Encode { request, reply })
                .await
                .unwrap();
            replies.push((nonce, rx));
        }

        let mut encoded = Vec::new();
        for (nonce, rx) in replies {
            let response = rx.await.unwrap();
            assert_eq!(response.id_nonce, nonce);
            match response.encoded {
                Some(Encoded::EncodedString(s)) => encoded.push((nonce, s)),
                other => panic!("nonce {nonce}: expected success, got {other:?}"),
            }
        }

        for (nonce, s) in encoded {
            let (reply, rx) = oneshot::channel();
            let request = DecodeRequest {
                id_nonce: nonce,
                encoded_string: s,
            };
            pool.send_to_next_worker(WorkRequest::Decode { request, reply })
                .await
                .unwrap();
            let response = rx.await.unwrap();
            assert_eq!(response.id_nonce, nonce);
        }

        let report = pool.shutdown().await.unwrap();
        assert_eq!(
            report,
            PoolReport {
                encode_calls: 64,
                decode_calls: 64,
            }
        );
    }

    #[tokio::test]
    async fn codec_failures_stay_in_band_and_workers_survive() {
        let pool = test_pool(1);

        let (reply, rx) = oneshot::channel();
        let request = EncodeRequest {
            id_nonce: 1,
            data: Vec::new().into(),
        };
        pool.send_to_next_worker(WorkRequest::Encode { request, reply })
            .await
            .unwrap();
        let response = rx.await.unwrap();
        assert!(matches!(response.encoded, Some(Encoded::Error(_))));

        // The same worker keeps serving after the failed call.
        let (reply, rx) = oneshot::channel();
        let request = EncodeRequest {
            id_nonce: 2,
            data: vec![1, 2, 3].into(),
        };
        pool.send_to_next_worker(WorkRequest::Encode { request, reply })
            .await
            .unwrap();
        assert!(matches!(
            rx.await.unwrap().encoded,
            Some(Encoded::EncodedString(_))
        ));
    }

    #[tokio::test]
    async fn shutdown_refuses_new_work() {
        let pool = test_pool(2);
        pool.shutdown().await.unwrap();

        let (reply, _rx) = oneshot::channel();
        let request = EncodeRequest {
            id_nonce: 1,
            data: vec![1].into(),
        };
        let err = pool
            .send_to_next_worker(WorkRequest::Encode { request, reply })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ServiceShutdown));
    }
}
