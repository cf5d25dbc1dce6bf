//! gRPC service implementation for streaming transcription.
//!
//! This module defines [`TranscriberService`], the concrete implementation
//! of the [`Transcriber`] gRPC service defined in the protobuf
//! specification. It exposes two bidirectional streaming endpoints,
//! `Encode` and `Decode`, each of which feeds a shared pool of worker
//! tasks and streams nonce-tagged responses back as they complete.
//!
//! ## Responsibilities
//!
//! - Spawn and manage the background worker pool.
//! - Hand each accepted stream to its own dispatch loop.
//! - Handle backpressure, per-stream failure isolation, and graceful
//!   shutdown.

use crate::server::{
    config::ServerConfig,
    pool::manager::{PoolReport, WorkerPool},
    streaming::{dispatcher::dispatch_stream, request::WorkRequest},
};
use based32_tonic_core::{
    Error,
    proto::{
        DecodeRequest, DecodeResponse, EncodeRequest, EncodeResponse,
        transcriber_server::Transcriber,
    },
};
use core::pin::Pin;
use core::time::Duration;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tonic::{Request, Response, Status, Streaming};

/// Streaming gRPC service for checksummed transcription.
///
/// Implements the [`Transcriber`] service defined in the protobuf schema.
/// Every request read off a stream is assigned to a worker in round-robin
/// order and relayed off the reading task, so responses complete - and are
/// sent - out of request order. Both RPCs share one worker pool, so the
/// round-robin rotation and the shutdown drain cover encode and decode
/// traffic together.
#[derive(Clone)]
pub struct TranscriberService {
    config: ServerConfig,
    worker_pool: Arc<WorkerPool>,
}

impl TranscriberService {
    /// Creates a new `TranscriberService` and spawns its pool of
    /// background worker tasks.
    ///
    /// Each worker owns its own bounded channel and the canonical
    /// transcription codec; workers communicate with dispatch loops only
    /// through MPSC queues and oneshot replies.
    pub fn new(config: ServerConfig) -> Self {
        let worker_pool = WorkerPool::spawn(
            config.num_workers,
            config.work_request_buffer_size,
            Duration::from_secs(config.shutdown_timeout),
            based32::codec(),
        );

        Self {
            config,
            worker_pool: Arc::new(worker_pool),
        }
    }

    /// Initiates a graceful shutdown of the worker pool.
    ///
    /// Dispatch of new work stops immediately; the call blocks until every
    /// worker has drained its queue and acknowledged termination, then
    /// returns the pool's aggregate call counts.
    pub async fn shutdown(&self) -> Result<PoolReport, Error> {
        self.worker_pool.shutdown().await
    }

    fn spawn_dispatch<Req, Resp>(
        &self,
        inbound: Streaming<Req>,
        make_work: fn(Req, tokio::sync::oneshot::Sender<Resp>) -> WorkRequest,
    ) -> ReceiverStream<Result<Resp, Status>>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
    {
        let (resp_tx, resp_rx) = mpsc::channel(self.config.stream_buffer_size);
        let pool = Arc::clone(&self.worker_pool);

        tokio::spawn(async move {
            if let Err(e) = dispatch_stream(inbound, pool, resp_tx, make_work).await {
                tracing::warn!("stream dispatch ended: {e}");
            }
        });

        ReceiverStream::new(resp_rx)
    }
}

#[tonic::async_trait]
impl Transcriber for TranscriberService {
    type EncodeStream = Pin<Box<dyn Stream<Item = Result<EncodeResponse, Status>> + Send>>;
    type DecodeStream = Pin<Box<dyn Stream<Item = Result<DecodeResponse, Status>> + Send>>;

    /// Handles a stream of encode requests.
    ///
    /// Each inbound payload is handed to the next worker in round-robin
    /// order; its transcription string (or typed error code) is streamed
    /// back tagged with the request's nonce, in completion order.
    async fn encode(
        &self,
        req: Request<Streaming<EncodeRequest>>,
    ) -> Result<Response<Self::EncodeStream>, Status> {
        if self.worker_pool.is_shutting_down() {
            return Err(Error::ServiceShutdown.into());
        }

        let stream = self.spawn_dispatch(req.into_inner(), |request, reply| {
            WorkRequest::Encode { request, reply }
        });

        Ok(Response::new(Box::pin(stream)))
    }

    /// Handles a stream of decode requests.
    ///
    /// Symmetric to [`Self::encode`]: transcription strings in, verified
    /// payloads (or typed error codes) out, correlated by nonce only.
    async fn decode(
        &self,
        req: Request<Streaming<DecodeRequest>>,
    ) -> Result<Response<Self::DecodeStream>, Status> {
        if self.worker_pool.is_shutting_down() {
            return Err(Error::ServiceShutdown.into());
        }

        let stream = self.spawn_dispatch(req.into_inner(), |request, reply| {
            WorkRequest::Decode { request, reply }
        });

        Ok(Response::new(Box::pin(stream)))
    }
}
