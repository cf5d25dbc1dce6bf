//! Bridges one bidirectional stream to the worker pool.
//!
//! The dispatch loop owns the stream's inbound half and the round-robin
//! worker choice. The actual hand-off to a worker and the wait for its
//! reply run on a spawned relay task, so reading request k+1 never waits
//! for request k to complete. Responses therefore reach the outbound
//! channel in completion order, not submission order; the nonce each one
//! carries is the only correlation clients may rely on.

use crate::server::{pool::manager::WorkerPool, streaming::request::WorkRequest};
use based32_tonic_core::Error;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::{Stream, StreamExt};
use tonic::Status;

/// Reads requests from `inbound` and relays each to the next worker in
/// round-robin order until the stream ends, the stream fails, or the pool
/// shuts down.
///
/// `make_work` wraps a request and its reply channel into the
/// [`WorkRequest`] variant for this stream's direction.
///
/// # Errors
///
/// A transport-level receive failure terminates this stream's loop and is
/// returned to the caller (after being forwarded to the client when
/// possible). End-of-stream is a clean exit, not an error. Codec failures
/// never surface here - workers carry those inside response values.
pub async fn dispatch_stream<Req, Resp, S>(
    mut inbound: S,
    pool: Arc<WorkerPool>,
    resp_tx: mpsc::Sender<Result<Resp, Status>>,
    make_work: fn(Req, oneshot::Sender<Resp>) -> WorkRequest,
) -> Result<(), Error>
where
    Req: Send + 'static,
    Resp: Send + 'static,
    S: Stream<Item = Result<Req, Status>> + Send + Unpin,
{
    loop {
        tokio::select! {
            () = pool.cancelled() => break,
            msg = inbound.next() => match msg {
                // The client has closed its half of the stream.
                None => break,
                Some(Err(status)) => {
                    tracing::warn!("stream receive failed: {status}");
                    return Err(Error::StreamReceive {
                        context: status.to_string(),
                    });
                }
                Some(Ok(request)) => {
                    // The worker index is taken here, on the only task
                    // that advances the counter.
                    let worker = pool.next_worker_index();
                    let (reply_tx, reply_rx) = oneshot::channel();
                    let work = make_work(request, reply_tx);

                    let pool = Arc::clone(&pool);
                    let resp_tx = resp_tx.clone();
                    tokio::spawn(async move {
                        if let Err(e) = relay(pool, worker, work, reply_rx, resp_tx).await {
                            tracing::debug!("relay ended early: {e}");
                        }
                    });
                }
            }
        }
    }

    Ok(())
}

/// Hands one unit of work to its worker, awaits the reply, and forwards
/// the tagged response onto the stream's outbound channel.
async fn relay<Resp>(
    pool: Arc<WorkerPool>,
    worker: usize,
    work: WorkRequest,
    reply_rx: oneshot::Receiver<Resp>,
    resp_tx: mpsc::Sender<Result<Resp, Status>>,
) -> Result<(), Error> {
    if let Err(e) = pool.send_to(worker, work).await {
        // Best effort to surface the failure to the client; it may have
        // disconnected already, in which case only the log remains.
        if resp_tx.send(Err(e.clone().into())).await.is_err() {
            tracing::warn!("Failed to forward dispatch error: {e}");
        }
        return Err(e);
    }

    match reply_rx.await {
        Ok(response) => resp_tx.send(Ok(response)).await.map_err(|e| Error::ChannelError {
            context: format!("Failed to forward response: {e}"),
        }),
        Err(_) => Err(Error::ChannelError {
            context: format!("Worker {worker} dropped the reply channel"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use based32_tonic_core::proto::{
        EncodeRequest, EncodeResponse, encode_response::Encoded,
    };
    use core::time::Duration;
    use std::collections::HashMap;

    fn test_pool(num_workers: usize) -> Arc<WorkerPool> {
        Arc::new(WorkerPool::spawn(
            num_workers,
            1,
            Duration::from_secs(3),
            based32::codec(),
        ))
    }

    fn encode_work(request: EncodeRequest, reply: oneshot::Sender<EncodeResponse>) -> WorkRequest {
        WorkRequest::Encode { request, reply }
    }

    /// Distinct payloads with wildly varying cost so completions interleave.
    fn payloads() -> Vec<(u64, Vec<u8>)> {
        (0..64_u64)
            .map(|nonce| {
                let len = if nonce % 2 == 0 {
                    1 + nonce as usize
                } else {
                    4096 + 61 * nonce as usize
                };
                (nonce, (0..len).map(|i| (i ^ nonce as usize) as u8).collect())
            })
            .collect()
    }

    #[tokio::test]
    async fn every_response_matches_its_request_regardless_of_order() {
        let pool = test_pool(4);
        let inputs = payloads();

        let requests: Vec<Result<EncodeRequest, Status>> = inputs
            .iter()
            .map(|(nonce, data)| {
                Ok(EncodeRequest {
                    id_nonce: *nonce,
                    data: data.clone().into(),
                })
            })
            .collect();

        let (resp_tx, mut resp_rx) = mpsc::channel(8);
        dispatch_stream(
            tokio_stream::iter(requests),
            Arc::clone(&pool),
            resp_tx,
            encode_work,
        )
        .await
        .unwrap();

        let mut responses = HashMap::new();
        for _ in 0..inputs.len() {
            let response = resp_rx.recv().await.unwrap().unwrap();
            responses.insert(response.id_nonce, response);
        }
        assert_eq!(responses.len(), inputs.len());

        for (nonce, data) in inputs {
            let response = responses.remove(&nonce).unwrap();
            let Some(Encoded::EncodedString(encoded)) = response.encoded else {
                panic!("nonce {nonce}: expected success");
            };
            assert_eq!(
                based32::decode(&encoded).unwrap(),
                data,
                "nonce {nonce} was answered with another request's payload",
            );
        }
    }

    #[tokio::test]
    async fn one_bad_request_does_not_terminate_the_stream() {
        let pool = test_pool(2);

        let requests = vec![
            Ok(EncodeRequest {
                id_nonce: 1,
                data: Vec::new().into(),
            }),
            Ok(EncodeRequest {
                id_nonce: 2,
                data: vec![0xAB].into(),
            }),
        ];

        let (resp_tx, mut resp_rx) = mpsc::channel(8);
        dispatch_stream(tokio_stream::iter(requests), pool, resp_tx, encode_work)
            .await
            .unwrap();

        let mut by_nonce = HashMap::new();
        for _ in 0..2 {
            let response = resp_rx.recv().await.unwrap().unwrap();
            by_nonce.insert(response.id_nonce, response.encoded);
        }

        assert!(matches!(by_nonce[&1], Some(Encoded::Error(_))));
        assert!(matches!(by_nonce[&2], Some(Encoded::EncodedString(_))));
    }

    #[tokio::test]
    async fn receive_errors_are_terminal_for_the_stream() {
        let pool = test_pool(1);

        let requests: Vec<Result<EncodeRequest, Status>> =
            vec![Err(Status::internal("connection reset"))];

        let (resp_tx, _resp_rx) = mpsc::channel(8);
        let err = dispatch_stream(tokio_stream::iter(requests), pool, resp_tx, encode_work)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StreamReceive { .. }));
    }

    #[tokio::test]
    async fn pool_shutdown_ends_an_idle_stream_loop() {
        let pool = test_pool(1);

        // An inbound stream that stays open but never yields a request.
        let (_req_tx, req_rx) =
            mpsc::channel::<Result<EncodeRequest, Status>>(1);
        let inbound = tokio_stream::wrappers::ReceiverStream::new(req_rx);

        let (resp_tx, _resp_rx) = mpsc::channel(8);
        let handle = tokio::spawn({
            let pool = Arc::clone(&pool);
            async move { dispatch_stream(inbound, pool, resp_tx, encode_work).await }
        });

        pool.shutdown().await.unwrap();
        handle.await.unwrap().unwrap();
    }
}
