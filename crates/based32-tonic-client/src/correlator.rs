//! Nonce correlation for a shared bidirectional stream.
//!
//! One [`Correlator`] multiplexes arbitrarily many concurrent logical
//! callers over a single request/response stream pair. Each call is
//! stamped with a fresh nonce, recorded in a pending registry, and written
//! to the shared outbound channel; each inbound response is routed back to
//! exactly the caller whose nonce it echoes, in whatever order the server
//! completed them.
//!
//! Three loops run per correlator:
//!
//! - **outbound**: drains the shared call channel, registers each pending
//!   entry, then writes the request to the RPC stream. Registration is
//!   enqueued before the request can reach the wire, and the matching loop
//!   drains registrations first, so a response can never race its own
//!   registry entry.
//! - **inbound**: drains the RPC stream and republishes responses onto the
//!   internal result channel. A transport error ends this loop without
//!   tearing anything else down.
//! - **matching**: the sole owner of the pending registry - no locks, no
//!   other task ever touches the map. Performs match-or-discard on every
//!   result and sweeps out entries older than the timeout, both on every
//!   result and on a periodic tick.
//!
//! Expiry is quiet by design: the sweep drops the entry, which closes the
//! caller's delivery channel. No "expired" value is delivered, and callers
//! are expected to race the channel against their own timer (which
//! [`Correlator::call_wait`] does for them).

use based32_tonic_core::Tagged;
use core::time::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tonic::Status;

use crate::error::ClientError;

/// Process-wide nonce source.
///
/// A monotonic counter guarantees uniqueness for the life of the process,
/// which a wall-clock timestamp cannot under high call rates or coarse
/// clock resolution.
static NEXT_NONCE: AtomicU64 = AtomicU64::new(1);

fn mint_nonce() -> u64 {
    NEXT_NONCE.fetch_add(1, Ordering::Relaxed)
}

/// An in-flight request awaiting its response or expiry.
///
/// The send time is data, not a key: the registry is keyed by nonce alone
/// and the timestamp only feeds the expiry check.
struct PendingEntry<Resp> {
    sent_at: Instant,
    reply: oneshot::Sender<Resp>,
}

struct Registration<Resp> {
    nonce: u64,
    entry: PendingEntry<Resp>,
}

struct Call<Req, Resp> {
    request: Req,
    reply: oneshot::Sender<Resp>,
}

/// Multiplexes concurrent logical callers over one stream pair.
///
/// Cheap to share: handles to the internal loops, a pending-count gauge
/// and the per-request timeout.
pub struct Correlator<Req, Resp> {
    call_tx: mpsc::Sender<Call<Req, Resp>>,
    pending_gauge: Arc<AtomicUsize>,
    timeout: Duration,
}

impl<Req, Resp> Correlator<Req, Resp>
where
    Req: Tagged + Send + 'static,
    Resp: Tagged + Send + 'static,
{
    /// Spawns the correlator's loops over an outbound request channel and
    /// an inbound response stream.
    ///
    /// Cancelling `cancel` stops all three loops; pending callers observe
    /// their delivery channel closing.
    pub fn spawn<S>(
        outbound_tx: mpsc::Sender<Req>,
        inbound: S,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Self
    where
        S: Stream<Item = Result<Resp, Status>> + Send + Unpin + 'static,
    {
        let (call_tx, call_rx) = mpsc::channel(1);
        let (reg_tx, reg_rx) = mpsc::channel(64);
        let (result_tx, result_rx) = mpsc::channel(64);
        let pending_gauge = Arc::new(AtomicUsize::new(0));

        tokio::spawn(outbound_loop(call_rx, reg_tx, outbound_tx, cancel.clone()));
        tokio::spawn(inbound_loop(inbound, result_tx, cancel.clone()));
        tokio::spawn(matching_loop(
            reg_rx,
            result_rx,
            timeout,
            cancel,
            Arc::clone(&pending_gauge),
        ));

        Self {
            call_tx,
            pending_gauge,
            timeout,
        }
    }

    /// Submits a request and returns its one-shot delivery channel.
    ///
    /// Returns immediately after the request is queued. The caller may
    /// block-receive on the channel or select over it; if the request
    /// expires first, the channel closes without a value. Applying a
    /// timeout to the wait is the caller's responsibility.
    pub async fn call(&self, mut request: Req) -> Result<oneshot::Receiver<Resp>, ClientError> {
        request.set_nonce(mint_nonce());

        let (reply, reply_rx) = oneshot::channel();
        self.call_tx
            .send(Call { request, reply })
            .await
            .map_err(|_| ClientError::ChannelClosed {
                context: "correlator is not running".into(),
            })?;

        Ok(reply_rx)
    }

    /// Submits a request and waits for its response, racing the delivery
    /// channel against this correlator's timeout.
    pub async fn call_wait(&self, request: Req) -> Result<Resp, ClientError> {
        let reply_rx = self.call(request).await?;

        match tokio::time::timeout(self.timeout, reply_rx).await {
            Ok(Ok(response)) => Ok(response),
            // The registry swept the entry (or the correlator stopped)
            // before our own timer fired.
            Ok(Err(_)) => Err(ClientError::Expired),
            Err(_) => Err(ClientError::Timeout),
        }
    }

    /// Number of requests currently awaiting a response or expiry.
    pub fn pending(&self) -> usize {
        self.pending_gauge.load(Ordering::Relaxed)
    }
}

async fn outbound_loop<Req, Resp>(
    mut call_rx: mpsc::Receiver<Call<Req, Resp>>,
    reg_tx: mpsc::Sender<Registration<Resp>>,
    outbound_tx: mpsc::Sender<Req>,
    cancel: CancellationToken,
) where
    Req: Tagged,
{
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            call = call_rx.recv() => match call {
                None => break,
                Some(Call { request, reply }) => {
                    let registration = Registration {
                        nonce: request.nonce(),
                        entry: PendingEntry {
                            sent_at: Instant::now(),
                            reply,
                        },
                    };

                    // Register before the request can reach the wire so
                    // its response never races an absent registry entry.
                    if reg_tx.send(registration).await.is_err() {
                        break;
                    }
                    if outbound_tx.send(request).await.is_err() {
                        tracing::warn!("outbound stream channel closed");
                        break;
                    }
                }
            }
        }
    }

    tracing::trace!("outbound loop stopped");
}

async fn inbound_loop<Resp, S>(
    mut inbound: S,
    result_tx: mpsc::Sender<Resp>,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<Resp, Status>> + Unpin,
{
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            msg = inbound.next() => match msg {
                // Server closed its half of the stream.
                None => break,
                Some(Err(status)) => {
                    tracing::warn!("stream receive failed: {status}");
                    break;
                }
                Some(Ok(response)) => {
                    if result_tx.send(response).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    tracing::trace!("inbound loop stopped");
}

async fn matching_loop<Resp>(
    mut reg_rx: mpsc::Receiver<Registration<Resp>>,
    mut result_rx: mpsc::Receiver<Resp>,
    timeout: Duration,
    cancel: CancellationToken,
    pending_gauge: Arc<AtomicUsize>,
) where
    Resp: Tagged,
{
    let mut pending: HashMap<u64, PendingEntry<Resp>> = HashMap::new();

    let mut sweep = tokio::time::interval(timeout);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        // Biased so queued registrations always land before the results
        // that could answer them.
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            reg = reg_rx.recv() => match reg {
                None => break,
                Some(Registration { nonce, entry }) => {
                    // At most one entry per nonce; the minting counter
                    // never repeats within a process.
                    pending.insert(nonce, entry);
                    pending_gauge.store(pending.len(), Ordering::Relaxed);
                }
            },
            result = result_rx.recv() => match result {
                None => break,
                Some(response) => {
                    match pending.remove(&response.nonce()) {
                        Some(entry) => {
                            // The caller may have given up already, in
                            // which case the response falls on the floor.
                            let _ = entry.reply.send(response);
                        }
                        None => {
                            tracing::debug!(
                                "discarding response for unknown or expired nonce {}",
                                response.nonce()
                            );
                        }
                    }

                    expire(&mut pending, timeout);
                    pending_gauge.store(pending.len(), Ordering::Relaxed);
                }
            },
            _ = sweep.tick() => {
                expire(&mut pending, timeout);
                pending_gauge.store(pending.len(), Ordering::Relaxed);
            }
        }
    }

    // Dropping the registry closes every remaining delivery channel.
    pending.clear();
    pending_gauge.store(0, Ordering::Relaxed);
    tracing::trace!("matching loop stopped");
}

/// Removes entries whose response did not arrive within `timeout`.
///
/// Dropping an entry's sender closes the caller's delivery channel; no
/// error value is pushed.
fn expire<Resp>(pending: &mut HashMap<u64, PendingEntry<Resp>>, timeout: Duration) {
    pending.retain(|nonce, entry| {
        let keep = entry.sent_at.elapsed() <= timeout;
        if !keep {
            tracing::debug!("expiring pending request {nonce}");
        }
        keep
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use based32_tonic_core::encode_response;
    use based32_tonic_core::proto::{EncodeRequest, EncodeResponse, encode_response::Encoded};
    use tokio_stream::wrappers::ReceiverStream;

    /// A stand-in transcription server: encodes each payload with the real
    /// codec and replies after `delay_for(payload)`, so completion order
    /// scrambles relative to submission order. Requests for which
    /// `delay_for` returns `None` are silently dropped.
    fn spawn_fake_server(
        mut req_rx: mpsc::Receiver<EncodeRequest>,
        resp_tx: mpsc::Sender<Result<EncodeResponse, Status>>,
        delay_for: fn(&[u8]) -> Option<Duration>,
    ) {
        tokio::spawn(async move {
            while let Some(request) = req_rx.recv().await {
                let Some(delay) = delay_for(&request.data) else {
                    continue;
                };
                let resp_tx = resp_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let response =
                        encode_response(request.id_nonce, based32::encode(&request.data));
                    let _ = resp_tx.send(Ok(response)).await;
                });
            }
        });
    }

    fn spawn_correlator(
        timeout: Duration,
        delay_for: fn(&[u8]) -> Option<Duration>,
    ) -> (Correlator<EncodeRequest, EncodeResponse>, CancellationToken) {
        let (out_tx, out_rx) = mpsc::channel(16);
        let (resp_tx, resp_rx) = mpsc::channel(16);
        spawn_fake_server(out_rx, resp_tx, delay_for);

        let cancel = CancellationToken::new();
        let correlator = Correlator::spawn(
            out_tx,
            ReceiverStream::new(resp_rx),
            timeout,
            cancel.clone(),
        );
        (correlator, cancel)
    }

    fn request(data: Vec<u8>) -> EncodeRequest {
        EncodeRequest {
            id_nonce: 0,
            data: data.into(),
        }
    }

    #[tokio::test]
    async fn concurrent_callers_each_get_their_own_response() {
        // Longer payloads answer sooner, so responses come back roughly
        // reversed.
        let (correlator, _cancel) = spawn_correlator(Duration::from_secs(5), |data| {
            Some(Duration::from_millis(64 - data.len().min(60) as u64))
        });
        let correlator = Arc::new(correlator);

        let calls = (1..=64_usize).map(|len| {
            let correlator = Arc::clone(&correlator);
            let payload: Vec<u8> = (0..len).map(|i| (i * 7 + len) as u8).collect();
            async move {
                let response = correlator.call_wait(request(payload.clone())).await.unwrap();
                (payload, response)
            }
        });

        for (payload, response) in futures::future::join_all(calls).await {
            let Some(Encoded::EncodedString(encoded)) = response.encoded else {
                panic!("expected a success response");
            };
            assert_eq!(
                based32::decode(&encoded).unwrap(),
                payload,
                "a caller received another caller's response",
            );
        }

        // Everything was delivered, so nothing is left to expire.
        assert_eq!(correlator.pending(), 0);
    }

    #[tokio::test]
    async fn unanswered_requests_expire_and_are_swept() {
        // The server never responds.
        let (correlator, _cancel) = spawn_correlator(Duration::from_millis(50), |_| None);

        let err = correlator.call_wait(request(vec![1, 2, 3])).await.unwrap_err();
        assert!(
            matches!(err, ClientError::Timeout | ClientError::Expired),
            "unexpected error: {err:?}",
        );

        // The periodic sweep removes the registry entry shortly after the
        // timeout passes.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(correlator.pending(), 0);
    }

    #[tokio::test]
    async fn late_responses_are_discarded_not_misdelivered() {
        // Payloads starting with 42 answer far beyond the timeout; others
        // answer promptly.
        let (correlator, _cancel) = spawn_correlator(Duration::from_millis(50), |data| {
            if data.first() == Some(&42) {
                Some(Duration::from_millis(150))
            } else {
                Some(Duration::from_millis(1))
            }
        });

        let err = correlator.call_wait(request(vec![42, 1])).await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout | ClientError::Expired));

        // Let the late response arrive and be discarded against the swept
        // registry.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(correlator.pending(), 0);

        // The stream is still healthy and later callers are unaffected.
        let response = correlator.call_wait(request(vec![7, 7])).await.unwrap();
        let Some(Encoded::EncodedString(encoded)) = response.encoded else {
            panic!("expected a success response");
        };
        assert_eq!(based32::decode(&encoded).unwrap(), vec![7, 7]);
    }

    #[tokio::test]
    async fn cancellation_stops_the_loops_and_closes_pending_channels() {
        let (correlator, cancel) = spawn_correlator(Duration::from_secs(60), |_| None);

        let reply_rx = correlator.call(request(vec![9])).await.unwrap();
        cancel.cancel();

        // The matching loop drops the registry on exit, closing the
        // delivery channel without a value.
        assert!(reply_rx.await.is_err());

        // New calls fail once the outbound loop is gone.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let err = correlator.call(request(vec![9])).await.unwrap_err();
        assert!(matches!(err, ClientError::ChannelClosed { .. }));
    }

    #[tokio::test]
    async fn minted_nonces_are_unique_and_monotonic() {
        let a = mint_nonce();
        let b = mint_nonce();
        let c = mint_nonce();
        assert!(a < b && b < c);
    }
}
