//! The gRPC-backed transcription client.
//!
//! [`TranscribeClient`] dials the server once, opens one `Encode` and one
//! `Decode` bidirectional stream, and hands each to its own
//! [`Correlator`](crate::correlator::Correlator). Every call on this
//! client - from however many tasks share it - travels over those two
//! streams and is routed home by nonce.

use crate::correlator::Correlator;
use crate::error::ClientError;
use based32_tonic_core::proto::{
    DecodeRequest, DecodeResponse, EncodeRequest, EncodeResponse, TranscribeError,
    decode_response::Decoded, encode_response::Encoded, transcriber_client::TranscriberClient,
};
use bytes::Bytes;
use core::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Endpoint;

/// A shared handle to the transcription service.
///
/// Clone-free by design: wrap it in an `Arc` to share across tasks. All
/// callers multiplex over the same two streams.
pub struct TranscribeClient {
    encode: Correlator<EncodeRequest, EncodeResponse>,
    decode: Correlator<DecodeRequest, DecodeResponse>,
    cancel: CancellationToken,
}

impl TranscribeClient {
    /// Dials `server_addr` and opens the two transcription streams.
    ///
    /// `timeout` bounds each individual call: it is both the pending
    /// registry's expiry window and the wait applied by [`Self::encode`]
    /// and [`Self::decode`].
    pub async fn connect(server_addr: String, timeout: Duration) -> Result<Self, ClientError> {
        let channel = Endpoint::from_shared(server_addr)?.connect().await?;
        let mut grpc = TranscriberClient::new(channel);

        let cancel = CancellationToken::new();

        let (encode_tx, encode_rx) = mpsc::channel(1);
        let encode_stream = grpc
            .encode(ReceiverStream::new(encode_rx))
            .await?
            .into_inner();
        let encode = Correlator::spawn(encode_tx, encode_stream, timeout, cancel.child_token());

        let (decode_tx, decode_rx) = mpsc::channel(1);
        let decode_stream = grpc
            .decode(ReceiverStream::new(decode_rx))
            .await?
            .into_inner();
        let decode = Correlator::spawn(decode_tx, decode_stream, timeout, cancel.child_token());

        Ok(Self {
            encode,
            decode,
            cancel,
        })
    }

    /// Encodes `data` and waits for the transcription string.
    ///
    /// In-band error codes from the server surface as
    /// [`ClientError::Transcription`].
    pub async fn encode(&self, data: impl Into<Bytes>) -> Result<String, ClientError> {
        let response = self
            .encode
            .call_wait(EncodeRequest {
                id_nonce: 0,
                data: data.into(),
            })
            .await?;

        match response.encoded {
            Some(Encoded::EncodedString(encoded)) => Ok(encoded),
            Some(Encoded::Error(code)) => Err(ClientError::Transcription(
                // An out-of-range code can only come from a newer server;
                // report it as the integrity failure it implies.
                TranscribeError::try_from(code).unwrap_or(TranscribeError::CheckFailed),
            )),
            None => Err(ClientError::EmptyResponse),
        }
    }

    /// Decodes a transcription string and waits for the verified payload.
    pub async fn decode(&self, encoded: impl Into<String>) -> Result<Vec<u8>, ClientError> {
        let response = self
            .decode
            .call_wait(DecodeRequest {
                id_nonce: 0,
                encoded_string: encoded.into(),
            })
            .await?;

        match response.decoded {
            Some(Decoded::Data(data)) => Ok(data.to_vec()),
            Some(Decoded::Error(code)) => Err(ClientError::Transcription(
                TranscribeError::try_from(code).unwrap_or(TranscribeError::CheckFailed),
            )),
            None => Err(ClientError::EmptyResponse),
        }
    }

    /// Submits an encode request and returns its delivery channel without
    /// waiting.
    ///
    /// The channel closes without a value if the request expires; applying
    /// a timeout to the wait is the caller's responsibility.
    pub async fn call_encode(
        &self,
        data: impl Into<Bytes>,
    ) -> Result<oneshot::Receiver<EncodeResponse>, ClientError> {
        self.encode
            .call(EncodeRequest {
                id_nonce: 0,
                data: data.into(),
            })
            .await
    }

    /// Submits a decode request and returns its delivery channel without
    /// waiting.
    pub async fn call_decode(
        &self,
        encoded: impl Into<String>,
    ) -> Result<oneshot::Receiver<DecodeResponse>, ClientError> {
        self.decode
            .call(DecodeRequest {
                id_nonce: 0,
                encoded_string: encoded.into(),
            })
            .await
    }

    /// Stops the correlator loops. Calls pending at this point observe
    /// their delivery channels closing.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}
