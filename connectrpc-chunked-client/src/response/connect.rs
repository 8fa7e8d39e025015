//! Connect streaming response body.
//!
//! The body is a sequence of message frames closed by one end-of-stream
//! frame carrying a JSON `EndStreamResponse`.

use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use connectrpc_chunked_core::{Code, Envelope, EnvelopeError, connect::parse_end_stream};
use futures::Stream;
use http::HeaderMap;
use prost::Message;
use serde::de::DeserializeOwned;
#[cfg(feature = "tracing")]
use tracing::debug;

use super::{DemuxState, Metadata, Trailers};
use crate::ClientError;
use crate::codec::Codec;

/// Fail a streaming response whose HTTP status is not 200.
pub fn validate_stream_response(status_code: u16, header: &HeaderMap) -> Result<(), ClientError> {
    if status_code == 200 {
        return Ok(());
    }
    Err(
        ClientError::new(Code::from_http_status(status_code), format!("HTTP {status_code}"))
            .with_metadata(header),
    )
}

/// Yields the messages of a Connect streaming body.
///
/// The end-of-stream record is handled in place:
/// - an error in it is raised with the response headers and its own
///   metadata attached
/// - otherwise its metadata is merged into the [`Trailers`] target
///
/// Frames after the end-of-stream frame are never read. A body without an
/// end-of-stream frame fails with "missing EndStreamResponse".
pub struct ConnectMessages<S, T> {
    frames: S,
    codec: Codec,
    /// Response headers, attached to end-of-stream errors.
    header: HeaderMap,
    trailer: Trailers,
    state: DemuxState,
    _marker: PhantomData<fn() -> T>,
}

impl<S, T> ConnectMessages<S, T> {
    pub fn new(frames: S, codec: Codec, header: HeaderMap, trailer: Trailers) -> Self {
        Self {
            frames,
            codec,
            header,
            trailer,
            state: DemuxState::AwaitingMessageOrTrailer,
            _marker: PhantomData,
        }
    }

    pub fn state(&self) -> DemuxState {
        self.state
    }

    fn fail(&mut self, err: ClientError) -> Poll<Option<Result<T, ClientError>>> {
        self.state = DemuxState::Errored;
        Poll::Ready(Some(Err(err)))
    }

    fn on_end_stream(&mut self, envelope: &Envelope) -> Result<(), ClientError> {
        let end = parse_end_stream(&envelope.data)?;
        if let Some(error) = end.error {
            let mut metadata = Metadata::new(self.header.clone());
            metadata.append_all(&end.metadata);
            return Err(ClientError::Status {
                code: error.code,
                message: error.message,
                details: error.details,
                metadata,
            });
        }
        self.trailer.merge(end.metadata);
        Ok(())
    }
}

impl<S, T> Unpin for ConnectMessages<S, T> where S: Unpin {}

impl<S, T> Stream for ConnectMessages<S, T>
where
    S: Stream<Item = Result<Envelope, ClientError>> + Unpin,
    T: Message + DeserializeOwned + Default,
{
    type Item = Result<T, ClientError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            match this.state {
                DemuxState::Errored | DemuxState::Done => return Poll::Ready(None),
                DemuxState::TrailerObserved => {
                    this.state = DemuxState::Done;
                    return Poll::Ready(None);
                }
                DemuxState::AwaitingMessageOrTrailer => {}
            }

            let envelope = match Pin::new(&mut this.frames).poll_next(cx) {
                Poll::Ready(Some(Ok(envelope))) => envelope,
                Poll::Ready(Some(Err(e))) => return this.fail(e),
                Poll::Ready(None) => {
                    return this.fail(ClientError::protocol("missing EndStreamResponse"));
                }
                Poll::Pending => return Poll::Pending,
            };

            if envelope.is_end_stream() {
                #[cfg(feature = "tracing")]
                debug!(len = envelope.data.len(), "end of stream received");
                match this.on_end_stream(&envelope) {
                    Ok(()) => this.state = DemuxState::TrailerObserved,
                    Err(e) => return this.fail(e),
                }
                continue;
            }

            if envelope.is_compressed() {
                return this.fail(EnvelopeError::UnsupportedCompression(envelope.flags).into());
            }

            return match this.codec.decode(&envelope.data) {
                Ok(message) => Poll::Ready(Some(Ok(message))),
                Err(e) => this.fail(e),
            };
        }
    }
}
