//! gRPC-Web response body.
//!
//! The body is a sequence of message frames followed by exactly one trailer
//! frame. A response whose headers already carry `grpc-status: 0` is
//! "trailers-only" and must have an empty body.

use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use connectrpc_chunked_core::grpc_web::{grpc_status, parse_trailer_block};
use connectrpc_chunked_core::{Code, Envelope, EnvelopeError};
use futures::Stream;
use http::HeaderMap;
use prost::Message;
use serde::de::DeserializeOwned;
#[cfg(feature = "tracing")]
use tracing::debug;

use super::{DemuxState, Metadata, Trailers};
use crate::ClientError;
use crate::codec::Codec;

/// How the response body must be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Messages followed by a trailer frame.
    Framed,
    /// Status already carried by the headers; the body must be empty.
    TrailersOnly,
}

/// Check the HTTP status and the `grpc-status` response header.
///
/// - HTTP status other than 200 fails with the mapped code
/// - a non-zero `grpc-status` header fails with that status
/// - `grpc-status: 0` selects [`ResponseKind::TrailersOnly`]
pub fn validate_response(status_code: u16, header: &HeaderMap) -> Result<ResponseKind, ClientError> {
    if status_code != 200 {
        return Err(ClientError::new(
            Code::from_http_status(status_code),
            format!("HTTP {status_code}"),
        )
        .with_metadata(header));
    }
    match grpc_status(header)? {
        None => Ok(ResponseKind::Framed),
        Some(status) if status.is_ok() => Ok(ResponseKind::TrailersOnly),
        Some(status) => Err(ClientError::Status {
            code: status.code,
            message: status.message,
            details: vec![],
            metadata: Metadata::new(header.clone()),
        }),
    }
}

/// Parse and validate a trailer frame. Error metadata carries the response
/// headers followed by the trailer.
fn read_trailer(envelope: &Envelope, header: &HeaderMap) -> Result<HeaderMap, ClientError> {
    let trailer = parse_trailer_block(&envelope.data)?;
    match grpc_status(&trailer)? {
        None => Err(ClientError::protocol("missing grpc-status")),
        Some(status) if status.is_ok() => Ok(trailer),
        Some(status) => {
            let mut metadata = Metadata::new(header.clone());
            metadata.append_all(&trailer);
            Err(ClientError::Status {
                code: status.code,
                message: status.message,
                details: vec![],
                metadata,
            })
        }
    }
}

/// Yields the messages of a gRPC-Web body.
///
/// The trailer frame is validated and merged into the [`Trailers`] target.
/// Violations:
/// - any frame after the trailer: "extra message" (or "extra trailer")
/// - end of body without a trailer: "missing trailer"
/// - any frame in a trailers-only body: "extra data for trailers-only"
pub struct GrpcWebMessages<S, T> {
    frames: S,
    codec: Codec,
    kind: ResponseKind,
    header: HeaderMap,
    trailer: Trailers,
    state: DemuxState,
    _marker: PhantomData<fn() -> T>,
}

impl<S, T> GrpcWebMessages<S, T> {
    pub fn new(
        frames: S,
        codec: Codec,
        kind: ResponseKind,
        header: HeaderMap,
        trailer: Trailers,
    ) -> Self {
        Self {
            frames,
            codec,
            kind,
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
}

impl<S, T> Unpin for GrpcWebMessages<S, T> where S: Unpin {}

impl<S, T> Stream for GrpcWebMessages<S, T>
where
    S: Stream<Item = Result<Envelope, ClientError>> + Unpin,
    T: Message + DeserializeOwned + Default,
{
    type Item = Result<T, ClientError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if matches!(this.state, DemuxState::Errored | DemuxState::Done) {
                return Poll::Ready(None);
            }

            let next = match Pin::new(&mut this.frames).poll_next(cx) {
                Poll::Ready(next) => next,
                Poll::Pending => return Poll::Pending,
            };

            let envelope = match (this.state, next) {
                (_, Some(Err(e))) => return this.fail(e),
                (DemuxState::TrailerObserved, None) => {
                    this.state = DemuxState::Done;
                    return Poll::Ready(None);
                }
                (_, None) if this.kind == ResponseKind::TrailersOnly => {
                    this.state = DemuxState::Done;
                    return Poll::Ready(None);
                }
                (_, None) => return this.fail(ClientError::protocol("missing trailer")),
                (_, Some(Ok(_))) if this.kind == ResponseKind::TrailersOnly => {
                    return this.fail(ClientError::protocol("extra data for trailers-only"));
                }
                (DemuxState::TrailerObserved, Some(Ok(envelope))) => {
                    let violation = if envelope.is_trailer() {
                        "extra trailer"
                    } else {
                        "extra message"
                    };
                    return this.fail(ClientError::protocol(violation));
                }
                (_, Some(Ok(envelope))) => envelope,
            };

            // Trailer bit first: trailer frames seen on the wire (0xFD) also
            // carry the compressed bit.
            if envelope.is_trailer() {
                #[cfg(feature = "tracing")]
                debug!(len = envelope.data.len(), "trailer received");
                match read_trailer(&envelope, &this.header) {
                    Ok(trailer) => {
                        this.trailer.merge(trailer);
                        this.state = DemuxState::TrailerObserved;
                    }
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

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use connectrpc_chunked_core::envelope_flags;
    use futures::StreamExt;
    use futures::stream;
    use http::HeaderValue;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
    struct Reply {
        #[prost(int32, tag = "1")]
        value: i32,
    }

    fn reply(value: i32) -> Envelope {
        Envelope::message(Bytes::from(Reply { value }.encode_to_vec()))
    }

    fn trailer(block: &'static str) -> Envelope {
        Envelope::new(0xFD, Bytes::from_static(block.as_bytes()))
    }

    fn demux(
        frames: Vec<Envelope>,
        kind: ResponseKind,
        target: Trailers,
    ) -> GrpcWebMessages<impl Stream<Item = Result<Envelope, ClientError>> + Unpin, Reply> {
        let mut header = HeaderMap::new();
        header.insert("x-request-id", HeaderValue::from_static("r1"));
        GrpcWebMessages::new(
            stream::iter(frames.into_iter().map(Ok)),
            Codec::Proto,
            kind,
            header,
            target,
        )
    }

    #[test]
    fn test_validate_response() {
        let mut header = HeaderMap::new();
        assert_eq!(validate_response(200, &header).unwrap(), ResponseKind::Framed);

        header.insert("grpc-status", HeaderValue::from_static("0"));
        assert_eq!(
            validate_response(200, &header).unwrap(),
            ResponseKind::TrailersOnly
        );

        header.insert("grpc-status", HeaderValue::from_static("7"));
        header.insert("grpc-message", HeaderValue::from_static("denied%21"));
        let err = validate_response(200, &header).unwrap_err();
        assert_eq!(err.code(), Code::PermissionDenied);
        assert_eq!(err.message(), Some("denied!"));
        assert_eq!(err.metadata().unwrap().get("grpc-status"), Some("7"));

        let err = validate_response(401, &HeaderMap::new()).unwrap_err();
        assert_eq!(err.code(), Code::Unauthenticated);
    }

    #[tokio::test]
    async fn test_messages_then_trailer() {
        let target = Trailers::new();
        let mut messages = demux(
            vec![reply(1), reply(2), trailer("grpc-status: 0\r\nx-cost: 3\r\n")],
            ResponseKind::Framed,
            target.clone(),
        );

        assert_eq!(messages.next().await.unwrap().unwrap().value, 1);
        assert_eq!(messages.next().await.unwrap().unwrap().value, 2);
        assert!(messages.next().await.is_none());
        assert_eq!(messages.state(), DemuxState::Done);
        assert_eq!(target.get().get("x-cost"), Some("3"));
    }

    #[tokio::test]
    async fn test_plain_trailer_flag() {
        let frames = vec![
            reply(1),
            Envelope::new(envelope_flags::TRAILER, Bytes::from_static(b"grpc-status: 0\r\n")),
        ];
        let count = demux(frames, ResponseKind::Framed, Trailers::new())
            .filter(|r| futures::future::ready(r.is_ok()))
            .count()
            .await;
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_error_trailer() {
        let mut messages = demux(
            vec![trailer("grpc-status: 5\r\ngrpc-message: no%20such%20item\r\n")],
            ResponseKind::Framed,
            Trailers::new(),
        );
        let err = messages.next().await.unwrap().unwrap_err();
        assert_eq!(err.code(), Code::NotFound);
        assert_eq!(err.message(), Some("no such item"));
        let metadata = err.metadata().unwrap();
        assert_eq!(metadata.get("x-request-id"), Some("r1"));
        assert_eq!(metadata.get("grpc-status"), Some("5"));
        assert!(messages.next().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_grpc_status() {
        let mut messages = demux(vec![trailer("x: 1\r\n")], ResponseKind::Framed, Trailers::new());
        let err = messages.next().await.unwrap().unwrap_err();
        assert_eq!(err.message(), Some("missing grpc-status"));
        assert_eq!(err.code(), Code::Internal);
    }

    #[tokio::test]
    async fn test_violations() {
        let cases = [
            (vec![reply(1)], "missing trailer"),
            (
                vec![trailer("grpc-status: 0\r\n"), reply(1)],
                "extra message",
            ),
            (
                vec![trailer("grpc-status: 0\r\n"), trailer("grpc-status: 0\r\n")],
                "extra trailer",
            ),
        ];
        for (frames, expected) in cases {
            let results: Vec<_> = demux(frames, ResponseKind::Framed, Trailers::new())
                .collect()
                .await;
            let err = results.into_iter().find_map(Result::err).unwrap();
            assert_eq!(err.message(), Some(expected));
        }
    }

    #[tokio::test]
    async fn test_trailers_only() {
        let mut messages = demux(vec![], ResponseKind::TrailersOnly, Trailers::new());
        assert!(messages.next().await.is_none());
        assert_eq!(messages.state(), DemuxState::Done);

        let mut messages = demux(vec![reply(1)], ResponseKind::TrailersOnly, Trailers::new());
        let err = messages.next().await.unwrap().unwrap_err();
        assert_eq!(err.message(), Some("extra data for trailers-only"));
    }
}
