//! Request driver.
//!
//! [`RequestDriver`] runs one [`HostRequest`] through a [`RequestHost`] and
//! turns the resulting callbacks into a header event followed by an
//! envelope stream.
//!
//! Two host capability levels are supported:
//!
//! - **Chunked**: header and chunk handlers are registered on the returned
//!   task; the completion callback only ends the stream. Disposal
//!   deregisters both handlers.
//! - **Atomic**: the completion callback carries the whole body; it is
//!   replayed as one header event, one chunk event and the end signal.

use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use http::HeaderMap;
use tokio::sync::oneshot;
#[cfg(feature = "tracing")]
use tracing::{debug, trace};

use crate::ClientError;
use crate::event_stream::{EventStream, noop_disposer};
use crate::host::{HeadersReceived, HostRequest, RequestHost};
use crate::response::EnvelopeDecoder;

/// One event of a request lifecycle. The terminal end/error travels out of
/// band through the event stream.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    HeadersReceived(HeadersReceived),
    ChunkReceived(Bytes),
}

/// Body chunks following the header event.
pub type BodyChunks = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

/// A response whose headers have arrived and whose body is still streaming.
pub struct DrivenResponse {
    pub status_code: u16,
    pub header: HeaderMap,
    pub cookies: Vec<String>,
    pub frames: EnvelopeDecoder<BodyChunks>,
}

impl std::fmt::Debug for DrivenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrivenResponse")
            .field("status_code", &self.status_code)
            .field("header", &self.header)
            .field("cookies", &self.cookies)
            .finish_non_exhaustive()
    }
}

/// A response delivered in one piece.
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status_code: u16,
    pub header: HeaderMap,
    pub body: Bytes,
}

/// Issues host requests and adapts their callbacks.
#[derive(Clone)]
pub struct RequestDriver {
    host: Arc<dyn RequestHost>,
    enable_chunked: bool,
    max_frame_len: Option<usize>,
}

impl std::fmt::Debug for RequestDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDriver")
            .field("enable_chunked", &self.enable_chunked)
            .field("max_frame_len", &self.max_frame_len)
            .finish_non_exhaustive()
    }
}

impl RequestDriver {
    pub fn new(host: Arc<dyn RequestHost>, enable_chunked: bool) -> Self {
        Self {
            host,
            enable_chunked,
            max_frame_len: None,
        }
    }

    /// Limit the payload size of decoded frames.
    pub fn with_max_frame_len(mut self, limit: Option<usize>) -> Self {
        self.max_frame_len = limit;
        self
    }

    pub fn is_chunked(&self) -> bool {
        self.enable_chunked
    }

    /// Issue `request` and resolve once the response headers are known.
    ///
    /// # Errors
    ///
    /// - the host error, if the host fails before the headers
    /// - `Protocol("missing header")` if the first event is a chunk or the
    ///   request completes without any event
    pub async fn drive(&self, mut request: HostRequest) -> Result<DrivenResponse, ClientError> {
        request.enable_chunked = self.enable_chunked;

        #[cfg(feature = "tracing")]
        debug!(url = %request.url, chunked = self.enable_chunked, "dispatching host request");

        let mut events = if self.enable_chunked {
            self.register_chunked(request)
        } else {
            self.register_atomic(request)
        };

        let head = match events.next().await {
            Some(Ok(LifecycleEvent::HeadersReceived(head))) => head,
            Some(Ok(LifecycleEvent::ChunkReceived(_))) | None => {
                return Err(ClientError::protocol("missing header"));
            }
            Some(Err(e)) => return Err(e),
        };

        #[cfg(feature = "tracing")]
        debug!(status = head.status_code, "response headers received");

        let chunks: BodyChunks = Box::pin(events.map(|event| match event {
            Ok(LifecycleEvent::ChunkReceived(chunk)) => {
                #[cfg(feature = "tracing")]
                trace!(len = chunk.len(), "chunk received");
                Ok(chunk)
            }
            Ok(LifecycleEvent::HeadersReceived(_)) => {
                Err(ClientError::protocol("unexpected header after body"))
            }
            Err(e) => Err(e),
        }));

        Ok(DrivenResponse {
            status_code: head.status_code,
            header: head.header,
            cookies: head.cookies,
            frames: EnvelopeDecoder::new(chunks).with_max_frame_len(self.max_frame_len),
        })
    }

    /// Issue `request` without chunked delivery and wait for the whole body.
    pub async fn fetch(&self, mut request: HostRequest) -> Result<FetchedResponse, ClientError> {
        request.enable_chunked = false;

        #[cfg(feature = "tracing")]
        debug!(url = %request.url, "dispatching host request");

        let (tx, rx) = oneshot::channel();
        let _task = self.host.request(
            request,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );

        let success = rx
            .await
            .map_err(|_| ClientError::protocol("host dropped the request without completing"))??;

        #[cfg(feature = "tracing")]
        debug!(
            status = success.status_code,
            len = success.data.len(),
            "response received"
        );

        Ok(FetchedResponse {
            status_code: success.status_code,
            header: success.header,
            body: success.data,
        })
    }

    fn register_chunked(&self, request: HostRequest) -> EventStream<LifecycleEvent> {
        let host = self.host.clone();
        EventStream::new(move |sink| {
            let complete = sink.clone();
            let task = host.request(
                request,
                Box::new(move |result| match result {
                    Ok(_) => complete.end(),
                    Err(e) => complete.error(e.into()),
                }),
            );

            let headers = sink.clone();
            task.on_headers_received(Box::new(move |head| {
                headers.value(LifecycleEvent::HeadersReceived(head));
            }));
            task.on_chunk_received(Box::new(move |chunk| {
                sink.value(LifecycleEvent::ChunkReceived(chunk));
            }));

            Box::new(move || {
                task.off_chunk_received();
                task.off_headers_received();
            })
        })
    }

    fn register_atomic(&self, request: HostRequest) -> EventStream<LifecycleEvent> {
        let host = self.host.clone();
        EventStream::new(move |sink| {
            let _task = host.request(
                request,
                Box::new(move |result| match result {
                    Ok(success) => {
                        sink.value(LifecycleEvent::HeadersReceived(HeadersReceived {
                            status_code: success.status_code,
                            header: success.header,
                            cookies: success.cookies,
                        }));
                        sink.value(LifecycleEvent::ChunkReceived(success.data));
                        sink.end();
                    }
                    Err(e) => sink.error(e.into()),
                }),
            );
            noop_disposer()
        })
    }
}
