//! Response types.
//!
//! - [`Metadata`]: header/trailer wrapper
//! - [`UnaryResponse`]: a fully materialized unary result
//! - [`StreamResponse`]: a lazily evaluated server-stream result
//! - [`Trailers`]: trailer target populated while a stream is drained

mod connect;
mod decoder;
mod grpc_web;

use std::sync::{Arc, Mutex, PoisonError};

use futures::{Stream, StreamExt};
use http::HeaderMap;
use http::header::{HeaderName, HeaderValue};

use crate::ClientError;
use crate::streaming::Streaming;

pub use connect::{ConnectMessages, validate_stream_response};
pub use decoder::EnvelopeDecoder;
pub use grpc_web::{GrpcWebMessages, ResponseKind, validate_response};

/// State of a response body demultiplexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemuxState {
    /// Reading message frames; the terminal frame has not been seen.
    AwaitingMessageOrTrailer,
    /// The terminal frame was consumed successfully.
    TrailerObserved,
    /// An error was yielded. Nothing more is read.
    Errored,
    /// The body completed successfully.
    Done,
}

/// Response metadata wrapper around HTTP headers.
///
/// Keys may carry several values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    headers: HeaderMap,
}

impl Metadata {
    /// Create new metadata from HTTP headers.
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }

    /// Create empty metadata.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Get a header value by name.
    ///
    /// Returns `None` if the header is not present or cannot be converted to a string.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|v| v.to_str().ok())
    }

    /// Get a header value as bytes.
    pub fn get_bytes(&self, key: &str) -> Option<&[u8]> {
        self.headers.get(key).map(|v| v.as_bytes())
    }

    /// Check if a header exists.
    pub fn contains(&self, key: &str) -> bool {
        self.headers.contains_key(key)
    }

    /// Get all values for a header (for headers that appear multiple times).
    pub fn get_all(&self, key: &str) -> impl Iterator<Item = &str> {
        self.headers
            .get_all(key)
            .iter()
            .filter_map(|v| v.to_str().ok())
    }

    /// Get the underlying HeaderMap.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Consume self and return the underlying HeaderMap.
    pub fn into_headers(self) -> HeaderMap {
        self.headers
    }

    /// Get an iterator over all header names and values.
    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.headers.iter()
    }

    /// Returns true if there are no headers.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Returns the number of values, counting each value of a
    /// multi-valued key.
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Append every value of `other`, keeping existing values.
    pub(crate) fn append_all(&mut self, other: &HeaderMap) {
        for (name, value) in other {
            self.headers.append(name.clone(), value.clone());
        }
    }

    /// Merge `other` key by key: a key present in `other` replaces all
    /// existing values for that key.
    pub(crate) fn merge(&mut self, other: HeaderMap) {
        let mut current: Option<HeaderName> = None;
        for (name, value) in other {
            // `None` names continue the previous key.
            if let Some(name) = name {
                self.headers.remove(&name);
                current = Some(name);
            }
            if let Some(name) = &current {
                self.headers.append(name.clone(), value);
            }
        }
    }
}

impl From<HeaderMap> for Metadata {
    fn from(headers: HeaderMap) -> Self {
        Self::new(headers)
    }
}

impl From<Metadata> for HeaderMap {
    fn from(metadata: Metadata) -> Self {
        metadata.headers
    }
}

/// Trailer target shared between a [`StreamResponse`] and the demultiplexer
/// reading its body.
///
/// Empty until the terminal frame has been consumed.
#[derive(Debug, Clone, Default)]
pub struct Trailers {
    inner: Arc<Mutex<Metadata>>,
}

impl Trailers {
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of the trailers received so far.
    pub fn get(&self) -> Metadata {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    pub(crate) fn merge(&self, headers: HeaderMap) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .merge(headers);
    }
}

/// Result of a unary call.
#[derive(Debug, Clone)]
pub struct UnaryResponse<T> {
    /// HTTP status of the response.
    pub status_code: u16,
    /// Response headers.
    pub header: Metadata,
    /// Response trailers.
    pub trailer: Metadata,
    /// The response message. `None` only for a gRPC-Web trailers-only
    /// success.
    pub message: Option<T>,
}

impl<T> UnaryResponse<T> {
    /// Extract the message, failing if the server sent none.
    pub fn into_message(self) -> Result<T, ClientError> {
        self.message
            .ok_or_else(|| ClientError::protocol("missing message"))
    }

    /// Get a reference to the message, if any.
    pub fn message(&self) -> Option<&T> {
        self.message.as_ref()
    }
}

/// Result of a server-streaming call.
///
/// The message stream is lazy: nothing past the response headers is read
/// until it is polled. `trailer` is filled in once the stream has been
/// fully drained.
pub struct StreamResponse<T> {
    /// HTTP status of the response.
    pub status_code: u16,
    /// Response headers.
    pub header: Metadata,
    /// Response trailers, populated by draining `message`.
    pub trailer: Trailers,
    /// The response messages.
    pub message: Streaming<T>,
}

impl<T> std::fmt::Debug for StreamResponse<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResponse")
            .field("status_code", &self.status_code)
            .field("header", &self.header)
            .field("trailer", &self.trailer)
            .finish_non_exhaustive()
    }
}

impl<T> StreamResponse<T> {
    /// Decompose into the message stream and its trailer handle.
    pub fn into_parts(self) -> (Metadata, Streaming<T>, Trailers) {
        (self.header, self.message, self.trailer)
    }
}

/// Drive a demultiplexed message stream expected to hold at most one message.
///
/// A second message is an "extra message" violation. Errors raised by the
/// stream after the first message still fail the call.
pub(crate) async fn collect_unary<S, T>(mut messages: S) -> Result<Option<T>, ClientError>
where
    S: Stream<Item = Result<T, ClientError>> + Unpin,
{
    let mut message = None;
    while let Some(item) = messages.next().await {
        let item = item?;
        if message.is_some() {
            return Err(ClientError::protocol("extra message"));
        }
        message = Some(item);
    }
    Ok(message)
}
