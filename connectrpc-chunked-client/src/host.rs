//! Host request facility.
//!
//! The transport never opens connections itself. It hands a [`HostRequest`]
//! to a [`RequestHost`], which reports back through callbacks:
//!
//! - a one-shot [`Completion`] with the final result
//! - when chunked delivery is enabled, header and chunk handlers registered
//!   on the returned [`RequestTask`]
//!
//! The shape follows mini-program style request APIs
//! (`request({ success, fail, enableChunked })` returning a task with
//! `onHeadersReceived` / `onChunkReceived`).

use bytes::Bytes;
use http::{HeaderMap, Method};

/// Requested response body type. Only binary bodies are used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseType {
    #[default]
    Binary,
}

/// Host-specific request switches, forwarded verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdditionalRequestOptions {
    pub enable_http2: Option<bool>,
    pub enable_quic: Option<bool>,
    pub enable_cache: Option<bool>,
    pub enable_http_dns: Option<bool>,
    pub http_dns_service_id: Option<String>,
    pub force_cellular_network: Option<bool>,
}

/// A request handed to the host.
#[derive(Debug, Clone)]
pub struct HostRequest {
    pub url: String,
    pub method: Method,
    pub header: HeaderMap,
    pub body: Bytes,
    pub response_type: ResponseType,
    /// Deliver the body incrementally through the task's chunk handler.
    pub enable_chunked: bool,
    pub options: AdditionalRequestOptions,
}

/// Final result of a successful host request.
///
/// With chunked delivery `data` is usually empty; the body already went
/// through the chunk handler.
#[derive(Debug, Clone, Default)]
pub struct RequestSuccess {
    pub status_code: u16,
    pub header: HeaderMap,
    pub data: Bytes,
    pub cookies: Vec<String>,
}

/// Failure reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (errno {errno})")]
pub struct HostError {
    pub errno: i32,
    pub message: String,
}

impl HostError {
    pub fn new<S: Into<String>>(errno: i32, message: S) -> Self {
        Self {
            errno,
            message: message.into(),
        }
    }
}

/// Payload of a headers-received callback.
#[derive(Debug, Clone, Default)]
pub struct HeadersReceived {
    pub status_code: u16,
    pub header: HeaderMap,
    pub cookies: Vec<String>,
}

/// One-shot completion callback.
pub type Completion = Box<dyn FnOnce(Result<RequestSuccess, HostError>) + Send>;

/// Handler for the headers-received event.
pub type HeadersHandler = Box<dyn Fn(HeadersReceived) + Send + Sync>;

/// Handler for each received body chunk.
pub type ChunkHandler = Box<dyn Fn(Bytes) + Send + Sync>;

/// An in-flight host request.
pub trait RequestTask: Send + Sync {
    fn on_headers_received(&self, handler: HeadersHandler);
    fn on_chunk_received(&self, handler: ChunkHandler);
    fn off_headers_received(&self);
    fn off_chunk_received(&self);
}

/// The host's request primitive.
pub trait RequestHost: Send + Sync {
    /// Start a request. `complete` is called exactly once.
    fn request(&self, request: HostRequest, complete: Completion) -> Box<dyn RequestTask>;
}

impl<H: RequestHost + ?Sized> RequestHost for std::sync::Arc<H> {
    fn request(&self, request: HostRequest, complete: Completion) -> Box<dyn RequestTask> {
        (**self).request(request, complete)
    }
}
