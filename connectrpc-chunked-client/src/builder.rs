//! Transport builder.
//!
//! Provides a fluent API for configuring and building a [`ConnectTransport`]
//! or a [`GrpcWebTransport`] on top of a [`RequestHost`].

use std::sync::Arc;
use std::time::Duration;

use crate::codec::Codec;
use crate::driver::RequestDriver;
use crate::host::{AdditionalRequestOptions, RequestHost};
use crate::transport::{ConnectTransport, GrpcWebTransport, TransportConfig};

/// Builder for the protocol transports.
///
/// # Example
///
/// ```ignore
/// use connectrpc_chunked_client::TransportBuilder;
///
/// let transport = TransportBuilder::new("https://api.example.com")
///     .use_proto()
///     .default_timeout(Duration::from_secs(10))
///     .build_grpc_web(host);
/// ```
#[derive(Debug, Clone)]
pub struct TransportBuilder {
    /// Base URL for the service (e.g., "https://api.example.com").
    base_url: String,
    /// Explicit encoding choice; `None` keeps the protocol default.
    use_proto: Option<bool>,
    /// Default timeout for RPC calls.
    default_timeout: Option<Duration>,
    /// Ask the host for chunked response delivery.
    enable_chunked: bool,
    /// Host options forwarded with every request.
    request_options: AdditionalRequestOptions,
    /// Largest accepted frame payload.
    max_frame_len: Option<usize>,
}

impl TransportBuilder {
    /// Create a new TransportBuilder with the given base URL.
    ///
    /// The base URL should include the scheme and host. A trailing slash is
    /// removed.
    pub fn new<S: Into<String>>(base_url: S) -> Self {
        Self {
            base_url: base_url.into(),
            use_proto: None,
            default_timeout: None,
            enable_chunked: true,
            request_options: AdditionalRequestOptions::default(),
            max_frame_len: None,
        }
    }

    /// Use JSON encoding for requests and responses.
    ///
    /// This is the default for the Connect transport.
    pub fn use_json(mut self) -> Self {
        self.use_proto = Some(false);
        self
    }

    /// Use protobuf encoding for requests and responses.
    ///
    /// This is the default for the gRPC-Web transport.
    pub fn use_proto(mut self) -> Self {
        self.use_proto = Some(true);
        self
    }

    /// Set the default timeout for RPC calls.
    ///
    /// The timeout is only propagated to the server, via `connect-timeout-ms`
    /// or `grpc-timeout`; it is not enforced locally. Individual calls can
    /// override it using [`CallOptions::timeout`](crate::CallOptions::timeout).
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Toggle chunked response delivery.
    ///
    /// When disabled, the host delivers the whole body with its completion
    /// and frames are decoded from that single chunk. Enabled by default.
    pub fn enable_chunked(mut self, enable: bool) -> Self {
        self.enable_chunked = enable;
        self
    }

    /// Host options forwarded verbatim with every request.
    pub fn request_options(mut self, options: AdditionalRequestOptions) -> Self {
        self.request_options = options;
        self
    }

    /// Reject response frames whose payload exceeds `limit` bytes.
    pub fn max_frame_len(mut self, limit: usize) -> Self {
        self.max_frame_len = Some(limit);
        self
    }

    fn parts(self, default_proto: bool, host: Arc<dyn RequestHost>) -> (TransportConfig, RequestDriver) {
        let driver =
            RequestDriver::new(host, self.enable_chunked).with_max_frame_len(self.max_frame_len);
        let config = TransportConfig {
            base_url: self.base_url.trim_end_matches('/').to_string(),
            codec: Codec::from_use_proto(self.use_proto.unwrap_or(default_proto)),
            default_timeout: self.default_timeout,
            request_options: self.request_options,
        };
        (config, driver)
    }

    /// Build a Connect transport. JSON unless [`use_proto`](Self::use_proto)
    /// was called.
    pub fn build_connect<H: RequestHost + 'static>(self, host: H) -> ConnectTransport {
        let (config, driver) = self.parts(false, Arc::new(host));
        ConnectTransport::new(config, driver)
    }

    /// Build a gRPC-Web transport. Protobuf unless
    /// [`use_json`](Self::use_json) was called.
    pub fn build_grpc_web<H: RequestHost + 'static>(self, host: H) -> GrpcWebTransport {
        let (config, driver) = self.parts(true, Arc::new(host));
        GrpcWebTransport::new(config, driver)
    }
}
