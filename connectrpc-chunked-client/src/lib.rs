//! Connect and gRPC-Web client transports for callback-based request hosts.
//!
//! This crate implements the client side of two RPC wire protocols on top of
//! a host-provided request primitive that reports its progress through
//! callbacks and may deliver the response body in arbitrary chunks.
//!
//! ## Features
//!
//! - Unary RPC calls (request-response)
//! - Server streaming RPC calls
//! - Connect protocol and gRPC-Web
//! - Both protobuf and JSON encoding support
//! - Chunked and whole-body host delivery
//!
//! Client streaming and bidirectional calls are not supported: every call
//! sends at most one message.
//!
//! ## Layers
//!
//! - [`EnvelopeDecoder`] rebuilds length-prefixed frames from a chunked byte
//!   stream.
//! - [`EventStream`] turns callback delivery into a pull-based stream and
//!   releases host listeners exactly once.
//! - [`RequestDriver`] issues a [`HostRequest`] and yields the response head
//!   followed by its frames.
//! - [`ConnectMessages`] and [`GrpcWebMessages`] demultiplex frames into
//!   messages and trailers.
//! - [`ConnectTransport`] and [`GrpcWebTransport`] implement [`Transport`].
//!
//! ## Example
//!
//! ```ignore
//! use connectrpc_chunked_client::{CallOptions, Transport, TransportBuilder};
//! use futures::StreamExt;
//!
//! let transport = TransportBuilder::new("https://api.example.com")
//!     .use_proto()
//!     .build_grpc_web(host);
//!
//! // Unary
//! let response = transport
//!     .unary::<GetRequest, Item>("items.v1.ItemService/Get", CallOptions::new(), &request)
//!     .await?;
//! println!("Response: {:?}", response.message);
//!
//! // Server streaming
//! let response = transport
//!     .server_stream::<ListRequest, Item, _>(
//!         "items.v1.ItemService/List",
//!         CallOptions::new(),
//!         futures::stream::iter([request]),
//!     )
//!     .await?;
//!
//! let mut stream = response.message;
//! while let Some(result) = stream.next().await {
//!     match result {
//!         Ok(item) => println!("Got item: {:?}", item),
//!         Err(e) => eprintln!("Error: {:?}", e),
//!     }
//! }
//!
//! // Trailers are available once the stream is consumed
//! println!("Trailers: {:?}", response.trailer.get());
//! ```
//!
//! ## Tracing
//!
//! With the default `tracing` feature every call runs inside an `rpc.call`
//! span. The crate never installs a subscriber.

mod builder;
mod codec;
pub mod config;
mod driver;
mod error;
mod event_stream;
pub mod host;
mod request;
pub mod response;
mod streaming;
pub mod transport;

pub use builder::TransportBuilder;
pub use codec::Codec;
pub use config::CallOptions;
pub use driver::{
    BodyChunks, DrivenResponse, FetchedResponse, LifecycleEvent, RequestDriver,
};
pub use error::ClientError;
pub use event_stream::{Disposer, EventSink, EventStream, noop_disposer};
pub use host::{
    AdditionalRequestOptions, ChunkHandler, Completion, HeadersHandler, HeadersReceived,
    HostError, HostRequest, RequestHost, RequestSuccess, RequestTask, ResponseType,
};
pub use response::{
    ConnectMessages, DemuxState, EnvelopeDecoder, GrpcWebMessages, Metadata, ResponseKind,
    StreamResponse, Trailers, UnaryResponse,
};
pub use streaming::Streaming;
pub use transport::{ConnectTransport, GrpcWebTransport, Transport};

// Re-export core types that users need
pub use connectrpc_chunked_core::{Code, Envelope, EnvelopeError, ErrorDetail, envelope_flags};

pub use bytes::Bytes;
