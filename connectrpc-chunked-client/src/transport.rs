//! Protocol transports.
//!
//! A transport turns one call into a [`HostRequest`](crate::HostRequest),
//! drives it through the [`RequestDriver`] and demultiplexes the response.
//!
//! - [`ConnectTransport`]: Connect protocol. Unary calls use a plain body and
//!   the non-chunked fetch path; server streams use enveloped frames closed
//!   by an end-of-stream record.
//! - [`GrpcWebTransport`]: gRPC-Web. Both call types use enveloped frames
//!   closed by a trailer frame.
//!
//! Both are built with [`TransportBuilder`](crate::TransportBuilder).

use std::future::Future;
use std::time::Duration;

use futures::Stream;
use prost::Message;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::ClientError;
use crate::codec::Codec;
use crate::config::CallOptions;
use crate::host::AdditionalRequestOptions;
use crate::response::{StreamResponse, UnaryResponse};

mod connect;
mod grpc_web;

pub use connect::ConnectTransport;
pub use grpc_web::GrpcWebTransport;

/// The call surface shared by both protocols.
///
/// Only calls with at most one outgoing message are supported.
pub trait Transport {
    /// Issue a unary call and wait for the complete result.
    ///
    /// Fails if the response carries zero or more than one message, except
    /// for a gRPC-Web trailers-only success where `message` is `None`.
    fn unary<Req, Res>(
        &self,
        procedure: &str,
        options: CallOptions,
        message: &Req,
    ) -> impl Future<Output = Result<UnaryResponse<Res>, ClientError>> + Send
    where
        Req: Message + Serialize + Sync,
        Res: Message + DeserializeOwned + Default + Send + 'static;

    /// Issue a server-streaming call.
    ///
    /// Only the first item of `input` is sent; an exhausted input fails with
    /// "missing request message" before any request is issued. The returned
    /// stream is lazy, and the trailer is populated once it is fully drained.
    fn server_stream<Req, Res, I>(
        &self,
        procedure: &str,
        options: CallOptions,
        input: I,
    ) -> impl Future<Output = Result<StreamResponse<Res>, ClientError>> + Send
    where
        Req: Message + Serialize + Send,
        Res: Message + DeserializeOwned + Default + Send + 'static,
        I: Stream<Item = Req> + Send;
}

/// Settings shared by both transports.
#[derive(Debug, Clone)]
pub(crate) struct TransportConfig {
    pub(crate) base_url: String,
    pub(crate) codec: Codec,
    pub(crate) default_timeout: Option<Duration>,
    pub(crate) request_options: AdditionalRequestOptions,
}
