use bytes::Bytes;
use connectrpc_chunked_core::{envelope_flags, wrap_envelope};
use futures::{Stream, StreamExt, pin_mut};
use prost::Message;
use serde::Serialize;
use serde::de::DeserializeOwned;
#[cfg(feature = "tracing")]
use tracing::{Instrument, info_span};

use super::{Transport, TransportConfig};
use crate::ClientError;
use crate::config::{CallOptions, resolve_timeout};
use crate::driver::{DrivenResponse, RequestDriver};
use crate::request::{append_call_headers, grpc_web_headers, host_request, method_url};
use crate::response::{
    GrpcWebMessages, ResponseKind, StreamResponse, Trailers, UnaryResponse, collect_unary,
    validate_response,
};
use crate::streaming::Streaming;

/// gRPC-Web transport.
#[derive(Debug, Clone)]
pub struct GrpcWebTransport {
    config: TransportConfig,
    driver: RequestDriver,
}

impl GrpcWebTransport {
    pub(crate) fn new(config: TransportConfig, driver: RequestDriver) -> Self {
        Self { config, driver }
    }

    /// Base URL calls are issued against.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Message encoding used by this transport.
    pub fn codec(&self) -> crate::Codec {
        self.config.codec
    }

    /// Send one enveloped message and validate the response head.
    async fn send<Req>(
        &self,
        procedure: &str,
        options: CallOptions,
        message: &Req,
    ) -> Result<(DrivenResponse, ResponseKind), ClientError>
    where
        Req: Message + Serialize,
    {
        let codec = self.config.codec;
        let timeout = resolve_timeout(options.timeout, self.config.default_timeout);

        let mut header = grpc_web_headers(codec, timeout);
        append_call_headers(&mut header, &options.headers);
        let payload = codec.encode(message)?;

        let request = host_request(
            method_url(&self.config.base_url, procedure),
            header,
            Bytes::from(wrap_envelope(envelope_flags::MESSAGE, &payload)?),
            &self.config.request_options,
        );
        let response = self.driver.drive(request).await?;
        let kind = validate_response(response.status_code, &response.header)?;
        Ok((response, kind))
    }

    async fn call_unary<Req, Res>(
        &self,
        procedure: &str,
        options: CallOptions,
        message: &Req,
    ) -> Result<UnaryResponse<Res>, ClientError>
    where
        Req: Message + Serialize,
        Res: Message + DeserializeOwned + Default + Send,
    {
        let (response, kind) = self.send(procedure, options, message).await?;

        let trailer = Trailers::new();
        let messages: GrpcWebMessages<_, Res> = GrpcWebMessages::new(
            response.frames,
            self.config.codec,
            kind,
            response.header.clone(),
            trailer.clone(),
        );
        let message = collect_unary(messages).await?;

        if kind == ResponseKind::Framed && message.is_none() {
            return Err(ClientError::protocol("missing message"));
        }

        Ok(UnaryResponse {
            status_code: response.status_code,
            header: response.header.into(),
            trailer: trailer.get(),
            message,
        })
    }

    async fn call_server_stream<Req, Res, I>(
        &self,
        procedure: &str,
        options: CallOptions,
        input: I,
    ) -> Result<StreamResponse<Res>, ClientError>
    where
        Req: Message + Serialize,
        Res: Message + DeserializeOwned + Default + Send + 'static,
        I: Stream<Item = Req>,
    {
        pin_mut!(input);
        let first = match input.next().await {
            Some(first) => first,
            None => return Err(ClientError::protocol("missing request message")),
        };
        let (response, kind) = self.send(procedure, options, &first).await?;

        let trailer = Trailers::new();
        let messages = GrpcWebMessages::new(
            response.frames,
            self.config.codec,
            kind,
            response.header.clone(),
            trailer.clone(),
        );

        Ok(StreamResponse {
            status_code: response.status_code,
            header: response.header.into(),
            trailer,
            message: Streaming::new(messages),
        })
    }
}

impl Transport for GrpcWebTransport {
    async fn unary<Req, Res>(
        &self,
        procedure: &str,
        options: CallOptions,
        message: &Req,
    ) -> Result<UnaryResponse<Res>, ClientError>
    where
        Req: Message + Serialize + Sync,
        Res: Message + DeserializeOwned + Default + Send + 'static,
    {
        let call = self.call_unary(procedure, options, message);

        #[cfg(feature = "tracing")]
        let call = call.instrument(info_span!(
            "rpc.call",
            rpc.method = %procedure,
            rpc.type = "unary",
            rpc.protocol = "grpc-web",
            rpc.encoding = %self.config.codec.name(),
            otel.kind = "client",
        ));

        call.await
    }

    async fn server_stream<Req, Res, I>(
        &self,
        procedure: &str,
        options: CallOptions,
        input: I,
    ) -> Result<StreamResponse<Res>, ClientError>
    where
        Req: Message + Serialize + Send,
        Res: Message + DeserializeOwned + Default + Send + 'static,
        I: Stream<Item = Req> + Send,
    {
        let call = self.call_server_stream(procedure, options, input);

        #[cfg(feature = "tracing")]
        let call = call.instrument(info_span!(
            "rpc.call",
            rpc.method = %procedure,
            rpc.type = "server_stream",
            rpc.protocol = "grpc-web",
            rpc.encoding = %self.config.codec.name(),
            otel.kind = "client",
        ));

        call.await
    }
}
