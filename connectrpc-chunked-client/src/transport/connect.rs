use bytes::Bytes;
use connectrpc_chunked_core::connect::{demux_unary_trailers, parse_error_body};
use connectrpc_chunked_core::{Code, envelope_flags, wrap_envelope};
use futures::{Stream, StreamExt, pin_mut};
use prost::Message;
use serde::Serialize;
use serde::de::DeserializeOwned;
#[cfg(feature = "tracing")]
use tracing::{Instrument, debug, info_span};

use super::{Transport, TransportConfig};
use crate::ClientError;
use crate::config::{CallOptions, resolve_timeout};
use crate::driver::RequestDriver;
use crate::request::{
    append_call_headers, connect_stream_headers, connect_unary_headers, host_request, method_url,
};
use crate::response::{
    ConnectMessages, Metadata, StreamResponse, Trailers, UnaryResponse, validate_stream_response,
};
use crate::streaming::Streaming;

/// Connect protocol transport.
#[derive(Debug, Clone)]
pub struct ConnectTransport {
    config: TransportConfig,
    driver: RequestDriver,
}

impl ConnectTransport {
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

    async fn call_unary<Req, Res>(
        &self,
        procedure: &str,
        options: CallOptions,
        message: &Req,
    ) -> Result<UnaryResponse<Res>, ClientError>
    where
        Req: Message + Serialize,
        Res: Message + DeserializeOwned + Default,
    {
        let codec = self.config.codec;
        let timeout = resolve_timeout(options.timeout, self.config.default_timeout);

        let mut header = connect_unary_headers(codec, timeout);
        append_call_headers(&mut header, &options.headers);
        let body = codec.encode(message)?;

        let request = host_request(
            method_url(&self.config.base_url, procedure),
            header,
            body,
            &self.config.request_options,
        );
        let response = self.driver.fetch(request).await?;
        let (header, trailer) = demux_unary_trailers(&response.header);

        if response.status_code != 200 {
            let status_code = response.status_code;
            let fallback = Code::from_http_status(status_code);
            let err = match parse_error_body(&response.body, fallback) {
                Some(wire) => ClientError::Status {
                    code: wire.code,
                    message: wire.message,
                    details: wire.details,
                    metadata: Metadata::empty(),
                },
                None => ClientError::new(fallback, format!("HTTP {status_code}")),
            };

            #[cfg(feature = "tracing")]
            debug!(status = status_code, code = %err.code(), "unary call failed");

            return Err(err.with_metadata(&header).with_metadata(&trailer));
        }

        let message = codec.decode(&response.body)?;
        Ok(UnaryResponse {
            status_code: response.status_code,
            header: header.into(),
            trailer: trailer.into(),
            message: Some(message),
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
        let payload = match input.next().await {
            Some(first) => self.config.codec.encode(&first)?,
            None => return Err(ClientError::protocol("missing request message")),
        };

        let codec = self.config.codec;
        let timeout = resolve_timeout(options.timeout, self.config.default_timeout);

        let mut header = connect_stream_headers(codec, timeout);
        append_call_headers(&mut header, &options.headers);

        let request = host_request(
            method_url(&self.config.base_url, procedure),
            header,
            Bytes::from(wrap_envelope(envelope_flags::MESSAGE, &payload)?),
            &self.config.request_options,
        );
        let response = self.driver.drive(request).await?;
        validate_stream_response(response.status_code, &response.header)?;

        let trailer = Trailers::new();
        let messages = ConnectMessages::new(
            response.frames,
            codec,
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

impl Transport for ConnectTransport {
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
            rpc.protocol = "connect",
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
            rpc.protocol = "connect",
            rpc.encoding = %self.config.codec.name(),
            otel.kind = "client",
        ));

        call.await
    }
}
