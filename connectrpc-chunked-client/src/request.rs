//! Request construction shared by both transports.

use std::time::Duration;

use bytes::Bytes;
use connectrpc_chunked_core::connect::{
    CONNECT_PROTOCOL_VERSION, CONNECT_PROTOCOL_VERSION_HEADER, CONNECT_TIMEOUT_HEADER,
};
use connectrpc_chunked_core::grpc_web::{GRPC_TIMEOUT, X_GRPC_WEB, X_USER_AGENT};
use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use http::Method;

use crate::codec::Codec;
use crate::config::{duration_to_grpc_timeout, duration_to_timeout_header};
use crate::host::{AdditionalRequestOptions, HostRequest, ResponseType};

/// Value sent in `x-user-agent` on gRPC-Web requests.
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Check if a header name is reserved by the protocols.
///
/// Reserved headers are never copied from user-provided CallOptions.
/// Headers beginning with "Connect-" and "Grpc-" are reserved.
pub(crate) fn is_reserved_header(name: &HeaderName) -> bool {
    let name_str = name.as_str();
    // Protocol-specific headers
    name_str.starts_with("connect-")
        || name_str.starts_with("grpc-")
        // Content headers set by the transport
        || name_str == "content-type"
        || name_str == "content-encoding"
        || name_str == "accept-encoding"
        || name_str == "content-length"
}

/// Build `<base_url>/<procedure>`, without doubling the slash.
pub(crate) fn method_url(base_url: &str, procedure: &str) -> String {
    let procedure = procedure.strip_prefix('/').unwrap_or(procedure);
    let base_url = base_url.strip_suffix('/').unwrap_or(base_url);
    format!("{}/{}", base_url, procedure)
}

/// Copy user headers, skipping reserved ones.
pub(crate) fn append_call_headers(headers: &mut HeaderMap, user: &HeaderMap) {
    for (name, value) in user {
        if !is_reserved_header(name) {
            headers.append(name.clone(), value.clone());
        }
    }
}

fn insert_timeout(headers: &mut HeaderMap, name: &'static str, value: Option<String>) {
    if let Some(value) = value.and_then(|v| HeaderValue::try_from(v).ok()) {
        headers.insert(name, value);
    }
}

/// Headers of a Connect unary request.
pub(crate) fn connect_unary_headers(codec: Codec, timeout: Option<Duration>) -> HeaderMap {
    let content_type = match codec {
        Codec::Proto => "application/proto",
        Codec::Json => "application/json",
    };
    connect_headers(content_type, timeout)
}

/// Headers of a Connect streaming request.
pub(crate) fn connect_stream_headers(codec: Codec, timeout: Option<Duration>) -> HeaderMap {
    let content_type = match codec {
        Codec::Proto => "application/connect+proto",
        Codec::Json => "application/connect+json",
    };
    connect_headers(content_type, timeout)
}

fn connect_headers(content_type: &'static str, timeout: Option<Duration>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(
        CONNECT_PROTOCOL_VERSION_HEADER,
        HeaderValue::from_static(CONNECT_PROTOCOL_VERSION),
    );
    insert_timeout(
        &mut headers,
        CONNECT_TIMEOUT_HEADER,
        timeout.and_then(duration_to_timeout_header),
    );
    headers
}

/// Headers of a gRPC-Web request.
pub(crate) fn grpc_web_headers(codec: Codec, timeout: Option<Duration>) -> HeaderMap {
    let content_type = match codec {
        Codec::Proto => "application/grpc-web+proto",
        Codec::Json => "application/grpc-web+json",
    };
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(X_GRPC_WEB, HeaderValue::from_static("1"));
    headers.insert(X_USER_AGENT, HeaderValue::from_static(USER_AGENT));
    insert_timeout(
        &mut headers,
        GRPC_TIMEOUT,
        timeout.and_then(duration_to_grpc_timeout),
    );
    headers
}

/// Assemble the request handed to the host. Always `POST` with a binary
/// response body; `enable_chunked` is decided by the driver.
pub(crate) fn host_request(
    url: String,
    header: HeaderMap,
    body: Bytes,
    options: &AdditionalRequestOptions,
) -> HostRequest {
    HostRequest {
        url,
        method: Method::POST,
        header,
        body,
        response_type: ResponseType::Binary,
        enable_chunked: false,
        options: options.clone(),
    }
}
