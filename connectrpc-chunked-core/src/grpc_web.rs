//! gRPC-Web payload formats.
//!
//! Trailers travel in a dedicated frame whose payload is an HTTP/1 style
//! header block:
//!
//! ```text
//! grpc-status: 0\r\n
//! grpc-message: \r\n
//! ```

use http::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::{Code, EnvelopeError};

/// Trailer (or trailers-only header) carrying the numeric status.
pub const GRPC_STATUS: &str = "grpc-status";

/// Trailer carrying the percent-encoded status message.
pub const GRPC_MESSAGE: &str = "grpc-message";

/// Request header carrying the timeout.
pub const GRPC_TIMEOUT: &str = "grpc-timeout";

/// Request header marking a gRPC-Web call.
pub const X_GRPC_WEB: &str = "x-grpc-web";

/// Request header identifying the client library.
pub const X_USER_AGENT: &str = "x-user-agent";

/// A status decoded from `grpc-status` / `grpc-message`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrpcStatus {
    pub code: Code,
    pub message: Option<String>,
}

impl GrpcStatus {
    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }
}

/// Parse a trailer frame payload into a header map.
///
/// Lines are separated by `\r\n`; each line is split at its first `:`, both
/// sides trimmed. Empty lines and lines without a name are skipped.
pub fn parse_trailer_block(data: &[u8]) -> Result<HeaderMap, EnvelopeError> {
    let text = std::str::from_utf8(data)
        .map_err(|_| EnvelopeError::InvalidTrailer("trailer block is not UTF-8".into()))?;

    let mut trailer = HeaderMap::new();
    for line in text.split("\r\n") {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let name = HeaderName::try_from(name)
            .map_err(|_| EnvelopeError::InvalidTrailer(format!("invalid name {name:?}")))?;
        let value = HeaderValue::try_from(value.trim())
            .map_err(|_| EnvelopeError::InvalidTrailer(format!("invalid value for {name}")))?;
        trailer.append(name, value);
    }
    Ok(trailer)
}

/// Encode a header map as a trailer frame payload.
pub fn encode_trailer_block(trailer: &HeaderMap) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, value) in trailer {
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Read `grpc-status` and `grpc-message` from headers or trailers.
///
/// Returns `Ok(None)` when no `grpc-status` is present.
pub fn grpc_status(headers: &HeaderMap) -> Result<Option<GrpcStatus>, EnvelopeError> {
    let Some(raw) = headers.get(GRPC_STATUS) else {
        return Ok(None);
    };
    let code = raw
        .to_str()
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok())
        .and_then(Code::from_u32)
        .ok_or_else(|| EnvelopeError::InvalidTrailer(format!("invalid grpc-status {raw:?}")))?;
    let message = headers
        .get(GRPC_MESSAGE)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(percent_decode);
    Ok(Some(GrpcStatus { code, message }))
}

/// Decode a percent-encoded `grpc-message`.
///
/// Malformed escapes are kept verbatim.
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
