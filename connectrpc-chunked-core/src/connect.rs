//! Connect protocol payload formats.
//!
//! - the JSON `EndStreamResponse` carried by the terminal frame of a stream
//! - the JSON error body of a failed unary call
//!
//! ```json
//! {
//!   "error": {"code": "not_found", "message": "...", "details": [...]},
//!   "metadata": {"key": ["value"]}
//! }
//! ```

use std::collections::HashMap;

use http::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;

use crate::error::{Code, EnvelopeError, ErrorDetail};

/// Header carrying the Connect protocol version.
pub const CONNECT_PROTOCOL_VERSION_HEADER: &str = "connect-protocol-version";

/// The only Connect protocol version.
pub const CONNECT_PROTOCOL_VERSION: &str = "1";

/// Header carrying the Connect timeout in milliseconds.
pub const CONNECT_TIMEOUT_HEADER: &str = "connect-timeout-ms";

/// Prefix marking unary response headers that are really trailers.
pub const TRAILER_PREFIX: &str = "trailer-";

/// A decoded error record, from an end-stream frame or a unary error body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WireError {
    pub code: Code,
    pub message: Option<String>,
    pub details: Vec<ErrorDetail>,
}

/// A decoded Connect `EndStreamResponse`.
#[derive(Clone, Debug, Default)]
pub struct EndStream {
    pub error: Option<WireError>,
    pub metadata: HeaderMap,
}

#[derive(Deserialize)]
struct EndStreamJson {
    #[serde(default)]
    error: Option<ErrorJson>,
    #[serde(default)]
    metadata: Option<HashMap<String, Vec<String>>>,
}

#[derive(Deserialize)]
struct ErrorJson {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Vec<ErrorDetailJson>,
}

#[derive(Deserialize)]
struct ErrorDetailJson {
    #[serde(rename = "type")]
    type_url: String,
    #[serde(default)]
    value: String,
}

impl ErrorJson {
    fn into_wire_error(self, fallback: Code) -> WireError {
        let code = self
            .code
            .and_then(|c| c.parse().ok())
            .unwrap_or(fallback);
        let details = self
            .details
            .iter()
            .filter_map(|d| ErrorDetail::from_base64(&d.type_url, &d.value))
            .collect();
        WireError {
            code,
            message: self.message,
            details,
        }
    }
}

/// Parse the payload of a Connect end-of-stream frame.
///
/// An empty payload is a valid record with no error and no metadata.
pub fn parse_end_stream(payload: &[u8]) -> Result<EndStream, EnvelopeError> {
    if payload.is_empty() {
        return Ok(EndStream::default());
    }

    let json: EndStreamJson = serde_json::from_slice(payload)
        .map_err(|e| EnvelopeError::InvalidEndStream(e.to_string()))?;

    let mut metadata = HeaderMap::new();
    for (key, values) in json.metadata.unwrap_or_default() {
        let name = HeaderName::try_from(key.as_str())
            .map_err(|_| EnvelopeError::InvalidEndStream(format!("invalid metadata key {key:?}")))?;
        for value in values {
            let value = HeaderValue::try_from(value.as_str()).map_err(|_| {
                EnvelopeError::InvalidEndStream(format!("invalid metadata value for {key:?}"))
            })?;
            metadata.append(name.clone(), value);
        }
    }

    Ok(EndStream {
        error: json.error.map(|e| e.into_wire_error(Code::Unknown)),
        metadata,
    })
}

/// Parse the JSON body of a failed unary call.
///
/// Returns `None` if the body is not a Connect error, in which case the
/// caller falls back to the code derived from the HTTP status.
pub fn parse_error_body(body: &[u8], fallback: Code) -> Option<WireError> {
    let json: ErrorJson = serde_json::from_slice(body).ok()?;
    Some(json.into_wire_error(fallback))
}

/// Split unary response headers into `(header, trailer)`.
///
/// Connect unary responses send trailers as `trailer-` prefixed headers;
/// the prefix is stripped in the returned trailer map.
pub fn demux_unary_trailers(headers: &HeaderMap) -> (HeaderMap, HeaderMap) {
    let mut header = HeaderMap::new();
    let mut trailer = HeaderMap::new();
    for (name, value) in headers {
        match name.as_str().strip_prefix(TRAILER_PREFIX) {
            Some(stripped) => {
                if let Ok(stripped) = HeaderName::try_from(stripped) {
                    trailer.append(stripped, value.clone());
                }
            }
            None => {
                header.append(name.clone(), value.clone());
            }
        }
    }
    (header, trailer)
}
