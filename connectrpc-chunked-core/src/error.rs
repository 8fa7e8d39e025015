//! Protocol status codes and wire-level error types.
//!
//! - [`Code`]: status codes shared by Connect and gRPC-Web
//! - [`ErrorDetail`]: self-describing error details
//! - [`EnvelopeError`]: framing and payload format errors

use std::str::FromStr;

use base64::Engine;

/// RPC status codes, identical for Connect (string form) and gRPC-Web
/// (numeric form).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Code {
    Ok = 0,
    Canceled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl Code {
    /// The Connect string form of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Ok => "ok",
            Code::Canceled => "canceled",
            Code::Unknown => "unknown",
            Code::InvalidArgument => "invalid_argument",
            Code::DeadlineExceeded => "deadline_exceeded",
            Code::NotFound => "not_found",
            Code::AlreadyExists => "already_exists",
            Code::PermissionDenied => "permission_denied",
            Code::ResourceExhausted => "resource_exhausted",
            Code::FailedPrecondition => "failed_precondition",
            Code::Aborted => "aborted",
            Code::OutOfRange => "out_of_range",
            Code::Unimplemented => "unimplemented",
            Code::Internal => "internal",
            Code::Unavailable => "unavailable",
            Code::DataLoss => "data_loss",
            Code::Unauthenticated => "unauthenticated",
        }
    }

    /// Map the numeric gRPC form (`grpc-status`) to a code.
    pub fn from_u32(value: u32) -> Option<Code> {
        let code = match value {
            0 => Code::Ok,
            1 => Code::Canceled,
            2 => Code::Unknown,
            3 => Code::InvalidArgument,
            4 => Code::DeadlineExceeded,
            5 => Code::NotFound,
            6 => Code::AlreadyExists,
            7 => Code::PermissionDenied,
            8 => Code::ResourceExhausted,
            9 => Code::FailedPrecondition,
            10 => Code::Aborted,
            11 => Code::OutOfRange,
            12 => Code::Unimplemented,
            13 => Code::Internal,
            14 => Code::Unavailable,
            15 => Code::DataLoss,
            16 => Code::Unauthenticated,
            _ => return None,
        };
        Some(code)
    }

    /// Map an HTTP status to a code.
    ///
    /// Used when a response carries no protocol-level status of its own.
    pub fn from_http_status(status: u16) -> Code {
        match status {
            200 => Code::Ok,
            400 => Code::Internal,
            401 => Code::Unauthenticated,
            403 => Code::PermissionDenied,
            404 => Code::Unimplemented,
            429 => Code::Unavailable,
            502..=504 => Code::Unavailable,
            _ => Code::Unknown,
        }
    }
}

/// Error returned when parsing a [`Code`] from a string fails.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseCodeError(());

impl std::fmt::Display for ParseCodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown error code")
    }
}

impl std::error::Error for ParseCodeError {}

impl FromStr for Code {
    type Err = ParseCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(Code::Ok),
            "canceled" | "cancelled" => Ok(Code::Canceled),
            "unknown" => Ok(Code::Unknown),
            "invalid_argument" => Ok(Code::InvalidArgument),
            "deadline_exceeded" => Ok(Code::DeadlineExceeded),
            "not_found" => Ok(Code::NotFound),
            "already_exists" => Ok(Code::AlreadyExists),
            "permission_denied" => Ok(Code::PermissionDenied),
            "resource_exhausted" => Ok(Code::ResourceExhausted),
            "failed_precondition" => Ok(Code::FailedPrecondition),
            "aborted" => Ok(Code::Aborted),
            "out_of_range" => Ok(Code::OutOfRange),
            "unimplemented" => Ok(Code::Unimplemented),
            "internal" => Ok(Code::Internal),
            "unavailable" => Ok(Code::Unavailable),
            "data_loss" => Ok(Code::DataLoss),
            "unauthenticated" => Ok(Code::Unauthenticated),
            _ => Err(ParseCodeError(())),
        }
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A self-describing error detail (`google.protobuf.Any` on the wire).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorDetail {
    /// Fully-qualified type name (e.g., "google.rpc.RetryInfo").
    type_url: String,
    /// Protobuf-encoded message bytes.
    value: Vec<u8>,
}

impl ErrorDetail {
    pub fn new<S: Into<String>>(type_url: S, value: Vec<u8>) -> Self {
        Self {
            type_url: type_url.into(),
            value,
        }
    }

    /// Build a detail from its JSON wire form.
    ///
    /// Connect sends unpadded base64, but padded input is accepted too.
    /// Returns `None` if the value is not valid base64.
    pub fn from_base64(type_url: &str, value: &str) -> Option<Self> {
        let value = base64::engine::general_purpose::STANDARD_NO_PAD
            .decode(value)
            .or_else(|_| base64::engine::general_purpose::STANDARD.decode(value))
            .ok()?;
        Some(Self::new(type_url, value))
    }

    pub fn type_url(&self) -> &str {
        &self.type_url
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

/// Framing and payload format errors.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    /// Incomplete envelope header.
    #[error("incomplete envelope header: expected {expected} bytes, got {actual}")]
    IncompleteHeader { expected: usize, actual: usize },

    /// The byte source ended inside a header or a payload.
    #[error("premature end of stream: {buffered} bytes of incomplete frame")]
    PrematureEnd { buffered: usize },

    /// A frame declared a length above the configured limit.
    #[error("frame of {length} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { length: usize, limit: usize },

    /// A payload too long for the 4-byte length prefix.
    #[error("payload of {length} bytes does not fit in an envelope")]
    PayloadTooLarge { length: usize },

    /// A message frame carried the compressed bit.
    #[error("unsupported compressed frame: flags 0x{0:02x}")]
    UnsupportedCompression(u8),

    /// The Connect end-of-stream record could not be parsed.
    #[error("invalid EndStreamResponse: {0}")]
    InvalidEndStream(String),

    /// The gRPC-Web trailer block could not be parsed.
    #[error("invalid trailer: {0}")]
    InvalidTrailer(String),
}

impl EnvelopeError {
    /// The status code this error is reported with.
    pub fn code(&self) -> Code {
        match self {
            EnvelopeError::PrematureEnd { .. } => Code::DataLoss,
            EnvelopeError::FrameTooLarge { .. } | EnvelopeError::PayloadTooLarge { .. } => {
                Code::ResourceExhausted
            }
            EnvelopeError::IncompleteHeader { .. }
            | EnvelopeError::UnsupportedCompression(_)
            | EnvelopeError::InvalidEndStream(_)
            | EnvelopeError::InvalidTrailer(_) => Code::Internal,
        }
    }
}
