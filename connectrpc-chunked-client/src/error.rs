//! Client-side error types.
//!
//! This module provides [`ClientError`], the error type for every transport
//! operation.

use connectrpc_chunked_core::{Code, EnvelopeError, ErrorDetail};
use http::HeaderMap;

use crate::host::HostError;
use crate::response::Metadata;

/// Client-side error variants.
///
/// Remote errors and framing violations arrive as [`ClientError::Status`];
/// protocol violations detected locally are [`ClientError::Protocol`].
#[derive(Clone, Debug, thiserror::Error)]
pub enum ClientError {
    /// A status error with code, message, optional details and the response
    /// metadata that accompanied it.
    #[error("[{code}] {}", .message.as_deref().unwrap_or(""))]
    Status {
        code: Code,
        message: Option<String>,
        details: Vec<ErrorDetail>,
        metadata: Metadata,
    },

    /// The host request facility reported a failure.
    #[error("host request failed (errno {errno}): {message}")]
    Host { errno: i32, message: String },

    /// Message encoding error.
    #[error("encode error: {0}")]
    Encode(String),

    /// Message decoding error.
    #[error("decode error: {0}")]
    Decode(String),

    /// Protocol violation (missing trailer, extra message, etc.).
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    /// Create a new status error with a code and message.
    pub fn new<S: Into<String>>(code: Code, message: S) -> Self {
        ClientError::Status {
            code,
            message: Some(message.into()),
            details: vec![],
            metadata: Metadata::empty(),
        }
    }

    /// Create a new status error with just a code.
    pub fn from_code(code: Code) -> Self {
        ClientError::Status {
            code,
            message: None,
            details: vec![],
            metadata: Metadata::empty(),
        }
    }

    pub(crate) fn protocol<S: Into<String>>(message: S) -> Self {
        ClientError::Protocol(message.into())
    }

    /// Get the error code.
    ///
    /// Every variant other than `Status` reports `Internal`.
    pub fn code(&self) -> Code {
        match self {
            ClientError::Status { code, .. } => *code,
            ClientError::Host { .. }
            | ClientError::Encode(_)
            | ClientError::Decode(_)
            | ClientError::Protocol(_) => Code::Internal,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> Option<&str> {
        match self {
            ClientError::Status { message, .. } => message.as_deref(),
            ClientError::Host { message, .. } => Some(message),
            ClientError::Encode(msg) | ClientError::Decode(msg) | ClientError::Protocol(msg) => {
                Some(msg)
            }
        }
    }

    /// Get the error details (only for Status variant).
    pub fn details(&self) -> &[ErrorDetail] {
        match self {
            ClientError::Status { details, .. } => details,
            _ => &[],
        }
    }

    /// Response metadata attached to a status error.
    pub fn metadata(&self) -> Option<&Metadata> {
        match self {
            ClientError::Status { metadata, .. } => Some(metadata),
            _ => None,
        }
    }

    /// Merge response metadata into a status error.
    ///
    /// Other variants are returned unchanged.
    pub fn with_metadata(mut self, headers: &HeaderMap) -> Self {
        if let ClientError::Status { metadata, .. } = &mut self {
            metadata.append_all(headers);
        }
        self
    }

    /// Add a pre-constructed ErrorDetail.
    pub fn add_error_detail(mut self, detail: ErrorDetail) -> Self {
        if let ClientError::Status { details, .. } = &mut self {
            details.push(detail);
        }
        self
    }

    /// Create an internal error.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Internal, message)
    }

    /// Create a data loss error.
    pub fn data_loss<S: Into<String>>(message: S) -> Self {
        Self::new(Code::DataLoss, message)
    }
}

impl From<EnvelopeError> for ClientError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::PrematureEnd { .. } | EnvelopeError::FrameTooLarge { .. } => {
                ClientError::new(err.code(), err.to_string())
            }
            EnvelopeError::IncompleteHeader { .. }
            | EnvelopeError::UnsupportedCompression(_)
            | EnvelopeError::InvalidEndStream(_)
            | EnvelopeError::InvalidTrailer(_) => ClientError::Protocol(err.to_string()),
        }
    }
}

impl From<HostError> for ClientError {
    fn from(err: HostError) -> Self {
        ClientError::Host {
            errno: err.errno,
            message: err.message,
        }
    }
}
