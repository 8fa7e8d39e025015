//! Call options for per-request configuration.
//!
//! This module provides [`CallOptions`] for configuring individual RPC calls
//! with timeouts and custom headers.

use http::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;
#[cfg(feature = "tracing")]
use tracing::warn;

/// Options for configuring individual RPC calls.
///
/// # Example
///
/// ```ignore
/// use connectrpc_chunked_client::CallOptions;
/// use std::time::Duration;
///
/// let options = CallOptions::new()
///     .timeout(Duration::from_secs(5))
///     .header("authorization", "Bearer token123")
///     .header("x-request-id", "abc-123");
///
/// let response = transport
///     .unary::<Req, Res>("my.service/Method", options, &request)
///     .await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Timeout for this specific call.
    /// If set, overrides the transport's default timeout.
    pub(crate) timeout: Option<Duration>,
    /// Custom headers for this specific call.
    pub(crate) headers: HeaderMap,
}

impl CallOptions {
    /// Create new default call options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timeout for this call.
    ///
    /// The timeout is only forwarded to the server (`connect-timeout-ms` or
    /// `grpc-timeout`); no local deadline is enforced. `Duration::ZERO`
    /// disables the transport's default timeout for this call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Get the configured timeout, if any.
    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Add a custom header for this call.
    ///
    /// Headers beginning with "Connect-" and "Grpc-" are reserved for use by
    /// the protocols and are not sent. An invalid name or value is skipped;
    /// use [`try_header`](Self::try_header) to detect it.
    pub fn header<K, V>(mut self, name: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        match (name.try_into(), value.try_into()) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => {
                #[cfg(feature = "tracing")]
                warn!("ignoring invalid call header");
            }
        }
        self
    }

    /// Try to add a custom header for this call.
    ///
    /// Returns `None` if the header name or value is invalid.
    pub fn try_header<K, V>(mut self, name: K, value: V) -> Option<Self>
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        let name = name.try_into().ok()?;
        let value = value.try_into().ok()?;
        self.headers.insert(name, value);
        Some(self)
    }

    /// Set all custom headers for this call, replacing any existing headers.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Get a reference to the custom headers.
    pub fn get_headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a mutable reference to the custom headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }
}

/// Pick the timeout forwarded for a call.
///
/// `None` falls back to `default`; a zero duration means "no timeout".
pub(crate) fn resolve_timeout(requested: Option<Duration>, default: Option<Duration>) -> Option<Duration> {
    requested.or(default).filter(|t| !t.is_zero())
}

/// Maximum timeout value in milliseconds (10 digits = 9,999,999,999 ms ≈ 115 days).
/// Values larger than this are treated as "no timeout".
pub(crate) const MAX_TIMEOUT_MS: u128 = 9_999_999_999;

/// Largest value of a `grpc-timeout` header (8 digits).
const MAX_GRPC_TIMEOUT_VALUE: u128 = 99_999_999;

/// Convert a Duration to the Connect-Timeout-Ms header value.
///
/// Returns None if the timeout is too large (> 10 digits) or zero.
pub(crate) fn duration_to_timeout_header(duration: Duration) -> Option<String> {
    let millis = duration.as_millis();
    if millis == 0 || millis > MAX_TIMEOUT_MS {
        return None;
    }
    Some(millis.to_string())
}

/// Convert a Duration to a `grpc-timeout` header value.
///
/// Milliseconds are used while they fit in 8 digits, then seconds. Returns
/// None for zero or for values too large for either unit.
pub(crate) fn duration_to_grpc_timeout(duration: Duration) -> Option<String> {
    let millis = duration.as_millis();
    if millis == 0 {
        return None;
    }
    if millis <= MAX_GRPC_TIMEOUT_VALUE {
        return Some(format!("{millis}m"));
    }
    let secs = duration.as_secs() as u128;
    if secs <= MAX_GRPC_TIMEOUT_VALUE {
        return Some(format!("{secs}S"));
    }
    None
}
