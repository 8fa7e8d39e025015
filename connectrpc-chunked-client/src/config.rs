//! Configuration for the client transports.
//!
//! - [`CallOptions`]: Per-call timeout and headers

mod options;

pub use options::CallOptions;
pub(crate) use options::{duration_to_grpc_timeout, duration_to_timeout_header, resolve_timeout};
