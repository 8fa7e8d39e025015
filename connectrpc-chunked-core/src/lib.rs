//! Core protocol types for connectrpc-chunked.
//!
//! This crate holds the synchronous, runtime-free pieces shared by every
//! layer of the client transport.
//!
//! ## Modules
//!
//! - [`error`]: Status codes and framing errors
//! - [`envelope`]: Length-prefixed envelope framing
//! - [`connect`]: Connect end-of-stream record and error body
//! - [`grpc_web`]: gRPC-Web trailer block and status headers

pub mod connect;
mod envelope;
mod error;
pub mod grpc_web;

pub use envelope::*;
pub use error::*;
