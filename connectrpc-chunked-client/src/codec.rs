//! Message serialization.
//!
//! Messages are encoded as protobuf (`prost`) or JSON (`serde`), chosen per
//! transport.

use bytes::Bytes;
use prost::Message;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::ClientError;

/// Wire format of application messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Proto,
    Json,
}

impl Codec {
    pub(crate) fn from_use_proto(use_proto: bool) -> Self {
        if use_proto { Codec::Proto } else { Codec::Json }
    }

    pub fn is_proto(&self) -> bool {
        matches!(self, Codec::Proto)
    }

    /// Get the encoding name (for tracing/debugging).
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Proto => "proto",
            Codec::Json => "json",
        }
    }

    /// Encode a message for sending.
    pub fn encode<T>(&self, msg: &T) -> Result<Bytes, ClientError>
    where
        T: Message + Serialize,
    {
        match self {
            Codec::Proto => Ok(Bytes::from(msg.encode_to_vec())),
            Codec::Json => serde_json::to_vec(msg)
                .map(Bytes::from)
                .map_err(|e| ClientError::Encode(format!("JSON encoding failed: {}", e))),
        }
    }

    /// Decode a message from response bytes.
    pub fn decode<T>(&self, bytes: &[u8]) -> Result<T, ClientError>
    where
        T: Message + DeserializeOwned + Default,
    {
        match self {
            Codec::Proto => T::decode(bytes)
                .map_err(|e| ClientError::Decode(format!("protobuf decoding failed: {}", e))),
            Codec::Json => serde_json::from_slice(bytes)
                .map_err(|e| ClientError::Decode(format!("JSON decoding failed: {}", e))),
        }
    }
}
