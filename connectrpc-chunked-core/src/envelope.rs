//! Length-prefixed envelope framing.
//!
//! Both the Connect streaming protocol and gRPC-Web frame their bodies the
//! same way:
//!
//! ```text
//! [flags:1][length:4][payload:length]
//! ```
//!
//! The length is a big-endian `u32`. Only the meaning of the flag bits
//! differs between the two protocols, see [`envelope_flags`].

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::EnvelopeError;

/// Envelope flag bits.
///
/// Flags are always tested as a bitmask (`flags & FLAG == FLAG`), never by
/// equality. gRPC-Web servers are known to send `0xFD` for trailer frames,
/// which only matches the trailer bit under mask semantics.
pub mod envelope_flags {
    /// Regular, uncompressed message.
    pub const MESSAGE: u8 = 0x00;
    /// Compressed message. Compression is never negotiated by this crate, so
    /// a message frame carrying this bit is rejected.
    pub const COMPRESSED: u8 = 0x01;
    /// Connect end-of-stream frame carrying the JSON `EndStreamResponse`.
    pub const END_STREAM: u8 = 0x80;
    /// gRPC-Web trailer frame carrying an HTTP/1 style header block.
    pub const TRAILER: u8 = 0x80;
}

/// Envelope header size (flags + length).
pub const ENVELOPE_HEADER_SIZE: usize = 5;

/// One decoded frame: a flags byte and its payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub flags: u8,
    pub data: Bytes,
}

impl Envelope {
    pub fn new(flags: u8, data: impl Into<Bytes>) -> Self {
        Self {
            flags,
            data: data.into(),
        }
    }

    /// A plain message frame (`flags = 0`).
    pub fn message(data: impl Into<Bytes>) -> Self {
        Self::new(envelope_flags::MESSAGE, data)
    }

    /// Whether every bit of `flag` is set on this envelope.
    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag == flag
    }

    pub fn is_end_stream(&self) -> bool {
        self.has_flag(envelope_flags::END_STREAM)
    }

    pub fn is_trailer(&self) -> bool {
        self.has_flag(envelope_flags::TRAILER)
    }

    pub fn is_compressed(&self) -> bool {
        self.has_flag(envelope_flags::COMPRESSED)
    }

    /// Encode this envelope back into its wire form.
    pub fn encode(&self) -> Result<Bytes, EnvelopeError> {
        let length = frame_length(self.data.len())?;
        let mut buf = BytesMut::with_capacity(ENVELOPE_HEADER_SIZE + self.data.len());
        buf.put_u8(self.flags);
        buf.put_u32(length);
        buf.put_slice(&self.data);
        Ok(buf.freeze())
    }
}

/// The length prefix for a payload of `len` bytes.
///
/// # Errors
/// Returns [`EnvelopeError::PayloadTooLarge`] if `len` does not fit in a `u32`.
pub fn frame_length(len: usize) -> Result<u32, EnvelopeError> {
    u32::try_from(len).map_err(|_| EnvelopeError::PayloadTooLarge { length: len })
}

/// Wrap a payload in a single envelope with the given flags.
pub fn wrap_envelope(flags: u8, payload: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    let length = frame_length(payload.len())?;
    let mut frame = Vec::with_capacity(ENVELOPE_HEADER_SIZE + payload.len());
    frame.push(flags);
    frame.extend_from_slice(&length.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Concatenate the wire form of several envelopes.
pub fn encode_envelopes<'a, I>(envelopes: I) -> Result<Vec<u8>, EnvelopeError>
where
    I: IntoIterator<Item = &'a Envelope>,
{
    let mut out = Vec::new();
    for envelope in envelopes {
        out.extend_from_slice(&envelope.encode()?);
    }
    Ok(out)
}

/// Parse an envelope header.
///
/// Returns `(flags, length)`.
///
/// # Errors
/// Returns [`EnvelopeError::IncompleteHeader`] if fewer than
/// [`ENVELOPE_HEADER_SIZE`] bytes are available.
pub fn parse_envelope_header(data: &[u8]) -> Result<(u8, u32), EnvelopeError> {
    if data.len() < ENVELOPE_HEADER_SIZE {
        return Err(EnvelopeError::IncompleteHeader {
            expected: ENVELOPE_HEADER_SIZE,
            actual: data.len(),
        });
    }

    let flags = data[0];
    let length = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);

    Ok((flags, length))
}
