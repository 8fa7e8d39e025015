//! Envelope frame decoding.
//!
//! This module provides [`EnvelopeDecoder`]: a stream adapter that rebuilds
//! length-prefixed envelopes from an arbitrarily chunked byte stream.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::BytesMut;
use connectrpc_chunked_core::{ENVELOPE_HEADER_SIZE, Envelope, EnvelopeError, parse_envelope_header};
use futures::Stream;
#[cfg(feature = "tracing")]
use tracing::trace;

use crate::ClientError;

/// Stream adapter that yields [`Envelope`]s from a chunked byte stream.
///
/// Frames may straddle chunk boundaries in any way, including a header split
/// across chunks. Frames already buffered are yielded before the source is
/// polled again.
///
/// # Example
///
/// ```ignore
/// let mut frames = EnvelopeDecoder::new(chunks);
///
/// while let Some(envelope) = frames.next().await {
///     let envelope = envelope?;
///     println!("flags=0x{:02x} len={}", envelope.flags, envelope.data.len());
/// }
/// ```
pub struct EnvelopeDecoder<S> {
    /// The underlying chunk stream.
    source: S,
    /// Bytes received but not yet emitted.
    buffer: BytesMut,
    /// Header of the frame currently being assembled: `(flags, length)`.
    pending: Option<(u8, u32)>,
    /// Largest accepted payload, if limited.
    max_frame_len: Option<usize>,
    /// Set once the source ended or an error was yielded.
    finished: bool,
}

impl<S> EnvelopeDecoder<S> {
    /// Create a new decoder with no frame length limit.
    pub fn new(source: S) -> Self {
        Self {
            source,
            buffer: BytesMut::new(),
            pending: None,
            max_frame_len: None,
            finished: false,
        }
    }

    /// Reject frames whose declared length exceeds `limit`.
    pub fn with_max_frame_len(mut self, limit: Option<usize>) -> Self {
        self.max_frame_len = limit;
        self
    }

    /// Check if the decoder has finished.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Try to take one complete frame out of the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(envelope))` if a complete frame was available
    /// - `Ok(None)` if more data is needed
    /// - `Err(e)` if the declared length is over the limit
    fn try_parse_frame(&mut self) -> Result<Option<Envelope>, EnvelopeError> {
        if self.pending.is_none() {
            if self.buffer.len() < ENVELOPE_HEADER_SIZE {
                return Ok(None);
            }
            let (flags, length) = parse_envelope_header(&self.buffer)?;
            if let Some(limit) = self.max_frame_len {
                if length as usize > limit {
                    return Err(EnvelopeError::FrameTooLarge {
                        length: length as usize,
                        limit,
                    });
                }
            }
            let _ = self.buffer.split_to(ENVELOPE_HEADER_SIZE);
            self.pending = Some((flags, length));
        }

        let Some((flags, length)) = self.pending else {
            return Ok(None);
        };
        if self.buffer.len() < length as usize {
            return Ok(None);
        }

        let data = self.buffer.split_to(length as usize).freeze();
        self.pending = None;
        Ok(Some(Envelope::new(flags, data)))
    }

    /// Bytes held for an incomplete frame, header included.
    fn incomplete_len(&self) -> usize {
        let header = if self.pending.is_some() {
            ENVELOPE_HEADER_SIZE
        } else {
            0
        };
        header + self.buffer.len()
    }
}

impl<S> Unpin for EnvelopeDecoder<S> where S: Unpin {}

impl<S> Stream for EnvelopeDecoder<S>
where
    S: Stream<Item = Result<bytes::Bytes, ClientError>> + Unpin,
{
    type Item = Result<Envelope, ClientError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if this.finished {
                return Poll::Ready(None);
            }

            match this.try_parse_frame() {
                Ok(Some(envelope)) => {
                    #[cfg(feature = "tracing")]
                    trace!(
                        flags = envelope.flags,
                        len = envelope.data.len(),
                        "decoded envelope"
                    );
                    return Poll::Ready(Some(Ok(envelope)));
                }
                Ok(None) => {
                    // Need more data, poll the underlying stream
                }
                Err(e) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(e.into())));
                }
            }

            match Pin::new(&mut this.source).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    #[cfg(feature = "tracing")]
                    trace!(len = chunk.len(), "received chunk");
                    this.buffer.extend_from_slice(&chunk);
                }
                Poll::Ready(Some(Err(e))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    this.finished = true;
                    let buffered = this.incomplete_len();
                    if buffered > 0 {
                        return Poll::Ready(Some(Err(
                            EnvelopeError::PrematureEnd { buffered }.into()
                        )));
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => {
                    return Poll::Pending;
                }
            }
        }
    }
}
