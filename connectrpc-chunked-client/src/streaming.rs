//! Streaming response wrapper.
//!
//! This module provides [`Streaming`], the message stream of a
//! [`StreamResponse`](crate::StreamResponse).
//!
//! # Cancellation
//!
//! Dropping a [`Streaming`] abandons the call. Host listeners stay
//! registered until the host reports completion or failure, then they are
//! released exactly once.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;

use crate::ClientError;

type BoxMessageStream<T> = Pin<Box<dyn Stream<Item = Result<T, ClientError>> + Send>>;

/// Wrapper for streaming response messages.
///
/// # Example
///
/// ```ignore
/// let response = transport.server_stream::<Req, Res, _>("pkg.Service/Method", options, input).await?;
/// let mut messages = response.message;
///
/// while let Some(result) = messages.next().await {
///     match result {
///         Ok(msg) => println!("Got message: {:?}", msg),
///         Err(e) => eprintln!("Error: {:?}", e),
///     }
/// }
///
/// // After the stream is consumed, trailers are available
/// println!("Trailers: {:?}", response.trailer.get());
/// ```
pub struct Streaming<T> {
    inner: BoxMessageStream<T>,
}

impl<T> Streaming<T> {
    /// Create a new Streaming wrapping the given stream.
    pub fn new<S>(inner: S) -> Self
    where
        S: Stream<Item = Result<T, ClientError>> + Send + 'static,
    {
        Self {
            inner: Box::pin(inner),
        }
    }

    /// Drain all remaining messages from the stream.
    ///
    /// Returns the number of messages that were drained, or the first error.
    /// After a successful drain the trailers are populated.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let drained = response.message.drain().await?;
    /// println!("Drained {} remaining messages", drained);
    /// println!("Trailers: {:?}", response.trailer.get());
    /// ```
    pub async fn drain(&mut self) -> Result<usize, ClientError> {
        use futures::StreamExt;
        let mut count = 0;
        while let Some(result) = self.inner.next().await {
            result?;
            count += 1;
        }
        Ok(count)
    }

    /// Collect every remaining message, failing on the first error.
    pub async fn collect_all(&mut self) -> Result<Vec<T>, ClientError> {
        use futures::StreamExt;
        let mut messages = Vec::new();
        while let Some(result) = self.inner.next().await {
            messages.push(result?);
        }
        Ok(messages)
    }
}

impl<T> std::fmt::Debug for Streaming<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Streaming").finish_non_exhaustive()
    }
}

impl<T> Stream for Streaming<T> {
    type Item = Result<T, ClientError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
