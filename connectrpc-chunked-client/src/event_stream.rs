//! Callback-to-stream adapter.
//!
//! [`EventStream`] turns a push-style registration (a host calling back with
//! values, then end or error) into a pull-based [`Stream`].
//!
//! Values are queued in arrival order and the consumer is woken through a
//! single stored [`Waker`]. The consumer drains every queued value before it
//! suspends again, so nothing is dropped and nothing is allocated per value
//! beyond the queue slot.
//!
//! # Disposal
//!
//! Registration returns a [`Disposer`] which runs exactly once:
//!
//! - when the consumer observes the terminal end or error, or
//! - when the stream is dropped after the terminal signal already arrived, or
//! - when the terminal signal arrives after the stream was dropped.
//!
//! It never runs while values are still queued for a live consumer.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use futures::Stream;
use futures::stream::FusedStream;
#[cfg(feature = "tracing")]
use tracing::trace;

use crate::ClientError;

/// Releases whatever a registration acquired (host listeners, etc.).
pub type Disposer = Box<dyn FnOnce() + Send>;

/// A disposer that does nothing.
pub fn noop_disposer() -> Disposer {
    Box::new(|| {})
}

struct Shared<T> {
    queue: VecDeque<T>,
    /// Terminal signal received.
    done: bool,
    error: Option<ClientError>,
    waker: Option<Waker>,
    disposer: Option<Disposer>,
    /// The consumer dropped the stream before the terminal signal.
    abandoned: bool,
}

fn lock<T>(shared: &Mutex<Shared<T>>) -> MutexGuard<'_, Shared<T>> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Push side handed to the registration function.
///
/// Cheap to clone and safe to call from any thread. Calls after `end` or
/// `error` are ignored.
pub struct EventSink<T> {
    shared: Arc<Mutex<Shared<T>>>,
}

impl<T> Clone for EventSink<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> std::fmt::Debug for EventSink<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = lock(&self.shared);
        f.debug_struct("EventSink")
            .field("queued", &shared.queue.len())
            .field("done", &shared.done)
            .field("abandoned", &shared.abandoned)
            .finish()
    }
}

impl<T> EventSink<T> {
    /// Deliver one value.
    pub fn value(&self, value: T) {
        let waker = {
            let mut shared = lock(&self.shared);
            if shared.done {
                #[cfg(feature = "tracing")]
                trace!("value delivered after terminal signal, ignored");
                return;
            }
            if shared.abandoned {
                return;
            }
            shared.queue.push_back(value);
            shared.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Signal normal completion.
    pub fn end(&self) {
        self.finish(None);
    }

    /// Signal failure. The error is yielded after every queued value.
    pub fn error(&self, error: ClientError) {
        self.finish(Some(error));
    }

    fn finish(&self, error: Option<ClientError>) {
        let (waker, disposer) = {
            let mut shared = lock(&self.shared);
            if shared.done {
                #[cfg(feature = "tracing")]
                trace!("terminal signal after terminal signal, ignored");
                return;
            }
            shared.done = true;
            shared.error = error;
            let disposer = if shared.abandoned {
                shared.disposer.take()
            } else {
                None
            };
            (shared.waker.take(), disposer)
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        if let Some(disposer) = disposer {
            disposer();
        }
    }
}

/// Pull side of the adapter.
///
/// Yields `Ok(value)` for each delivered value, then `Err(error)` once if
/// the registration failed, then `None`.
///
/// # Example
///
/// ```ignore
/// let stream = EventStream::new(|sink| {
///     let task = host.request(request, Box::new(move |result| match result {
///         Ok(_) => sink.end(),
///         Err(e) => sink.error(e.into()),
///     }));
///     Box::new(move || task.off_chunk_received())
/// });
/// ```
pub struct EventStream<T> {
    shared: Arc<Mutex<Shared<T>>>,
    terminated: bool,
}

impl<T> EventStream<T> {
    /// Run `register` with a fresh sink and adapt what it pushes.
    ///
    /// `register` may deliver values or even the terminal signal before it
    /// returns.
    pub fn new<F>(register: F) -> Self
    where
        F: FnOnce(EventSink<T>) -> Disposer,
    {
        let shared = Arc::new(Mutex::new(Shared {
            queue: VecDeque::new(),
            done: false,
            error: None,
            waker: None,
            disposer: None,
            abandoned: false,
        }));
        let disposer = register(EventSink {
            shared: shared.clone(),
        });
        lock(&shared).disposer = Some(disposer);
        Self {
            shared,
            terminated: false,
        }
    }
}

impl<T> Stream for EventStream<T> {
    type Item = Result<T, ClientError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.terminated {
            return Poll::Ready(None);
        }

        let (error, disposer) = {
            let mut shared = lock(&this.shared);
            if let Some(value) = shared.queue.pop_front() {
                return Poll::Ready(Some(Ok(value)));
            }
            if !shared.done {
                shared.waker = Some(cx.waker().clone());
                return Poll::Pending;
            }
            (shared.error.take(), shared.disposer.take())
        };

        this.terminated = true;
        if let Some(disposer) = disposer {
            disposer();
        }
        Poll::Ready(error.map(Err))
    }
}

impl<T> FusedStream for EventStream<T> {
    fn is_terminated(&self) -> bool {
        self.terminated
    }
}

impl<T> Drop for EventStream<T> {
    fn drop(&mut self) {
        if self.terminated {
            return;
        }
        let disposer = {
            let mut shared = lock(&self.shared);
            shared.queue.clear();
            shared.waker = None;
            if shared.done {
                shared.disposer.take()
            } else {
                shared.abandoned = true;
                None
            }
        };
        if let Some(disposer) = disposer {
            disposer();
        }
    }
}
