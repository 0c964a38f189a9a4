//! Handing the completion of an exchange to a future.
//!
//! A transport normally finishes an exchange as soon as the last handler
//! returns. [`Context::defer`](crate::Context::defer) asks the transport to keep
//! the exchange open instead and receives a [`Completion`] handle in return.
//! The handle travels inside the [`Deferred`] future together with the work
//! the handler started and a borrow of the context. When that work settles,
//! its [`Reply`] is written into the response, the response is handed to the
//! transport, and only then does the completion fire. A failure still flushes
//! what was already written and completes before it is reported.
//!
//! ```rust
//! use http_context::{Capabilities, Context, HttpExchange, Request, StatusCode, Transport};
//!
//! # async fn example() -> Result<(), http_context::ContextError> {
//! let mut exchange = HttpExchange::new(Request::default());
//! let mut ctx = Context::new(&mut exchange, Default::default(), Vec::new(), Capabilities::shared());
//!
//! ctx.defer(|| async { Ok::<_, std::io::Error>((StatusCode::ACCEPTED, "queued")) })?
//!     .await?;
//! drop(ctx);
//! assert_eq!(exchange.response().status(), StatusCode::ACCEPTED);
//! assert_eq!(exchange.completions(), 1);
//! # Ok(())
//! # }
//! ```
use core::fmt;
use core::future::Future;
use core::pin::Pin;
use core::task::{ready, Context as TaskContext, Poll};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use http::StatusCode;
use pin_project_lite::pin_project;

use crate::{Body, BoxError, Context, ContextError, Transport};

/// Lifecycle of an exchange that went asynchronous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncState {
    /// The handler returned but the deferred work has not settled.
    Pending,
    /// The transport was told it may finish the exchange. Terminal.
    Completed,
}

/// One-shot signal telling the transport an asynchronous exchange is done.
///
/// The signal fires exactly once: on [`Completion::complete`], or on drop if
/// it was never completed explicitly.
pub struct Completion {
    completed: Arc<AtomicBool>,
    signal: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl Completion {
    /// Creates a completion that runs `signal` when the exchange resolves.
    pub fn new(signal: impl FnOnce() + Send + 'static) -> Self {
        Self {
            completed: Arc::new(AtomicBool::new(false)),
            signal: Some(Box::new(signal)),
        }
    }

    /// Resolves the exchange.
    pub fn complete(mut self) {
        self.fire();
    }

    /// Returns `true` once the signal has fired.
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    pub(crate) fn tracker(&self) -> StateTracker {
        StateTracker(self.completed.clone())
    }

    fn fire(&mut self) {
        if let Some(signal) = self.signal.take() {
            self.completed.store(true, Ordering::Release);
            signal();
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.fire();
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("completed", &self.is_completed())
            .finish()
    }
}

/// Read side of a [`Completion`], kept by the context.
#[derive(Debug, Clone)]
pub(crate) struct StateTracker(Arc<AtomicBool>);

impl StateTracker {
    pub(crate) fn state(&self) -> AsyncState {
        if self.0.load(Ordering::Acquire) {
            AsyncState::Completed
        } else {
            AsyncState::Pending
        }
    }
}

/// A value deferred work resolves with, written into the response before the
/// exchange completes.
///
/// `()` leaves the response as the handler prepared it. Text becomes the
/// text body, a [`Body`] the streamed body, and a `(StatusCode, reply)` pair
/// also sets the status.
pub trait Reply {
    /// Writes `self` into the response held by `ctx`.
    fn apply<T: Transport + ?Sized>(self, ctx: &mut Context<'_, T>) -> Result<(), ContextError>;
}

impl Reply for () {
    fn apply<T: Transport + ?Sized>(self, _: &mut Context<'_, T>) -> Result<(), ContextError> {
        Ok(())
    }
}

impl Reply for String {
    fn apply<T: Transport + ?Sized>(self, ctx: &mut Context<'_, T>) -> Result<(), ContextError> {
        ctx.set_body(self).map(|_| ())
    }
}

impl Reply for &str {
    fn apply<T: Transport + ?Sized>(self, ctx: &mut Context<'_, T>) -> Result<(), ContextError> {
        ctx.set_body(self).map(|_| ())
    }
}

impl Reply for Body {
    fn apply<T: Transport + ?Sized>(self, ctx: &mut Context<'_, T>) -> Result<(), ContextError> {
        ctx.set_body_stream(self).map(|_| ())
    }
}

impl<R: Reply> Reply for (StatusCode, R) {
    fn apply<T: Transport + ?Sized>(self, ctx: &mut Context<'_, T>) -> Result<(), ContextError> {
        ctx.set_status(self.0)?;
        self.1.apply(ctx)
    }
}

pin_project! {
    /// The deferred half of an asynchronous exchange.
    ///
    /// Awaiting it drives the handler's future. Once that future settles the
    /// reply is applied, the response is flushed to the transport and the
    /// exchange is completed, in that order, before the outcome is returned.
    /// Errors are logged and surface as [`ContextError::Async`].
    ///
    /// Dropping it early still completes the exchange, without flushing.
    #[must_use = "the exchange stays open until the deferred future is driven"]
    pub struct Deferred<'c, 'a, T: ?Sized, F>
    where
        T: Transport,
    {
        ctx: &'c mut Context<'a, T>,
        #[pin]
        future: F,
        completion: Option<Completion>,
    }
}

impl<'c, 'a, T: Transport + ?Sized, F> Deferred<'c, 'a, T, F> {
    pub(crate) fn new(ctx: &'c mut Context<'a, T>, future: F, completion: Completion) -> Self {
        Self {
            ctx,
            future,
            completion: Some(completion),
        }
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> AsyncState {
        match &self.completion {
            Some(completion) if !completion.is_completed() => AsyncState::Pending,
            _ => AsyncState::Completed,
        }
    }
}

impl<T, F, R, E> Future for Deferred<'_, '_, T, F>
where
    T: Transport + ?Sized,
    F: Future<Output = Result<R, E>>,
    R: Reply,
    E: Into<BoxError>,
{
    type Output = Result<(), ContextError>;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let result = ready!(this.future.poll(cx));
        let ctx = &mut **this.ctx;
        let outcome = match result {
            Ok(reply) => reply.apply(&mut *ctx).and_then(|()| ctx.flush()),
            Err(error) => {
                let error = error.into();
                tracing::error!(error = %error, "deferred handler failed");
                if let Err(flush_error) = ctx.flush() {
                    tracing::warn!(error = %flush_error, "failed to flush the response of a failed exchange");
                }
                Err(ContextError::Async(error))
            }
        };
        if let Some(completion) = this.completion.take() {
            completion.complete();
        }
        Poll::Ready(outcome)
    }
}

impl<T: Transport + ?Sized, F> fmt::Debug for Deferred<'_, '_, T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
