//! The per-exchange handler context.
//!
//! A [`Context`] is created by the router once the route is resolved, lives
//! for exactly one exchange and is handed to every handler of that exchange
//! in turn. It borrows the server's [`Transport`] for its whole lifetime, so
//! it cannot outlive the connection it describes.
//!
//! The methods fall into four groups:
//!
//! - **request view**: route bindings, query and form parameters, body,
//!   headers, cookies, attributes and request-line metadata
//!   (see the `request` submodule)
//! - **response builder**: status, headers, content type, text or streaming
//!   body, cookies, serialization, templates and redirects
//!   (see the `response` submodule)
//! - **async bridge**: [`Context::defer`]
//! - **control flag**: [`Context::next`] / [`Context::nexted`]
//!
//! ```rust
//! use std::collections::HashMap;
//! use http_context::{Capabilities, Context, HttpExchange, Request, StatusCode, Transport};
//!
//! # fn main() -> Result<(), http_context::ContextError> {
//! let mut exchange = HttpExchange::new(http::Request::get("/users/42/files/a/b").body(Default::default()).unwrap());
//! let params = HashMap::from([(":id".to_owned(), "42".to_owned())]);
//! let splats = vec!["a".to_owned(), "b".to_owned()];
//! let mut ctx = Context::new(&mut exchange, params, splats, Capabilities::shared());
//!
//! assert_eq!(ctx.param("ID"), Some("42"));
//! assert_eq!(ctx.splat(1).unwrap(), "b");
//!
//! ctx.set_status(StatusCode::CREATED)?.html("<p>ok</p>")?;
//! ctx.finish()?;
//! assert_eq!(exchange.response().status(), StatusCode::CREATED);
//! # Ok(())
//! # }
//! ```
mod error;
mod request;
mod response;

pub use error::ContextError;

use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;

use bytestr::ByteStr;

use crate::deferred::StateTracker;
use crate::{AsyncState, Body, Capabilities, Deferred, Transport};

/// Outbound payload held by the context until [`Context::finish`].
#[derive(Debug, Default)]
enum ResponseBody {
    #[default]
    Empty,
    Text(ByteStr),
    Stream(Body),
}

/// Request view and response builder for one HTTP exchange.
///
/// Mutators take `&mut self` and return `&mut Self`, wrapped in a `Result`
/// where they can fail, so chained calls all act on this one context.
pub struct Context<'a, T: Transport + ?Sized> {
    transport: &'a mut T,
    params: HashMap<String, String>,
    splats: Vec<String>,
    capabilities: Arc<Capabilities>,
    body: ResponseBody,
    encoding: Option<String>,
    nexted: bool,
    async_state: Option<StateTracker>,
}

impl<'a, T: Transport + ?Sized> Context<'a, T> {
    /// Builds the context for one exchange.
    ///
    /// `params` maps `:name` keys, already lowercased by the router, to their
    /// values; `splats` holds the wildcard captures in path order.
    pub fn new(
        transport: &'a mut T,
        params: HashMap<String, String>,
        splats: Vec<String>,
        capabilities: Arc<Capabilities>,
    ) -> Self {
        Self {
            transport,
            params,
            splats,
            capabilities,
            body: ResponseBody::Empty,
            encoding: None,
            nexted: false,
            async_state: None,
        }
    }

    /// The borrowed transport.
    pub fn transport(&self) -> &T {
        &*self.transport
    }

    /// The capability table this context was built with.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Tells the dispatch loop to run the next matching handler. Idempotent.
    pub fn next(&mut self) {
        self.nexted = true;
    }

    /// Whether [`next`](Self::next) was called during this exchange.
    pub fn nexted(&self) -> bool {
        self.nexted
    }

    /// Moves the exchange into asynchronous mode and defers its completion.
    ///
    /// The transport is told to keep the exchange open, then `producer` is
    /// called to start the work. The returned [`Deferred`] borrows the context
    /// until that work settles; it then writes the work's
    /// [`Reply`](crate::Reply) into the response, hands the response to the
    /// transport and completes the exchange, so neither a result nor a
    /// failure can leave the connection dangling. Afterwards every response
    /// mutator fails with [`ContextError::ExchangeCompleted`].
    ///
    /// Work that must run on another task is spawned inside `producer` and
    /// its handle awaited by the returned future.
    ///
    /// # Errors
    ///
    /// [`ContextError::AsyncAlreadyStarted`] if this exchange was already
    /// deferred.
    pub fn defer<'c, P, F>(&'c mut self, producer: P) -> Result<Deferred<'c, 'a, T, F>, ContextError>
    where
        P: FnOnce() -> F,
    {
        if self.async_state.is_some() {
            return Err(ContextError::AsyncAlreadyStarted);
        }
        let completion = self.transport.start_async();
        self.async_state = Some(completion.tracker());
        tracing::debug!(path = %self.transport.request().uri().path(), "exchange deferred");
        let future = producer();
        Ok(Deferred::new(self, future, completion))
    }

    /// `None` for a synchronous exchange, otherwise its async lifecycle state.
    pub fn async_state(&self) -> Option<AsyncState> {
        self.async_state.as_ref().map(StateTracker::state)
    }

    fn ensure_open(&self) -> Result<(), ContextError> {
        match self.async_state() {
            Some(AsyncState::Completed) => Err(ContextError::ExchangeCompleted),
            _ => Ok(()),
        }
    }
}

impl<T: Transport + ?Sized> fmt::Debug for Context<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("method", self.transport.request().method())
            .field("uri", self.transport.request().uri())
            .field("params", &self.params)
            .field("splats", &self.splats)
            .field("body", &self.body)
            .field("encoding", &self.encoding)
            .field("nexted", &self.nexted)
            .field("async_state", &self.async_state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BoxError, HttpExchange, Request, StatusCode};
    use std::sync::Mutex;

    fn exchange() -> HttpExchange {
        HttpExchange::new(Request::default())
    }

    #[test]
    fn next_is_monotonic_and_idempotent() {
        let mut exchange = exchange();
        let mut ctx = Context::new(&mut exchange, HashMap::new(), Vec::new(), Capabilities::shared());
        assert!(!ctx.nexted());
        ctx.next();
        ctx.next();
        assert!(ctx.nexted());
    }

    #[tokio::test]
    async fn second_defer_is_a_state_conflict() {
        let mut exchange = exchange();
        let mut ctx = Context::new(&mut exchange, HashMap::new(), Vec::new(), Capabilities::shared());
        assert_eq!(ctx.async_state(), None);

        let first = ctx.defer(|| async { Ok::<_, BoxError>(()) }).unwrap();
        assert_eq!(first.state(), AsyncState::Pending);
        first.await.unwrap();
        assert_eq!(ctx.async_state(), Some(AsyncState::Completed));

        assert!(matches!(
            ctx.defer(|| async { Ok::<_, BoxError>(()) }),
            Err(ContextError::AsyncAlreadyStarted)
        ));
        drop(ctx);
        assert_eq!(exchange.completions(), 1);
    }

    #[tokio::test]
    async fn response_is_sealed_after_completion() {
        let mut exchange = exchange();
        let mut ctx = Context::new(&mut exchange, HashMap::new(), Vec::new(), Capabilities::shared());
        ctx.set_header("x-request-id", "7").unwrap();
        ctx.defer(|| async { Ok::<_, BoxError>((StatusCode::ACCEPTED, "computed")) })
            .unwrap()
            .await
            .unwrap();

        assert!(matches!(ctx.set_body("late"), Err(ContextError::ExchangeCompleted)));
        assert!(matches!(
            ctx.set_status(StatusCode::IM_A_TEAPOT),
            Err(ContextError::ExchangeCompleted)
        ));
        assert!(matches!(ctx.set_header("x-late", "1"), Err(ContextError::ExchangeCompleted)));
        ctx.redirect("/elsewhere");
        assert!(matches!(ctx.finish(), Err(ContextError::ExchangeCompleted)));

        let (_, response) = exchange.into_parts();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.headers()["x-request-id"], "7");
        assert!(response.headers().get("x-late").is_none());
        assert!(response.headers().get(http::header::LOCATION).is_none());
        let body = response.into_body().into_bytes().await.unwrap();
        assert_eq!(body.as_ref(), b"computed");
    }

    #[tokio::test]
    async fn failed_work_completes_before_the_error_is_seen() {
        struct Recording {
            inner: HttpExchange,
            log: Arc<Mutex<Vec<&'static str>>>,
        }

        impl Transport for Recording {
            fn request(&self) -> &Request {
                self.inner.request()
            }
            fn request_mut(&mut self) -> &mut Request {
                self.inner.request_mut()
            }
            fn response(&self) -> &crate::Response {
                self.inner.response()
            }
            fn response_mut(&mut self) -> &mut crate::Response {
                self.inner.response_mut()
            }
            fn start_async(&mut self) -> crate::Completion {
                let log = self.log.clone();
                crate::Completion::new(move || log.lock().unwrap().push("completed"))
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut transport = Recording {
            inner: exchange(),
            log: log.clone(),
        };
        let mut ctx = Context::new(&mut transport, HashMap::new(), Vec::new(), Capabilities::shared());
        ctx.set_status(StatusCode::BAD_GATEWAY).unwrap();

        let err = ctx
            .defer(|| async {
                tokio::task::yield_now().await;
                Err::<(), _>(std::io::Error::other("upstream timed out"))
            })
            .unwrap()
            .await
            .unwrap_err();
        log.lock().unwrap().push("error observed");

        assert!(matches!(err, ContextError::Async(_)));
        assert_eq!(err.to_string(), "deferred handler failed: upstream timed out");
        assert_eq!(*log.lock().unwrap(), vec!["completed", "error observed"]);
        drop(ctx);
        assert_eq!(transport.inner.response().status(), StatusCode::BAD_GATEWAY);
    }
}
