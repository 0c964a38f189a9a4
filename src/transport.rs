//! The transport side of an exchange.
//!
//! A [`Context`](crate::Context) never owns the connection. The server that
//! accepted it implements [`Transport`] and lends the request/response pair to
//! the context for the duration of one exchange. [`HttpExchange`] is a plain
//! in-memory implementation over `http` types, suitable for servers that hand
//! a finished `http::Response` back to hyper and for tests.
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use http::{header, HeaderValue, StatusCode};

use crate::{Completion, Request, Response};

/// Request and response handles for one exchange, owned by the server.
pub trait Transport {
    /// The inbound request.
    fn request(&self) -> &Request;

    /// The inbound request, for buffering its body and storing attributes.
    fn request_mut(&mut self) -> &mut Request;

    /// The outbound response.
    fn response(&self) -> &Response;

    /// The outbound response.
    fn response_mut(&mut self) -> &mut Response;

    /// Address of the remote peer, when known.
    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }

    /// Local address the connection was accepted on, when known.
    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }

    /// Whether the connection is TLS-protected.
    fn is_secure(&self) -> bool {
        false
    }

    /// Keeps the exchange open past the current handler's return.
    ///
    /// The transport must not finish the exchange until the returned
    /// [`Completion`] fires.
    fn start_async(&mut self) -> Completion;

    /// Writes a redirect response immediately.
    ///
    /// The default implementation sets `status` and the `Location` header on
    /// the outbound response.
    fn send_redirect(&mut self, location: &str, status: StatusCode) -> io::Result<()> {
        let location = HeaderValue::from_str(location)
            .map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, error))?;
        let response = self.response_mut();
        *response.status_mut() = status;
        response.headers_mut().insert(header::LOCATION, location);
        Ok(())
    }
}

/// An owned request/response pair implementing [`Transport`].
///
/// ```rust
/// use http_context::{HttpExchange, Request, Transport};
///
/// let mut exchange = HttpExchange::new(Request::default());
/// assert!(!exchange.is_async());
///
/// let completion = exchange.start_async();
/// assert!(exchange.is_async());
/// completion.complete();
/// assert_eq!(exchange.completions(), 1);
/// ```
#[derive(Debug, Default)]
pub struct HttpExchange {
    request: Request,
    response: Response,
    peer_addr: Option<SocketAddr>,
    local_addr: Option<SocketAddr>,
    secure: bool,
    async_started: bool,
    completions: Arc<AtomicUsize>,
}

impl HttpExchange {
    /// Wraps an inbound request with an empty `200 OK` response.
    pub fn new(request: Request) -> Self {
        Self {
            request,
            ..Self::default()
        }
    }

    /// Records the remote peer address.
    pub fn with_peer_addr(mut self, addr: SocketAddr) -> Self {
        self.peer_addr = Some(addr);
        self
    }

    /// Records the local address the request arrived on.
    pub fn with_local_addr(mut self, addr: SocketAddr) -> Self {
        self.local_addr = Some(addr);
        self
    }

    /// Marks the connection as TLS-protected.
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Whether a handler moved this exchange into asynchronous mode.
    pub fn is_async(&self) -> bool {
        self.async_started
    }

    /// How many times the completion signal fired.
    pub fn completions(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }

    /// Splits the exchange into its request and the response to send.
    pub fn into_parts(self) -> (Request, Response) {
        (self.request, self.response)
    }
}

impl Transport for HttpExchange {
    fn request(&self) -> &Request {
        &self.request
    }

    fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    fn response(&self) -> &Response {
        &self.response
    }

    fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn is_secure(&self) -> bool {
        self.secure
    }

    fn start_async(&mut self) -> Completion {
        self.async_started = true;
        let completions = self.completions.clone();
        Completion::new(move || {
            completions.fetch_add(1, Ordering::SeqCst);
        })
    }
}
