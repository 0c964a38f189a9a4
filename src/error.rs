//! Status-carrying errors.
//!
//! A handler working with a [`Context`] returns [`Result`], whose error side
//! pairs an erased failure with the status the transport should answer with.
//! Typed errors that already know their status implement [`HttpError`] and
//! convert through `?`. Anything else gets a status through [`ResultExt`].
//!
//! ```rust
//! use http_context::{Error, Result, ResultExt, StatusCode};
//!
//! fn lookup(id: &str) -> Result<u32> {
//!     id.parse::<u32>().status(StatusCode::BAD_REQUEST)
//! }
//!
//! let err = lookup("abc").unwrap_err();
//! assert_eq!(err.status(), StatusCode::BAD_REQUEST);
//!
//! let err = Error::msg("gone").set_status(StatusCode::GONE);
//! assert_eq!(err.status(), StatusCode::GONE);
//! ```
//!
//! [`Context`]: crate::Context
use core::error::Error as StdError;
use core::fmt;

use http::StatusCode;

/// Errors that know which HTTP status they map to.
///
/// [`ContextError`](crate::ContextError) implements this, so context failures
/// keep their status when a handler propagates them with `?`.
pub trait HttpError: StdError + Send + Sync + 'static {
    /// Returns the associated HTTP status code.
    fn status(&self) -> StatusCode;
}

/// An erased error with the HTTP status it answers with.
pub struct Error {
    inner: Box<dyn HttpError>,
}

/// `Result` specialized to [`Error`].
pub type Result<T> = core::result::Result<T, Error>;

// A foreign error paired with a status chosen by the caller.
#[derive(Debug)]
struct Tagged<E> {
    status: StatusCode,
    error: E,
}

impl<E: StdError> fmt::Display for Tagged<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl<E: StdError> StdError for Tagged<E> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.error.source()
    }
}

impl<E: StdError + Send + Sync + 'static> HttpError for Tagged<E> {
    fn status(&self) -> StatusCode {
        self.status
    }
}

#[derive(Debug)]
struct Message<M>(M);

impl<M: fmt::Display> fmt::Display for Message<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl<M: fmt::Display + fmt::Debug> StdError for Message<M> {}

// Keeps the original error reachable through `downcast_ref` after a status override.
#[derive(Debug)]
struct Restatus {
    status: StatusCode,
    inner: Box<dyn HttpError>,
}

impl fmt::Display for Restatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl StdError for Restatus {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source()
    }
}

impl HttpError for Restatus {
    fn status(&self) -> StatusCode {
        self.status
    }
}

impl Error {
    /// Wraps any error with the given status.
    pub fn new<E>(error: E, status: StatusCode) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            inner: Box::new(Tagged { status, error }),
        }
    }

    /// Creates an error from a message, defaulting to `503 Service Unavailable`.
    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self::new(Message(message), StatusCode::SERVICE_UNAVAILABLE)
    }

    /// Returns the status the transport should answer with.
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    /// Overrides the status code, keeping the underlying error.
    pub fn set_status(self, status: StatusCode) -> Self {
        if self.inner.status() == status {
            return self;
        }
        Self {
            inner: Box::new(Restatus {
                status,
                inner: self.inner,
            }),
        }
    }

    /// Borrows the concrete error, if it has type `E`.
    ///
    /// Errors that entered through `?` as an [`HttpError`] are found directly,
    /// also after [`set_status`](Self::set_status).
    ///
    /// ```rust
    /// use http_context::{ContextError, Error, StatusCode};
    ///
    /// let err: Error = ContextError::SplatOutOfRange { index: 3, len: 1 }.into();
    /// let err = err.set_status(StatusCode::NOT_FOUND);
    /// assert!(matches!(
    ///     err.downcast_ref::<ContextError>(),
    ///     Some(ContextError::SplatOutOfRange { index: 3, .. })
    /// ));
    /// ```
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + Send + Sync + 'static,
    {
        let mut current: &(dyn HttpError) = &*self.inner;
        loop {
            let erased: &(dyn StdError + Send + Sync + 'static) = current;
            if let Some(found) = erased.downcast_ref::<E>() {
                return Some(found);
            }
            match erased.downcast_ref::<Restatus>() {
                Some(restatus) => current = &*restatus.inner,
                None => return None,
            }
        }
    }
}

impl<E: HttpError> From<E> for Error {
    fn from(error: E) -> Self {
        Self {
            inner: Box::new(error),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("status", &self.status())
            .field("error", &self.inner)
            .finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

/// Attaches a status code to foreign errors and to `None`.
///
/// ```rust
/// use http_context::{Result, ResultExt, StatusCode};
///
/// fn page(raw: Option<&str>) -> Result<u32> {
///     raw.status(StatusCode::BAD_REQUEST)?
///         .parse::<u32>()
///         .status(StatusCode::BAD_REQUEST)
/// }
///
/// assert_eq!(page(Some("2")).unwrap(), 2);
/// assert_eq!(page(None).unwrap_err().status(), StatusCode::BAD_REQUEST);
/// ```
pub trait ResultExt<T>: Sized {
    /// Converts the failure case into an [`Error`] carrying `status`.
    fn status(self, status: StatusCode) -> Result<T>;
}

impl<T, E> ResultExt<T> for core::result::Result<T, E>
where
    E: StdError + Send + Sync + 'static,
{
    fn status(self, status: StatusCode) -> Result<T> {
        self.map_err(|error| Error::new(error, status))
    }
}

impl<T> ResultExt<T> for Option<T> {
    fn status(self, status: StatusCode) -> Result<T> {
        self.ok_or_else(|| Error::new(Message("value is missing"), status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_keeps_the_message_and_the_original_error() {
        let err: Error = crate::ContextError::AsyncAlreadyStarted.into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let err = err.set_status(StatusCode::CONFLICT);
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.to_string(), "the exchange is already in asynchronous mode");
        assert!(err.downcast_ref::<crate::ContextError>().is_some());
    }

    #[test]
    fn none_gets_the_requested_status() {
        let err = None::<u8>.status(StatusCode::NOT_FOUND).unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "value is missing");
    }
}
