use super::BoxError;
use core::fmt::Display;

/// Error type for body operations.
///
/// ```rust
/// use http_context::{Body, BodyError};
/// use futures_lite::stream;
///
/// # async fn example() {
/// let mut body = Body::from_stream(stream::iter(vec![
///     Ok("partial"),
///     Err(std::io::Error::other("connection reset")),
/// ]));
/// assert!(matches!(body.as_bytes().await, Err(BodyError::Io(_))));
/// assert!(matches!(body.as_bytes().await, Err(BodyError::BodyFrozen)));
/// # }
/// ```
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// Reading the underlying reader or stream failed.
    Io(std::io::Error),
    /// The body has no data left to yield.
    ///
    /// Distinct from an empty body: an earlier read failed midway, so the
    /// data that was consumed is gone.
    BodyFrozen,
    /// Any other failure reported by a wrapped stream.
    Other(BoxError),
}

impl Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Io(error) => error.fmt(f),
            Self::BodyFrozen => f.write_str("body was already consumed by an earlier read"),
            Self::Other(error) => error.fmt(f),
        }
    }
}

impl core::error::Error for Error {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Io(error) => Some(error),
            Self::BodyFrozen => None,
            Self::Other(error) => error.source(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error)
    }
}

impl From<BoxError> for Error {
    fn from(error: BoxError) -> Self {
        Self::Other(error)
    }
}

impl From<core::convert::Infallible> for Error {
    fn from(error: core::convert::Infallible) -> Self {
        match error {}
    }
}
