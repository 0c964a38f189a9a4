use core::str::Utf8Error;

use http::StatusCode;

use crate::{BodyError, BoxError, Capability, EngineKind, HttpError};

/// Failures raised by [`Context`](crate::Context) operations.
///
/// Each variant maps to the status a server should answer with through
/// [`HttpError`], so handlers can propagate it into [`Error`](crate::Error)
/// with `?`.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ContextError {
    /// An optional capability needed by the operation is not registered.
    #[error("no {0} is registered")]
    MissingCapability(Capability),

    /// The requested wildcard segment was not captured by the route.
    #[error("splat index {index} is out of range, the route captured {len}")]
    SplatOutOfRange {
        /// Requested position.
        index: usize,
        /// Number of captured segments.
        len: usize,
    },

    /// A stored attribute has a different type than the one requested.
    #[error("attribute `{key}` holds a `{found}`, not the requested `{expected}`")]
    AttributeType {
        /// Attribute key.
        key: String,
        /// Requested type.
        expected: &'static str,
        /// Stored type.
        found: &'static str,
    },

    /// `defer` was called on an exchange that is already asynchronous.
    #[error("the exchange is already in asynchronous mode")]
    AsyncAlreadyStarted,

    /// The request body could not be read from the transport.
    ///
    /// The message stays generic; the cause is logged server-side and kept as
    /// the error source.
    #[error("failed to read the request body")]
    Body(#[source] BodyError),

    /// The request body is not valid text in the charset it was decoded with.
    #[error("request body is not valid {charset}")]
    InvalidText {
        /// Charset the body was decoded with.
        charset: &'static str,
        /// UTF-8 validation failure, when the charset is UTF-8.
        source: Option<Utf8Error>,
    },

    /// The request or response names a charset this crate cannot convert.
    #[error("unsupported charset `{0}`")]
    UnsupportedCharset(String),

    /// The request body does not match the requested shape.
    #[error("malformed request body: {0}")]
    Parse(#[source] BoxError),

    /// A value could not be serialized for the response.
    #[error("failed to serialize the response body: {0}")]
    Serialize(#[source] BoxError),

    /// A template engine failed to render.
    #[error("`{engine}` template engine failed to render `{path}`")]
    Render {
        /// Engine that was asked.
        engine: EngineKind,
        /// Template path.
        path: String,
        /// Underlying failure.
        #[source]
        source: BoxError,
    },

    /// A header name or value is not valid HTTP.
    #[error("invalid header `{0}`")]
    InvalidHeader(String),

    /// The response was already handed to the transport and the exchange completed.
    #[error("the exchange has completed, the response can no longer change")]
    ExchangeCompleted,

    /// The deferred work of an asynchronous exchange failed.
    #[error("deferred handler failed: {0}")]
    Async(#[source] BoxError),
}

impl HttpError for ContextError {
    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidText { .. } | Self::Parse(_) => StatusCode::BAD_REQUEST,
            Self::UnsupportedCharset(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::MissingCapability(_)
            | Self::SplatOutOfRange { .. }
            | Self::AttributeType { .. }
            | Self::AsyncAlreadyStarted
            | Self::ExchangeCompleted
            | Self::Body(_)
            | Self::Serialize(_)
            | Self::Render { .. }
            | Self::InvalidHeader(_)
            | Self::Async(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn client_errors_map_to_4xx() {
        let err = ContextError::Parse("expected `}`".into());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ContextError::UnsupportedCharset("koi8-r".into()).status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
    }

    #[test]
    fn body_errors_hide_transport_detail() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer reset at 0x7f..");
        let err = ContextError::Body(BodyError::Io(io));
        assert_eq!(err.to_string(), "failed to read the request body");
        assert!(core::error::Error::source(&err).is_some());

        let err: Error = err.into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn missing_capability_names_it() {
        let err = ContextError::MissingCapability(Capability::TemplateEngine(EngineKind::Tera));
        assert_eq!(err.to_string(), "no `tera` template engine is registered");
    }
}
