//! Re-exports for building bodies and transports without extra dependencies.
//!
//! - [`Bytes`] - the buffer type request bodies are read into
//! - [`ByteStr`] - UTF-8 validated bytes, the storage of text bodies
//! - everything from `futures_lite`, for streamed bodies and async readers
//!
//! ```rust
//! use http_context::utils::{stream, Bytes};
//! use http_context::Body;
//!
//! let body = Body::from_stream(stream::iter(vec![
//!     Ok::<_, std::io::Error>(Bytes::from_static(b"chunk one, ")),
//!     Ok(Bytes::from_static(b"chunk two")),
//! ]));
//! assert_eq!(body.len(), None);
//! ```

pub use bytes::Bytes;

pub use bytestr::ByteStr;

pub use futures_lite::*;
