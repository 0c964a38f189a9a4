//! Request and response bodies.
//!
//! [`Body`] holds payload data in one of a few shapes:
//!
//! - **Once**: a single in-memory chunk
//! - **Reader**: an `AsyncBufRead` source such as a file or socket
//! - **Stream**: any `http_body::Body` or stream of chunks
//! - **Frozen**: a body whose data is gone, e.g. after a failed read
//!
//! A [`Context`](crate::Context) reads the inbound request body through
//! [`Body::as_bytes`], which buffers a streaming body in place so later reads
//! see the same bytes, and hands a streaming `Body` to the transport for
//! outbound payloads that should not be materialized as text.
//!
//! ```rust
//! use http_context::Body;
//!
//! # async fn example() -> Result<(), http_context::BodyError> {
//! let mut body = Body::from("name=alice");
//! assert_eq!(body.as_bytes().await?, b"name=alice");
//! // buffered, so a second read sees the same data
//! assert_eq!(body.to_bytes().await?.as_ref(), b"name=alice");
//! # Ok(())
//! # }
//! ```
mod convert;
mod error_type;

pub use error_type::Error;

use bytes::Bytes;
use bytestr::ByteStr;
use core::fmt::Debug;
use core::pin::Pin;
use core::task::{Context, Poll};
use futures_lite::{ready, AsyncBufRead, AsyncReadExt, Stream, StreamExt};
use http_body::Frame;
use http_body_util::{BodyExt, StreamBody};

pub(crate) use crate::BoxError;

type BoxBufReader = Pin<Box<dyn AsyncBufRead + Send + Sync + 'static>>;

type BoxHttpBody =
    Pin<Box<dyn http_body::Body<Data = Bytes, Error = Error> + Send + Sync + 'static>>;

/// An HTTP payload that is either buffered or streamed.
///
/// ```rust
/// use http_context::Body;
///
/// let body = Body::from_bytes("Hello, world!");
/// assert_eq!(body.len(), Some(13));
/// assert_eq!(Body::empty().len(), Some(0));
/// ```
pub struct Body {
    inner: BodyInner,
}

enum BodyInner {
    Once(Bytes),
    Reader {
        reader: BoxBufReader,
        length: Option<usize>,
    },
    HttpBody(BoxHttpBody),
    Freeze,
}

impl Debug for Body {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let shape = match self.inner {
            BodyInner::Once(_) => "Once",
            BodyInner::Reader { .. } => "Reader",
            BodyInner::HttpBody(_) => "Stream",
            BodyInner::Freeze => "Frozen",
        };
        f.debug_struct("Body")
            .field("shape", &shape)
            .field("len", &self.len())
            .finish()
    }
}

impl Body {
    /// Creates an empty body.
    pub const fn empty() -> Self {
        Self {
            inner: BodyInner::Once(Bytes::new()),
        }
    }

    /// Wraps any `http_body::Body`, e.g. the incoming body of a hyper request.
    ///
    /// ```rust
    /// use http_context::Body;
    /// use http_body_util::Full;
    /// use bytes::Bytes;
    ///
    /// let body = Body::new(Full::new(Bytes::from("chunk")));
    /// assert_eq!(body.len(), None);
    /// ```
    pub fn new<B>(body: B) -> Self
    where
        B: Send + Sync + http_body::Body + 'static,
        B::Data: Into<Bytes>,
        B::Error: Into<Error>,
    {
        Self {
            inner: BodyInner::HttpBody(Box::pin(
                body.map_frame(|frame| frame.map_data(|data| data.into()))
                    .map_err(|e| e.into()),
            )),
        }
    }

    pub(crate) const fn frozen() -> Self {
        Self {
            inner: BodyInner::Freeze,
        }
    }

    /// Streams data from an async buffered reader.
    ///
    /// `length` is reported by [`len`](Self::len) until the reader is drained.
    pub fn from_reader(
        reader: impl AsyncBufRead + Send + Sync + 'static,
        length: impl Into<Option<usize>>,
    ) -> Self {
        Self {
            inner: BodyInner::Reader {
                reader: Box::pin(reader),
                length: length.into(),
            },
        }
    }

    /// Streams data from chunks produced by `stream`.
    ///
    /// ```rust
    /// use http_context::Body;
    /// use futures_lite::stream;
    ///
    /// let body = Body::from_stream(stream::iter(vec![
    ///     Ok::<_, std::io::Error>("event: one\n\n"),
    ///     Ok("event: two\n\n"),
    /// ]));
    /// ```
    pub fn from_stream<T, E, S>(stream: S) -> Self
    where
        T: Into<Bytes> + Send + 'static,
        E: Into<Error>,
        S: Stream<Item = Result<T, E>> + Send + Sync + 'static,
    {
        Self {
            inner: BodyInner::HttpBody(Box::pin(StreamBody::new(stream.map(|result| {
                result
                    .map(|data| Frame::data(data.into()))
                    .map_err(|error| error.into())
            })))),
        }
    }

    /// Creates a buffered body from raw bytes.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self {
            inner: BodyInner::Once(data.into()),
        }
    }

    /// Creates a buffered body from UTF-8 text.
    pub fn from_text(text: impl Into<ByteStr>) -> Self {
        Self::from_bytes(Bytes::from(text.into()))
    }

    /// Returns the length in bytes when it is known without reading.
    pub const fn len(&self) -> Option<usize> {
        match &self.inner {
            BodyInner::Once(bytes) => Some(bytes.len()),
            BodyInner::Reader { length, .. } => *length,
            _ => None,
        }
    }

    /// Reads the whole body into memory.
    ///
    /// # Errors
    ///
    /// Fails when the body is frozen or the underlying source errors.
    pub async fn into_bytes(self) -> Result<Bytes, Error> {
        match self.inner {
            BodyInner::Once(bytes) => Ok(bytes),
            BodyInner::Reader { mut reader, length } => {
                let mut buf = Vec::with_capacity(length.unwrap_or_default());
                reader.read_to_end(&mut buf).await?;
                Ok(buf.into())
            }
            BodyInner::HttpBody(body) => Ok(body.collect().await?.to_bytes()),
            BodyInner::Freeze => Err(Error::BodyFrozen),
        }
    }

    /// Buffers the body in place and borrows the bytes.
    ///
    /// Streaming bodies are drained once; later calls return the buffered data.
    /// When draining fails the body stays frozen, so every later read reports
    /// [`Error::BodyFrozen`] instead of a truncated payload.
    pub async fn as_bytes(&mut self) -> Result<&[u8], Error> {
        self.to_bytes().await?;
        match &self.inner {
            BodyInner::Once(bytes) => Ok(bytes),
            _ => Err(Error::BodyFrozen),
        }
    }

    /// Buffers the body in place and returns a cheap handle to the bytes.
    pub async fn to_bytes(&mut self) -> Result<Bytes, Error> {
        if let BodyInner::Once(bytes) = &self.inner {
            return Ok(bytes.clone());
        }
        let body = core::mem::replace(self, Self::frozen());
        let bytes = body.into_bytes().await?;
        self.inner = BodyInner::Once(bytes.clone());
        Ok(bytes)
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl Stream for Body {
    type Item = Result<Bytes, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match &mut self.inner {
            BodyInner::Once(bytes) if bytes.is_empty() => Poll::Ready(None),
            BodyInner::Once(bytes) => Poll::Ready(Some(Ok(core::mem::take(bytes)))),
            BodyInner::Reader { reader, length } => {
                let data = ready!(reader.as_mut().poll_fill_buf(cx))?;
                if data.is_empty() {
                    return Poll::Ready(None);
                }
                let data = Bytes::copy_from_slice(data);
                reader.as_mut().consume(data.len());
                if let Some(remaining) = length {
                    *remaining = remaining.saturating_sub(data.len());
                }
                Poll::Ready(Some(Ok(data)))
            }
            BodyInner::HttpBody(stream) => stream
                .as_mut()
                .poll_frame(cx)
                .map_ok(|frame| frame.into_data().unwrap_or_default()),
            BodyInner::Freeze => Poll::Ready(Some(Err(Error::BodyFrozen))),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.inner {
            BodyInner::Once(bytes) => (bytes.len(), Some(bytes.len())),
            BodyInner::Reader { length, .. } => (0, *length),
            BodyInner::HttpBody(body) => {
                let hint = body.size_hint();
                (hint.lower() as usize, hint.upper().map(|u| u as usize))
            }
            BodyInner::Freeze => (0, None),
        }
    }
}

impl http_body::Body for Body {
    type Data = Bytes;
    type Error = Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        self.poll_next(cx)
            .map(|opt| opt.map(|result| result.map(Frame::data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_lite::{io::BufReader, io::Cursor, stream};

    #[tokio::test]
    async fn frozen_body_refuses_to_yield() {
        assert!(matches!(Body::frozen().into_bytes().await, Err(Error::BodyFrozen)));
    }

    #[tokio::test]
    async fn as_bytes_buffers_a_stream_once() {
        let mut body = Body::from_stream(stream::iter(vec![
            Ok::<_, std::io::Error>("a=1"),
            Ok("&b=2"),
        ]));
        assert_eq!(body.len(), None);
        assert_eq!(body.as_bytes().await.unwrap(), b"a=1&b=2");
        assert_eq!(body.len(), Some(7));
        assert_eq!(body.to_bytes().await.unwrap().as_ref(), b"a=1&b=2");
    }

    #[tokio::test]
    async fn failed_drain_leaves_the_body_frozen() {
        let mut body = Body::from_stream(stream::iter(vec![
            Ok("partial"),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ]));
        let err = body.as_bytes().await.unwrap_err();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == std::io::ErrorKind::ConnectionReset));
        assert!(matches!(body.as_bytes().await, Err(Error::BodyFrozen)));
    }

    #[tokio::test]
    async fn reader_body_is_drained() {
        let data = "reader contents";
        let reader = BufReader::new(Cursor::new(data.as_bytes().to_vec()));
        let body = Body::from_reader(reader, data.len());
        assert_eq!(body.len(), Some(data.len()));
        assert_eq!(body.into_bytes().await.unwrap().as_ref(), data.as_bytes());
    }

    #[tokio::test]
    async fn stream_yields_single_chunk_for_buffered_body() {
        let mut body = Body::from_bytes("chunk");
        let mut chunks = Vec::new();
        while let Some(chunk) = body.next().await {
            chunks.push(chunk.unwrap());
        }
        assert_eq!(chunks, vec![Bytes::from_static(b"chunk")]);
    }
}
