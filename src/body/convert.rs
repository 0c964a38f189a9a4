use bytes::Bytes;
use bytestr::ByteStr;
use std::borrow::Cow;

use super::Body;

macro_rules! from_bytes {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Body {
                fn from(data: $ty) -> Self {
                    Body::from_bytes(data)
                }
            }
        )*
    };
}
from_bytes!(Bytes, Vec<u8>, Box<[u8]>);

macro_rules! from_text {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Body {
                fn from(text: $ty) -> Self {
                    Body::from_text(text)
                }
            }
        )*
    };
}
from_text!(ByteStr, String);

impl From<&[u8]> for Body {
    fn from(data: &[u8]) -> Self {
        Body::from_bytes(data.to_vec())
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::from_text(text.to_owned())
    }
}

impl From<Cow<'_, str>> for Body {
    fn from(text: Cow<'_, str>) -> Self {
        Body::from_text(text.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn text_conversions_keep_the_utf8_bytes() {
        let body = Body::from("café");
        assert_eq!(body.len(), Some(5));
        assert_eq!(body.into_bytes().await.unwrap().as_ref(), "café".as_bytes());

        let body = Body::from(Cow::Borrowed("cow"));
        assert_eq!(body.into_bytes().await.unwrap().as_ref(), b"cow");
    }

    #[tokio::test]
    async fn byte_conversions_are_buffered() {
        let body = Body::from(vec![1u8, 2, 3]);
        assert_eq!(body.len(), Some(3));
        assert_eq!(body.into_bytes().await.unwrap().as_ref(), &[1, 2, 3]);
    }
}
