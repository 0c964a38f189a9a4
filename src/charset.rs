//! Character sets the context can read and write text in.
use bytes::Bytes;

use crate::ContextError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Charset {
    Utf8,
    Latin1,
    Ascii,
}

impl Charset {
    /// Resolves an IANA label, ignoring case and surrounding quotes.
    pub(crate) fn lookup(label: &str) -> Result<Self, ContextError> {
        let normalized = label.trim().trim_matches('"').to_ascii_lowercase();
        match normalized.as_str() {
            "utf-8" | "utf8" | "unicode-1-1-utf-8" => Ok(Self::Utf8),
            "iso-8859-1" | "iso8859-1" | "iso_8859-1" | "latin1" | "l1" => Ok(Self::Latin1),
            "us-ascii" | "ascii" => Ok(Self::Ascii),
            _ => Err(ContextError::UnsupportedCharset(label.to_owned())),
        }
    }

    pub(crate) const fn name(self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::Latin1 => "ISO-8859-1",
            Self::Ascii => "US-ASCII",
        }
    }

    /// Bytes the charset does not define are rejected, never replaced.
    pub(crate) fn decode(self, bytes: &[u8]) -> Result<String, ContextError> {
        match self {
            Self::Utf8 => core::str::from_utf8(bytes)
                .map(str::to_owned)
                .map_err(|error| ContextError::InvalidText {
                    charset: self.name(),
                    source: Some(error),
                }),
            Self::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
            Self::Ascii if bytes.is_ascii() => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
            Self::Ascii => Err(ContextError::InvalidText {
                charset: self.name(),
                source: None,
            }),
        }
    }

    /// Characters the charset cannot represent become `?`.
    pub(crate) fn encode(self, text: String) -> Bytes {
        let limit = match self {
            Self::Utf8 => return Bytes::from(text),
            Self::Latin1 => 0xFF,
            Self::Ascii => 0x7F,
        };
        text.chars()
            .map(|c| u8::try_from(u32::from(c)).ok().filter(|&b| u32::from(b) <= limit).unwrap_or(b'?'))
            .collect::<Vec<u8>>()
            .into()
    }
}
