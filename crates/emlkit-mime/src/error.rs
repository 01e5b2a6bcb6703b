//! Error types for message parsing.
//!
//! The same enum carries fatal errors (returned as `Err` from
//! [`Message::parse`](crate::Message::parse)) and non-fatal ones, which are
//! collected next to the partially parsed message.

/// Result type alias for parsing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Message parsing error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The raw message has no usable header section.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Header value could not be tokenized.
    #[error("Lex error at position {position}: {message}")]
    Lex {
        /// Byte offset into the (encoded-word expanded) header value.
        position: usize,
        /// Error description.
        message: String,
    },

    /// Malformed mailbox or group syntax.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Invalid content type.
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    /// Missing boundary in multipart message.
    #[error("Missing boundary in multipart message")]
    MissingBoundary,

    /// Multipart nesting went deeper than the configured limit.
    #[error("Multipart nesting exceeds the limit of {limit} levels")]
    RecursionLimit {
        /// The configured maximum depth.
        limit: usize,
    },

    /// Base64 decode error.
    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// Invalid quoted-printable data.
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Malformed RFC 2047 encoded word.
    #[error("Invalid encoded word: {0}")]
    EncodedWord(String),

    /// Unknown charset or bytes not valid in the declared charset.
    #[error("Charset error: {0}")]
    Charset(String),

    /// Attachment disposition without a filename parameter.
    #[error("Failed to get filename from Content-Disposition: {0}")]
    MissingFilename(String),

    /// A single header failed to parse.
    #[error("Header {name}: {source}")]
    Header {
        /// Header name as it appeared in the message.
        name: String,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wraps an error with the name of the header that produced it.
    #[must_use]
    pub fn in_header(self, name: impl Into<String>) -> Self {
        Self::Header {
            name: name.into(),
            source: Box::new(self),
        }
    }
}
