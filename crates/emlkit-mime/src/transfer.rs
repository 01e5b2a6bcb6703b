//! Content-Transfer-Encoding handling.

use std::fmt;

use crate::encoding::{decode_base64, decode_quoted_printable_lenient};
use crate::error::Result;
use crate::header::Headers;

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit binary.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit, // Default (includes "7bit")
        }
    }

    /// Resolves the encoding of a part: its own header first, then the
    /// message's, identity when neither declares one.
    #[must_use]
    pub fn resolve(part_headers: &Headers, message_headers: &Headers) -> Self {
        part_headers
            .get("content-transfer-encoding")
            .or_else(|| message_headers.get("content-transfer-encoding"))
            .map_or(Self::SevenBit, Self::parse)
    }

    /// Decodes `data` according to this encoding.
    ///
    /// Quoted-printable never fails; malformed escapes are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if Base64 data is invalid.
    pub fn decode(self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Base64 => decode_base64(data),
            Self::QuotedPrintable => Ok(decode_quoted_printable_lenient(data)),
            Self::SevenBit | Self::EightBit | Self::Binary => Ok(data.to_vec()),
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// Undoes the transfer encoding of a part's data.
///
/// # Errors
///
/// Returns an error only for invalid Base64; callers keep the raw bytes.
pub fn decode_transfer(
    part_headers: &Headers,
    message_headers: &Headers,
    raw: &[u8],
) -> Result<Vec<u8>> {
    TransferEncoding::resolve(part_headers, message_headers).decode(raw)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use crate::Error;

    fn headers(cte: &str) -> Headers {
        let mut headers = Headers::new();
        headers.add("Content-Transfer-Encoding", cte);
        headers
    }

    #[test]
    fn test_transfer_encoding_parse() {
        assert_eq!(TransferEncoding::parse("7bit"), TransferEncoding::SevenBit);
        assert_eq!(TransferEncoding::parse(" BASE64 "), TransferEncoding::Base64);
        assert_eq!(
            TransferEncoding::parse("quoted-printable"),
            TransferEncoding::QuotedPrintable
        );
        assert_eq!(TransferEncoding::parse("x-uuencode"), TransferEncoding::SevenBit);
        assert_eq!(TransferEncoding::QuotedPrintable.to_string(), "quoted-printable");
    }

    #[test]
    fn test_part_header_wins() {
        let part = headers("base64");
        let message = headers("quoted-printable");
        assert_eq!(
            TransferEncoding::resolve(&part, &message),
            TransferEncoding::Base64
        );
        assert_eq!(
            decode_transfer(&part, &message, b"aGk=").unwrap(),
            b"hi"
        );
    }

    #[test]
    fn test_message_header_fallback() {
        let message = headers("quoted-printable");
        assert_eq!(
            decode_transfer(&Headers::new(), &message, b"caf=C3=A9").unwrap(),
            "café".as_bytes()
        );
    }

    #[test]
    fn test_identity_without_headers() {
        assert_eq!(
            decode_transfer(&Headers::new(), &Headers::new(), b"=41 raw").unwrap(),
            b"=41 raw"
        );
    }

    #[test]
    fn test_invalid_base64() {
        let err = decode_transfer(&headers("base64"), &Headers::new(), b"@@@not base64@@@")
            .unwrap_err();
        assert!(matches!(err, Error::Base64Decode(_)));
    }

    #[test]
    fn test_quoted_printable_is_best_effort() {
        assert_eq!(
            decode_transfer(&headers("quoted-printable"), &Headers::new(), b"50=% off").unwrap(),
            b"50=% off"
        );
    }
}
