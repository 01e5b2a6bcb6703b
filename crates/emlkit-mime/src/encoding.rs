//! MIME decoding utilities.
//!
//! Supports Base64, Quoted-Printable, RFC 2047 encoded words and charset
//! transcoding to UTF-8.

use std::borrow::Cow;

use base64::Engine;
use base64::alphabet;
use base64::engine::DecodePaddingMode;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use encoding_rs::Encoding;

use crate::error::{Error, Result};
use crate::raw::find;

/// Body base64: padding required, stray bits after the last byte ignored.
const BODY_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// Encoded words in the wild often drop their padding.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decodes Base64 data, ignoring embedded whitespace and line breaks.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &[u8]) -> Result<Vec<u8>> {
    let cleaned: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    BODY_BASE64.decode(cleaned).map_err(Into::into)
}

/// Decodes Quoted-Printable data (RFC 2045).
///
/// # Errors
///
/// Returns an error if the input contains invalid escape sequences.
pub fn decode_quoted_printable(data: &[u8]) -> Result<Vec<u8>> {
    qp_decode(data, true, false)
}

/// Decodes Quoted-Printable data, copying malformed escapes through as-is.
#[must_use]
pub fn decode_quoted_printable_lenient(data: &[u8]) -> Vec<u8> {
    // Only strict mode can fail.
    qp_decode(data, false, false).unwrap_or_else(|_| data.to_vec())
}

fn qp_decode(data: &[u8], strict: bool, underscore_is_space: bool) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        match data[i] {
            b'=' => {
                let rest = &data[i + 1..];

                // Soft line break, possibly after transport padding
                let pad = rest
                    .iter()
                    .take_while(|&&b| b == b' ' || b == b'\t')
                    .count();
                match &rest[pad..] {
                    [b'\r', b'\n', ..] => {
                        i += 1 + pad + 2;
                        continue;
                    }
                    [b'\n', ..] => {
                        i += 1 + pad + 1;
                        continue;
                    }
                    [] => break,
                    _ => {}
                }

                // Hex encoded byte
                if let Some(byte) = rest.get(..2).and_then(hex_pair) {
                    result.push(byte);
                    i += 3;
                } else if strict {
                    return Err(Error::InvalidEncoding(format!(
                        "invalid escape sequence at byte {i}"
                    )));
                } else {
                    result.push(b'=');
                    i += 1;
                }
            }
            b'_' if underscore_is_space => {
                result.push(b' ');
                i += 1;
            }
            byte => {
                result.push(byte);
                i += 1;
            }
        }
    }

    Ok(result)
}

fn hex_pair(pair: &[u8]) -> Option<u8> {
    let hi = char::from(pair[0]).to_digit(16)?;
    let lo = char::from(pair[1]).to_digit(16)?;
    u8::try_from(hi * 16 + lo).ok()
}

/// Transcodes bytes in the named charset to UTF-8.
///
/// An empty charset name is treated as UTF-8.
///
/// # Errors
///
/// Returns [`Error::Charset`] if the charset is unknown or the bytes are not
/// valid in it.
pub fn to_utf8(charset: &str, bytes: &[u8]) -> Result<String> {
    let label = charset.trim().trim_matches('"');
    let encoding = if label.is_empty() {
        encoding_rs::UTF_8
    } else {
        Encoding::for_label(label.as_bytes())
            .ok_or_else(|| Error::Charset(format!("unknown charset: {label}")))?
    };

    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(Cow::into_owned)
        .ok_or_else(|| Error::Charset(format!("invalid {} data", encoding.name())))
}

/// Decodes all RFC 2047 encoded words in a header value.
///
/// Format: `=?charset?encoding?encoded-text?=`. Whitespace between two
/// adjacent encoded words is dropped. Text that is not an encoded word is
/// kept; non-UTF-8 bytes in it are read as Windows-1252.
///
/// # Errors
///
/// Returns [`Error::EncodedWord`] for an encoded word with an unknown
/// encoding, undecodable payload or unknown charset.
pub fn decode_words(data: &[u8]) -> Result<String> {
    let mut result = String::new();
    let mut pos = 0;
    let mut literal_start = 0;
    let mut after_word = false;

    while let Some(offset) = find(&data[pos..], b"=?") {
        let start = pos + offset;
        match parse_encoded_word(&data[start..])? {
            Some((word, len)) => {
                let gap = &data[literal_start..start];
                if !(after_word && gap.iter().all(u8::is_ascii_whitespace)) {
                    result.push_str(&decode_literal(gap));
                }
                result.push_str(&word);
                pos = start + len;
                literal_start = pos;
                after_word = true;
            }
            None => pos = start + 2,
        }
    }

    result.push_str(&decode_literal(&data[literal_start..]));
    Ok(result)
}

/// Parses one encoded word at the start of `data`.
///
/// Returns `Ok(None)` when the bytes only look like the start of an
/// encoded word, so they can be kept as literal text.
fn parse_encoded_word(data: &[u8]) -> Result<Option<(String, usize)>> {
    let body = &data[2..];
    let Some(q) = body.iter().position(|&b| b == b'?') else {
        return Ok(None);
    };
    let charset = &body[..q];
    if charset.is_empty() || charset.iter().any(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let [encoding, b'?', rest @ ..] = &body[q + 1..] else {
        return Ok(None);
    };
    let Some(end) = find(rest, b"?=") else {
        return Ok(None);
    };
    let text = &rest[..end];
    if text.iter().any(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let bytes = match encoding.to_ascii_uppercase() {
        b'B' => LENIENT_BASE64
            .decode(text)
            .map_err(|e| Error::EncodedWord(format!("bad base64 payload: {e}")))?,
        b'Q' => qp_decode(text, true, true)
            .map_err(|e| Error::EncodedWord(format!("bad Q payload: {e}")))?,
        other => {
            return Err(Error::EncodedWord(format!(
                "unknown encoding: {}",
                char::from(other)
            )));
        }
    };

    // RFC 2231 language suffix: charset*lang
    let charset = String::from_utf8_lossy(charset);
    let charset = charset.split('*').next().unwrap_or_default();
    let word = to_utf8(charset, &bytes).map_err(|e| Error::EncodedWord(e.to_string()))?;

    // "=?" + charset + "?" + encoding + "?" + text + "?="
    let len = 2 + q + 3 + end + 2;
    Ok(Some((word, len)))
}

fn decode_literal(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => encoding_rs::WINDOWS_1252.decode(bytes).0,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_decode() {
        let decoded = decode_base64(b"SGVsbG8s\r\nIFdvcmxkIQ==\r\n").unwrap();
        assert_eq!(decoded, b"Hello, World!");
    }

    #[test]
    fn test_base64_ignores_trailing_bits() {
        assert_eq!(decode_base64(b"QR==").unwrap(), b"A");
        assert_eq!(decode_base64(b"QUJDRB==").unwrap(), b"ABCD");
    }

    #[test]
    fn test_base64_invalid() {
        let err = decode_base64(b"not*base64!").unwrap_err();
        assert!(matches!(err, Error::Base64Decode(_)));
    }

    #[test]
    fn test_quoted_printable_decode() {
        let decoded = decode_quoted_printable(b"Hello, World!").unwrap();
        assert_eq!(decoded, b"Hello, World!");

        let decoded = decode_quoted_printable(b"H=C3=A9llo").unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), "Héllo");
    }

    #[test]
    fn test_quoted_printable_soft_line_break() {
        assert_eq!(decode_quoted_printable(b"Hello=\r\nWorld").unwrap(), b"HelloWorld");
        assert_eq!(decode_quoted_printable(b"Hello= \nWorld").unwrap(), b"HelloWorld");
        assert_eq!(decode_quoted_printable(b"trailing=").unwrap(), b"trailing");
    }

    #[test]
    fn test_quoted_printable_invalid_escape() {
        assert!(matches!(
            decode_quoted_printable(b"100=ZZ").unwrap_err(),
            Error::InvalidEncoding(_)
        ));
        assert_eq!(decode_quoted_printable_lenient(b"100=ZZ =41"), b"100=ZZ A");
    }

    #[test]
    fn test_to_utf8() {
        assert_eq!(to_utf8("UTF-8", "héllo".as_bytes()).unwrap(), "héllo");
        assert_eq!(to_utf8("iso-8859-1", b"caf\xe9").unwrap(), "café");
        assert_eq!(to_utf8("\"utf-8\"", b"plain").unwrap(), "plain");
        assert_eq!(to_utf8("", b"plain").unwrap(), "plain");
    }

    #[test]
    fn test_to_utf8_errors() {
        assert!(matches!(
            to_utf8("x-klingon", b"abc").unwrap_err(),
            Error::Charset(_)
        ));
        assert!(matches!(
            to_utf8("utf-8", b"\xff\xfe\xfd").unwrap_err(),
            Error::Charset(_)
        ));
    }

    #[test]
    fn test_decode_words_plain() {
        assert_eq!(decode_words(b"Hello").unwrap(), "Hello");
        assert_eq!(decode_words(b"a =? b").unwrap(), "a =? b");
    }

    #[test]
    fn test_decode_words_base64() {
        assert_eq!(decode_words(b"=?utf-8?B?SMOpbGxv?=").unwrap(), "Héllo");
        assert_eq!(decode_words(b"=?UTF-8?b?SMOpbGxv?=").unwrap(), "Héllo");
    }

    #[test]
    fn test_decode_words_q() {
        assert_eq!(decode_words(b"=?utf-8?Q?H=C3=A9llo_there?=").unwrap(), "Héllo there");
        assert_eq!(decode_words(b"=?iso-8859-1?q?caf=E9?=").unwrap(), "café");
    }

    #[test]
    fn test_decode_words_mixed() {
        let decoded = decode_words(b"Re: =?utf-8?Q?caf=C3=A9?= =?utf-8?Q?_au_lait?= now").unwrap();
        assert_eq!(decoded, "Re: café au lait now");
    }

    #[test]
    fn test_decode_words_language_suffix() {
        assert_eq!(decode_words(b"=?utf-8*en?Q?hi?=").unwrap(), "hi");
    }

    #[test]
    fn test_decode_words_errors() {
        assert!(matches!(
            decode_words(b"=?utf-8?X?abc?=").unwrap_err(),
            Error::EncodedWord(_)
        ));
        assert!(matches!(
            decode_words(b"=?no-such-charset?Q?abc?=").unwrap_err(),
            Error::EncodedWord(_)
        ));
    }
}
