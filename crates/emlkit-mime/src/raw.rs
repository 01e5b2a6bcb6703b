//! Splitting a raw message into its header block and body.

use crate::error::{Error, Result};

/// A single unfolded header field, exactly as it appeared on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHeader {
    /// Header name (original spelling).
    pub name: String,
    /// Unfolded value with surrounding whitespace trimmed.
    pub value: Vec<u8>,
}

/// A message split at the blank line separating headers from body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage<'a> {
    /// Header block without the trailing line breaks.
    pub header_block: &'a [u8],
    /// Everything after the blank line.
    pub body: &'a [u8],
    /// Header fields in message order.
    pub headers: Vec<RawHeader>,
}

/// Splits a raw message into header block, body and header fields.
///
/// # Errors
///
/// Returns [`Error::MalformedMessage`] when no blank line terminates the
/// header section or the section does not start with a header field.
pub fn split(data: &[u8]) -> Result<RawMessage<'_>> {
    let (header_end, body_start) = find_separator(data)
        .ok_or_else(|| Error::MalformedMessage("no header terminator found".to_string()))?;

    let header_block = trim_line_breaks(&data[..header_end]);
    let headers = parse_fields(header_block)?;

    Ok(RawMessage {
        header_block,
        body: &data[body_start..],
        headers,
    })
}

/// Finds the earliest blank line; returns (end of headers, start of body).
pub(crate) fn find_separator(data: &[u8]) -> Option<(usize, usize)> {
    let crlf = find(data, b"\r\n\r\n").map(|i| (i, i + 4));
    let lf = find(data, b"\n\n").map(|i| (i, i + 2));
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn trim_line_breaks(mut bytes: &[u8]) -> &[u8] {
    while let [rest @ .., b'\r' | b'\n'] = bytes {
        bytes = rest;
    }
    bytes
}

fn parse_fields(block: &[u8]) -> Result<Vec<RawHeader>> {
    let mut fields: Vec<RawHeader> = Vec::new();

    for line in block.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }

        if matches!(line[0], b' ' | b'\t') {
            match fields.last_mut() {
                Some(field) => field.value.extend_from_slice(line),
                None => {
                    return Err(Error::MalformedMessage(
                        "header section starts with a continuation line".to_string(),
                    ));
                }
            }
            continue;
        }

        match split_field(line) {
            Some(field) => fields.push(field),
            None if fields.is_empty() => {
                return Err(Error::MalformedMessage(format!(
                    "first header line is not a field: {}",
                    String::from_utf8_lossy(line)
                )));
            }
            None => {
                tracing::warn!(
                    line = %String::from_utf8_lossy(line),
                    "skipping malformed header line"
                );
            }
        }
    }

    if fields.is_empty() {
        return Err(Error::MalformedMessage("no header fields".to_string()));
    }

    for field in &mut fields {
        field.value = field.value.trim_ascii().to_vec();
    }

    Ok(fields)
}

fn split_field(line: &[u8]) -> Option<RawHeader> {
    let colon = line.iter().position(|&b| b == b':')?;
    let name = line[..colon].trim_ascii_end();
    if name.is_empty() || !name.iter().all(|&b| b.is_ascii_graphic()) {
        return None;
    }

    Some(RawHeader {
        name: String::from_utf8_lossy(name).into_owned(),
        value: line[colon + 1..].to_vec(),
    })
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

    #[test]
    fn test_split_crlf() {
        let raw = b"From: a@example.com\r\nSubject: Hi\r\n\r\nbody line\r\n";
        let msg = split(raw).unwrap();
        assert_eq!(msg.header_block, b"From: a@example.com\r\nSubject: Hi");
        assert_eq!(msg.body, b"body line\r\n");
        assert_eq!(msg.headers.len(), 2);
        assert_eq!(msg.headers[1].name, "Subject");
        assert_eq!(msg.headers[1].value, b"Hi");
    }

    #[test]
    fn test_split_lf_and_unfolding() {
        let raw = b"To: a@example.com,\n\tb@example.com\nX-Empty:\n\nbody";
        let msg = split(raw).unwrap();
        assert_eq!(msg.headers[0].value, b"a@example.com,\tb@example.com");
        assert_eq!(msg.headers[1].name, "X-Empty");
        assert!(msg.headers[1].value.is_empty());
        assert_eq!(msg.body, b"body");
    }

    #[test]
    fn test_split_earliest_separator_wins() {
        let raw = b"A: 1\n\nbody\r\n\r\nmore";
        let msg = split(raw).unwrap();
        assert_eq!(msg.body, b"body\r\n\r\nmore");
    }

    #[test]
    fn test_split_without_terminator() {
        let err = split(b"From: a@example.com\r\n").unwrap_err();
        assert!(matches!(err, Error::MalformedMessage(_)));
    }

    #[test]
    fn test_split_not_a_header() {
        let err = split(b"hello world\r\n\r\nbody").unwrap_err();
        assert!(matches!(err, Error::MalformedMessage(_)));
    }

    #[test]
    fn test_split_skips_stray_line_after_first_field() {
        let msg = split(b"From: a@example.com\nnonsense\nTo: b@example.com\n\n").unwrap();
        let names: Vec<_> = msg.headers.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["From", "To"]);
        assert!(msg.body.is_empty());
    }
}
