//! Multipart body decomposition.
//!
//! [`MultipartReader`] walks the boundary-delimited segments of one
//! multipart body. [`decompose`] drives it over nested multiparts and
//! flattens every leaf into a single ordered list of [`Part`]s.

use tracing::{debug, trace, warn};

use crate::content_type::ContentType;
use crate::error::{Error, Result};
use crate::header::Headers;
use crate::message::Part;
use crate::raw::{find, find_separator};

/// Default limit on nested multipart containers.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// One boundary-delimited segment of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment<'a> {
    /// Segment headers.
    pub headers: Headers,
    /// Segment body, still transfer-encoded.
    pub body: &'a [u8],
}

impl<'a> Segment<'a> {
    fn parse(content: &'a [u8]) -> Self {
        let without_headers = content
            .strip_prefix(b"\r\n")
            .or_else(|| content.strip_prefix(b"\n"));
        if let Some(body) = without_headers {
            return Self {
                headers: Headers::new(),
                body,
            };
        }

        match find_separator(content) {
            Some((header_end, body_start)) => Self {
                headers: Headers::parse(&content[..header_end]),
                body: &content[body_start..],
            },
            None => Self {
                headers: Headers::parse(content),
                body: &[],
            },
        }
    }
}

/// Location of a delimiter line.
struct Delimiter {
    /// End of the preceding segment (the line break before the delimiter
    /// belongs to the delimiter).
    content_end: usize,
    /// First byte after the delimiter line.
    next: usize,
    /// True for the closing `--boundary--` delimiter.
    close: bool,
}

/// Iterator over the segments of a multipart body.
///
/// The preamble before the first delimiter and the epilogue after the
/// closing one are ignored. A body without any delimiter yields nothing;
/// a missing closing delimiter ends the last segment at end of input.
pub struct MultipartReader<'a> {
    body: &'a [u8],
    dash_boundary: Vec<u8>,
    pos: Option<usize>,
    finished: bool,
}

impl<'a> MultipartReader<'a> {
    /// Creates a reader for `body` split on `boundary`.
    #[must_use]
    pub fn new(body: &'a [u8], boundary: &str) -> Self {
        Self {
            body,
            dash_boundary: format!("--{boundary}").into_bytes(),
            pos: None,
            finished: false,
        }
    }

    fn find_delimiter(&self, from: usize) -> Option<Delimiter> {
        let mut search = from;

        while let Some(offset) = find(&self.body[search..], &self.dash_boundary) {
            let at = search + offset;
            search = at + 1;

            if at > 0 && self.body[at - 1] != b'\n' {
                continue;
            }

            let mut cursor = at + self.dash_boundary.len();
            let close = self.body[cursor..].starts_with(b"--");
            if close {
                cursor += 2;
            }

            // Transport padding
            while matches!(self.body.get(cursor).copied(), Some(b' ' | b'\t')) {
                cursor += 1;
            }
            let next = match (
                self.body.get(cursor).copied(),
                self.body.get(cursor + 1).copied(),
            ) {
                (None, _) => cursor,
                (Some(b'\n'), _) => cursor + 1,
                (Some(b'\r'), Some(b'\n')) => cursor + 2,
                _ if close => cursor,
                // Longer line that merely starts with the boundary
                _ => continue,
            };

            let mut content_end = at;
            if content_end > 0 && self.body[content_end - 1] == b'\n' {
                content_end -= 1;
                if content_end > 0 && self.body[content_end - 1] == b'\r' {
                    content_end -= 1;
                }
            }

            return Some(Delimiter {
                content_end,
                next,
                close,
            });
        }

        None
    }
}

impl<'a> Iterator for MultipartReader<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let start = match self.pos {
            Some(pos) => pos,
            None => match self.find_delimiter(0) {
                Some(first) if !first.close => first.next,
                _ => {
                    self.finished = true;
                    return None;
                }
            },
        };

        let (end, next) = match self.find_delimiter(start) {
            Some(delimiter) => {
                self.finished = delimiter.close;
                (delimiter.content_end.max(start), delimiter.next)
            }
            None => {
                trace!("multipart body ends without a closing delimiter");
                self.finished = true;
                (self.body.len(), self.body.len())
            }
        };
        self.pos = Some(next);

        Some(Segment::parse(&self.body[start..end]))
    }
}

/// Pending body on the decomposition stack.
struct Frame<'a> {
    content_type: String,
    body: &'a [u8],
    headers: Headers,
    /// Number of enclosing multipart containers.
    depth: usize,
}

/// Decomposes a body into its leaf parts with the default depth limit.
///
/// # Errors
///
/// See [`decompose_with_limit`].
pub fn decompose(content_type: &str, body: &[u8], inherited: &Headers) -> Result<Vec<Part>> {
    decompose_with_limit(content_type, body, inherited, DEFAULT_MAX_DEPTH)
}

/// Decomposes a body into its leaf parts, depth first, in document order.
///
/// A non-multipart content type yields one part covering the whole body,
/// carrying `inherited` as its headers. Segments without a `Content-Type`
/// header are skipped. Nested segments whose content type is unusable are
/// kept as raw leaves.
///
/// # Errors
///
/// Returns [`Error::InvalidContentType`] if the top-level content type
/// cannot be parsed, [`Error::MissingBoundary`] if it is multipart without
/// a boundary, and [`Error::RecursionLimit`] when more than `max_depth`
/// multipart containers are nested.
pub fn decompose_with_limit(
    content_type: &str,
    body: &[u8],
    inherited: &Headers,
    max_depth: usize,
) -> Result<Vec<Part>> {
    let mut parts = Vec::new();
    let mut stack = vec![Frame {
        content_type: content_type.to_string(),
        body,
        headers: inherited.clone(),
        depth: 0,
    }];

    while let Some(frame) = stack.pop() {
        let ct = match ContentType::parse(&frame.content_type) {
            Ok(ct) => ct,
            Err(e) if frame.depth == 0 => return Err(e),
            Err(e) => {
                warn!(error = %e, "keeping segment with unusable content type as raw part");
                parts.push(raw_part(frame));
                continue;
            }
        };

        let Some(boundary) = ct.boundary() else {
            if ct.is_multipart() {
                if frame.depth == 0 {
                    return Err(Error::MissingBoundary);
                }
                warn!(media_type = %ct.media_type(), "nested multipart without boundary kept as raw part");
                parts.push(raw_part(frame));
                continue;
            }

            trace!(media_type = %ct.media_type(), depth = frame.depth, "leaf part");
            parts.push(Part {
                content_type: ct.media_type(),
                charset: ct.charset().unwrap_or_default().to_string(),
                data: frame.body.to_vec(),
                headers: frame.headers,
            });
            continue;
        };

        if frame.depth >= max_depth {
            return Err(Error::RecursionLimit { limit: max_depth });
        }

        let depth = frame.depth + 1;
        let children: Vec<Frame<'_>> = MultipartReader::new(frame.body, boundary)
            .filter_map(|segment| {
                let Some(content_type) = segment.headers.get("content-type") else {
                    trace!("skipping segment without Content-Type");
                    return None;
                };
                Some(Frame {
                    content_type: content_type.to_string(),
                    body: segment.body,
                    headers: segment.headers,
                    depth,
                })
            })
            .collect();
        debug!(
            media_type = %ct.media_type(),
            segments = children.len(),
            depth,
            "split multipart body"
        );

        // Reversed so the first segment is processed next.
        stack.extend(children.into_iter().rev());
    }

    Ok(parts)
}

/// Leaf for a nested segment whose content type could not be used.
fn raw_part(frame: Frame<'_>) -> Part {
    Part {
        charset: sniff_charset(&frame.content_type),
        content_type: frame.content_type,
        data: frame.body.to_vec(),
        headers: frame.headers,
    }
}

fn sniff_charset(content_type: &str) -> String {
    let lower = content_type.to_ascii_lowercase();
    lower
        .find("charset=")
        .map(|idx| {
            content_type[idx + "charset=".len()..]
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .trim_matches('"')
                .to_string()
        })
        .filter(|charset| !charset.is_empty())
        .unwrap_or_else(|| "UTF-8".to_string())
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

    fn segments<'a>(body: &'a [u8], boundary: &str) -> Vec<Segment<'a>> {
        MultipartReader::new(body, boundary).collect()
    }

    #[test]
    fn test_reader_basic() {
        let body = concat!(
            "preamble\r\n",
            "--b1\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "first\r\n",
            "--b1\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<p>second</p>\r\n",
            "--b1--\r\n",
            "epilogue\r\n"
        );

        let segs = segments(body.as_bytes(), "b1");
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].headers.get("content-type"), Some("text/plain"));
        assert_eq!(segs[0].body, b"first");
        assert_eq!(segs[1].body, b"<p>second</p>");
    }

    #[test]
    fn test_reader_lf_and_padding() {
        let body = "--xyz  \nContent-Type: text/plain\n\nhello\n--xyz-- \n";
        let segs = segments(body.as_bytes(), "xyz");
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].body, b"hello");
    }

    #[test]
    fn test_reader_ignores_longer_lines() {
        let body = "--b\nContent-Type: text/plain\n\n--bogus line\n--b--\n";
        let segs = segments(body.as_bytes(), "b");
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].body, b"--bogus line");
    }

    #[test]
    fn test_reader_boundary_must_start_line() {
        let body = "--b\nContent-Type: text/plain\n\ninline --b here\n--b--";
        let segs = segments(body.as_bytes(), "b");
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].body, b"inline --b here");
    }

    #[test]
    fn test_reader_missing_close() {
        let body = "--b\nContent-Type: text/plain\n\nunterminated";
        let segs = segments(body.as_bytes(), "b");
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].body, b"unterminated");
    }

    #[test]
    fn test_reader_no_delimiter() {
        assert!(segments(b"no parts at all", "b").is_empty());
        assert!(segments(b"--b--\n", "b").is_empty());
    }

    #[test]
    fn test_reader_segment_without_headers() {
        let segs = segments(b"--b\n\nbare body\n--b--", "b");
        assert_eq!(segs.len(), 1);
        assert!(segs[0].headers.is_empty());
        assert_eq!(segs[0].body, b"bare body");
    }

    #[test]
    fn test_decompose_leaf() {
        let parts =
            decompose("text/plain; charset=UTF-8", b"Hello", &Headers::new()).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].content_type, "text/plain");
        assert_eq!(parts[0].charset, "UTF-8");
        assert_eq!(parts[0].data, b"Hello");
    }

    #[test]
    fn test_decompose_nested_in_document_order() {
        let body = concat!(
            "--outer\r\n",
            "Content-Type: multipart/alternative; boundary=inner\r\n",
            "\r\n",
            "--inner\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "plain\r\n",
            "--inner\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<b>html</b>\r\n",
            "--inner--\r\n",
            "--outer\r\n",
            "X-Note: no content type here\r\n",
            "\r\n",
            "skipped\r\n",
            "--outer\r\n",
            "Content-Type: application/pdf\r\n",
            "Content-Disposition: attachment; filename=\"a.pdf\"\r\n",
            "\r\n",
            "PDF\r\n",
            "--outer--\r\n"
        );

        let parts = decompose(
            "multipart/mixed; boundary=outer",
            body.as_bytes(),
            &Headers::new(),
        )
        .unwrap();
        let types: Vec<_> = parts.iter().map(|p| p.content_type.as_str()).collect();
        assert_eq!(types, vec!["text/plain", "text/html", "application/pdf"]);
        assert_eq!(parts[0].data, b"plain");
        assert_eq!(
            parts[2].headers.get("content-disposition"),
            Some("attachment; filename=\"a.pdf\"")
        );
    }

    #[test]
    fn test_decompose_missing_boundary() {
        let err = decompose("multipart/mixed", b"body", &Headers::new()).unwrap_err();
        assert!(matches!(err, Error::MissingBoundary));
    }

    #[test]
    fn test_decompose_invalid_content_type() {
        let err = decompose("garbage", b"body", &Headers::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidContentType(_)));
    }

    #[test]
    fn test_decompose_nested_failure_kept_raw() {
        let body = concat!(
            "--b\n",
            "Content-Type: multipart/related; charset=\"latin1\"\n",
            "\n",
            "raw inner\n",
            "--b--\n"
        );
        let parts = decompose("multipart/mixed; boundary=b", body.as_bytes(), &Headers::new())
            .unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].charset, "latin1");
        assert_eq!(parts[0].data, b"raw inner");
    }

    /// `levels` multipart containers wrapped around one text leaf.
    fn nested(levels: usize) -> (String, Vec<u8>) {
        let mut segment = "Content-Type: text/plain\n\ndeep".to_string();
        let mut body = String::new();
        for k in (0..levels).rev() {
            body = format!("--b{k}\n{segment}\n--b{k}--\n");
            segment = format!("Content-Type: multipart/mixed; boundary=b{k}\n\n{body}");
        }
        ("multipart/mixed; boundary=b0".to_string(), body.into_bytes())
    }

    #[test]
    fn test_decompose_within_limit() {
        let (ct, body) = nested(5);
        let parts = decompose_with_limit(&ct, &body, &Headers::new(), 10).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].data, b"deep");
    }

    #[test]
    fn test_decompose_recursion_limit() {
        let (ct, body) = nested(100);
        let err = decompose(&ct, &body, &Headers::new()).unwrap_err();
        assert!(matches!(err, Error::RecursionLimit { limit: 64 }));
    }

    #[test]
    fn test_sniff_charset() {
        assert_eq!(sniff_charset("text/plain; Charset=\"koi8-r\"; x=1"), "koi8-r");
        assert_eq!(sniff_charset("text/plain"), "UTF-8");
    }
}
