//! Message assembly.
//!
//! [`Parser`] splits the raw bytes, routes every header field through a
//! table of handlers and then decomposes and classifies the body. Anything
//! short of an unreadable header section is reported as a non-fatal error
//! next to the best-effort [`Message`].

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{debug, trace, warn};

use crate::address::{Address, parse_address, parse_address_list};
use crate::content_type::ContentType;
use crate::date::parse_date;
use crate::encoding::{decode_words, to_utf8};
use crate::error::{Error, Result};
use crate::header::Headers;
use crate::multipart::{DEFAULT_MAX_DEPTH, decompose_with_limit};
use crate::raw::{self, RawHeader};
use crate::transfer::decode_transfer;

/// Leaf body part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Media type (`text/plain`), or the raw header value when it could not
    /// be parsed.
    pub content_type: String,
    /// Declared charset, empty when none was declared.
    pub charset: String,
    /// Part data. Text parts and attachments hold decoded bytes once the
    /// message is assembled; other parts keep their transfer encoding.
    pub data: Vec<u8>,
    /// Part headers.
    pub headers: Headers,
}

impl Part {
    /// Gets the first value of a part header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Checks whether `Content-Disposition` marks this part as an attachment.
    #[must_use]
    pub fn is_attachment(&self) -> bool {
        self.header("content-disposition")
            .is_some_and(|disposition| disposition.to_ascii_lowercase().contains("attachment"))
    }

    fn media_type_contains(&self, media_type: &str) -> bool {
        self.content_type.to_ascii_lowercase().contains(media_type)
    }
}

/// Decoded attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Filename with encoded words decoded.
    pub filename: String,
    /// Transfer-decoded data.
    pub data: Vec<u8>,
}

/// A parsed message.
#[derive(Debug, Clone, Default)]
pub struct Message {
    /// Header block as received, without the blank separator line.
    pub header_block: Vec<u8>,
    /// Body as received.
    pub body: Vec<u8>,
    /// All headers, unfolded, in message order.
    pub headers: Headers,
    /// `Message-ID` without angle brackets.
    pub message_id: String,
    /// `Date`; the Unix epoch when missing or unparseable.
    pub date: DateTime<Utc>,
    /// `Sender`, defaulting to the first `From` address.
    pub sender: Option<Address>,
    /// `From` addresses.
    pub from: Vec<Address>,
    /// `Reply-To` addresses.
    pub reply_to: Vec<Address>,
    /// `To` addresses.
    pub to: Vec<Address>,
    /// `Cc` addresses.
    pub cc: Vec<Address>,
    /// `Bcc` addresses.
    pub bcc: Vec<Address>,
    /// Decoded `Subject`.
    pub subject: String,
    /// Raw top-level `Content-Type`.
    pub content_type: String,
    /// `Comments` values.
    pub comments: Vec<String>,
    /// Comma-separated `Keywords`, flattened.
    pub keywords: Vec<String>,
    /// `In-Reply-To` ids without angle brackets.
    pub in_reply_to: Vec<String>,
    /// `References` ids without angle brackets.
    pub references: Vec<String>,
    /// Plain-text body.
    pub text: String,
    /// HTML body.
    pub html: String,
    /// Attachments in document order.
    pub attachments: Vec<Attachment>,
    /// Every leaf part in document order.
    pub parts: Vec<Part>,
}

impl Message {
    /// Parses a raw message with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedMessage`] when the header section cannot
    /// be found or read. Every other problem is returned in the error list.
    pub fn parse(data: &[u8]) -> Result<(Self, Vec<Error>)> {
        Parser::default().parse(data)
    }

    /// Checks if the top-level content type is multipart.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        ContentType::parse(&self.content_type).is_ok_and(|ct| ct.is_multipart())
    }

    /// Finds an attachment by filename.
    #[must_use]
    pub fn attachment(&self, filename: &str) -> Option<&Attachment> {
        self.attachments.iter().find(|a| a.filename == filename)
    }
}

/// Parser configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct ParserConfig {
    /// Maximum number of nested multipart containers.
    pub max_depth: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ParserConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the multipart nesting limit.
    #[must_use]
    pub const fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// Message parser.
#[derive(Debug, Clone, Default)]
pub struct Parser {
    config: ParserConfig,
}

impl Parser {
    /// Creates a parser with the given configuration.
    #[must_use]
    pub const fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parses a raw message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedMessage`] when the header section cannot
    /// be found or read. Every other problem is returned in the error list.
    pub fn parse(&self, data: &[u8]) -> Result<(Message, Vec<Error>)> {
        let raw = raw::split(data)?;
        let (mut message, errors) = self.assemble(&raw.headers, raw.body);
        message.header_block = raw.header_block.to_vec();
        debug!(
            headers = raw.headers.len(),
            parts = message.parts.len(),
            attachments = message.attachments.len(),
            errors = errors.len(),
            "parsed message"
        );
        Ok((message, errors))
    }

    /// Builds a message from already split header fields and body.
    #[must_use]
    pub fn assemble(&self, fields: &[RawHeader], body: &[u8]) -> (Message, Vec<Error>) {
        let mut message = Message {
            body: body.to_vec(),
            ..Message::default()
        };
        let mut errors = Vec::new();

        for field in fields {
            message
                .headers
                .add(field.name.as_str(), String::from_utf8_lossy(&field.value));

            let Some(handler) = handler_for(&field.name) else {
                trace!(name = %field.name, "no handler for header");
                continue;
            };
            if let Err(e) = handler(&mut message, &field.value) {
                warn!(name = %field.name, error = %e, "failed to parse header");
                errors.push(e.in_header(field.name.as_str()));
            }
        }

        if message.sender.is_none() {
            message.sender = message.from.first().cloned();
        }

        self.assemble_body(&mut message, &mut errors);
        (message, errors)
    }

    fn assemble_body(&self, message: &mut Message, errors: &mut Vec<Error>) {
        if message.content_type.is_empty() {
            message.text = String::from_utf8_lossy(&message.body).into_owned();
            return;
        }

        let parts = match decompose_with_limit(
            &message.content_type,
            &message.body,
            &Headers::new(),
            self.config.max_depth,
        ) {
            Ok(parts) => parts,
            Err(e) => {
                warn!(error = %e, "body decomposition failed, keeping raw body as text");
                message.text = String::from_utf8_lossy(&message.body).into_owned();
                errors.push(e);
                return;
            }
        };

        for mut part in parts {
            if part.media_type_contains("text/plain") {
                message.text = decode_text(&mut part, &message.headers, errors);
            } else if part.media_type_contains("text/html") {
                message.html = decode_text(&mut part, &message.headers, errors);
            } else if part.is_attachment() {
                match extract_attachment(&part, &message.headers, errors) {
                    Ok(attachment) => {
                        part.data.clone_from(&attachment.data);
                        message.attachments.push(attachment);
                    }
                    Err(e) => errors.push(e),
                }
            }
            message.parts.push(part);
        }
    }
}

/// Transfer-decodes and charset-normalizes a text part in place.
fn decode_text(part: &mut Part, message_headers: &Headers, errors: &mut Vec<Error>) -> String {
    match decode_transfer(&part.headers, message_headers, &part.data) {
        Ok(decoded) => part.data = decoded,
        Err(e) => errors.push(e),
    }

    match to_utf8(&part.charset, &part.data) {
        Ok(text) => {
            part.data = text.clone().into_bytes();
            text
        }
        Err(e) => {
            warn!(charset = %part.charset, error = %e, "charset conversion failed, keeping bytes");
            String::from_utf8_lossy(&part.data).into_owned()
        }
    }
}

#[allow(clippy::expect_used)]
static FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?si)name\s*=\s*(?:"(.*?)"|([^";\s]+))"#).expect("filename pattern is valid")
});

fn extract_attachment(
    part: &Part,
    message_headers: &Headers,
    errors: &mut Vec<Error>,
) -> Result<Attachment> {
    let disposition = part.header("content-disposition").unwrap_or_default();
    let raw_name = FILENAME
        .captures(disposition)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str())
        .ok_or_else(|| Error::MissingFilename(disposition.to_string()))?;

    let filename = decode_words(raw_name.as_bytes()).unwrap_or_else(|e| {
        errors.push(e);
        raw_name.to_string()
    });
    let data = decode_transfer(&part.headers, message_headers, &part.data).unwrap_or_else(|e| {
        errors.push(e);
        part.data.clone()
    });

    trace!(%filename, size = data.len(), "attachment");
    Ok(Attachment { filename, data })
}

type HeaderHandler = fn(&mut Message, &[u8]) -> Result<()>;

/// Header handlers keyed by lowercase name.
const HEADER_HANDLERS: &[(&str, HeaderHandler)] = &[
    ("content-type", set_content_type),
    ("message-id", set_message_id),
    ("in-reply-to", set_in_reply_to),
    ("references", set_references),
    ("date", set_date),
    ("sender", set_sender),
    ("from", add_from),
    ("reply-to", add_reply_to),
    ("to", add_to),
    ("cc", add_cc),
    ("bcc", add_bcc),
    ("subject", set_subject),
    ("comments", add_comments),
    ("keywords", add_keywords),
];

fn handler_for(name: &str) -> Option<HeaderHandler> {
    HEADER_HANDLERS
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|&(_, handler)| handler)
}

fn lossy(value: &[u8]) -> String {
    String::from_utf8_lossy(value).into_owned()
}

/// Decodes encoded words, keeping the raw text when that fails.
fn unstructured(value: &[u8]) -> (String, Result<()>) {
    match decode_words(value) {
        Ok(text) => (text, Ok(())),
        Err(e) => (lossy(value), Err(e)),
    }
}

fn message_ids(value: &[u8]) -> Vec<String> {
    lossy(value)
        .split_whitespace()
        .map(|id| id.trim_matches(|c: char| matches!(c, '<' | '>' | ' ')))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

#[allow(clippy::unnecessary_wraps)]
fn set_content_type(message: &mut Message, value: &[u8]) -> Result<()> {
    message.content_type = lossy(value);
    Ok(())
}

#[allow(clippy::unnecessary_wraps)]
fn set_message_id(message: &mut Message, value: &[u8]) -> Result<()> {
    message.message_id = lossy(value)
        .trim()
        .trim_matches(|c: char| c == '<' || c == '>')
        .to_string();
    Ok(())
}

#[allow(clippy::unnecessary_wraps)]
fn set_in_reply_to(message: &mut Message, value: &[u8]) -> Result<()> {
    message.in_reply_to.extend(message_ids(value));
    Ok(())
}

#[allow(clippy::unnecessary_wraps)]
fn set_references(message: &mut Message, value: &[u8]) -> Result<()> {
    message.references.extend(message_ids(value));
    Ok(())
}

#[allow(clippy::unnecessary_wraps)]
fn set_date(message: &mut Message, value: &[u8]) -> Result<()> {
    message.date = parse_date(&lossy(value));
    Ok(())
}

fn set_sender(message: &mut Message, value: &[u8]) -> Result<()> {
    message.sender = Some(parse_address(value)?);
    Ok(())
}

fn add_from(message: &mut Message, value: &[u8]) -> Result<()> {
    message.from.extend(parse_address_list(value)?);
    Ok(())
}

fn add_reply_to(message: &mut Message, value: &[u8]) -> Result<()> {
    message.reply_to.extend(parse_address_list(value)?);
    Ok(())
}

fn add_to(message: &mut Message, value: &[u8]) -> Result<()> {
    message.to.extend(parse_address_list(value)?);
    Ok(())
}

fn add_cc(message: &mut Message, value: &[u8]) -> Result<()> {
    message.cc.extend(parse_address_list(value)?);
    Ok(())
}

fn add_bcc(message: &mut Message, value: &[u8]) -> Result<()> {
    message.bcc.extend(parse_address_list(value)?);
    Ok(())
}

fn set_subject(message: &mut Message, value: &[u8]) -> Result<()> {
    let (subject, result) = unstructured(value);
    message.subject = subject;
    result
}

fn add_comments(message: &mut Message, value: &[u8]) -> Result<()> {
    let (comment, result) = unstructured(value);
    message.comments.push(comment);
    result
}

#[allow(clippy::unnecessary_wraps)]
fn add_keywords(message: &mut Message, value: &[u8]) -> Result<()> {
    message.keywords.extend(
        lossy(value)
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string),
    );
    Ok(())
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
    use crate::address::Mailbox;

    fn mailbox(local_part: &str, domain: &str) -> Address {
        Address::Mailbox(Mailbox {
            name: None,
            local_part: local_part.to_string(),
            domain: domain.to_string(),
        })
    }

    fn run(handler: &str, value: &str) -> (Message, Result<()>) {
        let mut message = Message::default();
        let result = handler_for(handler).unwrap()(&mut message, value.as_bytes());
        (message, result)
    }

    #[test]
    fn test_handler_lookup_ignores_case() {
        assert!(handler_for("Message-ID").is_some());
        assert!(handler_for("IN-REPLY-TO").is_some());
        assert!(handler_for("X-Mailer").is_none());
    }

    #[test]
    fn test_message_id_handler() {
        let (message, result) = run("message-id", " <1234@local.machine> ");
        assert!(result.is_ok());
        assert_eq!(message.message_id, "1234@local.machine");
    }

    #[test]
    fn test_id_list_handlers() {
        let (message, _) = run("in-reply-to", "<a@x> <b@y>");
        assert_eq!(message.in_reply_to, vec!["a@x", "b@y"]);

        let (message, _) = run("references", "<a@x>\t<b@y>  <c@z>");
        assert_eq!(message.references, vec!["a@x", "b@y", "c@z"]);
    }

    #[test]
    fn test_keywords_handler() {
        let (message, _) = run("keywords", "urgent, project x,, draft");
        assert_eq!(message.keywords, vec!["urgent", "project x", "draft"]);
    }

    #[test]
    fn test_subject_handler() {
        let (message, result) = run("subject", "=?UTF-8?Q?Caf=C3=A9?= time");
        assert!(result.is_ok());
        assert_eq!(message.subject, "Café time");

        let (message, result) = run("subject", "=?x-unknown?Q?abc?=");
        assert!(matches!(result, Err(Error::EncodedWord(_))));
        assert_eq!(message.subject, "=?x-unknown?Q?abc?=");
    }

    #[test]
    fn test_address_handlers_accumulate() {
        let mut message = Message::default();
        add_to(&mut message, b"a@example.com").unwrap();
        add_to(&mut message, b"b@example.com, c@example.com").unwrap();
        assert_eq!(
            message.to,
            vec![
                mailbox("a", "example.com"),
                mailbox("b", "example.com"),
                mailbox("c", "example.com"),
            ]
        );
    }

    #[test]
    fn test_sender_defaults_to_from() {
        let (message, errors) =
            Message::parse(b"From: a@example.com, b@example.com\r\n\r\nhi").unwrap();
        assert!(errors.is_empty());
        assert_eq!(message.sender, Some(mailbox("a", "example.com")));
        assert_eq!(message.text, "hi");
    }

    #[test]
    fn test_explicit_sender_wins() {
        let raw = b"Sender: s@example.com\r\nFrom: a@example.com\r\n\r\n";
        let (message, _) = Message::parse(raw).unwrap();
        assert_eq!(message.sender, Some(mailbox("s", "example.com")));
    }

    #[test]
    fn test_bad_header_is_not_fatal() {
        let raw = b"From: <broken@example.com\r\nTo: ok@example.com\r\nSubject: Hi\r\n\r\n";
        let (message, errors) = Message::parse(raw).unwrap();

        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], Error::Header { name, .. } if name == "From"));
        assert!(message.from.is_empty());
        assert_eq!(message.to, vec![mailbox("ok", "example.com")]);
        assert_eq!(message.subject, "Hi");
    }

    #[test]
    fn test_headers_map_and_blocks() {
        let raw = b"X-Custom: one\r\nSubject: Hi\r\nx-custom: two\r\n\r\nbody\r\n";
        let (message, _) = Message::parse(raw).unwrap();
        assert_eq!(message.headers.get_all("X-CUSTOM"), vec!["one", "two"]);
        assert_eq!(
            message.header_block,
            b"X-Custom: one\r\nSubject: Hi\r\nx-custom: two"
        );
        assert_eq!(message.body, b"body\r\n");
        assert_eq!(message.date, DateTime::UNIX_EPOCH);
    }

    #[test]
    fn test_no_content_type_is_plain_text() {
        let raw = b"Subject: Hi\r\n\r\n=41 stays verbatim";
        let (message, errors) = Message::parse(raw).unwrap();
        assert!(errors.is_empty());
        assert_eq!(message.text, "=41 stays verbatim");
        assert!(message.parts.is_empty());
        assert!(!message.is_multipart());
    }

    #[test]
    fn test_single_part_quoted_printable_latin1() {
        let raw = b"Content-Type: text/plain; charset=iso-8859-1\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\r\ncaf=E9";
        let (message, errors) = Message::parse(raw).unwrap();
        assert!(errors.is_empty());
        assert_eq!(message.text, "café");
        assert_eq!(message.parts.len(), 1);
        assert_eq!(message.parts[0].data, "café".as_bytes());
    }

    #[test]
    fn test_unknown_charset_falls_back() {
        let raw = b"Content-Type: text/plain; charset=x-nonexistent\r\n\r\nplain";
        let (message, errors) = Message::parse(raw).unwrap();
        assert!(errors.is_empty());
        assert_eq!(message.text, "plain");
    }

    #[test]
    fn test_unknown_charset_keeps_part_bytes() {
        let raw = b"Content-Type: text/plain; charset=x-unknown\r\n\r\ncaf\xe9";
        let (message, errors) = Message::parse(raw).unwrap();
        assert!(errors.is_empty());
        assert_eq!(message.parts[0].data, b"caf\xe9");
        assert_eq!(message.text, "caf\u{fffd}");
    }

    const MIXED: &[u8] = b"From: Alice <alice@example.com>\r\n\
Subject: Report\r\n\
Content-Type: multipart/mixed; boundary=\"outer\"\r\n\
\r\n\
--outer\r\n\
Content-Type: multipart/alternative; boundary=\"inner\"\r\n\
\r\n\
--inner\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Hello\r\n\
--inner\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>Hello</p>\r\n\
--inner--\r\n\
--outer\r\n\
Content-Type: application/pdf\r\n\
Content-Disposition: attachment; filename=\"=?UTF-8?B?w6kucGRm?=\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0=\r\n\
--outer--\r\n";

    #[test]
    fn test_multipart_classification() {
        let (message, errors) = Message::parse(MIXED).unwrap();
        assert!(errors.is_empty(), "{errors:?}");
        assert!(message.is_multipart());

        let types: Vec<_> = message.parts.iter().map(|p| p.content_type.as_str()).collect();
        assert_eq!(types, vec!["text/plain", "text/html", "application/pdf"]);
        assert_eq!(message.text, "Hello");
        assert_eq!(message.html, "<p>Hello</p>");

        assert_eq!(message.attachments.len(), 1);
        let attachment = message.attachment("é.pdf").unwrap();
        assert_eq!(attachment.data, b"%PDF-");
        assert_eq!(message.parts[2].data, b"%PDF-");
    }

    #[test]
    fn test_attachment_without_filename() {
        let raw = b"Content-Type: multipart/mixed; boundary=b\r\n\r\n\
--b\r\n\
Content-Type: application/octet-stream\r\n\
Content-Disposition: attachment\r\n\
\r\n\
data\r\n\
--b--\r\n";
        let (message, errors) = Message::parse(raw).unwrap();
        assert!(message.attachments.is_empty());
        assert_eq!(message.parts.len(), 1);
        assert!(matches!(&errors[..], [Error::MissingFilename(_)]));
    }

    #[test]
    fn test_unquoted_filename() {
        let raw = b"Content-Type: multipart/mixed; boundary=b\r\n\r\n\
--b\r\n\
Content-Type: image/png\r\n\
Content-Disposition: ATTACHMENT; filename=dot.png\r\n\
\r\n\
png\r\n\
--b--\r\n";
        let (message, errors) = Message::parse(raw).unwrap();
        assert!(errors.is_empty());
        assert_eq!(message.attachment("dot.png").unwrap().data, b"png");
    }

    #[test]
    fn test_attachment_base64_with_trailing_bits() {
        let raw = b"Content-Type: multipart/mixed; boundary=b\r\n\r\n\
--b\r\n\
Content-Type: application/octet-stream\r\n\
Content-Disposition: attachment; filename=\"a.txt\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
QR==\r\n\
--b--\r\n";
        let (message, errors) = Message::parse(raw).unwrap();
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(message.attachment("a.txt").unwrap().data, b"A");
    }

    #[test]
    fn test_invalid_base64_text_keeps_raw() {
        let raw = b"Content-Type: multipart/mixed; boundary=b\r\n\r\n\
--b\r\n\
Content-Type: text/plain\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
@@@not base64@@@\r\n\
--b--\r\n";
        let (message, errors) = Message::parse(raw).unwrap();
        assert!(matches!(&errors[..], [Error::Base64Decode(_)]));
        assert_eq!(message.parts[0].data, b"@@@not base64@@@");
        assert_eq!(message.text, "@@@not base64@@@");
    }

    #[test]
    fn test_decomposition_failure_keeps_raw_body() {
        let raw = b"Content-Type: multipart/mixed\r\n\r\n--x\r\nraw";
        let (message, errors) = Message::parse(raw).unwrap();
        assert!(matches!(&errors[..], [Error::MissingBoundary]));
        assert_eq!(message.text, "--x\r\nraw");
        assert!(message.parts.is_empty());
    }

    #[test]
    fn test_parser_config_depth() {
        let parser = Parser::new(ParserConfig::new().with_max_depth(0));
        assert_eq!(parser.config().max_depth, 0);

        let (message, errors) = parser.parse(MIXED).unwrap();
        assert!(matches!(&errors[..], [Error::RecursionLimit { limit: 0 }]));
        assert!(message.parts.is_empty());
        assert_eq!(message.from.len(), 1);
    }

    #[test]
    fn test_malformed_message_is_fatal() {
        assert!(matches!(
            Message::parse(b"no header here"),
            Err(Error::MalformedMessage(_))
        ));
    }
}
