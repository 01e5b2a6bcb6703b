//! End-to-end tests for message parsing.
//!
//! Each test feeds a complete raw message through the public API and checks
//! the assembled result together with the non-fatal error list.

#![allow(clippy::unwrap_used, clippy::needless_collect)]

use emlkit_mime::{
    Address, Error, Headers, Message, Parser, ParserConfig, decompose, parse_address_list,
};
use proptest::prelude::*;

fn rendered(list: &[Address]) -> Vec<String> {
    list.iter().map(ToString::to_string).collect()
}

/// Builds `levels` multipart containers around a single text leaf.
fn nested_message(levels: usize) -> Vec<u8> {
    let mut entity = "Content-Type: text/plain\r\n\r\nbottom".to_string();
    for level in (0..levels).rev() {
        entity = format!(
            "Content-Type: multipart/mixed; boundary=\"level{level}\"\r\n\r\n\
             --level{level}\r\n{entity}\r\n--level{level}--\r\n"
        );
    }
    format!("Subject: deep\r\n{entity}").into_bytes()
}

#[test]
fn quoted_display_name_with_comma() {
    let list = parse_address_list(b"\"Doe, John\" <john@x.com>, jane@y.com").unwrap();
    assert_eq!(rendered(&list), vec!["Doe, John <john@x.com>", "jane@y.com"]);
}

#[test]
fn unquoted_display_name_with_comma() {
    let list = parse_address_list(b"Doe, John <john@x.com>, jane@y.com").unwrap();
    assert_eq!(rendered(&list), vec!["Doe, John <john@x.com>", "jane@y.com"]);
}

#[test]
fn group_inside_list() {
    let list =
        parse_address_list(b"boss@x.com, Team: a@x.com, b@x.com;, =?UTF-8?Q?Ren=C3=A9?= <r@y.com>")
            .unwrap();
    assert_eq!(
        rendered(&list),
        vec![
            "boss@x.com",
            "Team: a@x.com, b@x.com;",
            "René <r@y.com>",
        ]
    );
}

#[test]
fn single_text_part() {
    let raw = b"From: a@example.com\r\n\
Content-Type: text/plain; charset=UTF-8\r\n\
\r\n\
Gr\xC3\xBC\xC3\x9Fe\r\nzweite Zeile\r\n";
    let (message, errors) = Message::parse(raw).unwrap();

    assert!(errors.is_empty());
    assert_eq!(message.parts.len(), 1);
    assert_eq!(message.parts[0].data, message.body);
    assert_eq!(message.text, "Grüße\r\nzweite Zeile\r\n");
    assert!(message.html.is_empty());
}

#[test]
fn nested_alternative_with_attachment() {
    let raw = b"From: \"Doe, John\" <john@x.com>\r\n\
To: jane@y.com, Team: a@x.com, b@x.com;\r\n\
Subject: =?ISO-8859-1?Q?Rapport_annuel_=E9t=E9?=\r\n\
Date: Tue, 1 Jul 2003 10:52:37 +0200\r\n\
Message-ID: <1234@local.machine.example>\r\n\
In-Reply-To: <a@x> <b@y>\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"mixed\"\r\n\
\r\n\
This is a multi-part message in MIME format.\r\n\
--mixed\r\n\
Content-Type: multipart/alternative; boundary=\"alt\"\r\n\
\r\n\
--alt\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
Voil=C3=A0 le rapport.\r\n\
--alt\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>Voil\xC3\xA0 le rapport.</p>\r\n\
--alt--\r\n\
\r\n\
--mixed\r\n\
Content-Type: application/octet-stream\r\n\
Content-Disposition: attachment; filename=\"report.bin\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
AAEC\r\n\
/w==\r\n\
--mixed--\r\n\
epilogue\r\n";

    let (message, errors) = Message::parse(raw).unwrap();
    assert!(errors.is_empty(), "{errors:?}");

    assert_eq!(rendered(&message.from), vec!["Doe, John <john@x.com>"]);
    assert_eq!(
        message.sender.as_ref().map(ToString::to_string).as_deref(),
        Some("Doe, John <john@x.com>")
    );
    assert_eq!(rendered(&message.to), vec!["jane@y.com", "Team: a@x.com, b@x.com;"]);
    assert_eq!(message.subject, "Rapport annuel été");
    assert_eq!(message.date.to_rfc3339(), "2003-07-01T08:52:37+00:00");
    assert_eq!(message.message_id, "1234@local.machine.example");
    assert_eq!(message.in_reply_to, vec!["a@x", "b@y"]);

    assert!(message.is_multipart());
    let types: Vec<_> = message.parts.iter().map(|p| p.content_type.as_str()).collect();
    assert_eq!(
        types,
        vec!["text/plain", "text/html", "application/octet-stream"]
    );
    assert_eq!(message.text, "Voilà le rapport.");
    assert_eq!(message.html, "<p>Voilà le rapport.</p>");

    assert_eq!(message.attachments.len(), 1);
    assert_eq!(message.attachments[0].filename, "report.bin");
    assert_eq!(message.attachments[0].data, vec![0x00, 0x01, 0x02, 0xFF]);
    assert_eq!(
        message.parts[2].header("content-disposition"),
        Some("attachment; filename=\"report.bin\"")
    );
}

#[test]
fn invalid_base64_is_not_fatal() {
    let raw = b"Subject: broken\r\n\
Content-Type: multipart/mixed; boundary=b\r\n\
\r\n\
--b\r\n\
Content-Type: application/octet-stream\r\n\
Content-Disposition: attachment; filename=\"x.bin\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
!!not*base64!!\r\n\
--b--\r\n";

    let (message, errors) = Message::parse(raw).unwrap();
    assert_eq!(message.subject, "broken");
    assert!(matches!(&errors[..], [Error::Base64Decode(_)]));
    assert_eq!(message.attachments[0].data, b"!!not*base64!!");
    assert_eq!(message.parts[0].data, b"!!not*base64!!");
}

#[test]
fn message_level_transfer_encoding_applies_to_parts() {
    let raw = b"Content-Type: text/plain; charset=utf-8\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
aGVsbG8gd29ybGQ=\r\n";
    let (message, errors) = Message::parse(raw).unwrap();
    assert!(errors.is_empty());
    assert_eq!(message.text, "hello world");
}

#[test]
fn header_errors_are_collected() {
    let raw = b"From: <unterminated@example.com\r\n\
Cc: \"open quote <c@example.com>\r\n\
To: fine@example.com\r\n\
\r\n\
body";
    let (message, errors) = Message::parse(raw).unwrap();

    let names: Vec<_> = errors
        .iter()
        .map(|e| match e {
            Error::Header { name, .. } => name.as_str(),
            _ => "?",
        })
        .collect();
    assert_eq!(names, vec!["From", "Cc"]);
    assert_eq!(rendered(&message.to), vec!["fine@example.com"]);
    assert!(message.sender.is_none());
    assert_eq!(message.text, "body");
}

#[test]
fn malformed_message_is_fatal() {
    assert!(matches!(
        Message::parse(b"just some text without headers"),
        Err(Error::MalformedMessage(_))
    ));
    assert!(matches!(
        Message::parse(b"not a header line\r\n\r\nbody"),
        Err(Error::MalformedMessage(_))
    ));
}

#[test]
fn recursion_limit_fails_fast() {
    let raw = nested_message(200);
    let (message, errors) = Message::parse(&raw).unwrap();
    assert!(matches!(&errors[..], [Error::RecursionLimit { limit: 64 }]));
    assert!(message.parts.is_empty());

    let parser = Parser::new(ParserConfig::new().with_max_depth(3));
    let (_, errors) = parser.parse(&nested_message(4)).unwrap();
    assert!(matches!(&errors[..], [Error::RecursionLimit { limit: 3 }]));

    let (message, errors) = parser.parse(&nested_message(3)).unwrap();
    assert!(errors.is_empty());
    assert_eq!(message.text, "bottom");
}

#[test]
fn decompose_skips_segments_without_content_type() {
    let body = b"--b\r\n\r\nno headers at all\r\n--b\r\nX-Note: 1\r\n\r\nstill none\r\n\
--b\r\nContent-Type: text/plain\r\n\r\nkept\r\n--b--";
    let parts = decompose("multipart/mixed; boundary=b", body, &Headers::new()).unwrap();
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].data, b"kept");
}

fn entry() -> impl Strategy<Value = String> {
    (
        proptest::option::of("[A-Z][a-z]{0,7}"),
        "[a-z][a-z0-9.]{0,8}[a-z0-9]",
        "[a-z]{1,10}\\.(com|org|net)",
    )
        .prop_map(|(name, local, domain)| match name {
            Some(name) => format!("{name} <{local}@{domain}>"),
            None => format!("{local}@{domain}"),
        })
}

proptest! {
    #[test]
    fn one_address_per_comma_free_entry(entries in prop::collection::vec(entry(), 1..8)) {
        let header = entries.join(", ");
        let list = parse_address_list(header.as_bytes()).unwrap();
        prop_assert_eq!(rendered(&list), entries);
    }
}
