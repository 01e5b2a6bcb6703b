//! Address-list parsing for `From`, `To`, `Cc` and friends.
//!
//! The token stream is split in two passes. The first pass cuts it at every
//! top-level comma (commas inside angle brackets or inside a group are not
//! top-level). The second pass re-joins neighbouring runs until a run
//! containing an `@` is seen, so that an unquoted display name with a comma
//! in it (`Doe, John <john@example.com>`) is not torn apart.
//!
//! Known limitation: a domain literal containing a comma is still cut at
//! that comma, which usually makes the whole list fail to parse.

use std::borrow::Cow;
use std::fmt;

use crate::encoding::decode_words;
use crate::error::{Error, Result};
use crate::lexer::{Token, TokenKind, tokenize};

/// A single mailbox: `Display Name <local@domain>` or `local@domain`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mailbox {
    /// Decoded display name.
    pub name: Option<String>,
    /// Part before the `@`, quotes preserved.
    pub local_part: String,
    /// Part after the `@`.
    pub domain: String,
}

impl Mailbox {
    /// Returns the bare `local@domain` address.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}@{}", self.local_part, self.domain)
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} <{}@{}>", self.local_part, self.domain),
            None => write!(f, "{}@{}", self.local_part, self.domain),
        }
    }
}

/// A named group of mailboxes: `Team: a@example.com, b@example.com;`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Group {
    /// Group display name.
    pub name: String,
    /// Members in order. Groups never nest.
    pub members: Vec<Mailbox>,
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.name)?;
        for (i, member) in self.members.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{sep}{member}")?;
        }
        write!(f, ";")
    }
}

/// An entry of an address list.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Address {
    /// A single mailbox.
    Mailbox(Mailbox),
    /// A group of mailboxes.
    Group(Group),
}

impl Address {
    /// Returns the mailbox if this is not a group.
    #[must_use]
    pub const fn as_mailbox(&self) -> Option<&Mailbox> {
        match self {
            Self::Mailbox(mailbox) => Some(mailbox),
            Self::Group(_) => None,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mailbox(mailbox) => fmt::Display::fmt(mailbox, f),
            Self::Group(group) => fmt::Display::fmt(group, f),
        }
    }
}

/// Parses a raw address-list header value.
///
/// Encoded words are expanded before tokenizing; if that fails the raw
/// value is tokenized instead.
///
/// # Errors
///
/// Returns [`Error::Lex`] if the value cannot be tokenized and
/// [`Error::InvalidAddress`] if any entry has malformed mailbox syntax.
pub fn parse_address_list(raw: &[u8]) -> Result<Vec<Address>> {
    let expanded: Cow<'_, [u8]> = match decode_words(raw) {
        Ok(decoded) => Cow::Owned(decoded.into_bytes()),
        Err(e) => {
            tracing::debug!(error = %e, "keeping encoded words in address list");
            Cow::Borrowed(raw)
        }
    };

    let tokens = tokenize(&expanded)?;
    join_runs(split_top_level(&tokens))
        .iter()
        .map(|run| parse_entry(run))
        .collect()
}

/// Parses a header holding a single address (e.g. `Sender`).
///
/// Extra entries are ignored.
///
/// # Errors
///
/// Fails like [`parse_address_list`], or if the value holds no address.
pub fn parse_address(raw: &[u8]) -> Result<Address> {
    parse_address_list(raw)?
        .into_iter()
        .next()
        .ok_or_else(|| Error::InvalidAddress("no address found".to_string()))
}

/// First pass: cut at top-level commas.
fn split_top_level<'a>(tokens: &[Token<'a>]) -> Vec<Vec<Token<'a>>> {
    let mut runs = Vec::new();
    let mut current = Vec::new();
    let mut angle_depth = 0usize;
    let mut in_group = false;

    for &token in tokens {
        match token.kind {
            TokenKind::Special => match token.raw[0] {
                b'<' => angle_depth += 1,
                b'>' => angle_depth = angle_depth.saturating_sub(1),
                b':' if angle_depth == 0 => in_group = true,
                b';' if angle_depth == 0 => in_group = false,
                b',' if angle_depth == 0 && !in_group => {
                    runs.push(std::mem::take(&mut current));
                    continue;
                }
                _ => {}
            },
            // Known limitation, see module docs.
            TokenKind::DomainLiteral if token.contains(b',') => {
                let mut pieces = token.raw.split(|&b| b == b',');
                if let Some(first) = pieces.next() {
                    current.push(Token::new(TokenKind::Atom, first));
                }
                for piece in pieces {
                    runs.push(std::mem::take(&mut current));
                    current.push(Token::new(TokenKind::Atom, piece));
                }
                continue;
            }
            _ => {}
        }
        current.push(token);
    }

    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

/// Second pass: accumulate runs until one contains an `@` (or the list
/// ends), re-inserting the commas the first pass removed.
fn join_runs<'a>(runs: Vec<Vec<Token<'a>>>) -> Vec<Vec<Token<'a>>> {
    const COMMA: Token<'static> = Token::new(TokenKind::Special, b",");

    let last = runs.len().saturating_sub(1);
    let mut closed = Vec::new();
    let mut pending: Vec<Token<'a>> = Vec::new();

    for (i, run) in runs.into_iter().enumerate() {
        if run.is_empty() {
            continue;
        }

        let has_at = run.iter().any(|t| t.contains(b'@'));
        pending.extend(run);
        if has_at || i == last {
            closed.push(std::mem::take(&mut pending));
        } else {
            pending.push(COMMA);
        }
    }

    if pending.last().is_some_and(|t| t.is_special(b',')) {
        pending.pop();
    }
    if !pending.is_empty() {
        closed.push(pending);
    }
    closed
}

fn parse_entry(tokens: &[Token<'_>]) -> Result<Address> {
    match top_level_colon(tokens) {
        Some(colon) => parse_group(tokens, colon).map(Address::Group),
        None => parse_mailbox(tokens).map(Address::Mailbox),
    }
}

/// Position of a `:` outside angle brackets, which marks a group.
fn top_level_colon(tokens: &[Token<'_>]) -> Option<usize> {
    let mut angle_depth = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        if token.is_special(b'<') {
            angle_depth += 1;
        } else if token.is_special(b'>') {
            angle_depth = angle_depth.saturating_sub(1);
        } else if token.is_special(b':') && angle_depth == 0 {
            return Some(i);
        }
    }
    None
}

fn parse_group(tokens: &[Token<'_>], colon: usize) -> Result<Group> {
    let name = phrase(&tokens[..colon]);
    if name.is_empty() {
        return Err(Error::InvalidAddress(format!(
            "group without a name: {}",
            render(tokens)
        )));
    }

    let body = &tokens[colon + 1..];
    let end = body
        .iter()
        .position(|t| t.is_special(b';'))
        .unwrap_or(body.len());
    if body[end..]
        .iter()
        .skip(1)
        .any(|t| t.kind != TokenKind::Comment)
    {
        return Err(Error::InvalidAddress(format!(
            "unexpected text after group: {}",
            render(tokens)
        )));
    }

    let members = join_runs(split_top_level(&body[..end]))
        .iter()
        .map(|run| {
            if top_level_colon(run).is_some() {
                return Err(Error::InvalidAddress(format!(
                    "nested group in {name}: {}",
                    render(run)
                )));
            }
            parse_mailbox(run)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Group { name, members })
}

fn parse_mailbox(tokens: &[Token<'_>]) -> Result<Mailbox> {
    // `john@example.com (John Doe)`: a comment may stand in for the name
    let comment_name = tokens
        .iter()
        .rev()
        .find(|t| t.kind == TokenKind::Comment)
        .map(|t| t.text().trim().to_string())
        .filter(|s| !s.is_empty());

    let tokens: Vec<Token<'_>> = tokens
        .iter()
        .copied()
        .filter(|t| t.kind != TokenKind::Comment)
        .collect();
    if tokens.is_empty() {
        return Err(Error::InvalidAddress("empty address".to_string()));
    }

    let Some(open) = tokens.iter().position(|t| t.is_special(b'<')) else {
        let (local_part, domain) = addr_spec(&tokens)?;
        return Ok(Mailbox {
            name: comment_name,
            local_part,
            domain,
        });
    };

    let close = tokens[open + 1..]
        .iter()
        .position(|t| t.is_special(b'>'))
        .map(|p| open + 1 + p)
        .ok_or_else(|| Error::InvalidAddress(format!("missing '>' in {}", render(&tokens))))?;
    if close + 1 != tokens.len() {
        return Err(Error::InvalidAddress(format!(
            "unexpected text after '>' in {}",
            render(&tokens)
        )));
    }

    let mut spec = &tokens[open + 1..close];
    // Obsolete source route: <@relay1,@relay2:user@example.com>
    if let Some(colon) = spec.iter().rposition(|t| t.is_special(b':')) {
        spec = &spec[colon + 1..];
    }
    let (local_part, domain) = addr_spec(spec)?;

    let name = phrase(&tokens[..open]);
    Ok(Mailbox {
        name: if name.is_empty() { comment_name } else { Some(name) },
        local_part,
        domain,
    })
}

fn addr_spec(tokens: &[Token<'_>]) -> Result<(String, String)> {
    let at = tokens
        .iter()
        .rposition(|t| t.is_special(b'@'))
        .ok_or_else(|| Error::InvalidAddress(format!("missing '@' in {}", render(tokens))))?;

    let local_part = concat(&tokens[..at])?;
    let domain = concat(&tokens[at + 1..])?;
    if local_part.is_empty() || domain.is_empty() {
        return Err(Error::InvalidAddress(format!(
            "empty local part or domain in {}",
            render(tokens)
        )));
    }
    Ok((local_part, domain))
}

fn concat(tokens: &[Token<'_>]) -> Result<String> {
    let mut result = String::new();
    for token in tokens {
        if token.kind == TokenKind::Special {
            return Err(Error::InvalidAddress(format!(
                "unexpected '{}' in address",
                String::from_utf8_lossy(token.raw)
            )));
        }
        result.push_str(&String::from_utf8_lossy(token.raw));
    }
    Ok(result)
}

/// Joins display-name words with single spaces; a comma sticks to the
/// word before it.
fn phrase(tokens: &[Token<'_>]) -> String {
    let mut result = String::new();
    for token in tokens.iter().filter(|t| t.kind != TokenKind::Comment) {
        if !result.is_empty() && !token.is_special(b',') {
            result.push(' ');
        }
        result.push_str(&token.text());
    }
    result.trim().to_string()
}

fn render(tokens: &[Token<'_>]) -> String {
    tokens
        .iter()
        .map(|t| String::from_utf8_lossy(t.raw))
        .collect::<Vec<_>>()
        .join(" ")
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

    fn rendered(raw: &str) -> Vec<String> {
        parse_address_list(raw.as_bytes())
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn test_bare_addresses() {
        assert_eq!(
            rendered("a@example.com, b@example.org,c@example.net"),
            vec!["a@example.com", "b@example.org", "c@example.net"]
        );
    }

    #[test]
    fn test_quoted_display_name_with_comma() {
        let list = parse_address_list(br#""Doe, John" <john@x.com>, jane@y.com"#).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].to_string(), "Doe, John <john@x.com>");
        assert_eq!(list[1].to_string(), "jane@y.com");

        let first = list[0].as_mailbox().unwrap();
        assert_eq!(first.name.as_deref(), Some("Doe, John"));
        assert_eq!(first.local_part, "john");
        assert_eq!(first.domain, "x.com");
    }

    #[test]
    fn test_unquoted_display_name_with_comma() {
        assert_eq!(
            rendered("Doe, John <john@x.com>, Smith, Jane <jane@y.com>"),
            vec!["Doe, John <john@x.com>", "Smith, Jane <jane@y.com>"]
        );
    }

    #[test]
    fn test_encoded_display_name() {
        assert_eq!(
            rendered("=?utf-8?Q?Ren=C3=A9?= <rene@example.com>"),
            vec!["René <rene@example.com>"]
        );
    }

    #[test]
    fn test_comment_as_name() {
        let list = parse_address_list(b"john@example.com (John Doe)").unwrap();
        assert_eq!(
            list[0].as_mailbox().unwrap().name.as_deref(),
            Some("John Doe")
        );
    }

    #[test]
    fn test_group() {
        let list = parse_address_list(b"Team: a@x.com, B <b@y.com>;, c@z.com").unwrap();
        assert_eq!(list.len(), 2);

        let Address::Group(group) = &list[0] else {
            panic!("expected group, got {:?}", list[0]);
        };
        assert_eq!(group.name, "Team");
        assert_eq!(group.members.len(), 2);
        assert_eq!(list[0].to_string(), "Team: a@x.com, B <b@y.com>;");
        assert_eq!(list[1].to_string(), "c@z.com");
    }

    #[test]
    fn test_empty_group() {
        let list = parse_address_list(b"undisclosed-recipients:;").unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].to_string(), "undisclosed-recipients:;");
    }

    #[test]
    fn test_nested_group_rejected() {
        let err = parse_address_list(b"Outer: Inner: a@x.com;;").unwrap_err();
        assert!(matches!(err, Error::InvalidAddress(_)));
    }

    #[test]
    fn test_source_route_dropped() {
        assert_eq!(
            rendered("<@relay.example,@other.example:user@example.com>"),
            vec!["user@example.com"]
        );
    }

    #[test]
    fn test_empty_elements_skipped() {
        assert_eq!(
            rendered("a@x.com,, b@y.com,"),
            vec!["a@x.com", "b@y.com"]
        );
    }

    #[test]
    fn test_quoted_local_part() {
        let list = parse_address_list(br#""john doe"@example.com"#).unwrap();
        assert_eq!(list[0].as_mailbox().unwrap().local_part, r#""john doe""#);
    }

    #[test]
    fn test_domain_literal() {
        assert_eq!(rendered("user@[10.0.0.1]"), vec!["user@[10.0.0.1]"]);
    }

    #[test]
    fn test_domain_literal_with_comma_is_mis_split() {
        assert!(parse_address_list(b"user@[1,2], other@example.com").is_err());
    }

    #[test]
    fn test_missing_at() {
        let err = parse_address_list(b"just a name").unwrap_err();
        assert!(matches!(err, Error::InvalidAddress(_)));
    }

    #[test]
    fn test_unclosed_angle() {
        let err = parse_address_list(b"Name <a@b.com").unwrap_err();
        assert!(matches!(err, Error::InvalidAddress(_)));
    }

    #[test]
    fn test_lex_error_propagates() {
        let err = parse_address_list(br#""unterminated <a@b.com>"#).unwrap_err();
        assert!(matches!(err, Error::Lex { .. }));
    }

    #[test]
    fn test_parse_address() {
        let address = parse_address(b"Boss <boss@example.com>").unwrap();
        assert_eq!(address.to_string(), "Boss <boss@example.com>");

        assert!(parse_address(b"   ").is_err());
    }
}
