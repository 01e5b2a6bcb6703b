//! Header token types.

use std::borrow::Cow;

/// Classification of a header token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Run of characters that are not whitespace, specials or delimiters.
    Atom,
    /// `"..."`, delimiters included.
    QuotedString,
    /// `(...)`, delimiters included.
    Comment,
    /// One of `,` `;` `@` `<` `>` `:`.
    Special,
    /// `[...]`, delimiters included.
    DomainLiteral,
}

/// A classified slice of a header value.
///
/// `raw` keeps the original bytes, delimiters and escapes included, so
/// tokens can be re-emitted verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    /// Token class.
    pub kind: TokenKind,
    /// Original bytes.
    pub raw: &'a [u8],
}

impl<'a> Token<'a> {
    /// Creates a token.
    #[must_use]
    pub const fn new(kind: TokenKind, raw: &'a [u8]) -> Self {
        Self { kind, raw }
    }

    /// Returns true if this is the given special character.
    #[must_use]
    pub fn is_special(&self, c: u8) -> bool {
        self.kind == TokenKind::Special && self.raw == [c]
    }

    /// Returns true if the raw bytes contain `c` anywhere.
    #[must_use]
    pub fn contains(&self, c: u8) -> bool {
        self.raw.contains(&c)
    }

    /// Token text with delimiters removed and quoted-pairs resolved.
    ///
    /// Atoms, specials and domain literals are returned as-is.
    #[must_use]
    pub fn text(&self) -> Cow<'a, str> {
        match self.kind {
            TokenKind::QuotedString | TokenKind::Comment => {
                let inner = self
                    .raw
                    .get(1..self.raw.len().saturating_sub(1))
                    .unwrap_or_default();
                Cow::Owned(String::from_utf8_lossy(&unescape(inner)).into_owned())
            }
            _ => String::from_utf8_lossy(self.raw),
        }
    }
}

fn unescape(bytes: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter();
    while let Some(&b) = iter.next() {
        if b == b'\\' {
            if let Some(&escaped) = iter.next() {
                result.push(escaped);
            }
        } else {
            result.push(b);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_unquotes_and_unescapes() {
        let token = Token::new(TokenKind::QuotedString, br#""Doe, \"J\"""#);
        assert_eq!(token.text(), "Doe, \"J\"");
        let token = Token::new(TokenKind::Comment, b"(John (Jr.))");
        assert_eq!(token.text(), "John (Jr.)");
        assert_eq!(Token::new(TokenKind::Atom, b"john").text(), "john");
    }

    #[test]
    fn test_text_of_truncated_delimited_tokens() {
        assert_eq!(Token::new(TokenKind::QuotedString, b"\"").text(), "");
        assert_eq!(Token::new(TokenKind::Comment, b"").text(), "");
        assert_eq!(Token::new(TokenKind::QuotedString, b"\"\"").text(), "");
    }
}
