//! Header value lexer.
//!
//! Breaks an address-bearing header value into the RFC 5322 lexical units
//! the address parser groups: atoms, quoted strings, comments, domain
//! literals and single-character specials. Whitespace outside quotes and
//! comments only separates tokens.

mod token;

pub use token::{Token, TokenKind};

use crate::{Error, Result};

/// Header lexer state.
pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given input.
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    /// Returns the current position in the input.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Peeks at the current byte without consuming it.
    #[must_use]
    pub fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    /// Advances by one byte and returns it.
    pub fn advance(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    /// Reads the next token, or `None` at end of input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Lex`] for an unterminated quoted string, comment or
    /// domain literal.
    pub fn next_token(&mut self) -> Result<Option<Token<'a>>> {
        while self.peek().is_some_and(is_whitespace) {
            self.advance();
        }

        let Some(byte) = self.peek() else {
            return Ok(None);
        };
        let start = self.pos;

        let kind = match byte {
            b'"' => {
                self.read_quoted_string()?;
                TokenKind::QuotedString
            }
            b'(' => {
                self.read_comment()?;
                TokenKind::Comment
            }
            b'[' => {
                self.read_domain_literal()?;
                TokenKind::DomainLiteral
            }
            _ if is_special(byte) => {
                self.advance();
                TokenKind::Special
            }
            _ => {
                self.read_atom();
                TokenKind::Atom
            }
        };

        Ok(Some(Token::new(kind, &self.input[start..self.pos])))
    }

    /// Reads a quoted string; escaped characters are kept literally.
    fn read_quoted_string(&mut self) -> Result<()> {
        self.advance(); // Skip opening quote

        loop {
            match self.advance() {
                Some(b'"') => return Ok(()),
                Some(b'\\') => {
                    if self.advance().is_none() {
                        return Err(self.error("Unexpected end of input in quoted string"));
                    }
                }
                Some(_) => {}
                None => return Err(self.error("Unterminated quoted string")),
            }
        }
    }

    /// Reads a comment, honouring nested parentheses.
    fn read_comment(&mut self) -> Result<()> {
        self.advance(); // Skip opening parenthesis
        let mut depth = 1usize;

        loop {
            match self.advance() {
                Some(b'(') => depth += 1,
                Some(b')') => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Some(b'\\') => {
                    if self.advance().is_none() {
                        return Err(self.error("Unexpected end of input in comment"));
                    }
                }
                Some(_) => {}
                None => return Err(self.error("Unterminated comment")),
            }
        }
    }

    /// Reads a domain literal up to the closing bracket.
    fn read_domain_literal(&mut self) -> Result<()> {
        self.advance(); // Skip opening bracket

        loop {
            match self.advance() {
                Some(b']') => return Ok(()),
                Some(b'\\') => {
                    self.advance();
                }
                Some(_) => {}
                None => return Err(self.error("Unterminated domain literal")),
            }
        }
    }

    fn read_atom(&mut self) {
        while let Some(b) = self.peek() {
            if is_whitespace(b) || is_special(b) || matches!(b, b'"' | b'(' | b'[') {
                break;
            }
            self.advance();
        }
    }

    /// Creates a lex error at the current position.
    fn error(&self, message: &str) -> Error {
        Error::Lex {
            position: self.pos,
            message: message.to_string(),
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token().transpose()
    }
}

/// Tokenizes a complete header value.
///
/// # Errors
///
/// Returns [`Error::Lex`] for an unterminated quoted string, comment or
/// domain literal.
pub fn tokenize(input: &[u8]) -> Result<Vec<Token<'_>>> {
    Lexer::new(input).collect()
}

/// Returns true if the byte is one of the single-character specials.
#[must_use]
pub const fn is_special(b: u8) -> bool {
    matches!(b, b',' | b';' | b'@' | b'<' | b'>' | b':')
}

const fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    fn kinds(tokens: &[Token<'_>]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind).collect()
    }

    fn raws(tokens: &[Token<'_>]) -> Vec<String> {
        tokens
            .iter()
            .map(|t| String::from_utf8_lossy(t.raw).into_owned())
            .collect()
    }

    #[test]
    fn test_simple_mailbox() {
        let tokens = tokenize(b"John Doe <john.doe@example.com>").unwrap();

        assert_eq!(
            raws(&tokens),
            vec!["John", "Doe", "<", "john.doe", "@", "example.com", ">"]
        );
        assert_eq!(tokens[2].kind, TokenKind::Special);
        assert_eq!(tokens[3].kind, TokenKind::Atom);
    }

    #[test]
    fn test_quoted_string() {
        let tokens = tokenize(br#""Doe, John" <j@x.com>"#).unwrap();

        assert_eq!(tokens[0].kind, TokenKind::QuotedString);
        assert_eq!(tokens[0].raw, br#""Doe, John""#);
        assert_eq!(tokens[0].text(), "Doe, John");
        assert_eq!(tokens.len(), 6);
    }

    #[test]
    fn test_quoted_string_escaped() {
        let tokens = tokenize(br#""say \"hi\"" x"#).unwrap();

        assert_eq!(tokens[0].raw, br#""say \"hi\"""#);
        assert_eq!(tokens[0].text(), r#"say "hi""#);
        assert_eq!(tokens[1].raw, b"x");
    }

    #[test]
    fn test_comment_nesting() {
        let tokens = tokenize(b"a@b (outer (inner) text) c").unwrap();

        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Atom,
                TokenKind::Special,
                TokenKind::Atom,
                TokenKind::Comment,
                TokenKind::Atom
            ]
        );
        assert_eq!(tokens[3].text(), "outer (inner) text");
    }

    #[test]
    fn test_domain_literal() {
        let tokens = tokenize(b"user@[192.168.0.1]").unwrap();

        assert_eq!(tokens[2].kind, TokenKind::DomainLiteral);
        assert_eq!(tokens[2].raw, b"[192.168.0.1]");
    }

    #[test]
    fn test_specials_split_atoms() {
        let tokens = tokenize(b"group:a@b,c@d;").unwrap();

        assert_eq!(tokens.len(), 10);
        assert!(tokens[1].is_special(b':'));
        assert!(tokens[5].is_special(b','));
        assert!(tokens[9].is_special(b';'));
    }

    #[test]
    fn test_whitespace_only() {
        assert!(tokenize(b" \t\r\n ").unwrap().is_empty());
    }

    #[test]
    fn test_unterminated_quote() {
        let err = tokenize(br#""never closed <a@b>"#).unwrap_err();
        assert!(matches!(err, Error::Lex { .. }));
    }

    #[test]
    fn test_unterminated_comment() {
        let err = tokenize(b"a@b (one (two)").unwrap_err();
        assert!(matches!(err, Error::Lex { .. }));
    }

    #[test]
    fn test_is_special() {
        for b in b",;@<>:" {
            assert!(is_special(*b));
        }
        assert!(!is_special(b'.'));
        assert!(!is_special(b'"'));
    }
}
