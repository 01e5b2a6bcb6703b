//! Header collections.

use std::collections::HashMap;
use std::fmt;

/// Collection of email headers.
///
/// Names are matched case-insensitively; the spelling of the first
/// occurrence is kept, and values stay in the order they were added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, Vec<String>)>,
    /// Lowercased name -> position in `entries`.
    index: HashMap<String, usize>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header value.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(idx) => self.entries[idx].1.push(value),
            None => {
                self.index.insert(name.to_ascii_lowercase(), self.entries.len());
                self.entries.push((name, vec![value]));
            }
        }
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name)
            .and_then(|idx| self.entries[idx].1.first().map(String::as_str))
    }

    /// Gets all values for a header.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.position(name)
            .map(|idx| self.entries[idx].1.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Returns true if at least one value exists for the header.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Number of distinct header names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no headers are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns an iterator over all `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |v| (name.as_str(), v.as_str())))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.index.get(&name.to_ascii_lowercase()).copied()
    }

    /// Parses headers from a raw header block.
    ///
    /// Headers are in the format:
    /// ```text
    /// Header-Name: value
    ///   continuation
    /// ```
    ///
    /// Parsing stops at the first empty line. Lines that are neither a
    /// header nor a continuation are skipped.
    #[must_use]
    pub fn parse(block: &[u8]) -> Self {
        let text = String::from_utf8_lossy(block);
        let mut headers = Self::new();
        let mut current: Option<(String, String)> = None;

        for line in text.lines() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                break;
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                if let Some((_, value)) = current.as_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }

            if let Some((name, value)) = current.take() {
                headers.add(name, value.trim());
            }

            match line.split_once(':') {
                Some((name, value)) => {
                    current = Some((name.trim().to_string(), value.trim().to_string()));
                }
                None => tracing::debug!(line, "skipping malformed part header line"),
            }
        }

        if let Some((name, value)) = current {
            headers.add(name, value.trim());
        }

        headers
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.iter() {
            writeln!(f, "{name}: {value}")?;
        }
        Ok(())
    }
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
    fn test_headers_new() {
        let headers = Headers::new();
        assert!(headers.is_empty());
        assert_eq!(headers.len(), 0);
    }

    #[test]
    fn test_headers_add_get() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/plain");
        assert_eq!(headers.get("Content-Type"), Some("text/plain"));
        assert_eq!(headers.get("content-type"), Some("text/plain")); // Case insensitive
        assert!(headers.contains("CONTENT-TYPE"));
    }

    #[test]
    fn test_headers_keep_order_and_spelling() {
        let mut headers = Headers::new();
        headers.add("Received", "first");
        headers.add("X-Mailer", "test");
        headers.add("received", "second");

        assert_eq!(headers.get_all("RECEIVED"), vec!["first", "second"]);
        let names: Vec<_> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Received", "Received", "X-Mailer"]);
    }

    #[test]
    fn test_headers_many_distinct_names() {
        let mut headers = Headers::new();
        for i in 0..50_000 {
            headers.add(format!("X-Header-{i}"), i.to_string());
        }
        headers.add("x-header-49999", "again");

        assert_eq!(headers.len(), 50_000);
        assert_eq!(headers.get("X-HEADER-0"), Some("0"));
        assert_eq!(headers.get_all("X-Header-49999"), vec!["49999", "again"]);
        assert_eq!(headers.iter().next(), Some(("X-Header-0", "0")));
    }

    #[test]
    fn test_headers_parse() {
        let text = concat!(
            "Content-Type: text/plain;\r\n",
            " charset=utf-8\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "Ignored: after blank line\r\n"
        );

        let headers = Headers::parse(text.as_bytes());
        assert_eq!(
            headers.get("Content-Type"),
            Some("text/plain; charset=utf-8")
        );
        assert_eq!(headers.get("content-transfer-encoding"), Some("base64"));
        assert!(!headers.contains("Ignored"));
    }

    #[test]
    fn test_headers_parse_skips_garbage_lines() {
        let headers = Headers::parse(b"garbage\nContent-Type: text/html\n");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("content-type"), Some("text/html"));
    }

    #[test]
    fn test_headers_display() {
        let mut headers = Headers::new();
        headers.add("From", "sender@example.com");
        headers.add("To", "recipient@example.com");

        let s = headers.to_string();
        assert_eq!(s, "From: sender@example.com\nTo: recipient@example.com\n");
    }
}
