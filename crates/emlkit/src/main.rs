//! `emlkit` - inspect a raw email message from the command line.
//!
//! Reads one `.eml` file (or stdin), parses it and prints a summary of the
//! headers, body parts and attachments, followed by anything the parser
//! had to work around.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::fmt::Write as _;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser as _;
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use emlkit_mime::{Address, Message, Parser, ParserConfig};

#[derive(clap::Parser)]
#[command(name = "emlkit", version, about)]
struct Cli {
    /// Message file, or `-` for stdin
    #[arg(value_name = "FILE", default_value = "-")]
    file: PathBuf,

    /// JSON file with parser settings
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Maximum multipart nesting depth (overrides --config)
    #[arg(long, value_name = "N")]
    max_depth: Option<usize>,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,

    /// Include every raw header in the summary
    #[arg(long)]
    headers: bool,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "emlkit=info,emlkit_mime=info",
        1 => "emlkit=debug,emlkit_mime=debug",
        _ => "emlkit=trace,emlkit_mime=trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(max_depth) = cli.max_depth {
        config = config.with_max_depth(max_depth);
    }
    debug!(?config, "parser configuration");

    let raw = read_input(&cli.file)?;
    let (message, errors) = Parser::new(config)
        .parse(&raw)
        .with_context(|| format!("failed to parse {}", cli.file.display()))?;
    info!(
        parts = message.parts.len(),
        attachments = message.attachments.len(),
        errors = errors.len(),
        "parsed {}",
        cli.file.display()
    );

    let summary = Summary::new(&message, &errors, cli.headers);
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", summary.render());
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ParserConfig> {
    let Some(path) = path else {
        return Ok(ParserConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    if path.as_os_str() == "-" {
        let mut buf = Vec::new();
        io::stdin()
            .read_to_end(&mut buf)
            .context("failed to read message from stdin")?;
        return Ok(buf);
    }
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

#[derive(Serialize)]
struct PartSummary<'a> {
    content_type: &'a str,
    charset: &'a str,
    size: usize,
}

#[derive(Serialize)]
struct AttachmentSummary<'a> {
    filename: &'a str,
    size: usize,
}

#[derive(Serialize)]
struct Summary<'a> {
    message_id: &'a str,
    date: DateTime<Utc>,
    subject: &'a str,
    sender: Option<String>,
    from: Vec<String>,
    reply_to: Vec<String>,
    to: Vec<String>,
    cc: Vec<String>,
    bcc: Vec<String>,
    in_reply_to: &'a [String],
    references: &'a [String],
    keywords: &'a [String],
    comments: &'a [String],
    content_type: &'a str,
    parts: Vec<PartSummary<'a>>,
    attachments: Vec<AttachmentSummary<'a>>,
    text: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    headers: Option<Vec<(&'a str, &'a str)>>,
    errors: Vec<String>,
}

fn addresses(list: &[Address]) -> Vec<String> {
    list.iter().map(ToString::to_string).collect()
}

impl<'a> Summary<'a> {
    fn new(message: &'a Message, errors: &[emlkit_mime::Error], with_headers: bool) -> Self {
        Self {
            message_id: &message.message_id,
            date: message.date,
            subject: &message.subject,
            sender: message.sender.as_ref().map(ToString::to_string),
            from: addresses(&message.from),
            reply_to: addresses(&message.reply_to),
            to: addresses(&message.to),
            cc: addresses(&message.cc),
            bcc: addresses(&message.bcc),
            in_reply_to: &message.in_reply_to,
            references: &message.references,
            keywords: &message.keywords,
            comments: &message.comments,
            content_type: &message.content_type,
            parts: message
                .parts
                .iter()
                .map(|p| PartSummary {
                    content_type: &p.content_type,
                    charset: &p.charset,
                    size: p.data.len(),
                })
                .collect(),
            attachments: message
                .attachments
                .iter()
                .map(|a| AttachmentSummary {
                    filename: &a.filename,
                    size: a.data.len(),
                })
                .collect(),
            text: &message.text,
            html: &message.html,
            headers: with_headers.then(|| message.headers.iter().collect()),
            errors: errors.iter().map(ToString::to_string).collect(),
        }
    }

    fn render(&self) -> String {
        let mut out = String::new();
        let mut field = |name: &str, value: &str| {
            if !value.is_empty() {
                let _ = writeln!(out, "{name:<12}{value}");
            }
        };

        field("Message-ID:", self.message_id);
        field("Date:", &self.date.to_rfc2822());
        field("Subject:", self.subject);
        field("Sender:", self.sender.as_deref().unwrap_or_default());
        field("From:", &self.from.join(", "));
        field("Reply-To:", &self.reply_to.join(", "));
        field("To:", &self.to.join(", "));
        field("Cc:", &self.cc.join(", "));
        field("Bcc:", &self.bcc.join(", "));
        field("In-Reply-To:", &self.in_reply_to.join(" "));
        field("References:", &self.references.join(" "));
        field("Keywords:", &self.keywords.join(", "));
        field("Comments:", &self.comments.join(" / "));
        field("Type:", self.content_type);

        if let Some(headers) = &self.headers {
            let _ = writeln!(out, "\nHeaders:");
            for (name, value) in headers {
                let _ = writeln!(out, "  {name}: {value}");
            }
        }

        if !self.parts.is_empty() {
            let _ = writeln!(out, "\nParts:");
            for (i, part) in self.parts.iter().enumerate() {
                let charset = if part.charset.is_empty() { "-" } else { part.charset };
                let _ = writeln!(
                    out,
                    "  {}. {} ({charset}, {} bytes)",
                    i + 1,
                    part.content_type,
                    part.size
                );
            }
        }

        if !self.attachments.is_empty() {
            let _ = writeln!(out, "\nAttachments:");
            for attachment in &self.attachments {
                let _ = writeln!(out, "  {} ({} bytes)", attachment.filename, attachment.size);
            }
        }

        if !self.text.is_empty() {
            let _ = writeln!(out, "\n{}", self.text.trim_end());
        } else if !self.html.is_empty() {
            let _ = writeln!(out, "\n{}", self.html.trim_end());
        }

        if !self.errors.is_empty() {
            let _ = writeln!(out, "\nWarnings:");
            for error in &self.errors {
                let _ = writeln!(out, "  - {error}");
            }
        }

        out
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const RAW: &[u8] = b"From: Alice <alice@example.com>\r\n\
To: <broken@example.com\r\n\
Subject: Hello\r\n\
Content-Type: text/plain\r\n\
\r\n\
Hi Bob";

    #[test]
    fn test_summary_text() {
        let (message, errors) = Message::parse(RAW).unwrap();
        let rendered = Summary::new(&message, &errors, false).render();

        assert!(rendered.contains("From:       Alice <alice@example.com>"));
        assert!(rendered.contains("Subject:    Hello"));
        assert!(rendered.contains("1. text/plain (-, 6 bytes)"));
        assert!(rendered.contains("\nHi Bob\n"));
        assert!(rendered.contains("Warnings:\n  - Header To:"));
        assert!(!rendered.contains("Headers:"));
    }

    #[test]
    fn test_summary_json() {
        let (message, errors) = Message::parse(RAW).unwrap();
        let json = serde_json::to_value(Summary::new(&message, &errors, true)).unwrap();

        assert_eq!(json["from"][0], "Alice <alice@example.com>");
        assert_eq!(json["sender"], "Alice <alice@example.com>");
        assert_eq!(json["parts"][0]["size"], 6);
        assert_eq!(json["headers"][2][0], "Subject");
        assert_eq!(json["errors"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_config_from_json() {
        let config: ParserConfig = serde_json::from_str(r#"{"max_depth": 8}"#).unwrap();
        assert_eq!(config.max_depth, 8);

        let config: ParserConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ParserConfig::default());
    }
}
