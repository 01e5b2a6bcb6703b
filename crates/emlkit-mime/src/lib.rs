//! # emlkit-mime
//!
//! Best-effort parser for raw RFC 5322 / MIME email messages.
//!
//! ## Features
//!
//! - **Headers**: unfolding, case-insensitive lookup, RFC 2047 encoded words
//! - **Addresses**: mailbox and group lists, including unquoted display names
//!   with commas in them
//! - **Multipart**: nested bodies flattened into leaf parts, with a bounded
//!   nesting depth
//! - **Decoding**: Base64, Quoted-Printable and any charset `encoding_rs`
//!   knows
//! - **Best effort**: a damaged header or part is reported next to the
//!   message instead of failing the whole parse
//!
//! ## Quick Start
//!
//! ```
//! use emlkit_mime::Message;
//!
//! let raw = b"From: Alice <alice@example.com>\r\n\
//!             To: bob@example.com\r\n\
//!             Subject: =?UTF-8?Q?Caf=C3=A9?=\r\n\
//!             Content-Type: text/plain; charset=utf-8\r\n\
//!             \r\n\
//!             Hello, World!";
//!
//! let (message, errors) = Message::parse(raw)?;
//! assert!(errors.is_empty());
//! assert_eq!(message.subject, "Café");
//! assert_eq!(message.from[0].to_string(), "Alice <alice@example.com>");
//! assert_eq!(message.text, "Hello, World!");
//! # Ok::<(), emlkit_mime::Error>(())
//! ```
//!
//! ### Address lists
//!
//! ```
//! use emlkit_mime::parse_address_list;
//!
//! let list = parse_address_list(b"Doe, John <john@example.com>, jane@example.com")?;
//! assert_eq!(list.len(), 2);
//! assert_eq!(list[0].to_string(), "Doe, John <john@example.com>");
//! # Ok::<(), emlkit_mime::Error>(())
//! ```
//!
//! ### Limiting multipart nesting
//!
//! ```
//! use emlkit_mime::{Parser, ParserConfig};
//!
//! let parser = Parser::new(ParserConfig::new().with_max_depth(8));
//! let (message, _errors) = parser.parse(b"Subject: hi\r\n\r\nbody")?;
//! assert_eq!(message.text, "body");
//! # Ok::<(), emlkit_mime::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod content_type;
mod error;
mod header;
mod message;

pub mod address;
pub mod date;
pub mod encoding;
pub mod lexer;
pub mod multipart;
pub mod raw;
pub mod transfer;

pub use address::{Address, Group, Mailbox, parse_address, parse_address_list};
pub use content_type::ContentType;
pub use date::parse_date;
pub use error::{Error, Result};
pub use header::Headers;
pub use message::{Attachment, Message, Parser, ParserConfig, Part};
pub use multipart::{DEFAULT_MAX_DEPTH, decompose, decompose_with_limit};
pub use transfer::{TransferEncoding, decode_transfer};
