//! Ledger parser with line-oriented error recovery.
//!
//! This crate turns ledger source text into the typed directives of
//! [`tallyline_core`], plus options, includes, plugins and diagnostics. A
//! parse never fails on malformed content: each problem is reported and only
//! the smallest affected unit (a directive, a posting, or a cost or price
//! clause) is dropped.
//!
//! # Pipeline
//!
//! - [`lexer`]: Logos tokenizer with indentation and error tokens
//! - [`grammar`]: groups lines into blocks and parses each block
//! - [`amount`]: Chumsky parsers for expressions, amounts and cost components
//! - [`synth`]: validates dates, accounts, currencies and bookings
//! - [`file`]: pushed tags and metadata, options, diagnostics ordering
//!
//! # Example
//!
//! ```
//! use tallyline_parser::parse;
//!
//! let source = r#"
//! 2024-01-15 * "Coffee Shop" "Morning coffee"
//!   Expenses:Food:Coffee  5.00 USD
//!   Assets:Cash
//! "#;
//!
//! let file = parse(source);
//! assert!(file.diagnostics.is_empty());
//! assert_eq!(file.directives.len(), 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod amount;
pub mod config;
mod error;
pub mod file;
pub mod grammar;
pub mod lexer;
mod line_index;
pub mod synth;
pub mod syntax;

pub use config::{Grammar, ParserConfig, DEFAULT_ACCOUNT_ROOTS};
pub use error::{ErrorClass, FatalError, ParseError, ParseErrorKind, Severity};
pub use file::{parse, parse_fragment, parse_with, OptionEntry, ParsedFile, PluginEntry};
pub use lexer::{tokenize, SpannedToken, Token};
pub use line_index::{LineIndex, Location};
pub use tallyline_core::{Span, Spanned};
