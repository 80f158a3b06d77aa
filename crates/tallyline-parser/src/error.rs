//! Parse diagnostics.
//!
//! Malformed ledger content never aborts a parse. Every problem becomes a
//! [`ParseError`] in [`ParsedFile::diagnostics`](crate::ParsedFile), carrying
//! both the offending tokens (`span`) and the range that was thrown away
//! because of it (`scope`: a whole block, one posting, or one clause).
//! Only [`FatalError`] escapes [`parse_with`](crate::parse_with).

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::Span;

/// How bad a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Something was dropped from the output.
    Error,
    /// Output is complete but probably not what was meant.
    Warning,
}

/// Which stage produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
    /// Unrecognized characters or unterminated strings.
    Lex,
    /// Well-formed tokens in an order the grammar does not accept.
    Syntax,
    /// Well-formed syntax with invalid content.
    Semantic,
}

impl ErrorClass {
    /// One-letter prefix used in report codes (`L`, `P`, `S`).
    #[must_use]
    pub const fn prefix(self) -> char {
        match self {
            Self::Lex => 'L',
            Self::Syntax => 'P',
            Self::Semantic => 'S',
        }
    }
}

/// A diagnostic with location information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseError {
    /// The kind of error.
    pub kind: ParseErrorKind,
    /// Error or warning.
    pub severity: Severity,
    /// The offending tokens.
    pub span: Span,
    /// The source range invalidated by this error.
    pub scope: Span,
    /// Optional context message.
    pub context: Option<String>,
    /// Optional hint for fixing the error.
    pub hint: Option<String>,
}

impl ParseError {
    /// Create a new error whose scope is its own span.
    #[must_use]
    pub const fn new(kind: ParseErrorKind, span: Span) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            span,
            scope: span,
            context: None,
            hint: None,
        }
    }

    /// Set the invalidated range.
    #[must_use]
    pub const fn with_scope(mut self, scope: Span) -> Self {
        self.scope = scope;
        self
    }

    /// Downgrade to a warning.
    #[must_use]
    pub const fn warning(mut self) -> Self {
        self.severity = Severity::Warning;
        self
    }

    /// Add context to this error.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Add a hint for fixing this error.
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Get the span of this error.
    #[must_use]
    pub const fn span(&self) -> (usize, usize) {
        (self.span.start, self.span.end)
    }

    /// True for `Severity::Error`.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }

    /// The stage that produced this error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        self.kind.class()
    }

    /// Get a stable numeric code for the error kind.
    #[must_use]
    pub const fn kind_code(&self) -> u32 {
        match &self.kind {
            ParseErrorKind::UnexpectedChar(_) => 1,
            ParseErrorKind::UnclosedString => 2,
            ParseErrorKind::UnexpectedToken { .. } => 10,
            ParseErrorKind::MissingField(_) => 11,
            ParseErrorKind::MalformedCost(_) => 12,
            ParseErrorKind::MalformedPrice(_) => 13,
            ParseErrorKind::MalformedPosting(_) => 14,
            ParseErrorKind::UnexpectedIndentation => 15,
            ParseErrorKind::DirectiveNotAllowed(_) => 16,
            ParseErrorKind::InvalidAccount(_) => 30,
            ParseErrorKind::InvalidCurrency(_) => 31,
            ParseErrorKind::DuplicateCostField(_) => 32,
            ParseErrorKind::UnknownBooking(_) => 33,
            ParseErrorKind::InvalidDateValue(_) => 34,
            ParseErrorKind::InvalidNumber(_) => 35,
            ParseErrorKind::UnmatchedPoptag(_) => 36,
            ParseErrorKind::UnmatchedPopmeta(_) => 37,
            ParseErrorKind::UnclosedPushtag(_) => 38,
        }
    }

    /// Report code such as `P0010` or `S0032`.
    #[must_use]
    pub fn code(&self) -> String {
        format!("{}{:04}", self.class().prefix(), self.kind_code())
    }

    /// Get the error message.
    #[must_use]
    pub fn message(&self) -> String {
        format!("{}", self.kind)
    }

    /// Get a short label for the error.
    #[must_use]
    pub const fn label(&self) -> &str {
        match &self.kind {
            ParseErrorKind::UnexpectedChar(_) => "unexpected character",
            ParseErrorKind::UnclosedString => "unclosed string",
            ParseErrorKind::UnexpectedToken { .. } => "unexpected token",
            ParseErrorKind::MissingField(_) => "missing field",
            ParseErrorKind::MalformedCost(_) => "cost dropped",
            ParseErrorKind::MalformedPrice(_) => "price dropped",
            ParseErrorKind::MalformedPosting(_) => "posting dropped",
            ParseErrorKind::UnexpectedIndentation => "no directive to continue",
            ParseErrorKind::DirectiveNotAllowed(_) => "not allowed here",
            ParseErrorKind::InvalidAccount(_) => "invalid account",
            ParseErrorKind::InvalidCurrency(_) => "invalid currency",
            ParseErrorKind::DuplicateCostField(_) => "duplicate cost field",
            ParseErrorKind::UnknownBooking(_) => "unknown booking method",
            ParseErrorKind::InvalidDateValue(_) => "invalid date value",
            ParseErrorKind::InvalidNumber(_) => "invalid number",
            ParseErrorKind::UnmatchedPoptag(_) => "tag was not pushed",
            ParseErrorKind::UnmatchedPopmeta(_) => "key was not pushed",
            ParseErrorKind::UnclosedPushtag(_) => "tag never popped",
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(ctx) = &self.context {
            write!(f, " ({ctx})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// Context naming the directive a dropped unit belonged to.
pub(crate) fn directive_context(keyword: &str) -> String {
    match keyword {
        "txn" => "in transaction".to_string(),
        other => format!("in {other} directive"),
    }
}

/// Kinds of parse errors.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ParseErrorKind {
    /// A character no token starts with.
    #[error("unexpected character '{0}'")]
    UnexpectedChar(String),
    /// A string literal with no closing quote.
    #[error("unclosed string literal")]
    UnclosedString,
    /// A token the grammar does not accept at this position.
    #[error("unexpected {found}, expected {expected}")]
    UnexpectedToken {
        /// What was found.
        found: String,
        /// What the grammar wanted.
        expected: String,
    },
    /// A directive ended before a required field.
    #[error("missing required field: {0}")]
    MissingField(String),
    /// A cost block that does not parse.
    #[error("malformed cost specification: {0}")]
    MalformedCost(String),
    /// A price annotation that does not parse.
    #[error("malformed price annotation: {0}")]
    MalformedPrice(String),
    /// A posting line that does not parse.
    #[error("malformed posting: {0}")]
    MalformedPosting(String),
    /// An indented line with no directive above it.
    #[error("unexpected indentation")]
    UnexpectedIndentation,
    /// A directive the active grammar does not accept.
    #[error("directive '{0}' is not allowed here")]
    DirectiveNotAllowed(String),
    /// An account name with a bad root or segment.
    #[error("invalid account '{0}'")]
    InvalidAccount(String),
    /// A currency code with bad length or characters.
    #[error("invalid currency '{0}'")]
    InvalidCurrency(String),
    /// The same kind of cost component written twice.
    #[error("duplicate {0} in cost specification")]
    DuplicateCostField(String),
    /// A booking keyword outside the closed set.
    #[error("unknown booking method '{0}'")]
    UnknownBooking(String),
    /// A date that is not on the calendar or outside years 1-9999.
    #[error("invalid date: {0}")]
    InvalidDateValue(String),
    /// A number that overflows or divides by zero.
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    /// `poptag` for a tag that is not pushed.
    #[error("attempting to pop absent tag '{0}'")]
    UnmatchedPoptag(String),
    /// `popmeta` for a key that is not pushed.
    #[error("attempting to pop absent metadata key '{0}'")]
    UnmatchedPopmeta(String),
    /// `pushtag` still active at end of input.
    #[error("unbalanced pushed tag '{0}'")]
    UnclosedPushtag(String),
}

impl ParseErrorKind {
    /// The stage that produces this kind.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::UnexpectedChar(_) | Self::UnclosedString => ErrorClass::Lex,
            Self::UnexpectedToken { .. }
            | Self::MissingField(_)
            | Self::MalformedCost(_)
            | Self::MalformedPrice(_)
            | Self::MalformedPosting(_)
            | Self::UnexpectedIndentation
            | Self::DirectiveNotAllowed(_) => ErrorClass::Syntax,
            Self::InvalidAccount(_)
            | Self::InvalidCurrency(_)
            | Self::DuplicateCostField(_)
            | Self::UnknownBooking(_)
            | Self::InvalidDateValue(_)
            | Self::InvalidNumber(_)
            | Self::UnmatchedPoptag(_)
            | Self::UnmatchedPopmeta(_)
            | Self::UnclosedPushtag(_) => ErrorClass::Semantic,
        }
    }
}

/// Conditions that abort a parse call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalError {
    /// The input is larger than `ParserConfig::max_input_bytes`.
    #[error("input is {size} bytes, limit is {limit}")]
    InputTooLarge {
        /// Input size in bytes.
        size: usize,
        /// Configured limit.
        limit: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_new() {
        let err = ParseError::new(ParseErrorKind::UnclosedString, Span::new(0, 5));
        assert_eq!(err.span(), (0, 5));
        assert_eq!(err.scope, Span::new(0, 5));
        assert!(err.is_error());
        assert!(err.context.is_none());
        assert!(err.hint.is_none());
    }

    #[test]
    fn test_parse_error_with_scope_and_warning() {
        let err = ParseError::new(
            ParseErrorKind::UnclosedPushtag("trip".to_string()),
            Span::new(3, 8),
        )
        .with_scope(Span::new(0, 20))
        .warning();
        assert_eq!(err.scope, Span::new(0, 20));
        assert_eq!(err.severity, Severity::Warning);
        assert!(!err.is_error());
    }

    #[test]
    fn test_parse_error_display_with_context() {
        let err = ParseError::new(
            ParseErrorKind::MissingField("account".to_string()),
            Span::new(0, 5),
        )
        .with_context("in open directive");
        let display = format!("{err}");
        assert!(display.contains("missing required field: account"));
        assert!(display.contains("in open directive"));
    }

    #[test]
    fn test_lex_message_names_the_character() {
        let err = ParseError::new(ParseErrorKind::UnexpectedChar("`".into()), Span::new(0, 1));
        assert_eq!(err.message(), "unexpected character '`'");
        assert_eq!(err.class(), ErrorClass::Lex);
    }

    #[test]
    fn test_directive_context() {
        assert_eq!(directive_context("txn"), "in transaction");
        assert_eq!(directive_context("open"), "in open directive");
    }

    #[test]
    fn test_codes_are_prefixed_by_class() {
        let lex = ParseError::new(ParseErrorKind::UnexpectedChar("`".into()), Span::new(0, 1));
        let syntax = ParseError::new(ParseErrorKind::UnexpectedIndentation, Span::new(0, 1));
        let semantic = ParseError::new(
            ParseErrorKind::DuplicateCostField("date".into()),
            Span::new(0, 1),
        );
        assert_eq!(lex.code(), "L0001");
        assert_eq!(syntax.code(), "P0015");
        assert_eq!(semantic.code(), "S0032");
    }

    #[test]
    fn test_kind_codes_unique() {
        let kinds = [
            ParseErrorKind::UnexpectedChar("x".to_string()),
            ParseErrorKind::UnclosedString,
            ParseErrorKind::UnexpectedToken {
                found: "a".to_string(),
                expected: "b".to_string(),
            },
            ParseErrorKind::MissingField("x".to_string()),
            ParseErrorKind::MalformedCost("x".to_string()),
            ParseErrorKind::MalformedPrice("x".to_string()),
            ParseErrorKind::MalformedPosting("x".to_string()),
            ParseErrorKind::UnexpectedIndentation,
            ParseErrorKind::DirectiveNotAllowed("x".to_string()),
            ParseErrorKind::InvalidAccount("x".to_string()),
            ParseErrorKind::InvalidCurrency("x".to_string()),
            ParseErrorKind::DuplicateCostField("x".to_string()),
            ParseErrorKind::UnknownBooking("x".to_string()),
            ParseErrorKind::InvalidDateValue("x".to_string()),
            ParseErrorKind::InvalidNumber("x".to_string()),
            ParseErrorKind::UnmatchedPoptag("x".to_string()),
            ParseErrorKind::UnmatchedPopmeta("x".to_string()),
            ParseErrorKind::UnclosedPushtag("x".to_string()),
        ];
        let mut codes: Vec<u32> = kinds
            .into_iter()
            .map(|kind| ParseError::new(kind, Span::new(0, 0)).kind_code())
            .collect();
        let total = codes.len();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), total);
    }

    #[test]
    fn test_fatal_error_display() {
        let err = FatalError::InputTooLarge {
            size: 2048,
            limit: 1024,
        };
        assert_eq!(err.to_string(), "input is 2048 bytes, limit is 1024");
    }
}
