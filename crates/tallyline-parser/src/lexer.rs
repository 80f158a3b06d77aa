//! Tokenizer built on Logos.
//!
//! [`Token`] is a Logos-generated DFA. [`Lexer`] wraps it to add what the DFA
//! cannot express: `Indent` tokens at the start of continuation lines,
//! line/column tracking, skipping of org-mode headings, a trailing `Eof`, and
//! line-granular error recovery (an unrecognized character or unterminated
//! string becomes one `Error` token running to the end of its line).

use logos::Logos;
use std::fmt;

use crate::error::{ParseError, ParseErrorKind};
use crate::Span;

/// Token types produced by the Logos lexer.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t]+")]
pub enum Token<'src> {
    // ===== Literals =====
    /// A date in YYYY-MM-DD or YYYY/MM/DD format. Calendar validity is
    /// checked later.
    #[regex(r"\d{4}[-/]\d{2}[-/]\d{2}")]
    Date(&'src str),

    /// A number with optional sign, thousands separators, and decimals.
    #[regex(r"-?(\d{1,3}(,\d{3})*|\d+)(\.\d+)?")]
    Number(&'src str),

    /// A double-quoted string, quotes included. May span lines.
    #[regex(r#""([^"\\]|\\.)*""#)]
    String(&'src str),

    /// Something shaped like an account. Root and segment rules are
    /// enforced when the directive is built.
    #[regex(r"[A-Z][A-Za-z0-9-]*(:[A-Za-z0-9][A-Za-z0-9-]*)+")]
    Account(&'src str),

    /// Something shaped like a currency code. Length and the final
    /// character are checked when the directive is built.
    #[regex(r"[A-Z][A-Z0-9._-]*")]
    Currency(&'src str),

    /// A tag like `#trip-2024`, `#` included.
    #[regex(r"#[A-Za-z0-9_/.-]+")]
    Tag(&'src str),

    /// A link like `^invoice-12`, `^` included.
    #[regex(r"\^[A-Za-z0-9_/.-]+")]
    Link(&'src str),

    // ===== Keywords =====
    /// `txn`
    #[token("txn")]
    Txn,
    /// `balance`
    #[token("balance")]
    Balance,
    /// `open`
    #[token("open")]
    Open,
    /// `close`
    #[token("close")]
    Close,
    /// `commodity`
    #[token("commodity")]
    Commodity,
    /// `pad`
    #[token("pad")]
    Pad,
    /// `event`
    #[token("event")]
    Event,
    /// `query`
    #[token("query")]
    Query,
    /// `note`
    #[token("note")]
    Note,
    /// `document`
    #[token("document")]
    Document,
    /// `price`
    #[token("price")]
    Price,
    /// `custom`
    #[token("custom")]
    Custom,
    /// `option`
    #[token("option")]
    Option_,
    /// `include`
    #[token("include")]
    Include,
    /// `plugin`
    #[token("plugin")]
    Plugin,
    /// `pushtag`
    #[token("pushtag")]
    Pushtag,
    /// `poptag`
    #[token("poptag")]
    Poptag,
    /// `pushmeta`
    #[token("pushmeta")]
    Pushmeta,
    /// `popmeta`
    #[token("popmeta")]
    Popmeta,
    /// `TRUE`
    #[token("TRUE")]
    True,
    /// `FALSE`
    #[token("FALSE")]
    False,
    /// `NULL`
    #[token("NULL")]
    Null,

    // ===== Punctuation =====
    /// `{{`
    #[token("{{")]
    LDoubleBrace,
    /// `}}`
    #[token("}}")]
    RDoubleBrace,
    /// `{`
    #[token("{")]
    LBrace,
    /// `}`
    #[token("}")]
    RBrace,
    /// `(`
    #[token("(")]
    LParen,
    /// `)`
    #[token(")")]
    RParen,
    /// `@@`
    #[token("@@")]
    AtAt,
    /// `@`
    #[token("@")]
    At,
    /// `,`
    #[token(",")]
    Comma,
    /// `~`
    #[token("~")]
    Tilde,
    /// `+`
    #[token("+")]
    Plus,
    /// `-`
    #[token("-")]
    Minus,
    /// `*`: cleared flag, multiplication, or cost merge marker.
    #[token("*")]
    Star,
    /// `/`
    #[token("/")]
    Slash,
    /// A lone `#`: separates per-unit from total cost.
    #[token("#")]
    Hash,

    // ===== Transaction Flags =====
    /// `!`
    #[token("!")]
    Pending,

    /// Other transaction flags: P S T C U R M ? % &
    ///
    /// Wins over a one-letter [`Token::Currency`]; see
    /// [`Token::currency_text`].
    #[regex(r"[PSTCURM?%&]", priority = 3)]
    Flag(&'src str),

    // ===== Structural =====
    /// Line break.
    #[regex(r"\r?\n")]
    Newline,

    /// `;` to end of line, or a skipped org-mode heading.
    #[regex(r";[^\n\r]*")]
    Comment(&'src str),

    /// A metadata key with its trailing colon.
    #[regex(r"[a-z][A-Za-z0-9_-]*:")]
    MetaKey(&'src str),

    /// Leading whitespace of a continuation line. Inserted by [`Lexer`].
    Indent,

    /// Unrecognized input up to the end of the line. Inserted by [`Lexer`].
    Error(&'src str),

    /// End of input. Inserted by [`Lexer`].
    Eof,
}

/// Coarse token categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// A date literal.
    Date,
    /// A string literal.
    String,
    /// A number literal.
    Number,
    /// A currency code.
    Currency,
    /// An account name.
    Account,
    /// A directive keyword or `TRUE`/`FALSE`/`NULL`.
    Keyword,
    /// A `#tag`.
    Tag,
    /// A `^link`.
    Link,
    /// Continuation-line indentation.
    Indent,
    /// Line break.
    Newline,
    /// Operators, braces, separators and flags.
    Punctuation,
    /// A comment.
    Comment,
    /// A `key:` metadata key.
    MetaKey,
    /// Unrecognized input.
    Error,
    /// End of input.
    Eof,
}

impl<'src> Token<'src> {
    /// The category of this token.
    pub const fn kind(&self) -> TokenKind {
        match self {
            Self::Date(_) => TokenKind::Date,
            Self::Number(_) => TokenKind::Number,
            Self::String(_) => TokenKind::String,
            Self::Account(_) => TokenKind::Account,
            Self::Currency(_) => TokenKind::Currency,
            Self::Tag(_) => TokenKind::Tag,
            Self::Link(_) => TokenKind::Link,
            Self::Txn
            | Self::Balance
            | Self::Open
            | Self::Close
            | Self::Commodity
            | Self::Pad
            | Self::Event
            | Self::Query
            | Self::Note
            | Self::Document
            | Self::Price
            | Self::Custom
            | Self::Option_
            | Self::Include
            | Self::Plugin
            | Self::Pushtag
            | Self::Poptag
            | Self::Pushmeta
            | Self::Popmeta
            | Self::True
            | Self::False
            | Self::Null => TokenKind::Keyword,
            Self::LDoubleBrace
            | Self::RDoubleBrace
            | Self::LBrace
            | Self::RBrace
            | Self::LParen
            | Self::RParen
            | Self::AtAt
            | Self::At
            | Self::Comma
            | Self::Tilde
            | Self::Plus
            | Self::Minus
            | Self::Star
            | Self::Slash
            | Self::Hash
            | Self::Pending
            | Self::Flag(_) => TokenKind::Punctuation,
            Self::Newline => TokenKind::Newline,
            Self::Comment(_) => TokenKind::Comment,
            Self::MetaKey(_) => TokenKind::MetaKey,
            Self::Indent => TokenKind::Indent,
            Self::Error(_) => TokenKind::Error,
            Self::Eof => TokenKind::Eof,
        }
    }

    /// The flag character if this token can flag a transaction or posting.
    pub fn txn_flag(&self) -> Option<char> {
        match self {
            Self::Star => Some('*'),
            Self::Pending => Some('!'),
            Self::Flag(s) => s.chars().next(),
            _ => None,
        }
    }

    /// The code if this token can stand for a currency. A flag letter
    /// doubles as a one-letter currency.
    pub fn currency_text(&self) -> Option<&'src str> {
        match *self {
            Self::Currency(s) => Some(s),
            Self::Flag(s) if s.bytes().all(|b| b.is_ascii_uppercase()) => Some(s),
            _ => None,
        }
    }

    /// Short description used in diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Self::Date(s) => format!("date {s}"),
            Self::Number(s) => format!("number {s}"),
            Self::String(s) => format!("string {s}"),
            Self::Account(s) => format!("account {s}"),
            Self::Currency(s) => format!("currency {s}"),
            Self::Tag(s) => format!("tag {s}"),
            Self::Link(s) => format!("link {s}"),
            Self::Newline | Self::Eof => "end of line".to_string(),
            Self::Indent => "indentation".to_string(),
            other => format!("'{other}'"),
        }
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date(s)
            | Self::Number(s)
            | Self::String(s)
            | Self::Account(s)
            | Self::Currency(s)
            | Self::Tag(s)
            | Self::Link(s)
            | Self::Flag(s)
            | Self::Comment(s)
            | Self::MetaKey(s)
            | Self::Error(s) => write!(f, "{s}"),
            Self::Txn => write!(f, "txn"),
            Self::Balance => write!(f, "balance"),
            Self::Open => write!(f, "open"),
            Self::Close => write!(f, "close"),
            Self::Commodity => write!(f, "commodity"),
            Self::Pad => write!(f, "pad"),
            Self::Event => write!(f, "event"),
            Self::Query => write!(f, "query"),
            Self::Note => write!(f, "note"),
            Self::Document => write!(f, "document"),
            Self::Price => write!(f, "price"),
            Self::Custom => write!(f, "custom"),
            Self::Option_ => write!(f, "option"),
            Self::Include => write!(f, "include"),
            Self::Plugin => write!(f, "plugin"),
            Self::Pushtag => write!(f, "pushtag"),
            Self::Poptag => write!(f, "poptag"),
            Self::Pushmeta => write!(f, "pushmeta"),
            Self::Popmeta => write!(f, "popmeta"),
            Self::True => write!(f, "TRUE"),
            Self::False => write!(f, "FALSE"),
            Self::Null => write!(f, "NULL"),
            Self::LDoubleBrace => write!(f, "{{{{"),
            Self::RDoubleBrace => write!(f, "}}}}"),
            Self::LBrace => write!(f, "{{"),
            Self::RBrace => write!(f, "}}"),
            Self::LParen => write!(f, "("),
            Self::RParen => write!(f, ")"),
            Self::AtAt => write!(f, "@@"),
            Self::At => write!(f, "@"),
            Self::Comma => write!(f, ","),
            Self::Tilde => write!(f, "~"),
            Self::Plus => write!(f, "+"),
            Self::Minus => write!(f, "-"),
            Self::Star => write!(f, "*"),
            Self::Slash => write!(f, "/"),
            Self::Hash => write!(f, "#"),
            Self::Pending => write!(f, "!"),
            Self::Newline => write!(f, "\\n"),
            Self::Indent => write!(f, "<indent>"),
            Self::Eof => write!(f, "<eof>"),
        }
    }
}

/// A token with its byte span and 1-based line and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpannedToken<'src> {
    /// The token.
    pub token: Token<'src>,
    /// Byte range in the source.
    pub span: Span,
    /// Line of the first byte.
    pub line: usize,
    /// Character column of the first byte.
    pub column: usize,
}

/// Pull-based tokenizer over a source string.
///
/// Never panics and always terminates with a single [`Token::Eof`].
pub struct Lexer<'src> {
    source: &'src str,
    inner: logos::Lexer<'src, Token<'src>>,
    base: usize,
    line: usize,
    line_start: usize,
    at_line_start: bool,
    pending: Option<SpannedToken<'src>>,
    finished: bool,
}

impl<'src> Lexer<'src> {
    /// Start lexing `source`.
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            inner: Token::lexer(source),
            base: 0,
            line: 1,
            line_start: 0,
            at_line_start: true,
            pending: None,
            finished: false,
        }
    }

    fn offset(&self) -> usize {
        self.source.len() - self.inner.remainder().len()
    }

    /// End of the line containing `offset`, before any `\r\n` or `\n`.
    fn line_end(&self, offset: usize) -> usize {
        let end = self.source[offset..]
            .find('\n')
            .map_or(self.source.len(), |i| offset + i);
        if end > offset && self.source.as_bytes()[end - 1] == b'\r' {
            end - 1
        } else {
            end
        }
    }

    fn make(&self, token: Token<'src>, span: Span) -> SpannedToken<'src> {
        let column = self.source[self.line_start..span.start].chars().count() + 1;
        SpannedToken {
            token,
            span,
            line: self.line,
            column,
        }
    }

    /// Record line breaks inside a token that spans lines.
    fn advance_lines(&mut self, span: Span) {
        let text = &self.source[span.start..span.end];
        if let Some(last) = text.rfind('\n') {
            self.line += text.matches('\n').count();
            self.line_start = span.start + last + 1;
        }
    }

    /// Emit `token`, preceded by an `Indent` if it opens an indented line.
    fn emit(&mut self, token: Token<'src>, span: Span) -> SpannedToken<'src> {
        let spanned = self.make(token, span);
        let indent = (self.at_line_start && span.start > self.line_start)
            .then(|| Span::new(self.line_start, span.start));
        self.at_line_start = false;
        self.advance_lines(span);
        match indent {
            Some(indent) => {
                self.pending = Some(spanned);
                SpannedToken {
                    token: Token::Indent,
                    span: indent,
                    line: spanned.line,
                    column: 1,
                }
            }
            None => spanned,
        }
    }
}

impl<'src> Iterator for Lexer<'src> {
    type Item = SpannedToken<'src>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(token) = self.pending.take() {
            return Some(token);
        }
        if self.finished {
            return None;
        }

        let pos = self.offset();
        if self.at_line_start && pos == self.line_start && self.inner.remainder().starts_with('*')
        {
            let end = self.line_end(pos);
            self.inner.bump(end - pos);
            self.at_line_start = false;
            let text = &self.source[pos..end];
            return Some(self.make(Token::Comment(text), Span::new(pos, end)));
        }

        match self.inner.next() {
            None => {
                self.finished = true;
                let end = self.source.len();
                Some(self.make(Token::Eof, Span::new(end, end)))
            }
            Some(Ok(Token::Newline)) => {
                let range = self.inner.span();
                let span = Span::new(self.base + range.start, self.base + range.end);
                let token = self.make(Token::Newline, span);
                self.line += 1;
                self.line_start = span.end;
                self.at_line_start = true;
                Some(token)
            }
            Some(Ok(token)) => {
                let range = self.inner.span();
                let span = Span::new(self.base + range.start, self.base + range.end);
                Some(self.emit(token, span))
            }
            Some(Err(())) => {
                let start = self.base + self.inner.span().start;
                let mut end = self.line_end(start);
                if end <= start {
                    end = start + self.source[start..].chars().next().map_or(0, char::len_utf8);
                }
                self.inner = Token::lexer(&self.source[end..]);
                self.base = end;
                let text = &self.source[start..end];
                Some(self.emit(Token::Error(text), Span::new(start, end)))
            }
        }
    }
}

/// Tokenize a whole source string.
pub fn tokenize(source: &str) -> Vec<SpannedToken<'_>> {
    Lexer::new(source).collect()
}

impl ParseError {
    /// The lex diagnostic for an `Error` token.
    pub fn lex(token: &SpannedToken<'_>) -> Self {
        let text = match token.token {
            Token::Error(text) => text,
            _ => "",
        };
        let kind = if text.starts_with('"') {
            ParseErrorKind::UnclosedString
        } else {
            ParseErrorKind::UnexpectedChar(text.chars().next().map(String::from).unwrap_or_default())
        };
        let first = text.chars().next().map_or(0, char::len_utf8);
        let span = match kind {
            ParseErrorKind::UnclosedString => token.span,
            _ => Span::new(token.span.start, token.span.start + first),
        };
        Self::new(kind, span).with_scope(token.span)
    }
}

/// Lex diagnostics for every unrecognized region of `source`.
pub fn lex_diagnostics(source: &str) -> Vec<ParseError> {
    Lexer::new(source)
        .filter(|t| matches!(t.token, Token::Error(_)))
        .map(|t| ParseError::lex(&t))
        .collect()
}
