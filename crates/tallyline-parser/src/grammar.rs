//! Line and block grammar.
//!
//! The token stream is cut into logical lines (comments and blank lines
//! dropped) and lines into blocks: a column-0 head line plus every indented
//! line after it. Each block is parsed on its own, so any error is contained
//! to the block it occurs in and parsing resumes at the next head line.
//!
//! Recovery granularity, largest first:
//!
//! - block: lex errors, a malformed head line, an unrecognized body line;
//! - posting: a missing account, malformed units, an unbalanced `{`;
//! - clause: a malformed cost block or price annotation.

use tallyline_core::PriceKind;
use tracing::trace;

use crate::amount::{self, run, Rejection, TokExtra, Tokens};
use crate::config::Grammar;
use crate::error::{directive_context, ParseError, ParseErrorKind};
use crate::lexer::{SpannedToken, Token};
use crate::syntax::{
    CostField, CostNode, DatedNode, Entry, EntryNode, MetaNode, PostingNode, PriceNode, Text,
    ValueNode, Word,
};
use crate::Span;

/// One logical line, without indentation or trailing comment.
#[derive(Debug, Clone, Copy)]
pub struct Line<'src> {
    /// Whether the line started with whitespace.
    pub indented: bool,
    /// Content tokens, never empty.
    pub tokens: &'src [SpannedToken<'src>],
    /// First through last content token.
    pub span: Span,
}

/// A head line and its continuation lines.
#[derive(Debug, Clone)]
pub struct Block<'src> {
    /// `lines[0]` is the head.
    pub lines: Vec<Line<'src>>,
    /// Head through last continuation line.
    pub span: Span,
}

/// Split a token stream into logical lines.
pub fn split_lines<'src>(tokens: &'src [SpannedToken<'src>]) -> Vec<Line<'src>> {
    tokens
        .split(|t| matches!(t.token, Token::Newline | Token::Eof))
        .filter_map(|raw| {
            let (indented, rest) = match raw.split_first() {
                Some((first, rest)) if first.token == Token::Indent => (true, rest),
                _ => (false, raw),
            };
            let content = match rest.split_last() {
                Some((last, init)) if matches!(last.token, Token::Comment(_)) => init,
                _ => rest,
            };
            let first = content.first()?;
            let last = content.last()?;
            Some(Line {
                indented,
                tokens: content,
                span: first.span.merge(&last.span),
            })
        })
        .collect()
}

/// Group lines into blocks. Indented lines with no block to continue are
/// reported once per run.
pub fn group_blocks<'src>(
    lines: Vec<Line<'src>>,
    diagnostics: &mut Vec<ParseError>,
) -> Vec<Block<'src>> {
    let mut blocks: Vec<Block<'src>> = Vec::new();
    let mut orphans: Option<Span> = None;

    for line in lines {
        if !line.indented {
            if let Some(span) = orphans.take() {
                diagnostics.push(ParseError::new(ParseErrorKind::UnexpectedIndentation, span));
            }
            blocks.push(Block {
                lines: vec![line],
                span: line.span,
            });
            continue;
        }
        match blocks.last_mut() {
            Some(block) if orphans.is_none() => {
                block.span = block.span.merge(&line.span);
                block.lines.push(line);
            }
            _ => {
                orphans = Some(orphans.map_or(line.span, |s| s.merge(&line.span)));
            }
        }
    }
    if let Some(span) = orphans {
        diagnostics.push(ParseError::new(ParseErrorKind::UnexpectedIndentation, span));
    }
    blocks
}

/// Walks the tokens of one line.
struct Cursor<'src> {
    tokens: &'src [SpannedToken<'src>],
    pos: usize,
    end: usize,
}

impl<'src> Cursor<'src> {
    fn new(line: &Line<'src>) -> Self {
        Self {
            tokens: line.tokens,
            pos: 0,
            end: line.span.end,
        }
    }

    fn peek(&self) -> Option<&SpannedToken<'src>> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<SpannedToken<'src>> {
        let token = self.tokens.get(self.pos).copied();
        self.pos += usize::from(token.is_some());
        token
    }

    fn rest(&self) -> &'src [SpannedToken<'src>] {
        &self.tokens[self.pos.min(self.tokens.len())..]
    }

    fn skip_all(&mut self) {
        self.pos = self.tokens.len();
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        match self.peek() {
            Some(token) => ParseError::new(
                ParseErrorKind::UnexpectedToken {
                    found: token.token.describe(),
                    expected: expected.to_string(),
                },
                token.span,
            ),
            None => ParseError::new(
                ParseErrorKind::MissingField(expected.to_string()),
                Span::new(self.end, self.end),
            ),
        }
    }

    fn expect_account(&mut self) -> Result<Word<'src>, ParseError> {
        match self.peek().map(|t| (t.token, t.span)) {
            Some((Token::Account(text), span)) => {
                self.pos += 1;
                Ok(Word { text, span })
            }
            _ => Err(self.unexpected("account")),
        }
    }

    fn expect_currency(&mut self) -> Result<Word<'src>, ParseError> {
        match self.peek().and_then(|t| Some((t.token.currency_text()?, t.span))) {
            Some((text, span)) => {
                self.pos += 1;
                Ok(Word { text, span })
            }
            None => Err(self.unexpected("currency")),
        }
    }

    fn expect_string(&mut self, what: &str) -> Result<Text, ParseError> {
        match self.peek().map(|t| (t.token, t.span)) {
            Some((Token::String(literal), span)) => {
                self.pos += 1;
                Ok(Text {
                    value: amount::unescape(literal),
                    span,
                })
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn string_opt(&mut self) -> Option<Text> {
        match self.peek().map(|t| t.token) {
            Some(Token::String(_)) => self.expect_string("string").ok(),
            _ => None,
        }
    }

    fn expect_tag(&mut self) -> Result<Word<'src>, ParseError> {
        match self.peek().map(|t| (t.token, t.span)) {
            Some((Token::Tag(text), span)) => {
                self.pos += 1;
                Ok(Word {
                    text: &text[1..],
                    span,
                })
            }
            _ => Err(self.unexpected("tag")),
        }
    }

    fn expect_meta_key(&mut self) -> Result<Word<'src>, ParseError> {
        match self.peek().map(|t| (t.token, t.span)) {
            Some((Token::MetaKey(text), span)) => {
                self.pos += 1;
                Ok(Word {
                    text: &text[..text.len() - 1],
                    span,
                })
            }
            _ => Err(self.unexpected("metadata key")),
        }
    }

    /// Collect trailing tags and links.
    fn tags_and_links(&mut self, tags: &mut Vec<&'src str>, links: &mut Vec<&'src str>) {
        while let Some(token) = self.peek() {
            match token.token {
                Token::Tag(text) => tags.push(&text[1..]),
                Token::Link(text) => links.push(&text[1..]),
                _ => break,
            }
            self.pos += 1;
        }
    }

    /// Run a value-level parser over the rest of the line.
    fn run_rest<O>(
        &mut self,
        expected: &str,
        parser: impl chumsky::Parser<'src, Tokens<'src>, O, TokExtra<'src>>,
    ) -> Result<O, ParseError> {
        let rest = self.rest();
        if rest.is_empty() {
            return Err(self.unexpected(expected));
        }
        let out = run(parser, rest).map_err(|r| rejected(&r, expected))?;
        self.skip_all();
        Ok(out)
    }

    fn finish(&self) -> Result<(), ParseError> {
        match self.peek() {
            None => Ok(()),
            Some(_) => Err(self.unexpected("end of line")),
        }
    }
}

fn rejected(rejection: &Rejection, expected: &str) -> ParseError {
    ParseError::new(
        ParseErrorKind::UnexpectedToken {
            found: rejection.found.clone(),
            expected: expected.to_string(),
        },
        rejection.span,
    )
}

/// The directive keyword a head line introduces, for grammar checks.
fn head_keyword(token: &Token<'_>) -> Option<&'static str> {
    Some(match token {
        Token::Open => "open",
        Token::Close => "close",
        Token::Commodity => "commodity",
        Token::Pad => "pad",
        Token::Note => "note",
        Token::Custom => "custom",
        Token::Balance => "balance",
        Token::Price => "price",
        Token::Event => "event",
        Token::Query => "query",
        Token::Document => "document",
        Token::Txn | Token::String(_) | Token::Star | Token::Pending | Token::Flag(_) => "txn",
        _ => return None,
    })
}

/// The directive keyword of a block's head line, if it has one.
fn block_keyword(block: &Block<'_>) -> Option<&'static str> {
    let head = block.lines.first()?.tokens;
    match head.first()?.token {
        Token::Date(_) => head_keyword(&head.get(1)?.token),
        Token::Option_ => Some("option"),
        Token::Include => Some("include"),
        Token::Plugin => Some("plugin"),
        Token::Pushtag => Some("pushtag"),
        Token::Poptag => Some("poptag"),
        Token::Pushmeta => Some("pushmeta"),
        Token::Popmeta => Some("popmeta"),
        _ => None,
    }
}

/// Parses blocks into syntax nodes, collecting diagnostics.
///
/// Block-level diagnostics are kept here. Posting and clause diagnostics go
/// on the block's [`Entry`], so they disappear with it if the directive is
/// dropped.
pub struct GrammarParser {
    grammar: Grammar,
    diagnostics: Vec<ParseError>,
    inner: Vec<ParseError>,
}

impl GrammarParser {
    /// Create a parser for the given grammar.
    pub const fn new(grammar: Grammar) -> Self {
        Self {
            grammar,
            diagnostics: Vec::new(),
            inner: Vec::new(),
        }
    }

    /// Block-level diagnostics recorded so far.
    pub fn into_diagnostics(self) -> Vec<ParseError> {
        self.diagnostics
    }

    /// Parse a whole token stream.
    pub fn parse<'src>(&mut self, tokens: &'src [SpannedToken<'src>]) -> Vec<Entry<'src>> {
        let lines = split_lines(tokens);
        let blocks = group_blocks(lines, &mut self.diagnostics);
        blocks.iter().filter_map(|b| self.parse_block(b)).collect()
    }

    /// Parse one block, or record why it was dropped.
    pub fn parse_block<'src>(&mut self, block: &Block<'src>) -> Option<Entry<'src>> {
        let error = block
            .lines
            .iter()
            .flat_map(|line| line.tokens)
            .find(|t| matches!(t.token, Token::Error(_)));
        if let Some(token) = error {
            trace!(span = %block.span, "dropping block with unrecognized input");
            self.drop_block(ParseError::lex(token), block);
            return None;
        }

        match self.block(block) {
            Ok(node) => Some(Entry {
                node,
                span: block.span,
                diagnostics: std::mem::take(&mut self.inner),
            }),
            Err(err) => {
                trace!(span = %block.span, error = %err, "dropping block");
                self.inner.clear();
                self.drop_block(err, block);
                None
            }
        }
    }

    fn drop_block(&mut self, err: ParseError, block: &Block<'_>) {
        let err = match block_keyword(block) {
            Some(keyword) => err.with_context(directive_context(keyword)),
            None => err,
        };
        self.diagnostics.push(err.with_scope(block.span));
    }

    fn block<'src>(&mut self, block: &Block<'src>) -> Result<EntryNode<'src>, ParseError> {
        let head = block.lines[0];
        let body = &block.lines[1..];
        let mut cur = Cursor::new(&head);
        let first = cur.bump().ok_or_else(|| cur.unexpected("directive"))?;

        let Token::Date(date) = first.token else {
            return self.undated(first, &mut cur, body);
        };
        let date = Word {
            text: date,
            span: first.span,
        };

        let keyword_token = *cur.peek().ok_or_else(|| {
            ParseError::new(
                ParseErrorKind::MissingField("directive".to_string()),
                Span::new(date.span.end, date.span.end),
            )
        })?;
        let keyword = head_keyword(&keyword_token.token)
            .ok_or_else(|| cur.unexpected("directive keyword or transaction flag"))?;
        self.check_allowed(keyword, keyword_token.span)?;

        if keyword == "txn" {
            return self.transaction(date, &mut cur, body);
        }

        cur.bump();
        let node = match keyword_token.token {
            Token::Open => {
                let account = cur.expect_account()?;
                let mut currencies = Vec::new();
                if cur.peek().is_some_and(|t| t.token.currency_text().is_some()) {
                    currencies.push(cur.expect_currency()?);
                    while matches!(cur.peek().map(|t| t.token), Some(Token::Comma)) {
                        cur.bump();
                        currencies.push(cur.expect_currency()?);
                    }
                }
                let booking = cur.string_opt();
                DatedNode::Open {
                    account,
                    currencies,
                    booking,
                }
            }
            Token::Close => DatedNode::Close {
                account: cur.expect_account()?,
            },
            Token::Commodity => DatedNode::Commodity {
                currency: cur.expect_currency()?,
            },
            Token::Pad => DatedNode::Pad {
                account: cur.expect_account()?,
                source: cur.expect_account()?,
            },
            Token::Balance => {
                let account = cur.expect_account()?;
                let (number, tolerance, currency) =
                    cur.run_rest("amount", amount::balance_amount())?;
                DatedNode::Balance {
                    account,
                    number,
                    tolerance,
                    currency,
                }
            }
            Token::Price => {
                let currency = cur.expect_currency()?;
                let (number, quote) = cur.run_rest("amount", amount::amount())?;
                DatedNode::Price {
                    currency,
                    number,
                    quote,
                }
            }
            Token::Note => DatedNode::Note {
                account: cur.expect_account()?,
                comment: cur.expect_string("note text")?,
            },
            Token::Event => DatedNode::Event {
                event_type: cur.expect_string("event type")?,
                value: cur.expect_string("event value")?,
            },
            Token::Query => DatedNode::Query {
                name: cur.expect_string("query name")?,
                query: cur.expect_string("query text")?,
            },
            Token::Document => {
                let account = cur.expect_account()?;
                let path = cur.expect_string("document path")?;
                let (mut tags, mut links) = (Vec::new(), Vec::new());
                cur.tags_and_links(&mut tags, &mut links);
                DatedNode::Document {
                    account,
                    path,
                    tags,
                    links,
                }
            }
            Token::Custom => {
                let custom_type = cur.expect_string("custom type")?;
                let values = if cur.rest().is_empty() {
                    Vec::new()
                } else {
                    cur.run_rest("custom value", amount::values())?
                };
                DatedNode::Custom {
                    custom_type,
                    values,
                }
            }
            _ => return Err(cur.unexpected("directive keyword")),
        };
        cur.finish()?;

        let meta = body
            .iter()
            .map(meta_line)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(EntryNode::Dated { date, node, meta })
    }

    fn check_allowed(&self, keyword: &str, span: Span) -> Result<(), ParseError> {
        if self.grammar.allows(keyword) {
            Ok(())
        } else {
            Err(ParseError::new(
                ParseErrorKind::DirectiveNotAllowed(keyword.to_string()),
                span,
            ))
        }
    }

    fn undated<'src>(
        &mut self,
        first: SpannedToken<'src>,
        cur: &mut Cursor<'src>,
        body: &[Line<'src>],
    ) -> Result<EntryNode<'src>, ParseError> {
        let keyword = match first.token {
            Token::Option_ => "option",
            Token::Include => "include",
            Token::Plugin => "plugin",
            Token::Pushtag => "pushtag",
            Token::Poptag => "poptag",
            Token::Pushmeta => "pushmeta",
            Token::Popmeta => "popmeta",
            other => {
                return Err(ParseError::new(
                    ParseErrorKind::UnexpectedToken {
                        found: other.describe(),
                        expected: "date or directive keyword".to_string(),
                    },
                    first.span,
                ))
            }
        };
        self.check_allowed(keyword, first.span)?;

        let node = match first.token {
            Token::Option_ => EntryNode::Option {
                name: cur.expect_string("option name")?,
                value: cur.expect_string("option value")?,
            },
            Token::Include => EntryNode::Include(cur.expect_string("include path")?),
            Token::Plugin => EntryNode::Plugin {
                module: cur.expect_string("plugin module")?,
                config: cur.string_opt(),
            },
            Token::Pushtag => EntryNode::Pushtag(cur.expect_tag()?),
            Token::Poptag => EntryNode::Poptag(cur.expect_tag()?),
            Token::Pushmeta => {
                let key = cur.expect_meta_key()?;
                let value = if cur.rest().is_empty() {
                    ValueNode::None
                } else {
                    cur.run_rest("metadata value", amount::value())?
                };
                EntryNode::Pushmeta(MetaNode {
                    key: key.text,
                    value,
                    span: Span::new(first.span.start, cur.end),
                })
            }
            _ => EntryNode::Popmeta(cur.expect_meta_key()?),
        };
        cur.finish()?;

        if let Some(line) = body.first() {
            return Err(ParseError::new(
                ParseErrorKind::UnexpectedIndentation,
                line.span,
            ));
        }
        Ok(node)
    }

    fn transaction<'src>(
        &mut self,
        date: Word<'src>,
        cur: &mut Cursor<'src>,
        body: &[Line<'src>],
    ) -> Result<EntryNode<'src>, ParseError> {
        let flag = match cur.peek().map(|t| t.token) {
            Some(Token::Txn) => {
                cur.bump();
                '*'
            }
            Some(token) => match token.txn_flag() {
                Some(flag) => {
                    cur.bump();
                    flag
                }
                None => '*',
            },
            None => '*',
        };

        let first = cur.string_opt();
        let second = cur.string_opt();
        let (payee, narration) = match (first, second) {
            (Some(payee), Some(narration)) => (Some(payee), Some(narration)),
            (narration, _) => (None, narration),
        };
        let (mut tags, mut links) = (Vec::new(), Vec::new());
        cur.tags_and_links(&mut tags, &mut links);
        if cur.peek().is_some() {
            return Err(cur.unexpected("tag, link or end of line"));
        }

        let mut meta = Vec::new();
        let mut postings: Vec<PostingNode<'src>> = Vec::new();
        // Metadata under a dropped posting goes with it.
        let mut current_dropped = false;

        for line in body {
            let lead = line.tokens[0].token;
            if matches!(lead, Token::MetaKey(_)) {
                let node = meta_line(line)?;
                match postings.last_mut() {
                    _ if current_dropped => {}
                    Some(posting) => posting.meta.push(node),
                    None => meta.push(node),
                }
            } else if is_posting_line(line) {
                let posting = self.posting(line);
                current_dropped = posting.is_none();
                postings.extend(posting);
            } else if line
                .tokens
                .iter()
                .all(|t| matches!(t.token, Token::Tag(_) | Token::Link(_)))
            {
                let mut line_cur = Cursor::new(line);
                line_cur.tags_and_links(&mut tags, &mut links);
            } else {
                return Err(Cursor::new(line).unexpected("posting, metadata, tags or links"));
            }
        }

        Ok(EntryNode::Dated {
            date,
            node: DatedNode::Transaction {
                flag,
                payee,
                narration,
                tags,
                links,
                postings,
            },
            meta,
        })
    }

    /// Parse a posting line, or record why it was dropped.
    fn posting<'src>(&mut self, line: &Line<'src>) -> Option<PostingNode<'src>> {
        match self.posting_inner(line) {
            Ok(posting) => Some(posting),
            Err(err) => {
                trace!(span = %line.span, error = %err, "dropping posting");
                self.inner
                    .push(err.with_scope(line.span).with_context("in posting"));
                None
            }
        }
    }

    fn posting_inner<'src>(&mut self, line: &Line<'src>) -> Result<PostingNode<'src>, ParseError> {
        let mut cur = Cursor::new(line);
        let flag = cur.peek().and_then(|t| t.token.txn_flag());
        if flag.is_some() {
            cur.bump();
        }
        let account = cur.expect_account()?;
        let tail = cur.rest();

        let split = tail
            .iter()
            .position(|t| {
                matches!(
                    t.token,
                    Token::LBrace | Token::LDoubleBrace | Token::At | Token::AtAt
                )
            })
            .unwrap_or(tail.len());
        let (units_tokens, mut rest) = tail.split_at(split);

        let units = if units_tokens.is_empty() {
            None
        } else {
            Some(run(amount::units(), units_tokens).map_err(|r| {
                ParseError::new(
                    ParseErrorKind::MalformedPosting(format!("unexpected {} in units", r.found)),
                    r.span,
                )
            })?)
        };

        let mut cost = None;
        if let Some(open) = rest.first() {
            let closer = match open.token {
                Token::LBrace => Some(Token::RBrace),
                Token::LDoubleBrace => Some(Token::RDoubleBrace),
                _ => None,
            };
            if let Some(closer) = closer {
                let close = rest.iter().position(|t| t.token == closer).ok_or_else(|| {
                    ParseError::new(
                        ParseErrorKind::MalformedPosting(format!("unclosed '{}'", open.token)),
                        open.span,
                    )
                })?;
                let span = open.span.merge(&rest[close].span);
                let total_brace = open.token == Token::LDoubleBrace;
                cost = self.cost_block(&rest[1..close], total_brace, span);
                rest = &rest[close + 1..];
            }
        }

        let mut price = None;
        if let Some(op) = rest.first() {
            let kind = match op.token {
                Token::At => PriceKind::PerUnit,
                Token::AtAt => PriceKind::Total,
                _ => {
                    return Err(ParseError::new(
                        ParseErrorKind::MalformedPosting(format!(
                            "unexpected {} after cost",
                            op.token.describe()
                        )),
                        op.span,
                    ))
                }
            };
            let span = Span::new(op.span.start, line.span.end);
            match run(amount::price_amount(), &rest[1..]) {
                Ok(amount) => {
                    price = Some(PriceNode { kind, amount, span });
                }
                Err(r) => {
                    trace!(span = %span, "dropping price annotation");
                    self.inner.push(
                        ParseError::new(
                            ParseErrorKind::MalformedPrice(format!("unexpected {}", r.found)),
                            r.span,
                        )
                        .with_scope(span),
                    );
                }
            }
        }

        Ok(PostingNode {
            flag,
            account,
            units,
            cost,
            price,
            meta: Vec::new(),
            span: line.span,
        })
    }

    /// Parse the inside of a balanced cost block, or record why it was
    /// dropped.
    fn cost_block<'src>(
        &mut self,
        inner: &'src [SpannedToken<'src>],
        total_brace: bool,
        span: Span,
    ) -> Option<CostNode<'src>> {
        let mut groups = Vec::new();
        for group in inner
            .split(|t| t.token == Token::Comma)
            .filter(|g| !g.is_empty())
        {
            match run(amount::cost_group(), group) {
                Ok(parsed) => {
                    if total_brace && matches!(parsed.field, CostField::Amount { hash: true, .. }) {
                        self.drop_cost(
                            ParseError::new(
                                ParseErrorKind::MalformedCost(
                                    "'#' is not allowed inside '{{...}}'".to_string(),
                                ),
                                parsed.span,
                            ),
                            span,
                        );
                        return None;
                    }
                    groups.push(parsed);
                }
                Err(r) => {
                    self.drop_cost(
                        ParseError::new(
                            ParseErrorKind::MalformedCost(format!("unexpected {}", r.found)),
                            r.span,
                        ),
                        span,
                    );
                    return None;
                }
            }
        }
        Some(CostNode {
            total_brace,
            groups,
            span,
        })
    }

    fn drop_cost(&mut self, err: ParseError, scope: Span) {
        trace!(span = %scope, "dropping cost specification");
        self.inner.push(err.with_scope(scope));
    }
}

fn is_posting_line(line: &Line<'_>) -> bool {
    match line.tokens {
        [first, ..] if matches!(first.token, Token::Account(_)) => true,
        [first, second, ..] => {
            first.token.txn_flag().is_some() && matches!(second.token, Token::Account(_))
        }
        _ => false,
    }
}

fn meta_line<'src>(line: &Line<'src>) -> Result<MetaNode<'src>, ParseError> {
    let mut cur = Cursor::new(line);
    let key = cur.expect_meta_key()?;
    let value = if cur.rest().is_empty() {
        ValueNode::None
    } else {
        cur.run_rest("metadata value", amount::value())?
    };
    Ok(MetaNode {
        key: key.text,
        value,
        span: line.span,
    })
}
