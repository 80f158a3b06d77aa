//! Syntax nodes.
//!
//! The grammar parser produces these from token lines. They keep raw text for
//! everything the synthesizer validates (dates, accounts, currencies, booking
//! keywords) so that semantic errors are reported against the exact token.

use rust_decimal::Decimal;
use tallyline_core::PriceKind;

use crate::error::ParseError;
use crate::Span;

/// A raw token slice awaiting validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Word<'src> {
    /// Source text of the token.
    pub text: &'src str,
    /// Where it was written.
    pub span: Span,
}

/// An evaluated number expression. `value` is `None` when the literal does
/// not fit a `Decimal` or the arithmetic overflows or divides by zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Num {
    /// The result.
    pub value: Option<Decimal>,
    /// The whole expression.
    pub span: Span,
}

/// A decoded string literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Text {
    /// Contents with escapes resolved.
    pub value: String,
    /// The literal including quotes.
    pub span: Span,
}

/// Posting units or a price amount, with either half optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitsNode<'src> {
    /// `expr CURRENCY`
    Complete(Num, Word<'src>),
    /// `expr`
    NumberOnly(Num),
    /// `CURRENCY`
    CurrencyOnly(Word<'src>),
}

impl UnitsNode<'_> {
    /// The source range covered.
    pub fn span(&self) -> Span {
        match self {
            Self::Complete(n, c) => n.span.merge(&c.span),
            Self::NumberOnly(n) => n.span,
            Self::CurrencyOnly(c) => c.span,
        }
    }
}

/// One comma-separated component of a cost block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CostField<'src> {
    /// `number [# number] [currency]` in any non-empty combination.
    Amount {
        /// Number before `#`.
        per: Option<Num>,
        /// Number after `#`.
        total: Option<Num>,
        /// Whether `#` was written.
        hash: bool,
        /// Trailing currency.
        currency: Option<Word<'src>>,
    },
    /// A lot date.
    Date(Word<'src>),
    /// A lot label.
    Label(Text),
    /// The `*` merge marker.
    Merge,
}

impl CostField<'_> {
    /// Name used in duplicate-field diagnostics.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Amount { .. } => "cost amount",
            Self::Date(_) => "date",
            Self::Label(_) => "label",
            Self::Merge => "merge marker",
        }
    }
}

/// A cost component with its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostGroup<'src> {
    /// The component.
    pub field: CostField<'src>,
    /// Its tokens.
    pub span: Span,
}

/// `{...}` or `{{...}}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostNode<'src> {
    /// True for `{{...}}`.
    pub total_brace: bool,
    /// Components in source order.
    pub groups: Vec<CostGroup<'src>>,
    /// Braces included.
    pub span: Span,
}

/// `@ [amount]` or `@@ [amount]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceNode<'src> {
    /// Operator kind.
    pub kind: PriceKind,
    /// What followed the operator.
    pub amount: Option<UnitsNode<'src>>,
    /// Operator and amount.
    pub span: Span,
}

/// A metadata or custom value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueNode<'src> {
    /// String literal.
    String(Text),
    /// Account name.
    Account(Word<'src>),
    /// Currency code.
    Currency(Word<'src>),
    /// Tag, without `#`.
    Tag(&'src str),
    /// Link, without `^`.
    Link(&'src str),
    /// Date.
    Date(Word<'src>),
    /// Bare number expression.
    Number(Num),
    /// `TRUE` / `FALSE`.
    Bool(bool),
    /// Number with currency.
    Amount(Num, Word<'src>),
    /// `NULL` or nothing.
    None,
}

/// `key: value` on its own line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaNode<'src> {
    /// Key without the colon.
    pub key: &'src str,
    /// Parsed value.
    pub value: ValueNode<'src>,
    /// The whole line.
    pub span: Span,
}

/// A posting line and the metadata lines under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingNode<'src> {
    /// Leading flag.
    pub flag: Option<char>,
    /// Account.
    pub account: Word<'src>,
    /// Units.
    pub units: Option<UnitsNode<'src>>,
    /// Cost block, absent if missing or dropped.
    pub cost: Option<CostNode<'src>>,
    /// Price annotation, absent if missing or dropped.
    pub price: Option<PriceNode<'src>>,
    /// Attached metadata.
    pub meta: Vec<MetaNode<'src>>,
    /// The posting line.
    pub span: Span,
}

/// The directive-specific part of a dated entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatedNode<'src> {
    /// A transaction header and its postings.
    Transaction {
        /// Flag character.
        flag: char,
        /// Payee when two strings were written.
        payee: Option<Text>,
        /// Narration.
        narration: Option<Text>,
        /// Tags from the header and continuation lines.
        tags: Vec<&'src str>,
        /// Links from the header and continuation lines.
        links: Vec<&'src str>,
        /// Postings in source order.
        postings: Vec<PostingNode<'src>>,
    },
    /// `open`
    Open {
        /// Account.
        account: Word<'src>,
        /// Currency constraints.
        currencies: Vec<Word<'src>>,
        /// Quoted booking keyword.
        booking: Option<Text>,
    },
    /// `close`
    Close {
        /// Account.
        account: Word<'src>,
    },
    /// `commodity`
    Commodity {
        /// Currency.
        currency: Word<'src>,
    },
    /// `pad`
    Pad {
        /// Padded account.
        account: Word<'src>,
        /// Source account.
        source: Word<'src>,
    },
    /// `balance`
    Balance {
        /// Account.
        account: Word<'src>,
        /// Expected number.
        number: Num,
        /// Tolerance after `~`.
        tolerance: Option<Num>,
        /// Currency.
        currency: Word<'src>,
    },
    /// `price`
    Price {
        /// Priced commodity.
        currency: Word<'src>,
        /// Price number.
        number: Num,
        /// Quote currency.
        quote: Word<'src>,
    },
    /// `note`
    Note {
        /// Account.
        account: Word<'src>,
        /// Note text.
        comment: Text,
    },
    /// `event`
    Event {
        /// Event type.
        event_type: Text,
        /// Event value.
        value: Text,
    },
    /// `query`
    Query {
        /// Query name.
        name: Text,
        /// Query text.
        query: Text,
    },
    /// `document`
    Document {
        /// Account.
        account: Word<'src>,
        /// Path as written.
        path: Text,
        /// Tags.
        tags: Vec<&'src str>,
        /// Links.
        links: Vec<&'src str>,
    },
    /// `custom`
    Custom {
        /// Type name.
        custom_type: Text,
        /// Values.
        values: Vec<ValueNode<'src>>,
    },
}

impl DatedNode<'_> {
    /// The directive keyword, `txn` for transactions.
    pub const fn keyword(&self) -> &'static str {
        match self {
            Self::Transaction { .. } => "txn",
            Self::Open { .. } => "open",
            Self::Close { .. } => "close",
            Self::Commodity { .. } => "commodity",
            Self::Pad { .. } => "pad",
            Self::Balance { .. } => "balance",
            Self::Price { .. } => "price",
            Self::Note { .. } => "note",
            Self::Event { .. } => "event",
            Self::Query { .. } => "query",
            Self::Document { .. } => "document",
            Self::Custom { .. } => "custom",
        }
    }
}

/// One parsed block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryNode<'src> {
    /// A dated directive.
    Dated {
        /// Raw date.
        date: Word<'src>,
        /// Directive fields.
        node: DatedNode<'src>,
        /// Directive-level metadata.
        meta: Vec<MetaNode<'src>>,
    },
    /// `option "name" "value"`
    Option {
        /// Option name.
        name: Text,
        /// Option value.
        value: Text,
    },
    /// `include "path"`
    Include(Text),
    /// `plugin "module" ["config"]`
    Plugin {
        /// Module name.
        module: Text,
        /// Config string.
        config: Option<Text>,
    },
    /// `pushtag #tag`
    Pushtag(Word<'src>),
    /// `poptag #tag`
    Poptag(Word<'src>),
    /// `pushmeta key: value`
    Pushmeta(MetaNode<'src>),
    /// `popmeta key:`
    Popmeta(Word<'src>),
}

/// A block's node with the block's span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<'src> {
    /// The node.
    pub node: EntryNode<'src>,
    /// Head line through last continuation line.
    pub span: Span,
    /// Dropped postings and clauses inside the block. Discarded if the
    /// whole directive is dropped later.
    pub diagnostics: Vec<ParseError>,
}
