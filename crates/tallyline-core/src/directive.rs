//! The typed directive model.
//!
//! A ledger file is a sequence of dated directives:
//!
//! - [`Transaction`] - transfers between accounts, made of [`Posting`]s
//! - [`Balance`] - asserts an account balance
//! - [`Open`] / [`Close`] - account lifetime
//! - [`Commodity`] - declares a commodity
//! - [`Pad`] - pads an account from another
//! - [`Event`], [`Query`], [`Note`], [`Document`] - informational records
//! - [`Price`] - a commodity price
//! - [`Custom`] - user-defined directive with arbitrary values
//!
//! Source positions are not stored here. The parser wraps each directive in a
//! [`Spanned`](crate::Spanned); postings carry their own spans because they are
//! reported individually.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::booking::{serde_interned, Booking};
use crate::{Amount, CostSpec, IncompleteAmount, Span};

/// Metadata value types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetaValue {
    /// String value
    String(String),
    /// Account reference
    Account(String),
    /// Currency code
    Currency(String),
    /// Tag reference, without the `#`
    Tag(String),
    /// Link reference, without the `^`
    Link(String),
    /// Date value
    Date(NaiveDate),
    /// Numeric value
    Number(Decimal),
    /// Boolean value
    Bool(bool),
    /// Amount value
    Amount(Amount),
    /// Key written with no value
    None,
}

impl MetaValue {
    /// The string payload of a `String` value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "\"{s}\""),
            Self::Account(a) => write!(f, "{a}"),
            Self::Currency(c) => write!(f, "{c}"),
            Self::Tag(t) => write!(f, "#{t}"),
            Self::Link(l) => write!(f, "^{l}"),
            Self::Date(d) => write!(f, "{d}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Self::Amount(a) => write!(f, "{a}"),
            Self::None => Ok(()),
        }
    }
}

/// Key-value map attached to directives and postings. A repeated key keeps
/// the last value written.
pub type Metadata = HashMap<String, MetaValue>;

/// Whether a price annotation was written with `@` or `@@`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceKind {
    /// `@`: price of one unit
    PerUnit,
    /// `@@`: price of the whole posting
    Total,
}

/// A posting's price annotation.
///
/// The amount may be missing entirely (`Assets:Cash 10 GBP @`) or be
/// incomplete; inference is left to downstream tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceAnnotation {
    /// `@` or `@@`
    pub kind: PriceKind,
    /// Whatever followed the operator
    pub amount: Option<IncompleteAmount>,
}

impl PriceAnnotation {
    /// A per-unit (`@`) price.
    #[must_use]
    pub const fn per_unit(amount: Option<IncompleteAmount>) -> Self {
        Self {
            kind: PriceKind::PerUnit,
            amount,
        }
    }

    /// A total (`@@`) price.
    #[must_use]
    pub const fn total(amount: Option<IncompleteAmount>) -> Self {
        Self {
            kind: PriceKind::Total,
            amount,
        }
    }

    /// True for `@@`.
    #[must_use]
    pub const fn is_total(&self) -> bool {
        matches!(self.kind, PriceKind::Total)
    }
}

impl fmt::Display for PriceAnnotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self.kind {
            PriceKind::PerUnit => "@",
            PriceKind::Total => "@@",
        })?;
        if let Some(amount) = &self.amount {
            write!(f, " {amount}")?;
        }
        Ok(())
    }
}

/// One leg of a transaction.
///
/// `units: None` means the account alone was written and the amount is left
/// to interpolation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// The account for this posting
    pub account: String,
    /// The units, possibly incomplete
    pub units: Option<IncompleteAmount>,
    /// Cost block, if written
    pub cost: Option<CostSpec>,
    /// Price annotation, if written
    pub price: Option<PriceAnnotation>,
    /// Posting flag, if written
    pub flag: Option<char>,
    /// Posting metadata
    pub meta: Metadata,
    /// Source span of the posting line
    pub span: Span,
    /// Source span of the enclosing transaction
    pub txn_span: Span,
}

impl Posting {
    /// A posting with only an account.
    #[must_use]
    pub fn auto(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            units: None,
            cost: None,
            price: None,
            flag: None,
            meta: Metadata::new(),
            span: Span::default(),
            txn_span: Span::default(),
        }
    }

    /// A posting with units.
    #[must_use]
    pub fn new(account: impl Into<String>, units: impl Into<IncompleteAmount>) -> Self {
        Self {
            units: Some(units.into()),
            ..Self::auto(account)
        }
    }

    /// The units when both number and currency were written.
    #[must_use]
    pub fn amount(&self) -> Option<&Amount> {
        self.units.as_ref().and_then(IncompleteAmount::as_amount)
    }

    /// Set the cost block.
    #[must_use]
    pub fn with_cost(mut self, cost: CostSpec) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Set the price annotation.
    #[must_use]
    pub fn with_price(mut self, price: PriceAnnotation) -> Self {
        self.price = Some(price);
        self
    }

    /// Set the flag.
    #[must_use]
    pub const fn with_flag(mut self, flag: char) -> Self {
        self.flag = Some(flag);
        self
    }

    /// Set the source span.
    #[must_use]
    pub const fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

/// All directive kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Directive {
    /// Transfers between accounts
    Transaction(Transaction),
    /// Balance assertion
    Balance(Balance),
    /// Open an account
    Open(Open),
    /// Close an account
    Close(Close),
    /// Declare a commodity
    Commodity(Commodity),
    /// Pad an account
    Pad(Pad),
    /// Record an event value
    Event(Event),
    /// Named query
    Query(Query),
    /// Note on an account
    Note(Note),
    /// Document attached to an account
    Document(Document),
    /// Commodity price
    Price(Price),
    /// User-defined directive
    Custom(Custom),
}

impl Directive {
    /// Get the date of this directive.
    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        match self {
            Self::Transaction(t) => t.date,
            Self::Balance(b) => b.date,
            Self::Open(o) => o.date,
            Self::Close(c) => c.date,
            Self::Commodity(c) => c.date,
            Self::Pad(p) => p.date,
            Self::Event(e) => e.date,
            Self::Query(q) => q.date,
            Self::Note(n) => n.date,
            Self::Document(d) => d.date,
            Self::Price(p) => p.date,
            Self::Custom(c) => c.date,
        }
    }

    /// Get the metadata of this directive.
    #[must_use]
    pub const fn meta(&self) -> &Metadata {
        match self {
            Self::Transaction(t) => &t.meta,
            Self::Balance(b) => &b.meta,
            Self::Open(o) => &o.meta,
            Self::Close(c) => &c.meta,
            Self::Commodity(c) => &c.meta,
            Self::Pad(p) => &p.meta,
            Self::Event(e) => &e.meta,
            Self::Query(q) => &q.meta,
            Self::Note(n) => &n.meta,
            Self::Document(d) => &d.meta,
            Self::Price(p) => &p.meta,
            Self::Custom(c) => &c.meta,
        }
    }

    /// Get mutable access to the metadata of this directive.
    pub fn meta_mut(&mut self) -> &mut Metadata {
        match self {
            Self::Transaction(t) => &mut t.meta,
            Self::Balance(b) => &mut b.meta,
            Self::Open(o) => &mut o.meta,
            Self::Close(c) => &mut c.meta,
            Self::Commodity(c) => &mut c.meta,
            Self::Pad(p) => &mut p.meta,
            Self::Event(e) => &mut e.meta,
            Self::Query(q) => &mut q.meta,
            Self::Note(n) => &mut n.meta,
            Self::Document(d) => &mut d.meta,
            Self::Price(p) => &mut p.meta,
            Self::Custom(c) => &mut c.meta,
        }
    }

    /// The keyword naming this directive kind (`"txn"` for transactions).
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Transaction(_) => "txn",
            Self::Balance(_) => "balance",
            Self::Open(_) => "open",
            Self::Close(_) => "close",
            Self::Commodity(_) => "commodity",
            Self::Pad(_) => "pad",
            Self::Event(_) => "event",
            Self::Query(_) => "query",
            Self::Note(_) => "note",
            Self::Document(_) => "document",
            Self::Price(_) => "price",
            Self::Custom(_) => "custom",
        }
    }

    /// Get the transaction if this is one.
    #[must_use]
    pub const fn as_transaction(&self) -> Option<&Transaction> {
        match self {
            Self::Transaction(t) => Some(t),
            _ => None,
        }
    }
}

/// A transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction date
    pub date: NaiveDate,
    /// Transaction flag (`*`, `!`, ...)
    pub flag: char,
    /// Payee, when two strings were written
    pub payee: Option<String>,
    /// Narration
    pub narration: String,
    /// Tags, including any pushed with `pushtag`
    pub tags: BTreeSet<String>,
    /// Links
    pub links: BTreeSet<String>,
    /// Transaction metadata
    pub meta: Metadata,
    /// Postings in source order
    pub postings: Vec<Posting>,
    /// Booking method override from `booking:` metadata
    #[serde(default, with = "serde_interned")]
    pub booking: Option<&'static Booking>,
}

impl Transaction {
    /// Create a new transaction with flag `*`.
    #[must_use]
    pub fn new(date: NaiveDate, narration: impl Into<String>) -> Self {
        Self {
            date,
            flag: '*',
            payee: None,
            narration: narration.into(),
            tags: BTreeSet::new(),
            links: BTreeSet::new(),
            meta: Metadata::new(),
            postings: Vec::new(),
            booking: None,
        }
    }

    /// Set the flag.
    #[must_use]
    pub const fn with_flag(mut self, flag: char) -> Self {
        self.flag = flag;
        self
    }

    /// Set the payee.
    #[must_use]
    pub fn with_payee(mut self, payee: impl Into<String>) -> Self {
        self.payee = Some(payee.into());
        self
    }

    /// Add a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Add a link.
    #[must_use]
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.links.insert(link.into());
        self
    }

    /// Add a posting.
    #[must_use]
    pub fn with_posting(mut self, posting: Posting) -> Self {
        self.postings.push(posting);
        self
    }
}

/// A balance assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Assertion date
    pub date: NaiveDate,
    /// Account to check
    pub account: String,
    /// Expected amount
    pub amount: Amount,
    /// Explicit tolerance written after `~`
    pub tolerance: Option<Decimal>,
    /// Metadata
    pub meta: Metadata,
}

impl Balance {
    /// Create a new balance assertion.
    #[must_use]
    pub fn new(date: NaiveDate, account: impl Into<String>, amount: Amount) -> Self {
        Self {
            date,
            account: account.into(),
            amount,
            tolerance: None,
            meta: Metadata::new(),
        }
    }

    /// Set the tolerance.
    #[must_use]
    pub const fn with_tolerance(mut self, tolerance: Decimal) -> Self {
        self.tolerance = Some(tolerance);
        self
    }
}

/// Opens an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Open {
    /// Open date
    pub date: NaiveDate,
    /// Account name
    pub account: String,
    /// Currency constraints, empty when unconstrained
    pub currencies: Vec<String>,
    /// Booking method for the account
    #[serde(default, with = "serde_interned")]
    pub booking: Option<&'static Booking>,
    /// Metadata
    pub meta: Metadata,
}

impl Open {
    /// Create a new open directive.
    #[must_use]
    pub fn new(date: NaiveDate, account: impl Into<String>) -> Self {
        Self {
            date,
            account: account.into(),
            currencies: Vec::new(),
            booking: None,
            meta: Metadata::new(),
        }
    }

    /// Set the currency constraints.
    #[must_use]
    pub fn with_currencies(mut self, currencies: Vec<String>) -> Self {
        self.currencies = currencies;
        self
    }

    /// Set the booking method.
    #[must_use]
    pub fn with_booking(mut self, booking: Booking) -> Self {
        self.booking = Some(booking.interned());
        self
    }
}

/// Closes an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Close {
    /// Close date
    pub date: NaiveDate,
    /// Account name
    pub account: String,
    /// Metadata
    pub meta: Metadata,
}

impl Close {
    /// Create a new close directive.
    #[must_use]
    pub fn new(date: NaiveDate, account: impl Into<String>) -> Self {
        Self {
            date,
            account: account.into(),
            meta: Metadata::new(),
        }
    }
}

/// Declares a commodity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commodity {
    /// Declaration date
    pub date: NaiveDate,
    /// Currency code
    pub currency: String,
    /// Metadata
    pub meta: Metadata,
}

/// Pads `account` from `source_account` up to the next balance assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pad {
    /// Pad date
    pub date: NaiveDate,
    /// Account to pad
    pub account: String,
    /// Account the padding comes from
    pub source_account: String,
    /// Metadata
    pub meta: Metadata,
}

/// Records the value of a named event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event date
    pub date: NaiveDate,
    /// Event type (e.g., "location")
    pub event_type: String,
    /// Event value
    pub value: String,
    /// Metadata
    pub meta: Metadata,
}

/// A named query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Query date
    pub date: NaiveDate,
    /// Query name
    pub name: String,
    /// Query text
    pub query: String,
    /// Metadata
    pub meta: Metadata,
}

/// A note on an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Note date
    pub date: NaiveDate,
    /// Account
    pub account: String,
    /// Note text
    pub comment: String,
    /// Metadata
    pub meta: Metadata,
}

/// A document attached to an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Document date
    pub date: NaiveDate,
    /// Account
    pub account: String,
    /// Path as written, never resolved
    pub path: String,
    /// Tags
    pub tags: BTreeSet<String>,
    /// Links
    pub links: BTreeSet<String>,
    /// Metadata
    pub meta: Metadata,
}

/// A commodity price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Price date
    pub date: NaiveDate,
    /// Commodity being priced
    pub currency: String,
    /// Price of one unit
    pub amount: Amount,
    /// Metadata
    pub meta: Metadata,
}

/// A user-defined directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Custom {
    /// Directive date
    pub date: NaiveDate,
    /// Custom type name (the first string)
    pub custom_type: String,
    /// Remaining values in source order
    pub values: Vec<MetaValue>,
    /// Metadata
    pub meta: Metadata,
}

impl Custom {
    /// Create a new custom directive.
    #[must_use]
    pub fn new(date: NaiveDate, custom_type: impl Into<String>) -> Self {
        Self {
            date,
            custom_type: custom_type.into(),
            values: Vec::new(),
            meta: Metadata::new(),
        }
    }

    /// Append a value.
    #[must_use]
    pub fn with_value(mut self, value: MetaValue) -> Self {
        self.values.push(value);
        self
    }
}
