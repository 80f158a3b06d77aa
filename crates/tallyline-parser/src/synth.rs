//! Directive synthesis.
//!
//! Turns syntax nodes into [`Directive`]s. Everything the grammar kept as raw
//! text is validated here, and a failure drops the smallest enclosing unit:
//!
//! - a posting's account, units or metadata: the posting;
//! - a cost component: the cost specification;
//! - a price amount: the price annotation;
//! - anything else: the whole directive.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tallyline_core::{
    Amount, Balance, Booking, Close, Commodity, CostSpec, Custom, Directive, Document, Event,
    IncompleteAmount, InternedStr, MetaValue, Metadata, Note, Open, Pad, Posting,
    PriceAnnotation, Query, StringInterner, Transaction,
};
use tracing::trace;

use crate::config::ParserConfig;
use crate::error::{directive_context, ParseError, ParseErrorKind};
use crate::syntax::{
    CostField, CostNode, DatedNode, MetaNode, Num, PostingNode, PriceNode, UnitsNode, ValueNode,
    Word,
};
use crate::Span;

/// Longest accepted currency code.
const MAX_CURRENCY_LEN: usize = 24;

/// Parse a `YYYY-MM-DD` or `YYYY/MM/DD` date, requiring a real calendar day
/// in years 1 through 9999.
pub fn validate_date(text: &str) -> Result<NaiveDate, String> {
    let mut parts = text.split(['-', '/']);
    let mut field = || parts.next().and_then(|p| p.parse::<u32>().ok());
    let (Some(year), Some(month), Some(day)) = (field(), field(), field()) else {
        return Err(format!("'{text}' is not a date"));
    };
    if !(1..=9999).contains(&year) {
        return Err(format!("year {year} is out of range"));
    }
    i32::try_from(year)
        .ok()
        .and_then(|y| NaiveDate::from_ymd_opt(y, month, day))
        .ok_or_else(|| format!("'{text}' is not a calendar date"))
}

/// Whether `name` has an allowed root and at least one sub-account segment
/// of ASCII letters, digits and `-` that starts with an uppercase letter or a
/// digit.
pub fn is_valid_account(name: &str, roots: &[String]) -> bool {
    let mut segments = name.split(':');
    let Some(root) = segments.next() else {
        return false;
    };
    if !roots.iter().any(|r| r == root) {
        return false;
    }
    let mut count = 0;
    for segment in segments {
        let mut chars = segment.chars();
        let lead_ok = chars
            .next()
            .is_some_and(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
        if !lead_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return false;
        }
        count += 1;
    }
    count > 0
}

/// Whether `code` is 1-24 characters of `A-Z 0-9 . _ -`, starting with a
/// letter and ending with a letter or digit.
pub fn is_valid_currency(code: &str) -> bool {
    let bytes = code.as_bytes();
    let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
        return false;
    };
    bytes.len() <= MAX_CURRENCY_LEN
        && first.is_ascii_uppercase()
        && (last.is_ascii_uppercase() || last.is_ascii_digit())
        && bytes
            .iter()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b"._-".contains(b))
}

/// Validates syntax nodes and builds directives.
pub struct Synthesizer<'a> {
    source: &'a str,
    roots: &'a [String],
    interner: StringInterner,
    diagnostics: Vec<ParseError>,
}

impl<'a> Synthesizer<'a> {
    /// Create a synthesizer for one source text.
    pub fn new(source: &'a str, config: &'a ParserConfig) -> Self {
        Self {
            source,
            roots: &config.account_roots,
            interner: StringInterner::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Diagnostics recorded so far.
    pub fn into_diagnostics(self) -> Vec<ParseError> {
        self.diagnostics
    }

    /// Number of distinct currencies seen.
    pub fn currency_count(&self) -> usize {
        self.interner.len()
    }

    /// Build a directive, or record why it was dropped.
    ///
    /// Dropping the directive also discards what was recorded for its
    /// postings and clauses, leaving one diagnostic for the directive.
    pub fn directive(
        &mut self,
        date: Word<'_>,
        node: DatedNode<'_>,
        meta: Vec<MetaNode<'_>>,
        span: Span,
    ) -> Option<Directive> {
        let mark = self.diagnostics.len();
        let keyword = node.keyword();
        match self.try_directive(date, node, meta, span) {
            Ok(directive) => Some(directive),
            Err(err) => {
                trace!(span = %span, error = %err, "dropping directive");
                self.diagnostics.truncate(mark);
                self.diagnostics
                    .push(err.with_scope(span).with_context(directive_context(keyword)));
                None
            }
        }
    }

    fn try_directive(
        &mut self,
        date: Word<'_>,
        node: DatedNode<'_>,
        meta: Vec<MetaNode<'_>>,
        span: Span,
    ) -> Result<Directive, ParseError> {
        let date = self.date(date)?;
        let booking = match node {
            DatedNode::Transaction { .. } => self.booking_override(&meta)?,
            _ => None,
        };
        let meta = self.metadata(&meta)?;

        Ok(match node {
            DatedNode::Transaction {
                flag,
                payee,
                narration,
                tags,
                links,
                postings,
            } => {
                let mut txn = Transaction::new(date, narration.map(|t| t.value).unwrap_or_default());
                txn.flag = flag;
                txn.payee = payee.map(|t| t.value);
                txn.tags = tags.into_iter().map(str::to_string).collect();
                txn.links = links.into_iter().map(str::to_string).collect();
                txn.meta = meta;
                txn.booking = booking;
                for posting in postings {
                    txn.postings.extend(self.posting(posting, span));
                }
                Directive::Transaction(txn)
            }
            DatedNode::Open {
                account,
                currencies,
                booking,
            } => {
                let mut open = Open::new(date, self.account(account)?);
                open.currencies = currencies
                    .into_iter()
                    .map(|c| self.currency(c).map(|c| c.to_string()))
                    .collect::<Result<_, _>>()?;
                open.booking = booking
                    .map(|text| {
                        Booking::from_keyword(&text.value).ok_or_else(|| {
                            ParseError::new(ParseErrorKind::UnknownBooking(text.value), text.span)
                        })
                    })
                    .transpose()?;
                open.meta = meta;
                Directive::Open(open)
            }
            DatedNode::Close { account } => {
                let mut close = Close::new(date, self.account(account)?);
                close.meta = meta;
                Directive::Close(close)
            }
            DatedNode::Commodity { currency } => Directive::Commodity(Commodity {
                date,
                currency: self.currency(currency)?.to_string(),
                meta,
            }),
            DatedNode::Pad { account, source } => Directive::Pad(Pad {
                date,
                account: self.account(account)?,
                source_account: self.account(source)?,
                meta,
            }),
            DatedNode::Balance {
                account,
                number,
                tolerance,
                currency,
            } => {
                let account = self.account(account)?;
                let amount = Amount::new(self.number(number)?, self.currency(currency)?);
                let mut balance = Balance::new(date, account, amount);
                balance.tolerance = tolerance.map(|t| self.number(t)).transpose()?;
                balance.meta = meta;
                Directive::Balance(balance)
            }
            DatedNode::Price {
                currency,
                number,
                quote,
            } => Directive::Price(tallyline_core::Price {
                date,
                currency: self.currency(currency)?.to_string(),
                amount: Amount::new(self.number(number)?, self.currency(quote)?),
                meta,
            }),
            DatedNode::Note { account, comment } => Directive::Note(Note {
                date,
                account: self.account(account)?,
                comment: comment.value,
                meta,
            }),
            DatedNode::Event { event_type, value } => Directive::Event(Event {
                date,
                event_type: event_type.value,
                value: value.value,
                meta,
            }),
            DatedNode::Query { name, query } => Directive::Query(Query {
                date,
                name: name.value,
                query: query.value,
                meta,
            }),
            DatedNode::Document {
                account,
                path,
                tags,
                links,
            } => Directive::Document(Document {
                date,
                account: self.account(account)?,
                path: path.value,
                tags: tags.into_iter().map(str::to_string).collect::<BTreeSet<_>>(),
                links: links.into_iter().map(str::to_string).collect::<BTreeSet<_>>(),
                meta,
            }),
            DatedNode::Custom {
                custom_type,
                values,
            } => {
                let mut custom = Custom::new(date, custom_type.value);
                for value in &values {
                    custom.values.push(self.meta_value(value)?);
                }
                custom.meta = meta;
                Directive::Custom(custom)
            }
        })
    }

    /// The booking named by a transaction's `booking:` string metadata.
    fn booking_override(
        &self,
        meta: &[MetaNode<'_>],
    ) -> Result<Option<&'static Booking>, ParseError> {
        let Some(node) = meta.iter().rev().find(|m| m.key == "booking") else {
            return Ok(None);
        };
        match &node.value {
            ValueNode::String(text) => Booking::from_keyword(&text.value)
                .map(Some)
                .ok_or_else(|| {
                    ParseError::new(
                        ParseErrorKind::UnknownBooking(text.value.clone()),
                        text.span,
                    )
                }),
            _ => Ok(None),
        }
    }

    /// Build a posting, or record why it was dropped.
    fn posting(&mut self, node: PostingNode<'_>, txn_span: Span) -> Option<Posting> {
        let core = self.account(node.account).and_then(|account| {
            let units = node.units.map(|u| self.units(u)).transpose()?;
            let meta = self.metadata(&node.meta)?;
            Ok((account, units, meta))
        });
        let (account, units, meta) = match core {
            Ok(core) => core,
            Err(err) => {
                // The posting's metadata lines go with it.
                let scope = node
                    .meta
                    .last()
                    .map_or(node.span, |m| node.span.merge(&m.span));
                trace!(span = %scope, error = %err, "dropping posting");
                self.diagnostics
                    .push(err.with_scope(scope).with_context("in posting"));
                return None;
            }
        };

        let cost = node.cost.and_then(|cost| {
            let scope = cost.span;
            self.cost(&cost)
                .map_err(|err| self.record_clause(err, scope, "cost specification"))
                .ok()
        });
        let price = node.price.and_then(|price| {
            self.price(price)
                .map_err(|err| self.record_clause(err, price.span, "price annotation"))
                .ok()
        });

        Some(Posting {
            account,
            units,
            cost,
            price,
            flag: node.flag,
            meta,
            span: node.span,
            txn_span,
        })
    }

    fn record_clause(&mut self, err: ParseError, scope: Span, what: &str) {
        trace!(span = %scope, error = %err, "dropping {what}");
        self.diagnostics.push(err.with_scope(scope));
    }

    fn cost(&mut self, node: &CostNode<'_>) -> Result<CostSpec, ParseError> {
        let mut spec = CostSpec::empty();
        let mut seen: Vec<&'static str> = Vec::new();
        for group in &node.groups {
            let name = group.field.name();
            if seen.contains(&name) {
                return Err(ParseError::new(
                    ParseErrorKind::DuplicateCostField(name.to_string()),
                    group.span,
                ));
            }
            seen.push(name);

            match &group.field {
                CostField::Amount {
                    per,
                    total,
                    currency,
                    ..
                } => {
                    let per = per.map(|n| self.number(n)).transpose()?;
                    let total = total.map(|n| self.number(n)).transpose()?;
                    if node.total_brace {
                        spec.number_total = per;
                    } else {
                        spec.number_per = per;
                        spec.number_total = total;
                    }
                    if let Some(currency) = currency {
                        spec.currency = Some(self.currency(*currency)?);
                    }
                }
                CostField::Date(word) => spec.date = Some(self.date(*word)?),
                CostField::Label(text) => spec.label = Some(text.value.clone()),
                CostField::Merge => spec.merge = true,
            }
        }
        Ok(spec)
    }

    fn price(&mut self, node: PriceNode<'_>) -> Result<PriceAnnotation, ParseError> {
        Ok(PriceAnnotation {
            kind: node.kind,
            amount: node.amount.map(|u| self.units(u)).transpose()?,
        })
    }

    fn units(&mut self, node: UnitsNode<'_>) -> Result<IncompleteAmount, ParseError> {
        Ok(match node {
            UnitsNode::Complete(number, currency) => {
                let number = self.number(number)?;
                IncompleteAmount::Complete(Amount::new(number, self.currency(currency)?))
            }
            UnitsNode::NumberOnly(number) => IncompleteAmount::NumberOnly(self.number(number)?),
            UnitsNode::CurrencyOnly(currency) => {
                IncompleteAmount::CurrencyOnly(self.currency(currency)?)
            }
        })
    }

    /// Build a metadata map. Later keys replace earlier ones.
    fn metadata(&mut self, nodes: &[MetaNode<'_>]) -> Result<Metadata, ParseError> {
        let mut meta = Metadata::new();
        for node in nodes {
            meta.insert(node.key.to_string(), self.meta_value(&node.value)?);
        }
        Ok(meta)
    }

    /// Validate one metadata or custom value.
    pub fn meta_value(&mut self, value: &ValueNode<'_>) -> Result<MetaValue, ParseError> {
        Ok(match value {
            ValueNode::String(text) => MetaValue::String(text.value.clone()),
            ValueNode::Account(word) => MetaValue::Account(self.account(*word)?),
            ValueNode::Currency(word) => MetaValue::Currency(self.currency(*word)?.to_string()),
            ValueNode::Tag(tag) => MetaValue::Tag((*tag).to_string()),
            ValueNode::Link(link) => MetaValue::Link((*link).to_string()),
            ValueNode::Date(word) => MetaValue::Date(self.date(*word)?),
            ValueNode::Number(number) => MetaValue::Number(self.number(*number)?),
            ValueNode::Bool(b) => MetaValue::Bool(*b),
            ValueNode::Amount(number, currency) => {
                let number = self.number(*number)?;
                MetaValue::Amount(Amount::new(number, self.currency(*currency)?))
            }
            ValueNode::None => MetaValue::None,
        })
    }

    fn date(&self, word: Word<'_>) -> Result<NaiveDate, ParseError> {
        validate_date(word.text)
            .map_err(|reason| ParseError::new(ParseErrorKind::InvalidDateValue(reason), word.span))
    }

    fn account(&self, word: Word<'_>) -> Result<String, ParseError> {
        if is_valid_account(word.text, self.roots) {
            Ok(word.text.to_string())
        } else {
            Err(ParseError::new(
                ParseErrorKind::InvalidAccount(word.text.to_string()),
                word.span,
            )
            .with_hint(format!("account roots are {}", self.roots.join(", "))))
        }
    }

    fn currency(&mut self, word: Word<'_>) -> Result<InternedStr, ParseError> {
        if is_valid_currency(word.text) {
            Ok(self.interner.intern(word.text))
        } else {
            Err(ParseError::new(
                ParseErrorKind::InvalidCurrency(word.text.to_string()),
                word.span,
            ))
        }
    }

    fn number(&self, num: Num) -> Result<Decimal, ParseError> {
        num.value.ok_or_else(|| {
            ParseError::new(
                ParseErrorKind::InvalidNumber(num.span.text(self.source).to_string()),
                num.span,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Grammar;
    use crate::grammar::GrammarParser;
    use crate::lexer::tokenize;
    use crate::syntax::EntryNode;
    use rust_decimal_macros::dec;

    fn roots() -> Vec<String> {
        crate::config::DEFAULT_ACCOUNT_ROOTS
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    fn synthesize(source: &str) -> (Vec<Directive>, Vec<ParseError>) {
        let config = ParserConfig::default();
        let tokens = tokenize(source);
        let mut grammar = GrammarParser::new(Grammar::Full);
        let entries = grammar.parse(&tokens);
        let mut diagnostics = grammar.into_diagnostics();
        let mut synth = Synthesizer::new(source, &config);
        let directives = entries
            .into_iter()
            .filter_map(|entry| match entry.node {
                EntryNode::Dated { date, node, meta } => synth.directive(date, node, meta, entry.span),
                _ => None,
            })
            .collect();
        diagnostics.extend(synth.into_diagnostics());
        (directives, diagnostics)
    }

    #[test]
    fn test_validate_date() {
        assert_eq!(
            validate_date("2024-02-29"),
            Ok(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        );
        assert_eq!(
            validate_date("2024/01/15"),
            Ok(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
        );
        assert!(validate_date("2023-02-29").is_err());
        assert!(validate_date("2024-13-01").is_err());
        assert!(validate_date("0000-01-01").is_err());
    }

    #[test]
    fn test_account_validation() {
        let roots = roots();
        assert!(is_valid_account("Assets:Cash", &roots));
        assert!(!is_valid_account("Expenses:Food:Café", &roots));
        assert!(!is_valid_account("Assets:Épargne", &roots));
        assert!(is_valid_account("Liabilities:2024-Card", &roots));
        assert!(!is_valid_account("Assets", &roots));
        assert!(!is_valid_account("Asset:Cash", &roots));
        assert!(!is_valid_account("Assets:cash", &roots));
        assert!(!is_valid_account("Assets:Cash_Box", &roots));
    }

    #[test]
    fn test_currency_validation() {
        assert!(is_valid_currency("USD"));
        assert!(is_valid_currency("VBMPX"));
        assert!(is_valid_currency("BRK.B"));
        assert!(is_valid_currency("NT.TO2"));
        assert!(is_valid_currency("V"));
        assert!(!is_valid_currency("AB'C"));
        assert!(!is_valid_currency(""));
        assert!(!is_valid_currency("USD-"));
        assert!(!is_valid_currency("1USD"));
        assert!(!is_valid_currency(&"A".repeat(25)));
    }

    #[test]
    fn test_invalid_date_drops_directive() {
        let source = "2024-02-30 open Assets:Cash\n2024-03-01 open Assets:Bank\n";
        let (directives, diagnostics) = synthesize(source);
        assert_eq!(directives.len(), 1);
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(
            diagnostics[0].kind,
            ParseErrorKind::InvalidDateValue(_)
        ));
        assert_eq!(diagnostics[0].span.text(source), "2024-02-30");
        assert_eq!(diagnostics[0].scope.text(source), "2024-02-30 open Assets:Cash");
        assert_eq!(diagnostics[0].context.as_deref(), Some("in open directive"));
    }

    #[test]
    fn test_bad_posting_account_drops_posting() {
        let source = "2024-01-01 *\n  Assests:Cash 1 USD\n  Expenses:Food -1 USD\n";
        let (directives, diagnostics) = synthesize(source);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].scope.text(source), "Assests:Cash 1 USD");
        assert_eq!(diagnostics[0].context.as_deref(), Some("in posting"));
        let txn = directives[0].as_transaction().unwrap();
        assert_eq!(txn.postings.len(), 1);
        assert_eq!(txn.postings[0].account, "Expenses:Food");
    }

    #[test]
    fn test_bad_posting_metadata_drops_posting() {
        let source = "2024-01-01 *\n  Assets:Cash 10 USD\n    when: 2024-02-30\n  Expenses:Food -10 USD\n";
        let (directives, diagnostics) = synthesize(source);
        assert_eq!(directives.len(), 1);
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(
            diagnostics[0].kind,
            ParseErrorKind::InvalidDateValue(_)
        ));
        assert_eq!(diagnostics[0].span.text(source), "2024-02-30");
        assert_eq!(
            diagnostics[0].scope.text(source),
            "Assets:Cash 10 USD\n    when: 2024-02-30"
        );
        let txn = directives[0].as_transaction().unwrap();
        assert_eq!(txn.postings.len(), 1);
        assert_eq!(txn.postings[0].account, "Expenses:Food");
    }

    #[test]
    fn test_dropped_directive_discards_posting_diagnostics() {
        let source = "2024-02-30 *\n  Assests:Cash 1 USD\n  Assets:Stock 1 AAPL {1 USD, 2024-01-01, 2024-01-02}\n";
        let (directives, diagnostics) = synthesize(source);
        assert!(directives.is_empty());
        assert_eq!(diagnostics.len(), 1, "{diagnostics:?}");
        assert!(matches!(
            diagnostics[0].kind,
            ParseErrorKind::InvalidDateValue(_)
        ));
        assert_eq!(diagnostics[0].scope, Span::new(0, source.len() - 1));
    }

    #[test]
    fn test_duplicate_cost_date() {
        let source = "2024-01-01 *\n  Assets:Stock 10 AAPL {100 USD, 2024-01-01, 2024-01-02}\n";
        let (directives, diagnostics) = synthesize(source);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].kind,
            ParseErrorKind::DuplicateCostField("date".to_string())
        );
        assert_eq!(
            diagnostics[0].scope.text(source),
            "{100 USD, 2024-01-01, 2024-01-02}"
        );
        let txn = directives[0].as_transaction().unwrap();
        assert!(txn.postings[0].cost.is_none());
        assert!(txn.postings[0].units.is_some());
    }

    #[test]
    fn test_total_brace_and_compound_cost() {
        let source = "2024-01-01 *\n  Assets:A 10 AAPL {{1000 USD}}\n  Assets:B 10 AAPL {100 # 9.95 USD}\n";
        let (directives, diagnostics) = synthesize(source);
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        let txn = directives[0].as_transaction().unwrap();
        let total = txn.postings[0].cost.as_ref().unwrap();
        assert_eq!(total.number_per, None);
        assert_eq!(total.number_total, Some(dec!(1000)));
        let compound = txn.postings[1].cost.as_ref().unwrap();
        assert_eq!(compound.number_per, Some(dec!(100)));
        assert_eq!(compound.number_total, Some(dec!(9.95)));
        assert_eq!(compound.currency.as_deref(), Some("USD"));
    }

    #[test]
    fn test_unknown_booking_drops_open() {
        let (directives, diagnostics) = synthesize("2024-01-01 open Assets:Cash USD \"FIRST\"\n");
        assert!(directives.is_empty());
        assert_eq!(
            diagnostics[0].kind,
            ParseErrorKind::UnknownBooking("FIRST".to_string())
        );
    }

    #[test]
    fn test_transaction_booking_override() {
        let source = "2024-01-01 * \"sell\"\n  booking: \"LIFO\"\n  Assets:Stock -1 AAPL {}\n";
        let (directives, diagnostics) = synthesize(source);
        assert!(diagnostics.is_empty());
        let txn = directives[0].as_transaction().unwrap();
        assert!(std::ptr::eq(txn.booking.unwrap(), Booking::Lifo.interned()));
    }

    #[test]
    fn test_currencies_are_interned() {
        let config = ParserConfig::default();
        let source = "2024-01-01 *\n  Assets:A 1 USD\n  Assets:B -1 USD\n";
        let tokens = tokenize(source);
        let mut grammar = GrammarParser::new(Grammar::Full);
        let mut synth = Synthesizer::new(source, &config);
        let mut directives = Vec::new();
        for entry in grammar.parse(&tokens) {
            if let EntryNode::Dated { date, node, meta } = entry.node {
                directives.extend(synth.directive(date, node, meta, entry.span));
            }
        }
        assert_eq!(synth.currency_count(), 1);
        let txn = directives[0].as_transaction().unwrap();
        let a = txn.postings[0].amount().unwrap();
        let b = txn.postings[1].amount().unwrap();
        assert!(a.currency.ptr_eq(&b.currency));
    }

    #[test]
    fn test_metadata_last_key_wins() {
        let source = "2024-01-01 open Assets:Cash\n  note: \"a\"\n  note: \"b\"\n";
        let (directives, _) = synthesize(source);
        assert_eq!(
            directives[0].meta().get("note"),
            Some(&MetaValue::String("b".to_string()))
        );
    }
}
