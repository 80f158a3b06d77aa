//! Integration tests for the parser crate.
//!
//! Tests cover every directive type, error containment, and the public
//! configuration surface.

use rust_decimal_macros::dec;
use tallyline_core::{Booking, Directive, IncompleteAmount, MetaValue, NaiveDate, PriceKind};
use tallyline_parser::{
    parse, parse_fragment, parse_with, ErrorClass, FatalError, ParseErrorKind, ParsedFile,
    ParserConfig, Span,
};

// ============================================================================
// Helper Functions
// ============================================================================

fn parse_ok(source: &str) -> ParsedFile {
    let result = parse(source);
    assert!(
        result.diagnostics.is_empty(),
        "expected no diagnostics, got: {:?}",
        result.diagnostics
    );
    result
}

fn count_directive_type(result: &ParsedFile, type_name: &str) -> usize {
    result
        .directives
        .iter()
        .filter(|d| d.value.type_name() == type_name)
        .count()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ============================================================================
// Basic Directive Parsing
// ============================================================================

#[test]
fn test_parse_open_directive() {
    let result = parse_ok("2020-02-01 open Assets:Bank:Test USTC");
    assert_eq!(count_directive_type(&result, "open"), 1);

    if let Directive::Open(open) = &result.directives[0].value {
        assert_eq!(open.date, date(2020, 2, 1));
        assert_eq!(open.account, "Assets:Bank:Test");
        assert_eq!(open.currencies, vec!["USTC"]);
        assert!(open.booking.is_none());
    } else {
        panic!("expected open directive");
    }
}

#[test]
fn test_parse_transaction_with_elided_amount() {
    let source = r#"
2014-05-05 * "Cafe Mogador" "Lamb tagine with wine"
  Liabilities:CreditCard:CapitalOne         -37.45 USD
  Expenses:Restaurant
"#;
    let result = parse_ok(source);
    let txn = result.directives[0].value.as_transaction().unwrap();
    assert_eq!(txn.flag, '*');
    assert_eq!(txn.payee.as_deref(), Some("Cafe Mogador"));
    assert_eq!(txn.narration, "Lamb tagine with wine");
    assert_eq!(txn.postings.len(), 2);

    let first = txn.postings[0].amount().unwrap();
    assert_eq!(first.number, dec!(-37.45));
    assert_eq!(first.currency, "USD");
    assert!(txn.postings[1].units.is_none());
}

#[test]
fn test_parse_price_annotations() {
    let source = r#"
2024-01-01 * "Exchange"
  Assets:UK   23391.81 GBP @ 1.71 USD
  Assets:US
2024-01-02 * "Exchange total"
  Assets:UK   23391.81 GBP @@ 1.71 USD
  Assets:US
"#;
    let result = parse_ok(source);
    for (directive, kind) in result
        .directives
        .iter()
        .zip([PriceKind::PerUnit, PriceKind::Total])
    {
        let posting = &directive.value.as_transaction().unwrap().postings[0];
        let units = posting.amount().unwrap();
        assert_eq!(units.number, dec!(23391.81));
        assert_eq!(units.currency, "GBP");

        let price = posting.price.as_ref().unwrap();
        assert_eq!(price.kind, kind);
        let amount = price.amount.as_ref().and_then(IncompleteAmount::as_amount).unwrap();
        assert_eq!(amount.number, dec!(1.71));
        assert_eq!(amount.currency, "USD");
    }
}

#[test]
fn test_include_is_collected_not_resolved() {
    let result = parse_ok("include \"a.bean\"\n");
    assert_eq!(result.includes.len(), 1);
    assert_eq!(result.includes[0].value, "a.bean");
    assert!(result.directives.is_empty());
}

#[test]
fn test_duplicate_cost_field_drops_only_cost() {
    let source = r#"
2024-03-01 * "Buy"
  Assets:Stock    10 AAPL {150.00 USD, 2024-01-01, 2024-02-01}
  Assets:Cash   -1500.00 USD
"#;
    let result = parse(source);
    assert_eq!(result.diagnostics.len(), 1);
    let diag = &result.diagnostics[0];
    assert_eq!(diag.class(), ErrorClass::Semantic);
    assert_eq!(
        diag.kind,
        ParseErrorKind::DuplicateCostField("date".to_string())
    );
    assert_eq!(
        diag.scope.text(source),
        "{150.00 USD, 2024-01-01, 2024-02-01}"
    );

    let txn = result.directives[0].value.as_transaction().unwrap();
    assert_eq!(txn.postings.len(), 2);
    assert!(txn.postings[0].cost.is_none());
    assert_eq!(txn.postings[0].amount().unwrap().number, dec!(10));
}

#[test]
fn test_cost_merge_marker() {
    let source = "2024-03-01 * \"Average\"\n  Assets:Stock  -5 AAPL {100.00 USD, *}\n  Assets:Cash\n";
    let result = parse_ok(source);
    let txn = result.directives[0].value.as_transaction().unwrap();
    let cost = txn.postings[0].cost.as_ref().unwrap();
    assert!(cost.merge);
    assert_eq!(cost.number_per, Some(dec!(100.00)));
    assert_eq!(cost.currency.as_deref(), Some("USD"));
}

#[test]
fn test_currency_codes() {
    let result = parse_ok("2020-02-01 open Assets:Bank:Test V
2020-02-01 open Assets:Bank:Cash P,BRK.B
");
    match (&result.directives[0].value, &result.directives[1].value) {
        (Directive::Open(first), Directive::Open(second)) => {
            assert_eq!(first.currencies, vec!["V"]);
            assert_eq!(second.currencies, vec!["P", "BRK.B"]);
        }
        other => panic!("expected two opens, got {other:?}"),
    }

    let result = parse("2020-02-01 open Assets:Bank:Test AB'C
");
    assert!(result.directives.is_empty());
    assert_eq!(result.diagnostics.len(), 1);

    let result = parse("2020-02-01 commodity USD-
");
    assert!(result.directives.is_empty());
    assert_eq!(
        result.diagnostics[0].kind,
        ParseErrorKind::InvalidCurrency("USD-".to_string())
    );
}

#[test]
fn test_parse_all_directive_types() {
    let source = r#"
option "operating_currency" "USD"
plugin "implicit_prices"
2024-01-01 open Assets:Brokerage USD,AAPL "FIFO"
2024-01-01 commodity AAPL
  name: "Apple"
2024-01-02 pad Assets:Brokerage Equity:Opening
2024-01-03 balance Assets:Brokerage 100.00 ~ 0.01 USD
2024-01-04 price AAPL 185.50 USD
2024-01-05 note Assets:Brokerage "Called the broker"
2024-01-06 event "location" "Lisbon"
2024-01-07 query "cash" "SELECT account WHERE account ~ 'Cash'"
2024-01-08 document Assets:Brokerage "/statements/jan.pdf" #tax ^stmt-1
2024-01-09 custom "budget" Expenses:Food "monthly" 400.00 USD TRUE
2024-01-10 ! "Pending"
  Assets:Brokerage 1 AAPL
  Equity:Opening
2024-12-31 close Assets:Brokerage
"#;
    let result = parse_ok(source);
    for kind in [
        "open", "commodity", "pad", "balance", "price", "note", "event", "query", "document",
        "custom", "txn", "close",
    ] {
        assert_eq!(count_directive_type(&result, kind), 1, "{kind}");
    }
    assert_eq!(result.options[0].name, "operating_currency");
    assert_eq!(result.plugins[0].module, "implicit_prices");

    match &result.directives[3].value {
        Directive::Balance(balance) => {
            assert_eq!(balance.amount.number, dec!(100.00));
            assert_eq!(balance.tolerance, Some(dec!(0.01)));
        }
        other => panic!("expected balance, got {other:?}"),
    }
    match &result.directives[8].value {
        Directive::Document(doc) => {
            assert!(doc.tags.contains("tax"));
            assert!(doc.links.contains("stmt-1"));
        }
        other => panic!("expected document, got {other:?}"),
    }
    match &result.directives[9].value {
        Directive::Custom(custom) => {
            assert_eq!(custom.values.len(), 4);
            assert_eq!(custom.values[3], MetaValue::Bool(true));
        }
        other => panic!("expected custom, got {other:?}"),
    }
    assert_eq!(
        result.directives[1].value.meta().get("name"),
        Some(&MetaValue::String("Apple".to_string()))
    );
}

#[test]
fn test_arithmetic_in_amounts() {
    let source = "2024-01-01 *\n  Expenses:Split (100 + 20) / 3 USD\n  Assets:Cash\n";
    let result = parse_ok(source);
    let txn = result.directives[0].value.as_transaction().unwrap();
    assert_eq!(txn.postings[0].amount().unwrap().number, dec!(40));
}

#[test]
fn test_posting_spans() {
    let source = "2024-01-01 * \"x\"\n  Assets:Cash 1 USD\n  Expenses:Food\n";
    let result = parse_ok(source);
    let directive = &result.directives[0];
    let txn = directive.value.as_transaction().unwrap();
    assert_eq!(txn.postings[0].span.text(source), "Assets:Cash 1 USD");
    for posting in &txn.postings {
        assert_eq!(posting.txn_span, directive.span);
        assert!(directive.span.contains(&posting.span));
    }
}

// ============================================================================
// Error Containment
// ============================================================================

#[test]
fn test_one_bad_directive_among_good_ones() {
    let bad = "2024-01-03 open Assets:Cash USD EUR GBP garbage";
    let source = format!(
        "2024-01-01 open Assets:A\n2024-01-02 open Assets:B\n{bad}\n2024-01-04 open Assets:C\n2024-01-05 close Assets:A\n"
    );
    let result = parse(&source);
    assert_eq!(result.directives.len(), 4);
    assert_eq!(result.diagnostics.len(), 1);
    let start = source.find(bad).unwrap();
    assert_eq!(result.diagnostics[0].scope, Span::new(start, start + bad.len()));
}

#[test]
fn test_diagnostic_points_at_offending_token() {
    let source = "2024-01-01 *\n  Assets:Cash 10 USD EUR\n  Assets:Bank 10 GBP @ 1.71 USD EUR\n  Expenses:Food\n";
    let result = parse(source);
    assert_eq!(result.diagnostics.len(), 2);
    for diag in &result.diagnostics {
        assert_eq!(diag.span.text(source), "EUR");
    }
    assert!(matches!(
        result.diagnostics[0].kind,
        ParseErrorKind::MalformedPosting(_)
    ));
    assert!(matches!(
        result.diagnostics[1].kind,
        ParseErrorKind::MalformedPrice(_)
    ));
    let txn = result.directives[0].value.as_transaction().unwrap();
    assert_eq!(txn.postings.len(), 2);
    assert!(txn.postings[0].price.is_none());
}

#[test]
fn test_bad_posting_metadata_drops_only_the_posting() {
    let source = "2024-01-01 * \"x\"\n  Assets:Cash 10 USD\n    when: 2024-02-30\n  Expenses:Food -10 USD\n";
    let result = parse(source);
    assert_eq!(result.directives.len(), 1);
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(
        result.diagnostics[0].scope.text(source),
        "Assets:Cash 10 USD\n    when: 2024-02-30"
    );
    let txn = result.directives[0].value.as_transaction().unwrap();
    assert_eq!(txn.postings.len(), 1);
    assert_eq!(txn.postings[0].account, "Expenses:Food");
}

#[test]
fn test_dropped_directive_reports_once() {
    let bad = "2024-01-02 *\n  Assets:Stock 10 AAPL {100 USD\n  \"stray\"";
    let source = format!("2024-01-01 open Assets:Stock\n{bad}\n2024-01-03 open Assets:Cash\n");
    let result = parse(&source);
    assert_eq!(result.directives.len(), 2);
    assert_eq!(result.diagnostics.len(), 1, "{:?}", result.diagnostics);
    let start = source.find(bad).unwrap();
    assert_eq!(result.diagnostics[0].scope, Span::new(start, start + bad.len()));
}

#[test]
fn test_lex_error_contained_to_block() {
    let source = "2024-01-01 open Assets:A\n2024-01-02 note Assets:A \"unterminated\n2024-01-03 open Assets:B\n";
    let result = parse(source);
    assert_eq!(result.directives.len(), 2);
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].class(), ErrorClass::Lex);
}

#[test]
fn test_invalid_calendar_date_rejected() {
    let result = parse("2023-02-29 open Assets:Cash\n");
    assert!(result.directives.is_empty());
    assert!(matches!(
        result.diagnostics[0].kind,
        ParseErrorKind::InvalidDateValue(_)
    ));
}

#[test]
fn test_unknown_directive_keyword() {
    let result = parse("2024-01-01 Assets:Cash open\n2024-01-02 open Assets:Cash\n");
    assert_eq!(result.directives.len(), 1);
    assert_eq!(result.diagnostics[0].class(), ErrorClass::Syntax);
}

#[test]
fn test_directives_keep_source_order() {
    let source = "2024-12-01 open Assets:Z\n2020-01-01 open Assets:A\n2022-06-15 close Assets:A\n";
    let result = parse_ok(source);
    let dates: Vec<_> = result.directives.iter().map(|d| d.value.date()).collect();
    assert_eq!(dates, vec![date(2024, 12, 1), date(2020, 1, 1), date(2022, 6, 15)]);
    assert!(result
        .directives
        .windows(2)
        .all(|w| w[0].span.start < w[1].span.start));
}

// ============================================================================
// Booking
// ============================================================================

#[test]
fn test_booking_values_share_identity() {
    let a = parse_ok("2024-01-01 open Assets:A USD \"STRICT\"\n");
    let b = parse_ok("2024-01-01 open Assets:B USD \"STRICT\"\n");
    let booking = |file: &ParsedFile| match &file.directives[0].value {
        Directive::Open(open) => open.booking.unwrap(),
        other => panic!("expected open, got {other:?}"),
    };
    let (x, y) = (booking(&a), booking(&b));
    assert_eq!(x, y);
    assert!(std::ptr::eq(x, y));
    assert_eq!(*x, "STRICT");
    assert_ne!(*x, Booking::Fifo);
}

#[test]
fn test_booking_keywords_are_case_sensitive() {
    let result = parse("2024-01-01 open Assets:A USD \"fifo\"\n");
    assert!(result.directives.is_empty());
    assert_eq!(
        result.diagnostics[0].kind,
        ParseErrorKind::UnknownBooking("fifo".to_string())
    );
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_fragment_grammar() {
    let source = "option \"title\" \"x\"\n2024-01-01 custom \"budget\" 10 USD\n2024-01-01 balance Assets:Cash 1 USD\n";
    let result = parse_fragment(source);
    assert_eq!(result.options.len(), 1);
    assert_eq!(result.directives.len(), 1);
    assert_eq!(
        result.diagnostics[0].kind,
        ParseErrorKind::DirectiveNotAllowed("balance".to_string())
    );
}

#[test]
fn test_custom_account_roots() {
    let config = ParserConfig::default().with_account_roots(["Actifs", "Passifs"]);
    let result = parse_with("2024-01-01 open Actifs:Banque\n2024-01-01 open Assets:Bank\n", &config)
        .unwrap();
    assert_eq!(result.directives.len(), 1);
    assert!(matches!(
        result.diagnostics[0].kind,
        ParseErrorKind::InvalidAccount(_)
    ));
}

#[test]
fn test_input_size_limit_is_fatal() {
    let config = ParserConfig::default().with_max_input_bytes(4);
    assert_eq!(
        parse_with("include \"x\"", &config),
        Err(FatalError::InputTooLarge { size: 11, limit: 4 })
    );
}

#[test]
fn test_reparse_is_deterministic() {
    let source = "2024-01-01 open Assets:A\n2024-01-02 * \"x\"\n  Assets:A 1 USD {2 EUR}\n  bad line\n";
    assert_eq!(parse(source), parse(source));
}
