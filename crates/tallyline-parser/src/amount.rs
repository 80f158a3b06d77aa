//! Value-level grammar: number expressions, amounts, cost components, price
//! amounts and metadata values.
//!
//! These are Chumsky combinators over token slices. The grammar parser cuts a
//! line into regions (units, each cost component, the price amount, a
//! metadata value) and runs one of these over each region with [`run`], which
//! requires the whole region to be consumed.

use chumsky::prelude::*;
use rust_decimal::Decimal;

use crate::lexer::{SpannedToken, Token};
use crate::syntax::{CostField, CostGroup, Num, Text, UnitsNode, ValueNode, Word};
use crate::Span;

/// A line region.
pub type Tokens<'src> = &'src [SpannedToken<'src>];

/// Type alias for parser extra with our token type.
pub type TokExtra<'src> = extra::Err<Rich<'src, SpannedToken<'src>>>;

/// Why a region did not parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// The first token that could not be consumed, or the empty span at the
    /// end of the region.
    pub span: Span,
    /// Description of that token.
    pub found: String,
}

/// Run `parser` over all of `tokens`.
///
/// On failure the rejection points at the first token past the longest
/// prefix the parser accepted, or at the furthest point any alternative
/// reached when no prefix parses.
pub fn run<'src, O>(
    parser: impl Parser<'src, Tokens<'src>, O, TokExtra<'src>>,
    tokens: Tokens<'src>,
) -> Result<O, Rejection> {
    let (output, consumed) = parser
        .map_with(|out, e| (out, e.span().end))
        .then_ignore(any().repeated())
        .parse(tokens)
        .into_result()
        .map_err(|errors| {
            let furthest = errors.iter().map(|e| e.span().start).max();
            rejection(tokens, furthest.unwrap_or(0))
        })?;
    if consumed < tokens.len() {
        return Err(rejection(tokens, consumed));
    }
    Ok(output)
}

fn rejection(tokens: Tokens<'_>, index: usize) -> Rejection {
    match tokens.get(index) {
        Some(token) => Rejection {
            span: token.span,
            found: token.token.describe(),
        },
        None => {
            let end = tokens.last().map_or(0, |t| t.span.end);
            Rejection {
                span: Span::new(end, end),
                found: "end of line".to_string(),
            }
        }
    }
}

// ============================================================================
// Token Matchers (Primitives)
// ============================================================================

/// Match one exact unit token and yield its span.
fn punct<'src>(
    want: Token<'src>,
) -> impl Parser<'src, Tokens<'src>, Span, TokExtra<'src>> + Clone {
    any()
        .filter(move |t: &SpannedToken<'src>| t.token == want)
        .map(|t: SpannedToken<'src>| t.span)
}

/// Parse a number literal, keeping full precision.
fn number<'src>() -> impl Parser<'src, Tokens<'src>, Num, TokExtra<'src>> + Clone {
    any()
        .filter(|t: &SpannedToken<'_>| matches!(t.token, Token::Number(_)))
        .map(|t: SpannedToken<'src>| Num {
            value: match t.token {
                Token::Number(s) => parse_decimal(s),
                _ => None,
            },
            span: t.span,
        })
}

/// A negative literal glued to the previous operand, as in `10-5`.
fn glued_negative<'src>() -> impl Parser<'src, Tokens<'src>, Num, TokExtra<'src>> + Clone {
    number().try_map(|n: Num, span| {
        if n.value.is_some_and(|v| v.is_sign_negative()) {
            Ok(n)
        } else {
            Err(Rich::custom(span, "expected operator"))
        }
    })
}

/// Strip thousands separators and parse without rounding.
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    let clean: String = text.chars().filter(|&c| c != ',').collect();
    Decimal::from_str_exact(&clean).ok()
}

fn currency<'src>() -> impl Parser<'src, Tokens<'src>, Word<'src>, TokExtra<'src>> + Clone {
    any()
        .filter(|t: &SpannedToken<'_>| t.token.currency_text().is_some())
        .map(|t: SpannedToken<'src>| Word {
            text: t.token.currency_text().unwrap_or_default(),
            span: t.span,
        })
}

fn account<'src>() -> impl Parser<'src, Tokens<'src>, Word<'src>, TokExtra<'src>> + Clone {
    any()
        .filter(|t: &SpannedToken<'_>| matches!(t.token, Token::Account(_)))
        .map(|t: SpannedToken<'src>| Word {
            text: match t.token {
                Token::Account(s) => s,
                _ => "",
            },
            span: t.span,
        })
}

fn date<'src>() -> impl Parser<'src, Tokens<'src>, Word<'src>, TokExtra<'src>> + Clone {
    any()
        .filter(|t: &SpannedToken<'_>| matches!(t.token, Token::Date(_)))
        .map(|t: SpannedToken<'src>| Word {
            text: match t.token {
                Token::Date(s) => s,
                _ => "",
            },
            span: t.span,
        })
}

fn string<'src>() -> impl Parser<'src, Tokens<'src>, Text, TokExtra<'src>> + Clone {
    any()
        .filter(|t: &SpannedToken<'_>| matches!(t.token, Token::String(_)))
        .map(|t: SpannedToken<'src>| Text {
            value: match t.token {
                Token::String(s) => unescape(s),
                _ => String::new(),
            },
            span: t.span,
        })
}

fn tag<'src>() -> impl Parser<'src, Tokens<'src>, &'src str, TokExtra<'src>> + Clone {
    any()
        .filter(|t: &SpannedToken<'_>| matches!(t.token, Token::Tag(_)))
        .map(|t: SpannedToken<'src>| match t.token {
            Token::Tag(s) => &s[1..],
            _ => "",
        })
}

fn link<'src>() -> impl Parser<'src, Tokens<'src>, &'src str, TokExtra<'src>> + Clone {
    any()
        .filter(|t: &SpannedToken<'_>| matches!(t.token, Token::Link(_)))
        .map(|t: SpannedToken<'src>| match t.token {
            Token::Link(s) => &s[1..],
            _ => "",
        })
}

/// Decode a string literal, quotes included.
pub fn unescape(literal: &str) -> String {
    let inner = literal
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(literal);
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('\\') => result.push('\\'),
            Some('"') => result.push('"'),
            Some(other) => {
                result.push('\\');
                result.push(other);
            }
            None => result.push('\\'),
        }
    }
    result
}

// ============================================================================
// Compound Parsers
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

fn apply(left: Num, (op, right): (Op, Num)) -> Num {
    let value = match (left.value, right.value) {
        (Some(a), Some(b)) => match op {
            Op::Add => a.checked_add(b),
            Op::Sub => a.checked_sub(b),
            Op::Mul => a.checked_mul(b),
            Op::Div => a.checked_div(b),
        },
        _ => None,
    };
    Num {
        value,
        span: left.span.merge(&right.span),
    }
}

/// Parse an arithmetic expression with standard precedence.
pub fn expr<'src>() -> impl Parser<'src, Tokens<'src>, Num, TokExtra<'src>> + Clone {
    recursive(|expr| {
        let atom = choice((
            punct(Token::LParen)
                .then(expr)
                .then(punct(Token::RParen))
                .map(|((open, inner), close): ((Span, Num), Span)| Num {
                    value: inner.value,
                    span: open.merge(&close),
                }),
            number(),
        ));

        let unary = choice((
            punct(Token::Minus).map(|s| (true, s)),
            punct(Token::Plus).map(|s| (false, s)),
        ))
        .repeated()
        .collect::<Vec<_>>()
        .then(atom)
        .map(|(signs, n): (Vec<(bool, Span)>, Num)| {
            let negate = signs.iter().filter(|(minus, _)| *minus).count() % 2 == 1;
            Num {
                value: if negate { n.value.map(|v| -v) } else { n.value },
                span: signs.first().map_or(n.span, |(_, s)| s.merge(&n.span)),
            }
        });

        let mul_op = choice((
            punct(Token::Star).to(Op::Mul),
            punct(Token::Slash).to(Op::Div),
        ));

        let product = unary
            .clone()
            .foldl(mul_op.clone().then(unary.clone()).repeated(), apply);

        let glued = glued_negative()
            .foldl(mul_op.then(unary).repeated(), apply)
            .map(|n| (Op::Add, n));

        let add_op = choice((
            punct(Token::Plus).to(Op::Add),
            punct(Token::Minus).to(Op::Sub),
        ));

        product
            .clone()
            .foldl(choice((add_op.then(product), glued)).repeated(), apply)
    })
}

/// Units: `expr CURRENCY`, `expr`, or `CURRENCY`.
pub fn units<'src>() -> impl Parser<'src, Tokens<'src>, UnitsNode<'src>, TokExtra<'src>> + Clone {
    choice((
        expr()
            .then(currency())
            .map(|(n, c)| UnitsNode::Complete(n, c)),
        expr().map(UnitsNode::NumberOnly),
        currency().map(UnitsNode::CurrencyOnly),
    ))
}

/// The optional amount after `@` or `@@`.
pub fn price_amount<'src>(
) -> impl Parser<'src, Tokens<'src>, Option<UnitsNode<'src>>, TokExtra<'src>> + Clone {
    units().or_not()
}

/// `expr [~ expr] CURRENCY` as written in a balance assertion.
pub fn balance_amount<'src>(
) -> impl Parser<'src, Tokens<'src>, (Num, Option<Num>, Word<'src>), TokExtra<'src>> + Clone {
    expr()
        .then(punct(Token::Tilde).ignore_then(expr()).or_not())
        .then(currency())
        .map(|((number, tolerance), currency)| (number, tolerance, currency))
}

/// `expr CURRENCY`.
pub fn amount<'src>() -> impl Parser<'src, Tokens<'src>, (Num, Word<'src>), TokExtra<'src>> + Clone
{
    expr().then(currency())
}

/// One comma-separated component of a cost block.
pub fn cost_group<'src>() -> impl Parser<'src, Tokens<'src>, CostGroup<'src>, TokExtra<'src>> + Clone
{
    let compound = expr()
        .or_not()
        .then(punct(Token::Hash).then(expr().or_not()).or_not())
        .then(currency().or_not())
        .try_map(|((per, hash), currency), span| {
            let spans = [
                per.map(|n| n.span),
                hash.map(|(h, _)| h),
                hash.and_then(|(_, n)| n.map(|n| n.span)),
                currency.map(|c| c.span),
            ];
            let mut present = spans.into_iter().flatten();
            let first = present.next().ok_or_else(|| Rich::custom(span, "empty cost component"))?;
            let covered = present.fold(first, |acc, s| acc.merge(&s));
            Ok(CostGroup {
                field: CostField::Amount {
                    per,
                    total: hash.and_then(|(_, n)| n),
                    hash: hash.is_some(),
                    currency,
                },
                span: covered,
            })
        });

    choice((
        date().map(|d| CostGroup {
            span: d.span,
            field: CostField::Date(d),
        }),
        string().map(|s| CostGroup {
            span: s.span,
            field: CostField::Label(s),
        }),
        punct(Token::Star).map(|span| CostGroup {
            field: CostField::Merge,
            span,
        }),
        compound,
    ))
}

/// A metadata or custom value.
pub fn value<'src>() -> impl Parser<'src, Tokens<'src>, ValueNode<'src>, TokExtra<'src>> + Clone {
    choice((
        string().map(ValueNode::String),
        punct(Token::True).to(ValueNode::Bool(true)),
        punct(Token::False).to(ValueNode::Bool(false)),
        punct(Token::Null).to(ValueNode::None),
        account().map(ValueNode::Account),
        tag().map(ValueNode::Tag),
        link().map(ValueNode::Link),
        date().map(ValueNode::Date),
        amount().map(|(n, c)| ValueNode::Amount(n, c)),
        expr().map(ValueNode::Number),
        currency().map(ValueNode::Currency),
    ))
}

/// Zero or more values.
pub fn values<'src>() -> impl Parser<'src, Tokens<'src>, Vec<ValueNode<'src>>, TokExtra<'src>> + Clone
{
    value().repeated().collect::<Vec<_>>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use rust_decimal_macros::dec;

    fn toks(source: &str) -> Vec<SpannedToken<'_>> {
        tokenize(source)
            .into_iter()
            .filter(|t| !matches!(t.token, Token::Eof | Token::Newline | Token::Indent))
            .collect()
    }

    fn eval(source: &str) -> Option<Decimal> {
        let tokens = toks(source);
        run(expr(), &tokens).ok().and_then(|n| n.value)
    }

    #[test]
    fn test_expr_precedence() {
        assert_eq!(eval("2 + 3 * 4"), Some(dec!(14)));
        assert_eq!(eval("(10 + 5) / 3"), Some(dec!(5)));
        assert_eq!(eval("-(2 - 5)"), Some(dec!(3)));
        assert_eq!(eval("10-5"), Some(dec!(5)));
    }

    #[test]
    fn test_expr_keeps_precision() {
        assert_eq!(eval("1,234.5600"), Some(dec!(1234.5600)));
        assert_eq!(eval("1,234.5600").map(|d| d.scale()), Some(4));
    }

    #[test]
    fn test_division_by_zero_is_not_a_value() {
        let tokens = toks("1 / 0");
        let n = run(expr(), &tokens).unwrap();
        assert_eq!(n.value, None);
        assert_eq!(n.span, Span::new(0, 5));
    }

    #[test]
    fn test_units_forms() {
        let tokens = toks("-37.45 USD");
        assert!(matches!(
            run(units(), &tokens),
            Ok(UnitsNode::Complete(n, c)) if n.value == Some(dec!(-37.45)) && c.text == "USD"
        ));

        let tokens = toks("CAD");
        assert!(matches!(run(units(), &tokens), Ok(UnitsNode::CurrencyOnly(_))));

        let tokens = toks("10");
        assert!(matches!(run(units(), &tokens), Ok(UnitsNode::NumberOnly(_))));
    }

    #[test]
    fn test_units_trailing_garbage_rejected() {
        let tokens = toks("10 USD EUR");
        let rejection = run(units(), &tokens).unwrap_err();
        assert_eq!(rejection.found, "currency EUR");
        assert_eq!(rejection.span, Span::new(7, 10));
    }

    #[test]
    fn test_rejection_points_past_accepted_prefix() {
        let tokens = toks("1.71 USD EUR");
        let rejection = run(price_amount(), &tokens).unwrap_err();
        assert_eq!(rejection.found, "currency EUR");

        let tokens = toks("100 USD )");
        let rejection = run(cost_group(), &tokens).unwrap_err();
        assert_eq!(rejection.span, Span::new(8, 9));

        let tokens = toks("10 +");
        let rejection = run(expr(), &tokens).unwrap_err();
        assert_eq!(rejection.found, "'+'");
    }

    #[test]
    fn test_cost_group_compound() {
        let tokens = toks("502.12 # 9.95 USD");
        let group = run(cost_group(), &tokens).unwrap();
        match group.field {
            CostField::Amount {
                per,
                total,
                hash,
                currency,
            } => {
                assert_eq!(per.and_then(|n| n.value), Some(dec!(502.12)));
                assert_eq!(total.and_then(|n| n.value), Some(dec!(9.95)));
                assert!(hash);
                assert_eq!(currency.map(|c| c.text), Some("USD"));
            }
            other => panic!("Expected amount, got {other:?}"),
        }
        assert_eq!(group.span, Span::new(0, 17));
    }

    #[test]
    fn test_cost_group_other_kinds() {
        let tokens = toks("2014-05-01");
        assert!(matches!(
            run(cost_group(), &tokens).map(|g| g.field),
            Ok(CostField::Date(_))
        ));
        let tokens = toks("\"lot-a\"");
        assert!(matches!(
            run(cost_group(), &tokens).map(|g| g.field),
            Ok(CostField::Label(t)) if t.value == "lot-a"
        ));
        // Indented so the lexer does not read `*` as an org-mode heading.
        let tokens = toks(" *");
        assert!(matches!(
            run(cost_group(), &tokens).map(|g| g.field),
            Ok(CostField::Merge)
        ));
    }

    #[test]
    fn test_values() {
        let tokens = toks("\"budget\" Expenses:Food 100.00 USD TRUE #trip 2024-01-01");
        let values = run(values(), &tokens).unwrap();
        assert_eq!(values.len(), 6);
        assert!(matches!(values[0], ValueNode::String(_)));
        assert!(matches!(values[1], ValueNode::Account(_)));
        assert!(matches!(values[2], ValueNode::Amount(_, _)));
        assert_eq!(values[3], ValueNode::Bool(true));
        assert_eq!(values[4], ValueNode::Tag("trip"));
        assert!(matches!(values[5], ValueNode::Date(_)));
        let tokens = toks("4");
        assert!(matches!(run(value(), &tokens), Ok(ValueNode::Number(_))));
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r#""a \"quoted\" \\ word""#), r#"a "quoted" \ word"#);
        assert_eq!(unescape(r#""line\nbreak""#), "line\nbreak");
        assert_eq!(unescape("\"Café\""), "Café");
    }
}
