//! Cost specifications written inside `{...}` and `{{...}}`.
//!
//! The parser records what was written and nothing more. Filling in missing
//! components or matching them against lots is a booking engine's job.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::intern::InternedStr;

/// The components of a posting's cost block, each optional.
///
/// `{150.00 USD, 2024-01-15}` sets `number_per`, `currency` and `date`.
/// `{{1500.00 USD}}` and `{150.00 # 9.95 USD}` put the amount after the
/// brace pair or the `#` into `number_total`.
///
/// # Examples
///
/// ```
/// use tallyline_core::CostSpec;
/// use rust_decimal_macros::dec;
/// use chrono::NaiveDate;
///
/// let spec = CostSpec::empty()
///     .with_number_per(dec!(150.00))
///     .with_currency("USD")
///     .with_date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
///
/// assert!(!spec.is_empty());
/// assert_eq!(spec.to_string(), "{150.00 USD, 2024-01-15}");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CostSpec {
    /// Cost per unit
    pub number_per: Option<Decimal>,
    /// Total cost for the whole posting
    pub number_total: Option<Decimal>,
    /// Currency of the cost
    pub currency: Option<InternedStr>,
    /// Lot date
    pub date: Option<NaiveDate>,
    /// Lot label
    pub label: Option<String>,
    /// `*` marker: merge with existing lots at average cost
    pub merge: bool,
}

impl CostSpec {
    /// Create an empty cost spec (`{}`).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Set the per-unit cost.
    #[must_use]
    pub const fn with_number_per(mut self, number: Decimal) -> Self {
        self.number_per = Some(number);
        self
    }

    /// Set the total cost.
    #[must_use]
    pub const fn with_number_total(mut self, number: Decimal) -> Self {
        self.number_total = Some(number);
        self
    }

    /// Set the currency.
    #[must_use]
    pub fn with_currency(mut self, currency: impl Into<InternedStr>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    /// Set the date.
    #[must_use]
    pub const fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Set the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the merge marker.
    #[must_use]
    pub const fn with_merge(mut self) -> Self {
        self.merge = true;
        self
    }

    /// True for `{}`.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.number_per.is_none()
            && self.number_total.is_none()
            && self.currency.is_none()
            && self.date.is_none()
            && self.label.is_none()
            && !self.merge
    }
}

impl fmt::Display for CostSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();

        let mut amount = String::new();
        if let Some(n) = self.number_per {
            amount.push_str(&n.to_string());
        }
        if let Some(n) = self.number_total {
            if amount.is_empty() {
                amount.push_str("# ");
            } else {
                amount.push_str(" # ");
            }
            amount.push_str(&n.to_string());
        }
        if let Some(c) = &self.currency {
            if !amount.is_empty() {
                amount.push(' ');
            }
            amount.push_str(c);
        }
        if !amount.is_empty() {
            parts.push(amount);
        }
        if let Some(date) = self.date {
            parts.push(date.to_string());
        }
        if let Some(label) = &self.label {
            parts.push(format!("\"{label}\""));
        }
        if self.merge {
            parts.push("*".to_string());
        }

        write!(f, "{{{}}}", parts.join(", "))
    }
}
