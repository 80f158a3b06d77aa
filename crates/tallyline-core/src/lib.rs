//! Core types for tallyline
//!
//! This crate holds the typed model a ledger file is parsed into:
//!
//! - [`Span`] / [`Spanned`] - byte ranges into the source text
//! - [`Amount`] / [`IncompleteAmount`] - a decimal number with a currency
//! - [`CostSpec`] - the components of a posting's cost block
//! - [`Booking`] - how a downstream engine reduces lots
//! - [`Directive`] - all directive types (Transaction, Balance, Open, etc.)
//!
//! # Example
//!
//! ```
//! use tallyline_core::{Amount, Booking, Open, Posting, Transaction};
//! use rust_decimal_macros::dec;
//! use chrono::NaiveDate;
//!
//! let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
//!
//! let open = Open::new(date, "Assets:Brokerage").with_booking(Booking::Fifo);
//! assert_eq!(*open.booking.unwrap(), "FIFO");
//!
//! let txn = Transaction::new(date, "Coffee")
//!     .with_posting(Posting::new("Expenses:Coffee", Amount::new(dec!(4.50), "USD")))
//!     .with_posting(Posting::auto("Assets:Cash"));
//! assert_eq!(txn.postings.len(), 2);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod amount;
pub mod booking;
pub mod cost;
pub mod directive;
pub mod intern;
pub mod span;

pub use amount::{Amount, IncompleteAmount};
pub use booking::{Booking, UnknownBooking, BOOKINGS};
pub use cost::CostSpec;
pub use directive::{
    Balance, Close, Commodity, Custom, Directive, Document, Event, MetaValue, Metadata, Note,
    Open, Pad, Posting, Price, PriceAnnotation, PriceKind, Query, Transaction,
};
pub use intern::{InternedStr, StringInterner};
pub use span::{Span, Spanned};

/// Re-export of the decimal type used for every number.
pub use rust_decimal::Decimal;
/// Re-export of the date type used for every directive date.
pub use chrono::NaiveDate;
