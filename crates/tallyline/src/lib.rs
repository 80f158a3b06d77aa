//! Tallyline CLI tools.
//!
//! - `tally-check`: parse a ledger file and report every diagnostic
//!
//! # Example Usage
//!
//! ```bash
//! tally-check ledger.tally
//! tally-check --format json ledger.tally
//! tally-check --fragment accounts.tally
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cmd;
pub mod report;
