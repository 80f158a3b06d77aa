//! Booking methods.
//!
//! A booking method tells a downstream engine how to match reductions against
//! existing lots. The parser only resolves the keyword and carries it.
//!
//! Every variant lives exactly once in [`BOOKINGS`]. Parsed directives hold
//! `&'static Booking` references into that table, so two independently parsed
//! `"STRICT"` keywords are equal by value and by address.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How a downstream engine reduces lots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Booking {
    /// Reductions must match exactly one lot.
    Strict,
    /// Like `Strict`, but an exact-size match picks the oldest lot.
    StrictWithSize,
    /// No lot matching, reductions may leave mixed-sign inventories.
    None,
    /// All lots of a commodity merge into one at average cost.
    Average,
    /// Oldest lots are reduced first.
    Fifo,
    /// Newest lots are reduced first.
    Lifo,
}

/// The process-wide instance of each variant, in declaration order.
pub static BOOKINGS: [Booking; 6] = [
    Booking::Strict,
    Booking::StrictWithSize,
    Booking::None,
    Booking::Average,
    Booking::Fifo,
    Booking::Lifo,
];

/// A booking keyword outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown booking method: {0}")]
pub struct UnknownBooking(pub String);

impl Booking {
    /// The exact, case-sensitive keyword for this variant.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Strict => "STRICT",
            Self::StrictWithSize => "STRICT_WITH_SIZE",
            Self::None => "NONE",
            Self::Average => "AVERAGE",
            Self::Fifo => "FIFO",
            Self::Lifo => "LIFO",
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::Strict => 0,
            Self::StrictWithSize => 1,
            Self::None => 2,
            Self::Average => 3,
            Self::Fifo => 4,
            Self::Lifo => 5,
        }
    }

    /// The table instance for this variant.
    ///
    /// ```
    /// use tallyline_core::Booking;
    ///
    /// let a = Booking::Fifo.interned();
    /// let b = Booking::Fifo.interned();
    /// assert!(std::ptr::eq(a, b));
    /// ```
    #[must_use]
    pub fn interned(self) -> &'static Self {
        &BOOKINGS[self.index()]
    }

    /// Resolve a keyword spelling to its table instance.
    ///
    /// Matching is case-sensitive: `"strict"` is not a booking method.
    ///
    /// ```
    /// use tallyline_core::Booking;
    ///
    /// let a = Booking::from_keyword("STRICT").unwrap();
    /// let b = Booking::from_keyword("STRICT").unwrap();
    /// assert!(std::ptr::eq(a, b));
    /// assert_eq!(*a, Booking::Strict);
    /// assert!(Booking::from_keyword("strict").is_none());
    /// ```
    #[must_use]
    pub fn from_keyword(keyword: &str) -> Option<&'static Self> {
        BOOKINGS.iter().find(|b| b.keyword() == keyword)
    }
}

impl FromStr for Booking {
    type Err = UnknownBooking;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_keyword(s)
            .copied()
            .ok_or_else(|| UnknownBooking(s.to_string()))
    }
}

impl fmt::Display for Booking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl PartialEq<str> for Booking {
    fn eq(&self, other: &str) -> bool {
        self.keyword() == other
    }
}

impl PartialEq<&str> for Booking {
    fn eq(&self, other: &&str) -> bool {
        self.keyword() == *other
    }
}

impl PartialEq<Booking> for &str {
    fn eq(&self, other: &Booking) -> bool {
        *self == other.keyword()
    }
}

/// Serde adapter for `Option<&'static Booking>` fields.
///
/// Deserialized values are resolved back to table instances.
pub mod serde_interned {
    use super::Booking;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize as the keyword, or `null`.
    pub fn serialize<S: Serializer>(
        value: &Option<&'static Booking>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value.copied().serialize(serializer)
    }

    /// Deserialize a keyword, or `null`, into the table instance.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<&'static Booking>, D::Error> {
        let value = Option::<Booking>::deserialize(deserializer)?;
        Ok(value.map(Booking::interned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_round_trip_for_every_variant() {
        for booking in &BOOKINGS {
            let parsed = Booking::from_keyword(booking.keyword()).unwrap();
            assert!(std::ptr::eq(parsed, booking));
        }
    }

    #[test]
    fn test_equality_with_keyword_string() {
        assert_eq!(Booking::Strict, "STRICT");
        assert!("STRICT_WITH_SIZE" == Booking::StrictWithSize);
        assert!(Booking::Strict != *"FIFO");
        assert_ne!(Booking::Strict, Booking::Fifo);
    }

    #[test]
    fn test_case_sensitive() {
        assert_eq!(
            "Strict".parse::<Booking>(),
            Err(UnknownBooking("Strict".to_string()))
        );
        assert!(Booking::from_keyword("HIFO").is_none());
        assert_eq!("LIFO".parse::<Booking>(), Ok(Booking::Lifo));
    }

    #[test]
    fn test_interned_is_stable_across_threads() {
        let here = Booking::Average.interned() as *const Booking as usize;
        let there = std::thread::spawn(|| Booking::Average.interned() as *const Booking as usize)
            .join()
            .unwrap();
        assert_eq!(here, there);
    }

    #[test]
    fn test_display_keyword() {
        assert_eq!(Booking::StrictWithSize.to_string(), "STRICT_WITH_SIZE");
        assert_eq!(Booking::None.to_string(), "NONE");
    }
}
