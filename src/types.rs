//! Core types used throughout PriceWatch
//!
//! Defines feed identifiers, raw oracle quotes, normalized prices and the
//! per-cycle `Tick` handed to result sinks.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a price feed in the oracle service.
///
/// Opaque to the crate apart from matching: Hermes echoes ids back without
/// the `0x` prefix, so comparisons ignore it along with ASCII case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedId(String);

impl FeedId {
    /// Build a feed id, rejecting blank input
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Id without a leading `0x`
    pub fn bare(&self) -> &str {
        strip_hex_prefix(&self.0)
    }

    /// Whether an id returned by the oracle refers to this feed
    pub fn matches(&self, other: &str) -> bool {
        self.bare().eq_ignore_ascii_case(strip_hex_prefix(other.trim()))
    }

    /// Pyth feed ids are 32-byte hex strings
    pub fn is_pyth_hex(&self) -> bool {
        hex::decode(self.bare())
            .map(|bytes| bytes.len() == 32)
            .unwrap_or(false)
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// Fixed-point quote as published by the oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawQuote {
    /// Integer significant digits
    pub mantissa: i64,
    /// Power-of-ten scale applied to the mantissa
    pub exponent: i32,
    /// Publish time in unix seconds, when the oracle reports it
    pub publish_time: Option<i64>,
    /// Confidence interval in mantissa units
    pub confidence: Option<u64>,
}

impl RawQuote {
    pub fn new(mantissa: i64, exponent: i32) -> Self {
        Self {
            mantissa,
            exponent,
            publish_time: None,
            confidence: None,
        }
    }
}

/// Non-negative decimal price derived from a `RawQuote`
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DecimalPrice(Decimal);

impl DecimalPrice {
    /// Wrap a decimal value; negative values are not prices
    pub fn new(value: Decimal) -> Option<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            None
        } else {
            Some(Self(value))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl fmt::Display for DecimalPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

/// Comparison of one token against the base for a single tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub token: String,
    /// USD price; `None` when the fetch or normalization failed
    pub price: Option<DecimalPrice>,
    /// Token price expressed in base-token units
    pub price_in_base: Option<Decimal>,
    /// `(token - base) / base * 100`
    pub percent_difference: Option<Decimal>,
}

impl ComparisonResult {
    pub fn unavailable(token: &str) -> Self {
        Self {
            token: token.to_string(),
            price: None,
            price_in_base: None,
            percent_difference: None,
        }
    }

    /// Price-only entry, used when there is no base to compare against
    pub fn price_only(token: &str, price: Option<DecimalPrice>) -> Self {
        Self {
            token: token.to_string(),
            price,
            price_in_base: None,
            percent_difference: None,
        }
    }
}

/// Outcome of a polling cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickStatus {
    /// Base price known, comparisons computed
    Complete,
    /// No base configured; comparisons carry prices only
    PricesOnly,
    /// Base price missing or zero; no comparisons
    Unavailable,
}

impl fmt::Display for TickStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickStatus::Complete => write!(f, "complete"),
            TickStatus::PricesOnly => write!(f, "prices_only"),
            TickStatus::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Full output of one polling cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub base_token: Option<String>,
    pub base_price: Option<DecimalPrice>,
    pub status: TickStatus,
    pub comparisons: Vec<ComparisonResult>,
    /// Name of the price source that produced the quotes
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

impl Tick {
    /// Tick for a cycle whose base price could not be obtained
    pub fn unavailable(base_token: &str, base_price: Option<DecimalPrice>, source: &str) -> Self {
        Self {
            base_token: Some(base_token.to_string()),
            base_price,
            status: TickStatus::Unavailable,
            comparisons: Vec::new(),
            source: source.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.status != TickStatus::Unavailable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn feed_id_rejects_blank_input() {
        assert!(FeedId::new("").is_none());
        assert!(FeedId::new("   ").is_none());
        assert_eq!(FeedId::new(" 0xabc ").unwrap().as_str(), "0xabc");
    }

    #[test]
    fn feed_id_matches_without_prefix_or_case() {
        let id = FeedId::new("0xABCdef").unwrap();
        assert!(id.matches("abcdef"));
        assert!(id.matches("0xabcdef"));
        assert!(!id.matches("abcdee"));
    }

    #[test]
    fn feed_id_detects_pyth_hex() {
        let pyth =
            FeedId::new("0x962088abcfdbdb6e30db2e340c8cf887d9efb311b1f2f17b155a63dbb6d40265")
                .unwrap();
        assert!(pyth.is_pyth_hex());
        assert!(!FeedId::new("BERA/USD").unwrap().is_pyth_hex());
    }

    #[test]
    fn decimal_price_rejects_negative_values() {
        assert!(DecimalPrice::new(dec!(-0.01)).is_none());
        assert!(DecimalPrice::new(dec!(0)).unwrap().is_zero());
        assert_eq!(DecimalPrice::new(dec!(1.50)).unwrap().to_string(), "1.5");
    }
}
