//! Cross-asset comparison against a base token
//!
//! One engine covers every base-token framing: the base is chosen at
//! construction and each comparison token is reported as its percentage
//! deviation from the base plus its price in base-token units.

use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::warn;

use crate::types::{ComparisonResult, DecimalPrice};

/// Result of comparing a token set against the base
#[derive(Debug, Clone, PartialEq)]
pub enum ComparisonSet {
    Available(Vec<ComparisonResult>),
    /// Base price missing or zero; nothing was computed
    Unavailable,
}

impl ComparisonSet {
    pub fn is_available(&self) -> bool {
        matches!(self, ComparisonSet::Available(_))
    }

    pub fn into_results(self) -> Vec<ComparisonResult> {
        match self {
            ComparisonSet::Available(results) => results,
            ComparisonSet::Unavailable => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComparisonEngine {
    base_token: String,
    comparison_tokens: Vec<String>,
}

impl ComparisonEngine {
    pub fn new(base_token: impl Into<String>, comparison_tokens: Vec<String>) -> Self {
        Self {
            base_token: base_token.into(),
            comparison_tokens,
        }
    }

    pub fn base_token(&self) -> &str {
        &self.base_token
    }

    /// Tokens in the order results are produced
    pub fn comparison_tokens(&self) -> &[String] {
        &self.comparison_tokens
    }

    /// Compare every configured token against `base_price`.
    ///
    /// Tokens missing from `token_prices`, or mapped to `None`, come back
    /// with every field unavailable. A zero or absent base short-circuits
    /// the whole set. A token whose ratio overflows `Decimal` keeps its
    /// price but has no `price_in_base`/`percent_difference`; that case is
    /// logged so it is not read as a failed fetch.
    pub fn compare(
        &self,
        base_price: Option<DecimalPrice>,
        token_prices: &HashMap<String, Option<DecimalPrice>>,
    ) -> ComparisonSet {
        let base = match base_price {
            Some(price) if !price.is_zero() => price.value(),
            _ => return ComparisonSet::Unavailable,
        };

        let results = self
            .comparison_tokens
            .iter()
            .map(|token| match token_prices.get(token).copied().flatten() {
                Some(price) => {
                    let price_in_base = price.value().checked_div(base);
                    let percent = percent_difference(base, price.value());
                    if price_in_base.is_none() || percent.is_none() {
                        warn!(
                            token = %token,
                            price = %price,
                            base = %base,
                            "Comparison overflowed the decimal range"
                        );
                    }
                    ComparisonResult {
                        token: token.clone(),
                        price: Some(price),
                        price_in_base,
                        percent_difference: percent,
                    }
                }
                None => ComparisonResult::unavailable(token),
            })
            .collect();

        ComparisonSet::Available(results)
    }
}

/// `(price - base) / base * 100`; `None` for a zero base or on overflow
pub fn percent_difference(base: Decimal, price: Decimal) -> Option<Decimal> {
    if base.is_zero() {
        return None;
    }
    price
        .checked_sub(base)?
        .checked_div(base)?
        .checked_mul(Decimal::ONE_HUNDRED)
}
