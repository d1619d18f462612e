//! Oracle module - Pyth price feed access
//!
//! Fetches fixed-point quotes for individual feeds and turns them into
//! decimal prices.

mod normalizer;
pub mod sources;

pub use normalizer::{normalize, NormalizationError};

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{FeedId, RawQuote};

/// Why a quote could not be obtained. Never fatal; the token is simply
/// unavailable for the current tick.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("oracle returned HTTP {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("non-numeric {field}: {value}")]
    NonNumeric { field: &'static str, value: String },
}

impl FetchError {
    /// Short tag for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Transport(_) => "transport",
            FetchError::Timeout(_) => "timeout",
            FetchError::Status(_) => "status",
            FetchError::Malformed(_) => "malformed",
            FetchError::NonNumeric { .. } => "non_numeric",
        }
    }
}

/// Trait for price fetchers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceFetcher: Send + Sync {
    /// Get the source name
    fn name(&self) -> &'static str;

    /// Fetch the latest quote for a single feed
    async fn fetch(&self, feed_id: &FeedId) -> Result<RawQuote, FetchError>;
}
