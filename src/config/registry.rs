//! Token symbol → feed id mapping

use super::{ConfigError, FeedEntry};
use crate::types::FeedId;
use tracing::warn;

/// Read-only registry of the feeds the monitor may poll.
///
/// Preserves configuration order; that order drives monitor-mode ticks.
#[derive(Debug, Clone, Default)]
pub struct FeedRegistry {
    entries: Vec<(String, FeedId)>,
}

impl FeedRegistry {
    /// Build the registry, rejecting blank ids and duplicate symbols
    pub fn from_entries(entries: &[FeedEntry]) -> Result<Self, ConfigError> {
        if entries.is_empty() {
            return Err(ConfigError::NoFeeds);
        }

        let mut registry = Self::default();
        for entry in entries {
            let token = entry.token.trim();
            if token.is_empty() {
                return Err(ConfigError::EmptyToken);
            }
            if registry.contains(token) {
                return Err(ConfigError::DuplicateToken(token.to_string()));
            }
            let id = FeedId::new(&entry.id)
                .ok_or_else(|| ConfigError::EmptyFeedId(token.to_string()))?;
            if !id.is_pyth_hex() {
                warn!(token = %token, feed_id = %id, "Feed id is not a 32-byte hex string");
            }
            registry.entries.push((token.to_string(), id));
        }

        Ok(registry)
    }

    pub fn get(&self, token: &str) -> Option<&FeedId> {
        self.entries
            .iter()
            .find(|(symbol, _)| symbol == token)
            .map(|(_, id)| id)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.get(token).is_some()
    }

    /// Token symbols in configuration order
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(symbol, _)| symbol.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
