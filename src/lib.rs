//! PriceWatch Library
//!
//! Polls oracle price feeds on a fixed interval and reports how each
//! comparison token deviates from a base token

pub mod comparison;
pub mod config;
pub mod monitor;
pub mod oracle;
pub mod persistence;
pub mod sink;
pub mod types;
