//! Result sinks - where finished ticks go
//!
//! Console rendering, CSV persistence, and a fan-out that feeds several
//! sinks while keeping their failures independent.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::fmt::Write as _;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing::error;

use crate::persistence::CsvPersistence;
use crate::types::{Tick, TickStatus};

const RULE_WIDTH: usize = 50;

/// Receives each polling cycle's output
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Get the sink name
    fn name(&self) -> &'static str;

    /// Handle one tick
    async fn emit(&self, tick: &Tick) -> Result<()>;
}

/// Prints a framed summary of every tick, to stdout unless told otherwise.
///
/// Write failures (a closed pipe, say) come back as errors.
pub struct ConsoleSink {
    out: Mutex<Box<dyn Write + Send>>,
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::with_writer(std::io::stdout())
    }

    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(writer)),
        }
    }

    pub fn render(tick: &Tick) -> String {
        let mut out = String::new();
        let heavy = "=".repeat(RULE_WIDTH);
        let light = "-".repeat(RULE_WIDTH);
        let stamp = tick.timestamp.format("%Y-%m-%d %H:%M:%S");

        match tick.status {
            TickStatus::Unavailable => {
                let _ = writeln!(
                    out,
                    "[{}] Error: could not fetch {} price; comparisons unavailable",
                    stamp,
                    tick.base_token.as_deref().unwrap_or("base")
                );
            }
            TickStatus::PricesOnly => {
                let _ = writeln!(out, "[{}] Prices ({})", stamp, tick.source);
                for c in &tick.comparisons {
                    match c.price {
                        Some(price) => {
                            let _ =
                                writeln!(out, "{} Price: ${}", c.token, fixed(price.value(), 2));
                        }
                        None => {
                            let _ = writeln!(out, "Failed to fetch price for {}", c.token);
                        }
                    }
                }
            }
            TickStatus::Complete => {
                let base = tick.base_token.as_deref().unwrap_or("base");
                let _ = writeln!(out, "{}", heavy);
                let _ = writeln!(out, "Price Comparison at {}", stamp);
                let _ = writeln!(out, "{}", heavy);
                let _ = writeln!(out, "Main Token: {}", base);
                if let Some(price) = tick.base_price {
                    let _ = writeln!(out, "Main Price: ${}", fixed(price.value(), 8));
                }
                let _ = writeln!(out, "Comparison Tokens:");
                let _ = writeln!(out, "{}", light);
                for c in &tick.comparisons {
                    let _ = writeln!(out, "Token: {}", c.token);
                    match (c.price, c.price_in_base) {
                        (Some(price), Some(in_base)) => {
                            let _ = writeln!(
                                out,
                                "Price: ${} ({} {})",
                                fixed(price.value(), 8),
                                fixed(in_base, 8),
                                base
                            );
                        }
                        (Some(price), None) => {
                            let _ = writeln!(out, "Price: ${}", fixed(price.value(), 8));
                        }
                        _ => {
                            let _ = writeln!(out, "Price: unavailable");
                        }
                    }
                    let _ = writeln!(
                        out,
                        "Percentage Difference: {}",
                        format_percent(c.percent_difference)
                    );
                }
            }
        }

        out
    }
}

/// Round then pad to exactly `dp` decimal places
fn fixed(value: Decimal, dp: u32) -> String {
    format!("{:.*}", dp as usize, value.round_dp(dp))
}

fn format_percent(value: Option<Decimal>) -> String {
    match value {
        Some(pct) if pct.is_sign_positive() && !pct.is_zero() => format!("+{}%", fixed(pct, 2)),
        Some(pct) => format!("{}%", fixed(pct, 2)),
        None => "unavailable".to_string(),
    }
}

#[async_trait]
impl ResultSink for ConsoleSink {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn emit(&self, tick: &Tick) -> Result<()> {
        let text = Self::render(tick);
        let mut out = self
            .out
            .lock()
            .map_err(|_| anyhow!("console writer lock poisoned"))?;
        out.write_all(text.as_bytes())
            .context("Failed to write tick to console")?;
        out.flush().context("Failed to flush console")?;
        Ok(())
    }
}

/// Appends ticks to the daily CSV files
pub struct CsvSink {
    persistence: Arc<CsvPersistence>,
}

impl CsvSink {
    pub fn new(persistence: Arc<CsvPersistence>) -> Self {
        Self { persistence }
    }
}

#[async_trait]
impl ResultSink for CsvSink {
    fn name(&self) -> &'static str {
        "csv"
    }

    async fn emit(&self, tick: &Tick) -> Result<()> {
        self.persistence.save_tick(tick).await
    }
}

/// Forwards each tick to every inner sink; one failure does not skip the rest
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Arc<dyn ResultSink>>,
}

impl MultiSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl ResultSink for MultiSink {
    fn name(&self) -> &'static str {
        "multi"
    }

    async fn emit(&self, tick: &Tick) -> Result<()> {
        let mut failed = Vec::new();
        for sink in &self.sinks {
            if let Err(e) = sink.emit(tick).await {
                error!(sink = %sink.name(), error = %e, "Sink failed");
                failed.push(sink.name());
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("sinks failed: {}", failed.join(", ")))
        }
    }
}
