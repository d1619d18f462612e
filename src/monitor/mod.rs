//! Polling loop - fetch, normalize, compare, emit
//!
//! Runs one tick per interval on a single task. Per-token failures are
//! contained within the tick, tick-level failures (including panics inside
//! a fetcher or sink) are logged, and the loop only ends when the shutdown
//! channel says so.

use futures_util::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::comparison::{ComparisonEngine, ComparisonSet};
use crate::config::FeedRegistry;
use crate::oracle::{normalize, PriceFetcher};
use crate::sink::ResultSink;
use crate::types::{ComparisonResult, DecimalPrice, Tick, TickStatus};

/// Polling-loop settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Sleep between ticks
    pub interval: Duration,
    /// Reference token; `None` polls every registry feed without comparing
    pub base_token: Option<String>,
    /// Tokens compared against the base, in output order
    pub comparison_tokens: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopped,
}

pub struct PriceMonitor {
    config: MonitorConfig,
    registry: Arc<FeedRegistry>,
    fetcher: Arc<dyn PriceFetcher>,
    sink: Arc<dyn ResultSink>,
    engine: Option<ComparisonEngine>,
    state: LoopState,
    ticks_emitted: u64,
}

impl PriceMonitor {
    pub fn new(
        config: MonitorConfig,
        registry: Arc<FeedRegistry>,
        fetcher: Arc<dyn PriceFetcher>,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        let engine = config
            .base_token
            .as_ref()
            .map(|base| ComparisonEngine::new(base.clone(), config.comparison_tokens.clone()));

        Self {
            config,
            registry,
            fetcher,
            sink,
            engine,
            state: LoopState::Running,
            ticks_emitted: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn ticks_emitted(&self) -> u64 {
        self.ticks_emitted
    }

    /// Run until `shutdown` carries `true` (or its sender is dropped).
    ///
    /// Cancellation is observed between ticks and during the sleep; a tick
    /// that has started always finishes.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        self.state = LoopState::Running;
        info!(
            interval_secs = self.config.interval.as_secs_f64(),
            base = %self.config.base_token.as_deref().unwrap_or("-"),
            tokens = ?self.config.comparison_tokens,
            source = %self.fetcher.name(),
            "Price monitor started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(panic) = AssertUnwindSafe(self.run_cycle()).catch_unwind().await {
                error!(
                    error = %panic_message(panic.as_ref()),
                    "Unexpected failure during tick; continuing"
                );
            }

            if self.sleep_or_cancel(&mut shutdown).await {
                break;
            }
        }

        self.state = LoopState::Stopped;
        info!(ticks = self.ticks_emitted, "Price monitor stopped");
    }

    /// Run one tick and hand it to the sink. Sink failures are logged.
    pub async fn run_cycle(&mut self) -> Tick {
        let tick = self.run_tick().await;

        info!(
            status = %tick.status,
            base = %tick.base_token.as_deref().unwrap_or("-"),
            priced = tick.comparisons.iter().filter(|c| c.price.is_some()).count(),
            tokens = tick.comparisons.len(),
            "Tick complete"
        );

        if let Err(e) = self.sink.emit(&tick).await {
            error!(sink = %self.sink.name(), error = %e, "Failed to emit tick");
        }
        self.ticks_emitted += 1;

        tick
    }

    /// Fetch, normalize and compare without emitting
    pub async fn run_tick(&self) -> Tick {
        match &self.engine {
            Some(engine) => self.comparison_tick(engine).await,
            None => self.prices_tick().await,
        }
    }

    async fn comparison_tick(&self, engine: &ComparisonEngine) -> Tick {
        let base_token = engine.base_token();
        let base_price = match self.price_of(base_token).await {
            Some(price) if !price.is_zero() => price,
            other => {
                warn!(token = %base_token, "Base price unavailable; skipping comparisons");
                return Tick::unavailable(base_token, other, self.fetcher.name());
            }
        };

        let mut prices = HashMap::with_capacity(engine.comparison_tokens().len());
        for token in engine.comparison_tokens() {
            prices.insert(token.clone(), self.price_of(token).await);
        }

        match engine.compare(Some(base_price), &prices) {
            ComparisonSet::Available(comparisons) => Tick {
                base_token: Some(base_token.to_string()),
                base_price: Some(base_price),
                status: TickStatus::Complete,
                comparisons,
                source: self.fetcher.name().to_string(),
                timestamp: chrono::Utc::now(),
            },
            ComparisonSet::Unavailable => {
                Tick::unavailable(base_token, Some(base_price), self.fetcher.name())
            }
        }
    }

    async fn prices_tick(&self) -> Tick {
        let mut comparisons = Vec::with_capacity(self.registry.len());
        for token in self.registry.tokens() {
            let price = self.price_of(token).await;
            comparisons.push(ComparisonResult::price_only(token, price));
        }

        Tick {
            base_token: None,
            base_price: None,
            status: TickStatus::PricesOnly,
            comparisons,
            source: self.fetcher.name().to_string(),
            timestamp: chrono::Utc::now(),
        }
    }

    /// Fetch and normalize one token; any failure means "no price this tick"
    async fn price_of(&self, token: &str) -> Option<DecimalPrice> {
        let feed_id = match self.registry.get(token) {
            Some(id) => id,
            None => {
                error!(token = %token, "Token has no configured feed");
                return None;
            }
        };

        let quote = match self.fetcher.fetch(feed_id).await {
            Ok(quote) => quote,
            Err(e) => {
                warn!(
                    token = %token,
                    feed_id = %feed_id,
                    kind = e.kind(),
                    error = %e,
                    "Failed to fetch price"
                );
                return None;
            }
        };

        match normalize(&quote) {
            Ok(price) => {
                debug!(
                    token = %token,
                    price = %price,
                    publish_time = ?quote.publish_time,
                    "Price normalized"
                );
                Some(price)
            }
            Err(e) => {
                warn!(token = %token, error = %e, "Failed to normalize price");
                None
            }
        }
    }

    /// Sleep for the interval; `true` when shutdown was requested meanwhile
    async fn sleep_or_cancel(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let sleep = tokio::time::sleep(self.config.interval);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                changed = shutdown.changed() => match changed {
                    Ok(()) if *shutdown.borrow() => return true,
                    Ok(()) => continue,
                    Err(_) => return true,
                },
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
