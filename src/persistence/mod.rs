//! CSV Persistence Module
//!
//! Append-only daily CSV files for fetched prices and per-tick comparisons

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use csv::WriterBuilder;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::info;

use crate::types::{Tick, TickStatus};

/// One fetched price per row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceRecord {
    /// RFC 3339 timestamp of the tick
    pub timestamp: String,
    pub token: String,
    pub price: Decimal,
    pub source: String,
}

/// One comparison token per row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComparisonRecord {
    pub timestamp: String,
    pub base_token: String,
    pub base_price: Decimal,
    pub token: String,
    pub price: Option<Decimal>,
    pub price_in_base: Option<Decimal>,
    pub percent_difference: Option<Decimal>,
}

impl PriceRecord {
    /// Rows for every price the tick actually obtained, base first
    pub fn from_tick(tick: &Tick) -> Vec<PriceRecord> {
        let timestamp = tick.timestamp.to_rfc3339();
        let base = tick
            .base_token
            .as_ref()
            .zip(tick.base_price)
            .map(|(token, price)| (token.as_str(), price));
        let comparisons = tick
            .comparisons
            .iter()
            .filter_map(|c| c.price.map(|price| (c.token.as_str(), price)));

        base.into_iter()
            .chain(comparisons)
            .map(|(token, price)| PriceRecord {
                timestamp: timestamp.clone(),
                token: token.to_string(),
                price: price.value(),
                source: tick.source.clone(),
            })
            .collect()
    }
}

impl ComparisonRecord {
    /// Rows for a completed tick; other ticks have nothing to compare
    pub fn from_tick(tick: &Tick) -> Vec<ComparisonRecord> {
        let (base_token, base_price) = match (&tick.base_token, tick.base_price) {
            (Some(token), Some(price)) if tick.status == TickStatus::Complete => (token, price),
            _ => return Vec::new(),
        };
        let timestamp = tick.timestamp.to_rfc3339();

        tick.comparisons
            .iter()
            .map(|c| ComparisonRecord {
                timestamp: timestamp.clone(),
                base_token: base_token.clone(),
                base_price: base_price.value(),
                token: c.token.clone(),
                price: c.price.map(|p| p.value()),
                price_in_base: c.price_in_base,
                percent_difference: c.percent_difference,
            })
            .collect()
    }
}

/// CSV writer that reopens its file when the UTC date changes
struct DailyWriter {
    dir: PathBuf,
    prefix: &'static str,
    date: NaiveDate,
    writer: csv::Writer<std::fs::File>,
}

impl DailyWriter {
    fn open(dir: PathBuf, prefix: &'static str) -> Result<Self> {
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let date = Utc::now().date_naive();
        let writer = create_writer(&dir, &file_name(prefix, date))?;
        Ok(Self {
            dir,
            prefix,
            date,
            writer,
        })
    }

    fn rotate_if_needed(&mut self) -> Result<()> {
        let today = Utc::now().date_naive();
        if today != self.date {
            self.writer.flush().ok();
            self.writer = create_writer(&self.dir, &file_name(self.prefix, today))?;
            self.date = today;
            info!(prefix = %self.prefix, date = %today, "Rotated CSV file");
        }
        Ok(())
    }

    fn write_all<T: Serialize>(&mut self, records: &[T]) -> Result<()> {
        self.rotate_if_needed()?;
        for record in records {
            self.writer
                .serialize(record)
                .with_context(|| format!("Failed to write {} record", self.prefix))?;
        }
        self.writer
            .flush()
            .with_context(|| format!("Failed to flush {} writer", self.prefix))?;
        Ok(())
    }
}

fn file_name(prefix: &str, date: NaiveDate) -> String {
    format!("{}_{}.csv", prefix, date.format("%Y-%m-%d"))
}

fn create_writer(dir: &Path, filename: &str) -> Result<csv::Writer<std::fs::File>> {
    let path = dir.join(filename);
    let file_has_data =
        path.exists() && fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false);

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .context("Failed to open CSV file")?;

    let writer = WriterBuilder::new()
        .has_headers(!file_has_data)
        .from_writer(file);

    Ok(writer)
}

/// CSV persistence manager
pub struct CsvPersistence {
    data_dir: PathBuf,
    price_writer: Mutex<DailyWriter>,
    comparison_writer: Mutex<DailyWriter>,
}

impl CsvPersistence {
    /// Create a new CSV persistence manager
    pub fn new(data_dir: &str) -> Result<Self> {
        let data_dir = PathBuf::from(data_dir);

        // Create directory if it doesn't exist
        fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

        let price_writer = DailyWriter::open(data_dir.join("prices"), "prices")?;
        let comparison_writer = DailyWriter::open(data_dir.join("comparisons"), "comparisons")?;

        Ok(Self {
            data_dir,
            price_writer: Mutex::new(price_writer),
            comparison_writer: Mutex::new(comparison_writer),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Save fetched prices
    pub async fn save_prices(&self, records: &[PriceRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.price_writer.lock().await.write_all(records)
    }

    /// Save comparison rows
    pub async fn save_comparisons(&self, records: &[ComparisonRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.comparison_writer.lock().await.write_all(records)
    }

    /// Persist everything a tick produced
    pub async fn save_tick(&self, tick: &Tick) -> Result<()> {
        self.save_prices(&PriceRecord::from_tick(tick)).await?;
        self.save_comparisons(&ComparisonRecord::from_tick(tick))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ComparisonResult, DecimalPrice};
    use csv::ReaderBuilder;
    use rust_decimal_macros::dec;

    fn temp_data_dir(test_name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "pricewatch_persistence_{}_{}",
            test_name,
            uuid::Uuid::new_v4()
        ))
    }

    fn today() -> String {
        Utc::now().format("%Y-%m-%d").to_string()
    }

    fn complete_tick() -> Tick {
        Tick {
            base_token: Some("BERA".to_string()),
            base_price: DecimalPrice::new(dec!(1.05)),
            status: TickStatus::Complete,
            comparisons: vec![
                ComparisonResult {
                    token: "iBGT".to_string(),
                    price: DecimalPrice::new(dec!(1.10)),
                    price_in_base: Some(dec!(1.0476)),
                    percent_difference: Some(dec!(4.76)),
                },
                ComparisonResult::unavailable("LBGT"),
            ],
            source: "pyth".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn price_records_skip_unavailable_tokens() {
        let records = PriceRecord::from_tick(&complete_tick());
        let tokens: Vec<&str> = records.iter().map(|r| r.token.as_str()).collect();
        assert_eq!(tokens, vec!["BERA", "iBGT"]);
        assert!(records.iter().all(|r| r.source == "pyth"));
    }

    #[test]
    fn comparison_records_only_for_complete_ticks() {
        assert_eq!(ComparisonRecord::from_tick(&complete_tick()).len(), 2);

        let unavailable = Tick::unavailable("BERA", None, "pyth");
        assert!(ComparisonRecord::from_tick(&unavailable).is_empty());
        assert!(PriceRecord::from_tick(&unavailable).is_empty());
    }

    #[test]
    fn create_writer_adds_headers_when_file_exists_but_is_empty() {
        let data_dir = temp_data_dir("headers_on_empty");
        let prices_dir = data_dir.join("prices");
        fs::create_dir_all(&prices_dir).unwrap();

        let price_file = prices_dir.join(format!("prices_{}.csv", today()));
        fs::write(&price_file, "").unwrap();

        let persistence = CsvPersistence::new(data_dir.to_str().unwrap()).unwrap();
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async { persistence.save_tick(&complete_tick()).await.unwrap() });

        let content = fs::read_to_string(&price_file).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("timestamp,token,price,source"));
        assert_eq!(lines.count(), 2, "expected base and iBGT rows");

        let _ = fs::remove_dir_all(&data_dir);
    }

    #[tokio::test]
    async fn save_tick_appends_without_repeating_headers() {
        let data_dir = temp_data_dir("append");
        {
            let persistence = CsvPersistence::new(data_dir.to_str().unwrap()).unwrap();
            persistence.save_tick(&complete_tick()).await.unwrap();
        }
        {
            let persistence = CsvPersistence::new(data_dir.to_str().unwrap()).unwrap();
            persistence.save_tick(&complete_tick()).await.unwrap();
        }

        let comparison_file = data_dir
            .join("comparisons")
            .join(format!("comparisons_{}.csv", today()));
        let content = fs::read_to_string(&comparison_file).unwrap();
        let headers = content
            .lines()
            .filter(|l| l.starts_with("timestamp,"))
            .count();
        assert_eq!(headers, 1);

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .from_reader(content.as_bytes());
        let rows: Vec<ComparisonRecord> = reader.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].token, "iBGT");
        assert_eq!(rows[0].percent_difference, Some(dec!(4.76)));
        assert_eq!(rows[1].token, "LBGT");
        assert_eq!(rows[1].price, None);
        assert_eq!(rows[1].percent_difference, None);

        let _ = fs::remove_dir_all(&data_dir);
    }
}
