//! Per-fill trade records and the append-only CSV trade log.

use crate::exchange::OrderSide;
use crate::strategy::{EventKind, StrategyEvent};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Column order of the trade log.
pub const CSV_HEADER: &str =
    "timestamp,type,connector,order_id,side,size_usd,price,fee,spread,mid_a,mid_b";

/// One fill together with the event context it was produced in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub connector: String,
    pub order_id: String,
    pub side: OrderSide,
    pub size_usd: Decimal,
    pub price: Decimal,
    pub fee: Decimal,
    pub spread: Decimal,
    pub mid_a: Decimal,
    pub mid_b: Decimal,
}

impl TradeRecord {
    /// One record per fill in the event.
    pub fn from_event(event: &StrategyEvent) -> Vec<Self> {
        event
            .orders
            .iter()
            .map(|fill| Self {
                timestamp: fill.timestamp,
                kind: event.kind,
                connector: fill.venue.clone(),
                order_id: fill.order_id.clone(),
                side: fill.side,
                size_usd: fill.notional,
                price: fill.executed_price,
                fee: fill.fee,
                spread: event.spread,
                mid_a: event.mid_a,
                mid_b: event.mid_b,
            })
            .collect()
    }

    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{},{},{}",
            self.timestamp.to_rfc3339(),
            self.kind,
            self.connector,
            self.order_id,
            self.side,
            self.size_usd,
            self.price,
            self.fee,
            self.spread,
            self.mid_a,
            self.mid_b,
        )
    }
}

/// Appends trade records to a CSV file, writing the header once.
#[derive(Debug, Clone)]
pub struct CsvTradeLog {
    path: PathBuf,
}

impl CsvTradeLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append every fill of an event. Returns the number of rows written.
    pub fn append(&self, event: &StrategyEvent) -> Result<usize> {
        self.append_records(&TradeRecord::from_event(event))
    }

    pub fn append_records(&self, records: &[TradeRecord]) -> Result<usize> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open trade log {}", self.path.display()))?;

        let is_new = file
            .metadata()
            .with_context(|| format!("Failed to stat trade log {}", self.path.display()))?
            .len()
            == 0;
        if is_new {
            writeln!(file, "{CSV_HEADER}")?;
        }

        for record in records {
            writeln!(file, "{}", record.to_csv_row())?;
        }

        debug!(path = %self.path.display(), rows = records.len(), "Trade log appended");
        Ok(records.len())
    }
}
