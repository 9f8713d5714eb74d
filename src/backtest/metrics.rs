//! Trade statistics for a backtest run.

use crate::strategy::{EventKind, StrategyEvent};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate counts over the events of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestMetrics {
    pub open_events: u64,
    pub close_events: u64,
    pub fills: u64,
    pub notional_traded: Decimal,
    pub total_fees: Decimal,
    /// Fees charged per venue id
    pub fees_by_venue: BTreeMap<String, Decimal>,
    /// Largest |spread| seen at an open
    pub max_open_spread: Decimal,
}

impl BacktestMetrics {
    /// Compute metrics from a sequence of events.
    pub fn from_events(events: &[StrategyEvent]) -> Self {
        let mut metrics = Self::default();
        for event in events {
            metrics.record(event);
        }
        metrics
    }

    pub fn record(&mut self, event: &StrategyEvent) {
        match event.kind {
            EventKind::Open => {
                self.open_events += 1;
                self.max_open_spread = self.max_open_spread.max(event.spread.abs());
            }
            EventKind::Close => self.close_events += 1,
        }

        for fill in &event.orders {
            self.fills += 1;
            self.notional_traded += fill.notional;
            self.total_fees += fill.fee;
            *self.fees_by_venue.entry(fill.venue.clone()).or_default() += fill.fee;
        }
    }

    pub fn trade_events(&self) -> u64 {
        self.open_events + self.close_events
    }

    /// Human-readable summary.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Trades: {} ({} open, {} close)\nFills: {}\nNotional traded: ${:.2}\nTotal fees: ${:.4}\nWidest open spread: {:.4}%",
            self.trade_events(),
            self.open_events,
            self.close_events,
            self.fills,
            self.notional_traded,
            self.total_fees,
            self.max_open_spread * Decimal::from(100),
        );
        for (venue, fees) in &self.fees_by_venue {
            out.push_str(&format!("\n  Fees {venue}: ${fees:.4}"));
        }
        out
    }
}
