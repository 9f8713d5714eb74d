//! Structured notices emitted by the strategy engine.
//!
//! The engine reports what it decided to an optional [`EventSink`] rather
//! than to a global logger; [`TracingSink`] forwards notices to `tracing`.

use super::engine::{EventKind, StrategyEvent};
use crate::utils::decimal::to_basis_points;
use rust_decimal::Decimal;
use std::sync::Mutex;
use tracing::{debug, error, info};

/// Something the engine wants an observer to know about.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyNotice {
    /// A cycle was skipped because the last trade is too recent.
    CooldownActive { spread: Decimal, remaining_secs: u64 },
    /// An open was skipped because it would breach the exposure cap.
    ExposureLimit {
        spread: Decimal,
        current: Decimal,
        requested: Decimal,
        max: Decimal,
    },
    /// An open or close event was produced.
    Trade(StrategyEvent),
    /// A venue leg failed mid-trade.
    LegFailure { venue: String, reason: String },
}

/// Observer of strategy decisions.
pub trait EventSink: Send + Sync {
    fn notify(&self, notice: &StrategyNotice);
}

/// Writes notices to the `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn notify(&self, notice: &StrategyNotice) {
        match notice {
            StrategyNotice::CooldownActive {
                spread,
                remaining_secs,
            } => {
                debug!(spread_bps = %to_basis_points(*spread).round_dp(2), remaining_secs, "Cooldown active");
            }
            StrategyNotice::ExposureLimit {
                spread,
                current,
                requested,
                max,
            } => {
                info!(
                    spread_bps = %to_basis_points(*spread).round_dp(2),
                    %current,
                    %requested,
                    %max,
                    "Max exposure would be exceeded; skipping open"
                );
            }
            StrategyNotice::Trade(event) => {
                let label = match event.kind {
                    EventKind::Open => "Opened delta-neutral pair",
                    EventKind::Close => "Closed delta-neutral pair",
                };
                info!(
                    kind = %event.kind,
                    spread = %event.spread.round_dp(6),
                    mid_a = %event.mid_a,
                    mid_b = %event.mid_b,
                    orders = event.orders.len(),
                    fees = %event.total_fees(),
                    "{label}"
                );
            }
            StrategyNotice::LegFailure { venue, reason } => {
                error!(%venue, %reason, "Venue leg failed");
            }
        }
    }
}

/// Keeps every notice in memory, for inspection after a run.
#[derive(Debug, Default)]
pub struct RecordingSink {
    notices: Mutex<Vec<StrategyNotice>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<StrategyNotice> {
        self.notices
            .lock()
            .map(|n| n.clone())
            .unwrap_or_default()
    }
}

impl EventSink for RecordingSink {
    fn notify(&self, notice: &StrategyNotice) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(notice.clone());
        }
    }
}
