//! Delta-neutral spread strategy.
//!
//! Each [`StrategyEngine::step`] reads both venues' mid prices and decides
//! whether to open an offsetting pair, close the open pair, or do nothing:
//!
//! - `|spread| >= min_spread_pct` opens: sell the rich venue, buy the cheap one
//! - `|spread| <= take_profit_spread_pct` closes every non-flat leg in full
//! - nothing trades within `cooldown_seconds` of the previous trade
//! - opens never push summed notional past `max_exposure_usd`

use super::sink::{EventSink, StrategyNotice};
use super::spread::SpreadSample;
use crate::clock::{Clock, SystemClock};
use crate::config::StrategyConfig;
use crate::exchange::{Fill, OrderRequest, OrderSide, Position, VenueAdapter, VenueError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Kind of trade action taken in a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Open,
    Close,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Open => "open",
            EventKind::Close => "close",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened in a trading cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub spread: Decimal,
    pub orders: Vec<Fill>,
    pub mid_a: Decimal,
    pub mid_b: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl StrategyEvent {
    fn new(kind: EventKind, sample: SpreadSample, orders: Vec<Fill>, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            spread: sample.spread,
            orders,
            mid_a: sample.mid_a,
            mid_b: sample.mid_b,
            timestamp,
        }
    }

    pub fn total_fees(&self) -> Decimal {
        self.orders.iter().map(|o| o.fee).sum()
    }
}

/// Failures that abort a cycle.
///
/// Legs execute sequentially; these variants carry whatever already filled
/// so the caller can reconcile.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("venue {venue} failed: {source}")]
    Venue {
        venue: String,
        #[source]
        source: VenueError,
    },

    #[error("open leg on {failed_venue} failed ({source}); first leg rolled back")]
    LegRolledBack {
        failed_venue: String,
        #[source]
        source: VenueError,
        /// First leg fill followed by its compensating fill.
        executed: Vec<Fill>,
    },

    #[error(
        "open leg on {failed_venue} failed ({source}) and rollback failed ({rollback_error}); order {} is unhedged",
        .unhedged.order_id
    )]
    UnhedgedLeg {
        failed_venue: String,
        #[source]
        source: VenueError,
        unhedged: Fill,
        rollback_error: VenueError,
    },

    #[error("close leg on {failed_venue} failed ({source}); {} leg(s) closed", .executed.len())]
    CloseIncomplete {
        failed_venue: String,
        #[source]
        source: VenueError,
        executed: Vec<Fill>,
    },
}

/// Decision engine trading one instrument across two venues.
pub struct StrategyEngine {
    config: StrategyConfig,
    venue_a: Arc<dyn VenueAdapter>,
    venue_b: Arc<dyn VenueAdapter>,
    clock: Arc<dyn Clock>,
    sink: Option<Arc<dyn EventSink>>,
    last_trade_time: DateTime<Utc>,
}

impl StrategyEngine {
    /// Create an engine on the system clock with no sink attached.
    pub fn new(
        config: StrategyConfig,
        venue_a: Arc<dyn VenueAdapter>,
        venue_b: Arc<dyn VenueAdapter>,
    ) -> Self {
        Self {
            config,
            venue_a,
            venue_b,
            clock: Arc::new(SystemClock),
            sink: None,
            last_trade_time: DateTime::UNIX_EPOCH,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Time of the last open or close.
    pub fn last_trade_time(&self) -> DateTime<Utc> {
        self.last_trade_time
    }

    pub fn should_open(&self, spread: Decimal) -> bool {
        spread.abs() >= self.config.min_spread_pct
    }

    pub fn should_close(&self, spread: Decimal) -> bool {
        spread.abs() <= self.config.take_profit_spread_pct
    }

    /// Summed absolute notional held on both venues.
    pub async fn current_exposure(&self) -> Result<Decimal, StrategyError> {
        let (pos_a, pos_b) = self.positions().await?;
        Ok(pos_a.notional.abs() + pos_b.notional.abs())
    }

    /// Run one decision cycle.
    #[instrument(skip(self), fields(pair = %self.config.pair))]
    pub async fn step(&mut self) -> Result<Option<StrategyEvent>, StrategyError> {
        let pair = self.config.pair.as_str();
        let mid_a = self
            .venue_a
            .get_mid_price(pair)
            .await
            .map_err(|e| venue_error(&*self.venue_a, e))?;
        let mid_b = self
            .venue_b
            .get_mid_price(pair)
            .await
            .map_err(|e| venue_error(&*self.venue_b, e))?;
        let sample = SpreadSample::new(mid_a, mid_b);
        let now = self.clock.now();

        debug!(%mid_a, %mid_b, spread = %sample.spread, "Spread sample");

        // Cooldown gates closes as well as opens.
        if let Some(remaining) = self.cooldown_remaining(now) {
            self.notify(StrategyNotice::CooldownActive {
                spread: sample.spread,
                remaining_secs: remaining.as_secs(),
            });
            return Ok(None);
        }

        if self.should_open(sample.spread) {
            return self.open(sample, now).await;
        }

        let (pos_a, pos_b) = self.positions().await?;
        if (!pos_a.is_flat() || !pos_b.is_flat()) && self.should_close(sample.spread) {
            return self.close(sample, now, pos_a, pos_b).await;
        }

        Ok(None)
    }

    fn cooldown_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        let cooldown = Duration::from_secs(self.config.cooldown_seconds);
        match (now - self.last_trade_time).to_std() {
            Ok(elapsed) if elapsed >= cooldown => None,
            Ok(elapsed) => Some(cooldown - elapsed),
            // Clock behind the last trade: still cooling down.
            Err(_) => Some(cooldown),
        }
    }

    async fn positions(&self) -> Result<(Position, Position), StrategyError> {
        let pair = self.config.pair.as_str();
        let pos_a = self
            .venue_a
            .get_position(pair)
            .await
            .map_err(|e| venue_error(&*self.venue_a, e))?;
        let pos_b = self
            .venue_b
            .get_position(pair)
            .await
            .map_err(|e| venue_error(&*self.venue_b, e))?;
        Ok((pos_a, pos_b))
    }

    async fn open(
        &mut self,
        sample: SpreadSample,
        now: DateTime<Utc>,
    ) -> Result<Option<StrategyEvent>, StrategyError> {
        let order_size = self.config.order_size_usd;
        let current = self.current_exposure().await?;
        let requested = order_size * Decimal::TWO;

        if current + requested > self.config.max_exposure_usd {
            self.notify(StrategyNotice::ExposureLimit {
                spread: sample.spread,
                current,
                requested,
                max: self.config.max_exposure_usd,
            });
            return Ok(None);
        }

        // A rich relative to B: short A, long B to capture convergence.
        let (side_a, side_b) = if sample.a_is_rich() {
            (OrderSide::Sell, OrderSide::Buy)
        } else {
            (OrderSide::Buy, OrderSide::Sell)
        };

        let pair = self.config.pair.clone();
        let fill_a = self
            .venue_a
            .place_order(OrderRequest::market(&pair, side_a, order_size))
            .await
            .map_err(|e| {
                self.notify_leg_failure(&*self.venue_a, &e);
                venue_error(&*self.venue_a, e)
            })?;

        let fill_b = match self
            .venue_b
            .place_order(OrderRequest::market(&pair, side_b, order_size))
            .await
        {
            Ok(fill) => fill,
            Err(e) => {
                self.last_trade_time = now;
                self.notify_leg_failure(&*self.venue_b, &e);
                return Err(self.roll_back(fill_a, e).await);
            }
        };

        self.last_trade_time = now;
        let event = StrategyEvent::new(EventKind::Open, sample, vec![fill_a, fill_b], now);
        self.notify(StrategyNotice::Trade(event.clone()));
        Ok(Some(event))
    }

    /// Undo an executed first leg after the second leg failed.
    async fn roll_back(&self, executed: Fill, cause: VenueError) -> StrategyError {
        let failed_venue = self.venue_b.venue_id();
        warn!(
            %failed_venue,
            order_id = %executed.order_id,
            "Second leg failed; rolling back first leg"
        );

        let compensation = OrderRequest::market(
            self.config.pair.clone(),
            executed.side.opposite(),
            executed.notional,
        );
        match self.venue_a.place_order(compensation).await {
            Ok(undo) => StrategyError::LegRolledBack {
                failed_venue,
                source: cause,
                executed: vec![executed, undo],
            },
            Err(rollback_error) => {
                self.notify_leg_failure(&*self.venue_a, &rollback_error);
                StrategyError::UnhedgedLeg {
                    failed_venue,
                    source: cause,
                    unhedged: executed,
                    rollback_error,
                }
            }
        }
    }

    async fn close(
        &mut self,
        sample: SpreadSample,
        now: DateTime<Utc>,
        pos_a: Position,
        pos_b: Position,
    ) -> Result<Option<StrategyEvent>, StrategyError> {
        let mut orders = Vec::with_capacity(2);
        let legs = [
            (Arc::clone(&self.venue_a), pos_a),
            (Arc::clone(&self.venue_b), pos_b),
        ];

        for (venue, position) in legs {
            let Some(side) = position.closing_side() else {
                continue;
            };
            let request = OrderRequest::market(self.config.pair.clone(), side, position.notional);
            match venue.place_order(request).await {
                Ok(fill) => orders.push(fill),
                Err(e) => {
                    if !orders.is_empty() {
                        self.last_trade_time = now;
                    }
                    self.notify_leg_failure(&*venue, &e);
                    return Err(StrategyError::CloseIncomplete {
                        failed_venue: venue.venue_id(),
                        source: e,
                        executed: orders,
                    });
                }
            }
        }

        self.last_trade_time = now;
        let event = StrategyEvent::new(EventKind::Close, sample, orders, now);
        self.notify(StrategyNotice::Trade(event.clone()));
        Ok(Some(event))
    }

    fn notify(&self, notice: StrategyNotice) {
        if let Some(sink) = &self.sink {
            sink.notify(&notice);
        }
    }

    fn notify_leg_failure(&self, venue: &dyn VenueAdapter, error: &VenueError) {
        self.notify(StrategyNotice::LegFailure {
            venue: venue.venue_id(),
            reason: error.to_string(),
        });
    }
}

fn venue_error(venue: &dyn VenueAdapter, source: VenueError) -> StrategyError {
    StrategyError::Venue {
        venue: venue.venue_id(),
        source,
    }
}
