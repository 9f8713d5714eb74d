//! Simulated venue for paper trading and backtesting.
//!
//! Every order fills immediately and completely against the venue's own mid
//! price, adjusted for slippage. Fees come out of the balance; no PnL is
//! realized.

use super::traits::{VenueAdapter, VenueError};
use super::types::{Fill, OrderRequest, OrderSide, Position, PositionSide};
use crate::clock::{Clock, SystemClock};
use crate::utils::weighted_average;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// Lowest mid price the simulator will ever report.
pub const MIN_PRICE: Decimal = dec!(0.01);

/// Jitter resolution: offsets are drawn as `k / 10^8` of the price with
/// `|k| <= JITTER_STEPS`, i.e. at most ±0.01%.
const JITTER_STEPS: i64 = 10_000;
const JITTER_SCALE: u32 = 8;

/// Source of per-quote price noise.
pub trait PriceNoise: Send + Sync {
    /// Return `price` with noise applied.
    fn perturb(&mut self, price: Decimal) -> Decimal;
}

/// Leaves prices untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoNoise;

impl PriceNoise for NoNoise {
    fn perturb(&mut self, price: Decimal) -> Decimal {
        price
    }
}

/// Uniform jitter in `[-0.01%, +0.01%]` of the price.
#[derive(Debug, Clone)]
pub struct UniformNoise {
    rng: StdRng,
}

impl UniformNoise {
    /// Reproducible noise stream.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl PriceNoise for UniformNoise {
    fn perturb(&mut self, price: Decimal) -> Decimal {
        let k = self.rng.gen_range(-JITTER_STEPS..=JITTER_STEPS);
        price + price * Decimal::new(k, JITTER_SCALE)
    }
}

/// Static parameters of a simulated venue.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub venue_id: String,
    pub starting_balance: Decimal,
    pub initial_price: Decimal,
    pub fee_pct: Decimal,
    pub slippage_pct: Decimal,
}

impl SimulatorConfig {
    pub fn new(venue_id: impl Into<String>) -> Self {
        Self {
            venue_id: venue_id.into(),
            ..Default::default()
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            venue_id: "mock".to_string(),
            starting_balance: dec!(100),
            initial_price: dec!(20000),
            fee_pct: dec!(0.00075),
            slippage_pct: dec!(0.0005),
        }
    }
}

/// Mutable state of a simulated venue.
#[derive(Debug, Clone)]
pub struct SimulatorState {
    pub starting_balance: Decimal,
    pub balance: Decimal,
    pub price: Decimal,
    pub positions: HashMap<String, Position>,
    pub total_fees: Decimal,
    pub order_count: u64,
}

impl SimulatorState {
    fn new(starting_balance: Decimal, price: Decimal) -> Self {
        Self {
            starting_balance,
            balance: starting_balance,
            price,
            positions: HashMap::new(),
            total_fees: Decimal::ZERO,
            order_count: 0,
        }
    }

    /// Position for an instrument, flat if never traded.
    pub fn position(&self, instrument: &str) -> Position {
        self.positions.get(instrument).cloned().unwrap_or_default()
    }
}

/// Apply a fill of `notional` at `price` to an existing position.
///
/// Opposite-side fills of exactly the held notional close the position
/// instead of flipping it to a zero-sized opposite side.
pub fn apply_fill(
    current: &Position,
    side: OrderSide,
    notional: Decimal,
    price: Decimal,
) -> Position {
    if notional <= Decimal::ZERO {
        return current.clone();
    }

    if current.is_flat() {
        return Position::open(notional, side, price);
    }

    let incoming = PositionSide::from(side);
    if current.side == incoming {
        let old_entry = current.entry_price.unwrap_or(price);
        let avg = weighted_average(&[(old_entry, current.notional), (price, notional)]);
        return Position::open(current.notional + notional, side, avg);
    }

    if notional < current.notional {
        Position {
            notional: current.notional - notional,
            side: current.side,
            entry_price: current.entry_price,
        }
    } else if notional == current.notional {
        Position::flat()
    } else {
        Position::open(notional - current.notional, side, price)
    }
}

/// In-memory venue that satisfies [`VenueAdapter`].
pub struct VenueSimulator {
    config: SimulatorConfig,
    state: Arc<RwLock<SimulatorState>>,
    noise: Mutex<Box<dyn PriceNoise>>,
    clock: Arc<dyn Clock>,
    order_id_counter: AtomicU64,
}

impl VenueSimulator {
    /// Create a simulator without price noise, stamped by the system clock.
    pub fn new(config: SimulatorConfig) -> Self {
        let state = SimulatorState::new(config.starting_balance, config.initial_price);
        Self {
            config,
            state: Arc::new(RwLock::new(state)),
            noise: Mutex::new(Box::new(NoNoise)),
            clock: Arc::new(SystemClock),
            order_id_counter: AtomicU64::new(1),
        }
    }

    pub fn with_noise(mut self, noise: impl PriceNoise + 'static) -> Self {
        self.noise = Mutex::new(Box::new(noise));
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Push a new reference price (replay rows, external feeds).
    pub async fn set_price(&self, price: Decimal) {
        self.state.write().await.price = price;
    }

    /// Copy of the current state for reporting.
    pub async fn get_state(&self) -> SimulatorState {
        self.state.read().await.clone()
    }

    /// Reset balance, positions and counters for a new run.
    pub async fn reset(&self, starting_balance: Decimal) {
        let mut state = self.state.write().await;
        *state = SimulatorState::new(starting_balance, self.config.initial_price);
        self.order_id_counter.store(1, Ordering::SeqCst);

        debug!(venue = %self.config.venue_id, balance = %starting_balance, "Simulator state reset");
    }

    fn next_order_id(&self) -> String {
        let n = self.order_id_counter.fetch_add(1, Ordering::SeqCst);
        format!("{}-order-{}", self.config.venue_id, n)
    }
}

#[async_trait]
impl VenueAdapter for VenueSimulator {
    fn venue_id(&self) -> String {
        self.config.venue_id.clone()
    }

    async fn get_mid_price(&self, _instrument: &str) -> Result<Decimal, VenueError> {
        let price = self.state.read().await.price;
        let quoted = self.noise.lock().await.perturb(price);
        Ok(quoted.max(MIN_PRICE))
    }

    async fn place_order(&self, order: OrderRequest) -> Result<Fill, VenueError> {
        let order_id = self.next_order_id();
        let reference = match order.limit_price {
            Some(price) => price,
            None => self.get_mid_price(&order.instrument).await?,
        };
        let executed_price = reference * (Decimal::ONE + order.side.sign() * self.config.slippage_pct);
        let fee = order.notional.abs() * self.config.fee_pct;

        if order.notional <= Decimal::ZERO {
            warn!(
                venue = %self.config.venue_id,
                notional = %order.notional,
                "Non-positive order notional; position left unchanged"
            );
        }

        let mut state = self.state.write().await;
        let current = state.position(&order.instrument);
        let updated = apply_fill(&current, order.side, order.notional, executed_price);
        state.positions.insert(order.instrument.clone(), updated.clone());
        state.balance -= fee;
        state.total_fees += fee;
        state.order_count += 1;

        if state.balance < Decimal::ZERO {
            warn!(venue = %self.config.venue_id, balance = %state.balance, "Simulated balance below zero");
        }

        debug!(
            venue = %self.config.venue_id,
            %order_id,
            side = %order.side,
            notional = %order.notional,
            %executed_price,
            %fee,
            position_side = %updated.side,
            position_notional = %updated.notional,
            "Simulated fill"
        );

        Ok(Fill {
            order_id,
            venue: self.config.venue_id.clone(),
            side: order.side,
            executed_price,
            notional: order.notional,
            fee,
            timestamp: self.clock.now(),
        })
    }

    async fn get_position(&self, instrument: &str) -> Result<Position, VenueError> {
        Ok(self.state.read().await.position(instrument))
    }

    async fn get_balance(&self) -> Result<Decimal, VenueError> {
        Ok(self.state.read().await.balance)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), VenueError> {
        // Orders fill on placement; nothing is ever resting.
        debug!(venue = %self.config.venue_id, %order_id, "Cancel ignored by simulator");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAIR: &str = "BTC-PERP";

    fn frictionless(price: Decimal) -> VenueSimulator {
        VenueSimulator::new(SimulatorConfig {
            venue_id: "mock_a".to_string(),
            starting_balance: dec!(1000),
            initial_price: price,
            fee_pct: Decimal::ZERO,
            slippage_pct: Decimal::ZERO,
        })
    }

    async fn order(sim: &VenueSimulator, side: OrderSide, notional: Decimal) -> Fill {
        sim.place_order(OrderRequest::market(PAIR, side, notional))
            .await
            .unwrap()
    }

    fn assert_invariant(position: &Position) {
        assert!(position.notional >= Decimal::ZERO);
        assert_eq!(position.side == PositionSide::Flat, position.notional == Decimal::ZERO);
        assert_eq!(position.entry_price.is_some(), position.notional > Decimal::ZERO);
    }

    // =========================================================================
    // Position update rules
    // =========================================================================

    #[tokio::test]
    async fn test_open_from_flat() {
        let sim = frictionless(dec!(100));
        order(&sim, OrderSide::Buy, dec!(100)).await;

        let position = sim.get_position(PAIR).await.unwrap();
        assert_eq!(position, Position::open(dec!(100), OrderSide::Buy, dec!(100)));
    }

    #[tokio::test]
    async fn test_same_side_averages_entry() {
        let sim = frictionless(dec!(100));
        order(&sim, OrderSide::Buy, dec!(100)).await;
        sim.set_price(dec!(110)).await;
        order(&sim, OrderSide::Buy, dec!(100)).await;

        let position = sim.get_position(PAIR).await.unwrap();
        assert_eq!(position.notional, dec!(200));
        assert_eq!(position.side, PositionSide::Long);
        assert_eq!(position.entry_price, Some(dec!(105)));
    }

    #[tokio::test]
    async fn test_same_side_average_is_notional_weighted() {
        let sim = frictionless(dec!(100));
        order(&sim, OrderSide::Sell, dec!(300)).await;
        sim.set_price(dec!(200)).await;
        order(&sim, OrderSide::Sell, dec!(100)).await;

        let position = sim.get_position(PAIR).await.unwrap();
        // (300*100 + 100*200) / 400 = 125
        assert_eq!(position.entry_price, Some(dec!(125)));
        assert_eq!(position.side, PositionSide::Short);
    }

    #[tokio::test]
    async fn test_partial_reduce_keeps_entry() {
        let sim = frictionless(dec!(100));
        order(&sim, OrderSide::Buy, dec!(200)).await;
        sim.set_price(dec!(120)).await;
        order(&sim, OrderSide::Sell, dec!(50)).await;

        let position = sim.get_position(PAIR).await.unwrap();
        assert_eq!(position.notional, dec!(150));
        assert_eq!(position.side, PositionSide::Long);
        assert_eq!(position.entry_price, Some(dec!(100)));
    }

    #[tokio::test]
    async fn test_opposite_side_larger_order_flips() {
        let sim = frictionless(dec!(100));
        order(&sim, OrderSide::Buy, dec!(200)).await;
        sim.set_price(dec!(90)).await;
        let fill = order(&sim, OrderSide::Sell, dec!(300)).await;

        let position = sim.get_position(PAIR).await.unwrap();
        assert_eq!(position.notional, dec!(100));
        assert_eq!(position.side, PositionSide::Short);
        assert_eq!(position.entry_price, Some(fill.executed_price));
    }

    #[tokio::test]
    async fn test_opposite_side_equal_order_goes_flat() {
        let sim = frictionless(dec!(100));
        order(&sim, OrderSide::Buy, dec!(200)).await;
        order(&sim, OrderSide::Sell, dec!(200)).await;

        let position = sim.get_position(PAIR).await.unwrap();
        assert_eq!(position, Position::flat());
    }

    #[test]
    fn test_apply_fill_ignores_non_positive_notional() {
        let current = Position::open(dec!(50), OrderSide::Sell, dec!(10));
        assert_eq!(apply_fill(&current, OrderSide::Buy, Decimal::ZERO, dec!(11)), current);
        assert_eq!(apply_fill(&Position::flat(), OrderSide::Buy, dec!(-5), dec!(11)), Position::flat());
    }

    #[tokio::test]
    async fn test_position_invariant_over_order_sequence() {
        let sim = frictionless(dec!(100));
        let sequence = [
            (OrderSide::Buy, dec!(100)),
            (OrderSide::Buy, dec!(50)),
            (OrderSide::Sell, dec!(150)),
            (OrderSide::Sell, dec!(80)),
            (OrderSide::Buy, dec!(200)),
            (OrderSide::Sell, dec!(20)),
            (OrderSide::Sell, dec!(100)),
            (OrderSide::Buy, dec!(0.5)),
        ];

        for (i, (side, notional)) in sequence.into_iter().enumerate() {
            sim.set_price(dec!(100) + Decimal::from(i as i64)).await;
            order(&sim, side, notional).await;
            assert_invariant(&sim.get_position(PAIR).await.unwrap());
        }

        // +100 +50 -150 -80 +200 -20 -100 +0.5 = 0.5 long
        let position = sim.get_position(PAIR).await.unwrap();
        assert_eq!(position.notional, dec!(0.5));
        assert_eq!(position.side, PositionSide::Long);
    }

    // =========================================================================
    // Pricing, slippage and fees
    // =========================================================================

    #[tokio::test]
    async fn test_slippage_direction() {
        let sim = VenueSimulator::new(SimulatorConfig {
            initial_price: dec!(100),
            slippage_pct: dec!(0.001),
            ..SimulatorConfig::new("mock_a")
        });

        let buy = order(&sim, OrderSide::Buy, dec!(10)).await;
        let sell = order(&sim, OrderSide::Sell, dec!(10)).await;
        assert_eq!(buy.executed_price, dec!(100.1));
        assert_eq!(sell.executed_price, dec!(99.9));
    }

    #[tokio::test]
    async fn test_limit_price_overrides_mid() {
        let sim = VenueSimulator::new(SimulatorConfig {
            initial_price: dec!(100),
            slippage_pct: dec!(0.001),
            ..SimulatorConfig::new("mock_a")
        });

        let fill = sim
            .place_order(OrderRequest::market(PAIR, OrderSide::Buy, dec!(10)).with_limit_price(dec!(200)))
            .await
            .unwrap();
        assert_eq!(fill.executed_price, dec!(200.2));
    }

    #[tokio::test]
    async fn test_fee_deducted_for_every_order() {
        let sim = VenueSimulator::new(SimulatorConfig {
            starting_balance: dec!(100),
            initial_price: dec!(100),
            fee_pct: dec!(0.001),
            ..SimulatorConfig::new("mock_a")
        });

        let open = order(&sim, OrderSide::Buy, dec!(100)).await;
        let close = order(&sim, OrderSide::Sell, dec!(100)).await;
        assert_eq!(open.fee, dec!(0.1));
        assert_eq!(close.fee, dec!(0.1));

        assert_eq!(sim.get_balance().await.unwrap(), dec!(99.8));
        let state = sim.get_state().await;
        assert_eq!(state.total_fees, dec!(0.2));
        assert_eq!(state.order_count, 2);
    }

    #[tokio::test]
    async fn test_order_ids_unique_and_prefixed() {
        let sim = frictionless(dec!(100));
        let first = order(&sim, OrderSide::Buy, dec!(1)).await;
        let second = order(&sim, OrderSide::Buy, dec!(1)).await;

        assert_eq!(first.order_id, "mock_a-order-1");
        assert_eq!(second.order_id, "mock_a-order-2");
        assert_eq!(first.venue, "mock_a");
    }

    #[tokio::test]
    async fn test_mid_price_floor() {
        let sim = frictionless(dec!(0.001));
        assert_eq!(sim.get_mid_price(PAIR).await.unwrap(), MIN_PRICE);
    }

    #[tokio::test]
    async fn test_seeded_noise_is_bounded_and_reproducible() {
        let first = frictionless(dec!(20000)).with_noise(UniformNoise::seeded(7));
        let second = frictionless(dec!(20000)).with_noise(UniformNoise::seeded(7));

        for _ in 0..50 {
            let a = first.get_mid_price(PAIR).await.unwrap();
            let b = second.get_mid_price(PAIR).await.unwrap();
            assert_eq!(a, b);
            assert!(a >= dec!(19998) && a <= dec!(20002));
        }
    }

    #[tokio::test]
    async fn test_reset_restores_starting_state() {
        let sim = frictionless(dec!(100));
        order(&sim, OrderSide::Buy, dec!(10)).await;
        sim.reset(dec!(500)).await;

        let state = sim.get_state().await;
        assert_eq!(state.balance, dec!(500));
        assert!(state.positions.is_empty());
        assert_eq!(order(&sim, OrderSide::Buy, dec!(1)).await.order_id, "mock_a-order-1");
    }

    #[tokio::test]
    async fn test_cancel_is_noop() {
        let sim = frictionless(dec!(100));
        order(&sim, OrderSide::Buy, dec!(10)).await;
        sim.cancel_order("mock_a-order-1").await.unwrap();
        assert_eq!(sim.get_position(PAIR).await.unwrap().notional, dec!(10));
    }
}
