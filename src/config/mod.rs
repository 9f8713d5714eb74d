//! Configuration management for the spread arbitrage bot.
//!
//! Loads a flat settings file (JSON, TOML or YAML) with environment
//! overrides, e.g. `ARB__MIN_SPREAD_PCT=0.003`.

use crate::clock::Clock;
use crate::exchange::{SimulatorConfig, UniformNoise, VenueSimulator};
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Problems that make a configuration unusable. Raised before any trading step.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required configuration key `{0}`")]
    MissingKey(&'static str),

    #[error("invalid value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Instrument traded on both venues
    #[serde(default)]
    pub pair: String,
    /// Venue identifier for leg A
    #[serde(default)]
    pub connector_a: String,
    /// Venue identifier for leg B
    #[serde(default)]
    pub connector_b: String,

    /// Minimum |spread| that opens a pair (0.002 = 0.2%)
    #[serde(default = "default_min_spread_pct")]
    pub min_spread_pct: Decimal,
    /// |spread| at or below which open pairs are closed
    #[serde(default = "default_take_profit_spread_pct")]
    pub take_profit_spread_pct: Decimal,
    /// Minimum seconds between trade actions
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
    /// Notional per leg in USD
    #[serde(default = "default_order_size_usd")]
    pub order_size_usd: Decimal,
    /// Cap on summed absolute notional across both venues
    #[serde(default = "default_max_exposure_usd")]
    pub max_exposure_usd: Decimal,

    /// Simulated taker fee per order
    #[serde(default = "default_fee_pct")]
    pub fee_pct: Decimal,
    /// Simulated slippage per order
    #[serde(default = "default_slippage_pct")]
    pub slippage_pct: Decimal,
    /// Starting collateral per venue id
    #[serde(default)]
    pub starting_balances: HashMap<String, Decimal>,
    /// Seed price for paper-mode simulators
    #[serde(default = "default_initial_price")]
    pub initial_price: Decimal,
    /// Apply ±0.01% jitter to simulated quotes
    #[serde(default = "default_price_noise")]
    pub price_noise: bool,
    /// Fixed seed for reproducible jitter
    #[serde(default)]
    pub price_noise_seed: Option<u64>,

    /// Historical `timestamp,price` CSV for venue A (backtest)
    #[serde(default)]
    pub historical_csv_a: Option<String>,
    /// Historical `timestamp,price` CSV for venue B (backtest)
    #[serde(default)]
    pub historical_csv_b: Option<String>,

    /// CSV trade log path
    #[serde(default = "default_log_path")]
    pub log_path: String,
    /// Optional SQLite trade journal
    #[serde(default)]
    pub database_path: Option<String>,
    /// Paper loop polling interval
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

/// Decision parameters consumed by the strategy engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub pair: String,
    pub min_spread_pct: Decimal,
    pub take_profit_spread_pct: Decimal,
    pub cooldown_seconds: u64,
    pub order_size_usd: Decimal,
    pub max_exposure_usd: Decimal,
}

impl StrategyConfig {
    pub fn new(pair: impl Into<String>) -> Self {
        Self {
            pair: pair.into(),
            min_spread_pct: default_min_spread_pct(),
            take_profit_spread_pct: default_take_profit_spread_pct(),
            cooldown_seconds: default_cooldown_seconds(),
            order_size_usd: default_order_size_usd(),
            max_exposure_usd: default_max_exposure_usd(),
        }
    }
}

// Default value functions
fn default_min_spread_pct() -> Decimal {
    Decimal::new(2, 3) // 0.002
}

fn default_take_profit_spread_pct() -> Decimal {
    Decimal::new(5, 4) // 0.0005
}

fn default_cooldown_seconds() -> u64 {
    60
}

fn default_order_size_usd() -> Decimal {
    Decimal::new(100, 0)
}

fn default_max_exposure_usd() -> Decimal {
    Decimal::new(1000, 0)
}

fn default_fee_pct() -> Decimal {
    Decimal::new(75, 5) // 0.00075
}

fn default_slippage_pct() -> Decimal {
    Decimal::new(5, 4) // 0.0005
}

/// Balance used for venues missing from `starting_balances`.
pub fn default_starting_balance() -> Decimal {
    Decimal::new(100, 0)
}

fn default_initial_price() -> Decimal {
    Decimal::new(20000, 0)
}

fn default_price_noise() -> bool {
    true
}

fn default_log_path() -> String {
    "trades.csv".to_string()
}

fn default_poll_interval_secs() -> u64 {
    1
}

impl Config {
    /// Load configuration from `.env`, the given file and `ARB__*` environment variables.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = path.as_ref();
        let config = config::Config::builder()
            .add_source(config::File::from(path).required(true))
            .add_source(config::Environment::default().separator("__").prefix("ARB"))
            .build()
            .with_context(|| format!("Failed to build configuration from {}", path.display()))?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pair.trim().is_empty() {
            return Err(ConfigError::MissingKey("pair"));
        }
        if self.connector_a.trim().is_empty() {
            return Err(ConfigError::MissingKey("connector_a"));
        }
        if self.connector_b.trim().is_empty() {
            return Err(ConfigError::MissingKey("connector_b"));
        }
        if self.connector_a == self.connector_b {
            return Err(ConfigError::Invalid {
                key: "connector_b",
                reason: format!("must differ from connector_a ({})", self.connector_a),
            });
        }

        ensure_non_negative("min_spread_pct", self.min_spread_pct)?;
        ensure_non_negative("take_profit_spread_pct", self.take_profit_spread_pct)?;
        ensure_non_negative("max_exposure_usd", self.max_exposure_usd)?;
        ensure_fraction("fee_pct", self.fee_pct)?;
        ensure_fraction("slippage_pct", self.slippage_pct)?;

        if self.order_size_usd <= Decimal::ZERO {
            return Err(ConfigError::Invalid {
                key: "order_size_usd",
                reason: format!("must be positive, got {}", self.order_size_usd),
            });
        }
        if self.initial_price <= Decimal::ZERO {
            return Err(ConfigError::Invalid {
                key: "initial_price",
                reason: format!("must be positive, got {}", self.initial_price),
            });
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "poll_interval_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if let Some((venue, balance)) = self
            .starting_balances
            .iter()
            .find(|(_, balance)| **balance < Decimal::ZERO)
        {
            return Err(ConfigError::Invalid {
                key: "starting_balances",
                reason: format!("{venue} has negative balance {balance}"),
            });
        }

        Ok(())
    }

    /// Validate for backtest mode, returning the two historical data paths.
    pub fn validate_backtest(&self) -> Result<(&str, &str), ConfigError> {
        self.validate()?;

        let csv_a = self
            .historical_csv_a
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or(ConfigError::MissingKey("historical_csv_a"))?;
        let csv_b = self
            .historical_csv_b
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or(ConfigError::MissingKey("historical_csv_b"))?;

        Ok((csv_a, csv_b))
    }

    /// Parameters for the strategy engine.
    pub fn strategy_config(&self) -> StrategyConfig {
        StrategyConfig {
            pair: self.pair.clone(),
            min_spread_pct: self.min_spread_pct,
            take_profit_spread_pct: self.take_profit_spread_pct,
            cooldown_seconds: self.cooldown_seconds,
            order_size_usd: self.order_size_usd,
            max_exposure_usd: self.max_exposure_usd,
        }
    }

    /// Starting balance configured for a venue.
    pub fn starting_balance(&self, venue_id: &str) -> Decimal {
        self.starting_balances
            .get(venue_id)
            .or_else(|| self.starting_balances.get(&venue_id.to_lowercase()))
            .copied()
            .unwrap_or_else(default_starting_balance)
    }

    /// Simulator parameters for one venue, seeded at `initial_price`.
    pub fn simulator_config(&self, venue_id: &str, initial_price: Decimal) -> SimulatorConfig {
        SimulatorConfig {
            venue_id: venue_id.to_string(),
            starting_balance: self.starting_balance(venue_id),
            initial_price,
            fee_pct: self.fee_pct,
            slippage_pct: self.slippage_pct,
        }
    }

    /// Build a simulated venue with the configured noise and the given clock.
    ///
    /// `seed_offset` keeps the two venues' noise streams apart when a fixed
    /// seed is configured.
    pub fn build_simulator(
        &self,
        venue_id: &str,
        initial_price: Decimal,
        clock: Arc<dyn Clock>,
        seed_offset: u64,
    ) -> VenueSimulator {
        let simulator =
            VenueSimulator::new(self.simulator_config(venue_id, initial_price)).with_clock(clock);

        match (self.price_noise, self.price_noise_seed) {
            (false, _) => simulator,
            (true, Some(seed)) => {
                simulator.with_noise(UniformNoise::seeded(seed.wrapping_add(seed_offset)))
            }
            (true, None) => simulator.with_noise(UniformNoise::from_entropy()),
        }
    }
}

fn ensure_non_negative(key: &'static str, value: Decimal) -> Result<(), ConfigError> {
    if value < Decimal::ZERO {
        return Err(ConfigError::Invalid {
            key,
            reason: format!("must not be negative, got {value}"),
        });
    }
    Ok(())
}

fn ensure_fraction(key: &'static str, value: Decimal) -> Result<(), ConfigError> {
    if value < Decimal::ZERO || value >= Decimal::ONE {
        return Err(ConfigError::Invalid {
            key,
            reason: format!("must be in [0, 1), got {value}"),
        });
    }
    Ok(())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pair: String::new(),
            connector_a: String::new(),
            connector_b: String::new(),
            min_spread_pct: default_min_spread_pct(),
            take_profit_spread_pct: default_take_profit_spread_pct(),
            cooldown_seconds: default_cooldown_seconds(),
            order_size_usd: default_order_size_usd(),
            max_exposure_usd: default_max_exposure_usd(),
            fee_pct: default_fee_pct(),
            slippage_pct: default_slippage_pct(),
            starting_balances: HashMap::new(),
            initial_price: default_initial_price(),
            price_noise: default_price_noise(),
            price_noise_seed: None,
            historical_csv_a: None,
            historical_csv_b: None,
            log_path: default_log_path(),
            database_path: None,
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}
