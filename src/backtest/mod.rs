//! Backtesting against recorded prices.
//!
//! This module provides:
//! - Historical `timestamp,price` CSV loading
//! - Nearest-timestamp alignment of the two venues' series
//! - A replay engine that drives the strategy on data time
//! - Trade statistics for the run
//!
//! # Example
//!
//! ```rust,ignore
//! use spread_arb::backtest::BacktestEngine;
//!
//! let engine = BacktestEngine::new(config);
//! let samples = engine.load_aligned()?;
//! let result = engine.run(&samples).await?;
//! println!("{}", result.summary());
//! ```

mod align;
mod data;
mod engine;
mod metrics;

pub use align::{align_nearest, AlignedSample};
pub use data::{parse_timestamp, PricePoint, PriceSeries};
pub use engine::{BacktestEngine, BacktestResult, VenueReport};
pub use metrics::BacktestMetrics;
