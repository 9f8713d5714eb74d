//! # Spread Arb
//!
//! Delta-neutral spread arbitrage of one instrument across two venues,
//! run against simulated venues in paper mode or over recorded prices in
//! backtest mode.
//!
//! ## Architecture
//!
//! - `config`: Configuration loading and validation
//! - `exchange`: Venue adapter contract and the in-memory venue simulator
//! - `strategy`: Spread computation and the open/close decision engine
//! - `backtest`: Historical data loading, alignment and replay
//! - `persistence`: CSV trade log and SQLite trade journal
//! - `clock`: Wall-clock and replay time sources
//! - `utils`: Shared decimal arithmetic

pub mod backtest;
pub mod clock;
pub mod config;
pub mod exchange;
pub mod persistence;
pub mod strategy;
pub mod utils;

pub use config::Config;
