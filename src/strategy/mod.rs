//! Trading strategy implementation.
//!
//! Contains the core logic for:
//! - Spread measurement between two venues
//! - Open/close/cooldown/exposure decisions and order placement
//! - Structured notices for observers of those decisions

mod engine;
mod sink;
mod spread;

pub use engine::{EventKind, StrategyEngine, StrategyError, StrategyEvent};
pub use sink::{EventSink, RecordingSink, StrategyNotice, TracingSink};
pub use spread::{compute_spread, SpreadSample};
