//! Shared utilities.

pub mod decimal;

pub use decimal::{safe_div, weighted_average};
