//! Venue-agnostic trading interface.
//!
//! The strategy engine talks to every venue (simulated or live) through
//! [`VenueAdapter`], so swapping a paper venue for a real one never touches
//! decision logic.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use super::types::{Fill, OrderRequest, Position};

/// Failures a venue adapter can surface.
///
/// The simulator never produces these; live adapters must map rejections
/// and timeouts onto them instead of panicking.
#[derive(Debug, Error)]
pub enum VenueError {
    #[error("order rejected by {venue}: {reason}")]
    Rejected { venue: String, reason: String },

    #[error("request to {venue} timed out after {timeout_secs}s")]
    Timeout { venue: String, timeout_secs: u64 },

    #[error("{venue} unavailable: {reason}")]
    Unavailable { venue: String, reason: String },

    #[error("no price available on {venue} for {instrument}")]
    NoPrice { venue: String, instrument: String },
}

/// Capability contract for a trading venue.
///
/// Implementations own their balance and position state; callers mutate it
/// only through [`VenueAdapter::place_order`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    /// Identifier used in order ids and trade logs.
    fn venue_id(&self) -> String;

    /// Current reference (mid) price for an instrument.
    async fn get_mid_price(&self, instrument: &str) -> Result<Decimal, VenueError>;

    /// Execute an order, returning its fill.
    async fn place_order(&self, order: OrderRequest) -> Result<Fill, VenueError>;

    /// Current position for an instrument.
    async fn get_position(&self, instrument: &str) -> Result<Position, VenueError>;

    /// Free collateral in quote currency.
    async fn get_balance(&self) -> Result<Decimal, VenueError>;

    async fn cancel_order(&self, order_id: &str) -> Result<(), VenueError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_venue_error_display() {
        let err = VenueError::Timeout {
            venue: "mock_b".to_string(),
            timeout_secs: 5,
        };
        assert_eq!(err.to_string(), "request to mock_b timed out after 5s");

        let err = VenueError::Rejected {
            venue: "mock_a".to_string(),
            reason: "insufficient margin".to_string(),
        };
        assert!(err.to_string().contains("insufficient margin"));
    }
}
