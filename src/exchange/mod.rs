//! Venue integration.
//!
//! - `traits`: the [`VenueAdapter`] capability interface consumed by the strategy
//! - `types`: orders, fills and positions
//! - `mock`: [`VenueSimulator`], an in-memory venue for paper trading and backtests

pub mod mock;
pub mod traits;
pub mod types;

pub use mock::{NoNoise, PriceNoise, SimulatorConfig, SimulatorState, UniformNoise, VenueSimulator};
pub use traits::{VenueAdapter, VenueError};
pub use types::{Fill, OrderRequest, OrderSide, Position, PositionSide};

#[cfg(test)]
pub use traits::MockVenueAdapter;
