//! Relative price divergence between two venues.

use crate::utils::safe_div;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Signed spread `(mid_a - mid_b) / ((mid_a + mid_b) / 2)`.
///
/// Zero when the midpoint is zero.
pub fn compute_spread(mid_a: Decimal, mid_b: Decimal) -> Decimal {
    let midpoint = (mid_a + mid_b) / Decimal::TWO;
    safe_div(mid_a - mid_b, midpoint)
}

/// Mid prices observed in one cycle and the spread between them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpreadSample {
    pub mid_a: Decimal,
    pub mid_b: Decimal,
    pub spread: Decimal,
}

impl SpreadSample {
    pub fn new(mid_a: Decimal, mid_b: Decimal) -> Self {
        Self {
            mid_a,
            mid_b,
            spread: compute_spread(mid_a, mid_b),
        }
    }

    /// Venue A quotes above venue B.
    pub fn a_is_rich(&self) -> bool {
        self.spread > Decimal::ZERO
    }
}
