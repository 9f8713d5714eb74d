//! Order, fill and position types shared by every venue adapter.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// `+1` for buys, `-1` for sells.
    pub fn sign(self) -> Decimal {
        match self {
            OrderSide::Buy => Decimal::ONE,
            OrderSide::Sell => Decimal::NEGATIVE_ONE,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
    Flat,
}

impl From<OrderSide> for PositionSide {
    fn from(side: OrderSide) -> Self {
        match side {
            OrderSide::Buy => PositionSide::Long,
            OrderSide::Sell => PositionSide::Short,
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSide::Long => f.write_str("long"),
            PositionSide::Short => f.write_str("short"),
            PositionSide::Flat => f.write_str("flat"),
        }
    }
}

/// Notional position held on one venue for one instrument.
///
/// `side` is `Flat` exactly when `notional` is zero, and `entry_price`
/// is present exactly when `notional` is positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub notional: Decimal,
    pub side: PositionSide,
    pub entry_price: Option<Decimal>,
}

impl Position {
    pub fn flat() -> Self {
        Self {
            notional: Decimal::ZERO,
            side: PositionSide::Flat,
            entry_price: None,
        }
    }

    pub fn open(notional: Decimal, side: OrderSide, entry_price: Decimal) -> Self {
        Self {
            notional,
            side: side.into(),
            entry_price: Some(entry_price),
        }
    }

    pub fn is_flat(&self) -> bool {
        self.notional == Decimal::ZERO
    }

    /// The order side that would reduce this position, if any.
    pub fn closing_side(&self) -> Option<OrderSide> {
        match self.side {
            PositionSide::Long => Some(OrderSide::Sell),
            PositionSide::Short => Some(OrderSide::Buy),
            PositionSide::Flat => None,
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::flat()
    }
}

/// Market order request, sized in quote-currency notional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub instrument: String,
    pub side: OrderSide,
    pub notional: Decimal,
    /// Reference price to execute against instead of the venue mid.
    pub limit_price: Option<Decimal>,
}

impl OrderRequest {
    pub fn market(instrument: impl Into<String>, side: OrderSide, notional: Decimal) -> Self {
        Self {
            instrument: instrument.into(),
            side,
            notional,
            limit_price: None,
        }
    }

    pub fn with_limit_price(mut self, price: Decimal) -> Self {
        self.limit_price = Some(price);
        self
    }
}

/// Execution report for a single order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub venue: String,
    pub side: OrderSide,
    pub executed_price: Decimal,
    pub notional: Decimal,
    pub fee: Decimal,
    pub timestamp: DateTime<Utc>,
}
