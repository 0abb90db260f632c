use apex_instrument::Side;
use apex_integration::time::Time;
use serde::{Deserialize, Serialize};

/// Whether a trade tick is a single print or a venue-side aggregation at one price.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeKind {
    Single,
    Aggregate,
}

/// A public trade applied to the market-data model. The whole struct replaces the previous
/// last-trade on every update.
#[derive(Debug, Copy, Clone, PartialEq, Deserialize, Serialize)]
pub struct TickTrade {
    pub price: f64,
    pub qty: f64,
    /// Venue timestamp of the trade.
    pub exchange_time: Time,
    /// Local capture timestamp.
    pub capture_time: Time,
    /// The side that removed liquidity, if the venue reports it.
    pub aggr_side: Option<Side>,
    pub kind: TradeKind,
}

impl Default for TickTrade {
    fn default() -> Self {
        Self {
            price: f64::NAN,
            qty: 0.0,
            exchange_time: Time::zero(),
            capture_time: Time::zero(),
            aggr_side: None,
            kind: TradeKind::Single,
        }
    }
}

impl TickTrade {
    pub fn is_valid(&self) -> bool {
        !self.price.is_nan()
    }
}

/// A change to both sides of level-1 market data.
#[derive(Debug, Copy, Clone, PartialEq, Deserialize, Serialize)]
pub struct TickTop {
    pub bid_price: f64,
    pub bid_qty: f64,
    pub ask_price: f64,
    pub ask_qty: f64,
}

impl Default for TickTop {
    fn default() -> Self {
        Self {
            bid_price: f64::NAN,
            bid_qty: 0.0,
            ask_price: f64::NAN,
            ask_qty: 0.0,
        }
    }
}
