use apex_instrument::Side;
use serde::{Deserialize, Serialize};

/// Per-instrument position accounting.
///
/// `startup` is the quantity restored from persistence at strategy start; buy/sell
/// quantities and costs accumulate over the current session.
#[derive(Debug, Copy, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Position {
    startup: f64,
    buy_qty: f64,
    sell_qty: f64,
    buy_cost: f64,
    sell_cost: f64,
}

impl Position {
    pub fn new(startup: f64) -> Self {
        Self {
            startup,
            ..Default::default()
        }
    }

    /// Net position in base asset units.
    pub fn net_qty(&self) -> f64 {
        self.startup + self.buy_qty - self.sell_qty
    }

    pub fn startup_qty(&self) -> f64 {
        self.startup
    }

    /// Quantity bought this session, in base asset units.
    pub fn buy_qty(&self) -> f64 {
        self.buy_qty
    }

    /// Quantity sold this session, in base asset units.
    pub fn sell_qty(&self) -> f64 {
        self.sell_qty
    }

    /// Cost of all buys, in quote asset units.
    pub fn buy_cost(&self) -> f64 {
        self.buy_cost
    }

    /// Cost of all sells, in quote asset units.
    pub fn sell_cost(&self) -> f64 {
        self.sell_cost
    }

    /// Total turnover traded at a mark price, in quote asset units.
    pub fn total_turnover(&self, mark_price: f64) -> f64 {
        (self.sell_cost + self.buy_cost) + (self.buy_qty - self.sell_qty).abs() * mark_price
    }

    /// Session PnL at a mark price, in quote asset units.
    pub fn total_pnl(&self, mark_price: f64) -> f64 {
        (self.sell_cost - self.buy_cost) + (self.buy_qty - self.sell_qty) * mark_price
    }

    pub fn apply_fill(&mut self, side: Side, qty: f64, price: f64) {
        match side {
            Side::Buy => {
                self.buy_qty += qty;
                self.buy_cost += qty * price;
            }
            Side::Sell => {
                self.sell_qty += qty;
                self.sell_cost += qty * price;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_net_includes_startup() {
        let mut position = Position::new(1.5);
        position.apply_fill(Side::Buy, 2.0, 100.0);
        position.apply_fill(Side::Sell, 0.5, 110.0);

        assert_eq!(position.net_qty(), 3.0);
        assert_eq!(position.buy_qty(), 2.0);
        assert_eq!(position.sell_qty(), 0.5);
        assert_eq!(position.buy_cost(), 200.0);
        assert_eq!(position.sell_cost(), 55.0);
    }

    #[test]
    fn test_pnl_at_mark() {
        let mut position = Position::default();
        position.apply_fill(Side::Buy, 1.0, 100.0);

        // mark above entry: long 1 @ 100, marked 110 => +10
        assert_eq!(position.total_pnl(110.0), 10.0);
        // mark at entry: flat pnl
        assert_eq!(position.total_pnl(100.0), 0.0);
    }

    #[test]
    fn test_turnover() {
        let mut position = Position::default();
        position.apply_fill(Side::Buy, 2.0, 50.0);
        position.apply_fill(Side::Sell, 1.0, 60.0);

        // traded cost 100 + 60, open 1.0 marked at 55
        assert_eq!(position.total_turnover(55.0), 215.0);
    }
}
