use crate::tick::{TickTop, TickTrade};
use apex_integration::subject::Subject;
use parking_lot::Mutex;

/// Bitmask of market-data event kinds delivered to subscribers.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MdEvent(pub u32);

impl MdEvent {
    pub const TRADE: MdEvent = MdEvent(0x01);
    pub const TOP: MdEvent = MdEvent(0x02);

    pub fn is_trade(&self) -> bool {
        self.0 & Self::TRADE.0 != 0
    }

    pub fn is_top(&self) -> bool {
        self.0 & Self::TOP.0 != 0
    }
}

/// Best bid and ask prices. Valid once both sides have ticked.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Book {
    pub best_bid_price: f64,
    pub best_ask_price: f64,
}

impl Default for Book {
    fn default() -> Self {
        Self {
            best_bid_price: f64::NAN,
            best_ask_price: f64::NAN,
        }
    }
}

impl Book {
    pub fn is_valid(&self) -> bool {
        !self.best_bid_price.is_nan() && !self.best_ask_price.is_nan()
    }
}

#[derive(Debug, Default)]
struct MarketDataInner {
    last: TickTrade,
    book: Book,
}

/// Per-instrument market data: the last trade and the top of book, with subscriber fan-out.
///
/// Ticks are only ever applied on the event-loop thread; subscribers run synchronously in
/// application order.
#[derive(Debug, Default)]
pub struct MarketData {
    inner: Mutex<MarketDataInner>,
    events: Subject<MdEvent>,
}

impl MarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_trade(&self, tick: TickTrade) {
        self.inner.lock().last = tick;
        self.events.next(&MdEvent::TRADE);
    }

    pub fn apply_top(&self, tick: &TickTop) {
        {
            let mut inner = self.inner.lock();
            inner.book.best_bid_price = tick.bid_price;
            inner.book.best_ask_price = tick.ask_price;
        }
        self.events.next(&MdEvent::TOP);
    }

    pub fn subscribe_events(&self, listener: impl FnMut(&MdEvent) + Send + 'static) {
        self.events.subscribe(listener);
    }

    pub fn last(&self) -> TickTrade {
        self.inner.lock().last
    }

    pub fn book(&self) -> Book {
        self.inner.lock().book
    }

    pub fn bid(&self) -> f64 {
        self.inner.lock().book.best_bid_price
    }

    pub fn ask(&self) -> f64 {
        self.inner.lock().book.best_ask_price
    }

    pub fn has_last(&self) -> bool {
        self.inner.lock().last.is_valid()
    }

    pub fn has_bid_ask(&self) -> bool {
        self.inner.lock().book.is_valid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    #[test]
    fn test_trade_replaces_last_and_notifies() {
        let market = MarketData::new();
        assert!(!market.has_last());

        let trades = Arc::new(AtomicU32::new(0));
        let tops = Arc::new(AtomicU32::new(0));
        let trades_ref = Arc::clone(&trades);
        let tops_ref = Arc::clone(&tops);
        market.subscribe_events(move |event| {
            if event.is_trade() {
                trades_ref.fetch_add(1, Ordering::SeqCst);
            }
            if event.is_top() {
                tops_ref.fetch_add(1, Ordering::SeqCst);
            }
        });

        market.apply_trade(TickTrade {
            price: 100.5,
            qty: 2.0,
            ..Default::default()
        });

        assert!(market.has_last());
        assert_eq!(market.last().price, 100.5);
        assert_eq!(trades.load(Ordering::SeqCst), 1);
        assert_eq!(tops.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_top_replaces_best_bid_ask() {
        let market = MarketData::new();
        assert!(!market.has_bid_ask());

        market.apply_top(&TickTop {
            bid_price: 99.0,
            bid_qty: 1.0,
            ask_price: 101.0,
            ask_qty: 1.0,
        });

        assert!(market.has_bid_ask());
        assert_eq!(market.bid(), 99.0);
        assert_eq!(market.ask(), 101.0);

        market.apply_top(&TickTop {
            bid_price: 99.5,
            bid_qty: 1.0,
            ask_price: 100.5,
            ask_qty: 1.0,
        });
        assert_eq!(market.bid(), 99.5);
        assert_eq!(market.ask(), 100.5);
    }
}
