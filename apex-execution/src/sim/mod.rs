use crate::{
    error::ExecutionError,
    order::{CloseReason, Order, OrderFill, OrderId, OrderState, OrderUpdate},
    router::OrderRouter,
};
use apex_data::market_data::MarketData;
use apex_instrument::{instrument::Instrument, Side};
use apex_integration::{
    error::code,
    event_loop::{EventLoop, EventLoopExt},
};
use fnv::{FnvHashMap, FnvHashSet};
use parking_lot::Mutex;
use rust_decimal::{prelude::FromPrimitive, Decimal};
use smol_str::SmolStr;
use std::{
    collections::BTreeMap,
    sync::{Arc, Weak},
    time::Duration,
};
use tracing::{info, warn};

/// Default simulated venue latency for acks, fills and cancels.
pub const DEFAULT_SIM_LATENCY: Duration = Duration::from_millis(100);

fn is_zero(value: f64) -> bool {
    value.abs() < 1e-6
}

/// Resting entries are keyed by (price, insertion seq) so same-price orders keep arrival
/// order.
type BookKey = (Decimal, u64);

#[derive(Debug)]
struct RestingOrder {
    order_id: OrderId,
    price: f64,
    size_remain: f64,
    order: Weak<Order>,
}

#[derive(Debug, Default)]
struct SimBook {
    bids: BTreeMap<BookKey, RestingOrder>,
    asks: BTreeMap<BookKey, RestingOrder>,
    /// Whether market data has ever ticked for this symbol.
    ticking: bool,
}

#[derive(Debug, Default)]
struct SimState {
    books: FnvHashMap<SmolStr, SimBook>,
    /// Locator for cancels: order id -> (symbol, side, book key).
    index: FnvHashMap<OrderId, (SmolStr, Side, BookKey)>,
    /// Symbols whose market-data stream already feeds this engine.
    registered: FnvHashSet<SmolStr>,
    next_seq: u64,
    next_ext_id: u64,
}

/// Simulated matching engine and order router.
///
/// Consumes the same market-data tick stream the strategy sees. Resting limit orders are
/// matched against trades under a conservative fill model: an order fills only when the
/// market trades *through* its price (strict inequality), never at it. Acks, fills and
/// cancel confirmations are delivered asynchronously into the event loop with a fixed
/// latency.
pub struct SimExchange {
    evloop: Arc<dyn EventLoop>,
    latency: Duration,
    state: Mutex<SimState>,
}

impl std::fmt::Debug for SimExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimExchange")
            .field("latency", &self.latency)
            .field("books", &self.state.lock().books.len())
            .finish()
    }
}

impl SimExchange {
    pub fn new(evloop: Arc<dyn EventLoop>, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            evloop,
            latency,
            state: Mutex::new(SimState::default()),
        })
    }

    /// Attach the engine to an instrument's market-data stream. Every trade tick drives
    /// the matching walk for that symbol.
    pub fn register_instrument(self: &Arc<Self>, instrument: &Instrument, market: &Arc<MarketData>) {
        if !self
            .state
            .lock()
            .registered
            .insert(instrument.native_symbol.clone())
        {
            return;
        }
        info!(instrument = %instrument, "sim: registering instrument");

        let engine = Arc::downgrade(self);
        let market_handle = Arc::downgrade(market);
        let symbol = instrument.native_symbol.clone();

        market.subscribe_events(move |event| {
            if !event.is_trade() {
                return;
            }
            let (Some(engine), Some(market)) = (engine.upgrade(), market_handle.upgrade()) else {
                return;
            };
            let last = market.last();
            engine.apply_trade(symbol.as_str(), last.price, last.qty);
        });
    }

    /// Walk the books for `symbol` against one market trade, filling resting orders that
    /// the trade prints through.
    pub fn apply_trade(&self, symbol: &str, price: f64, size: f64) {
        debug_assert!(self.evloop.this_thread_is_ev());

        struct PendingFill {
            order: Weak<Order>,
            size: f64,
            price: f64,
            fully_filled: bool,
        }

        let mut fills: Vec<PendingFill> = Vec::new();

        {
            let mut state = self.state.lock();
            // a tick always finds-or-creates the book, so prices are known before the
            // first order arrives
            let book = state.books.entry(SmolStr::new(symbol)).or_default();
            book.ticking = true;

            let mut qty_remain = size;
            let mut done: Vec<(Side, BookKey)> = Vec::new();

            // bids match from the highest price down; the walk stops at the first entry
            // the trade did not print through
            for (key, resting) in book.bids.iter_mut().rev() {
                if qty_remain <= 0.0 || is_zero(qty_remain) {
                    break;
                }
                if price < resting.price {
                    let qty_fill = qty_remain.min(resting.size_remain);
                    resting.size_remain -= qty_fill;
                    qty_remain -= qty_fill;

                    let fully_filled = is_zero(resting.size_remain);
                    fills.push(PendingFill {
                        order: resting.order.clone(),
                        size: qty_fill,
                        price: resting.price,
                        fully_filled,
                    });
                    if fully_filled {
                        done.push((Side::Buy, *key));
                    }
                } else {
                    break;
                }
            }

            // asks match from the lowest price up
            for (key, resting) in book.asks.iter_mut() {
                if qty_remain <= 0.0 || is_zero(qty_remain) {
                    break;
                }
                if price > resting.price {
                    let qty_fill = qty_remain.min(resting.size_remain);
                    resting.size_remain -= qty_fill;
                    qty_remain -= qty_fill;

                    let fully_filled = is_zero(resting.size_remain);
                    fills.push(PendingFill {
                        order: resting.order.clone(),
                        size: qty_fill,
                        price: resting.price,
                        fully_filled,
                    });
                    if fully_filled {
                        done.push((Side::Sell, *key));
                    }
                } else {
                    break;
                }
            }

            // erase filled entries only after the walk so iteration stays valid
            let mut removed_ids = Vec::new();
            for (side, key) in done {
                let removed = match side {
                    Side::Buy => book.bids.remove(&key),
                    Side::Sell => book.asks.remove(&key),
                };
                if let Some(resting) = removed {
                    removed_ids.push(resting.order_id);
                }
            }
            for order_id in removed_ids {
                state.index.remove(&order_id);
            }
        }

        for fill in fills {
            let evloop = Arc::clone(&self.evloop);
            let order = fill.order;
            let (size, price, fully_filled) = (fill.size, fill.price, fill.fully_filled);
            self.evloop.dispatch_timer(self.latency, move || {
                if let Some(order) = order.upgrade() {
                    order.apply_fill(OrderFill {
                        is_fully_filled: fully_filled,
                        recv_time: evloop.time(),
                        price,
                        size,
                    });
                }
                Duration::ZERO
            });
        }
    }

    fn schedule_reject(&self, order: &Arc<Order>, code: &'static str, text: &'static str) {
        let handle = Arc::downgrade(order);
        self.evloop.dispatch_timer(self.latency, move || {
            if let Some(order) = handle.upgrade() {
                order.set_is_rejected(code, text);
            }
            Duration::ZERO
        });
    }
}

impl OrderRouter for SimExchange {
    fn send_order(&self, order: &Arc<Order>) {
        let symbol = order.instrument().native_symbol.clone();

        let ext_order_id = {
            let mut state = self.state.lock();

            if state.index.contains_key(order.order_id()) {
                warn!(
                    order_id = %order.order_id(),
                    "sim: rejecting order, id already resting"
                );
                drop(state);
                self.schedule_reject(order, code::DUPLICATE_ORDER_ID, "duplicate client-order-id");
                return;
            }

            let Some(price_key) = Decimal::from_f64(order.price()) else {
                drop(state);
                self.schedule_reject(order, code::INVALID_ORDER_PARAMS, "order price is not finite");
                return;
            };

            let seq = state.next_seq;
            state.next_seq += 1;
            let ext_id = state.next_ext_id;
            state.next_ext_id += 1;

            let key = (price_key, seq);
            let resting = RestingOrder {
                order_id: order.order_id().clone(),
                price: order.price(),
                size_remain: order.size(),
                order: Arc::downgrade(order),
            };

            let book = state.books.entry(symbol.clone()).or_default();
            if !book.ticking {
                warn!(symbol = %symbol, "sim: matching engine not ticking for symbol");
            }
            match order.side() {
                Side::Buy => book.bids.insert(key, resting),
                Side::Sell => book.asks.insert(key, resting),
            };

            state
                .index
                .insert(order.order_id().clone(), (symbol, order.side(), key));

            format!("sim-{ext_id:08x}")
        };

        let handle = Arc::downgrade(order);
        self.evloop.dispatch_timer(self.latency, move || {
            if let Some(order) = handle.upgrade() {
                order.apply_update(&OrderUpdate {
                    state: Some(OrderState::Live),
                    close_reason: None,
                    ext_order_id: ext_order_id.clone(),
                });
            }
            Duration::ZERO
        });
    }

    fn cancel_order(&self, order: &Arc<Order>) -> Result<(), ExecutionError> {
        let removed = {
            let mut state = self.state.lock();
            match state.index.remove(order.order_id()) {
                Some((symbol, side, key)) => {
                    if let Some(book) = state.books.get_mut(&symbol) {
                        match side {
                            Side::Buy => book.bids.remove(&key),
                            Side::Sell => book.asks.remove(&key),
                        };
                    }
                    true
                }
                None => false,
            }
        };

        let handle = Arc::downgrade(order);
        if removed {
            self.evloop.dispatch_timer(self.latency, move || {
                if let Some(order) = handle.upgrade() {
                    order.apply_update(&OrderUpdate {
                        state: Some(OrderState::Closed),
                        close_reason: Some(CloseReason::Cancelled),
                        ext_order_id: String::new(),
                    });
                }
                Duration::ZERO
            });
        } else {
            self.evloop.dispatch_timer(self.latency, move || {
                if let Some(order) = handle.upgrade() {
                    order.apply_cancel_reject(code::ORDER_NOT_FOUND, "order not found");
                }
                Duration::ZERO
            });
        }

        Ok(())
    }

    fn is_up(&self) -> bool {
        true
    }
}
