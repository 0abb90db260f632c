use crate::{error::ApexError, services::Services};
use apex_data::market_data::{MarketData, MdEvent};
use apex_execution::{
    error::ExecutionError,
    order::{Order, OrderFill, StrategyId, TimeInForce},
    position::Position,
    router::OrderRouter,
};
use apex_instrument::{instrument::Instrument, Side};
use apex_integration::event_loop::{EventLoop, EventLoopExt};
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use std::{
    any::Any,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};
use tracing::{info, warn};

const BOT_TIMER_INTERVAL: Duration = Duration::from_secs(1);

/// Quote assets treated as USD proxies when marking notional values.
const USD_PROXIES: [&str; 3] = ["USDT", "BUSD", "USD"];

/// Strategy-supplied trading logic for one instrument. All callbacks run on the event-loop
/// thread and must not block.
#[allow(unused_variables)]
pub trait BotLogic: Send {
    fn on_init(&mut self, bot: &BotCore) {}

    fn on_tick_trade(&mut self, bot: &BotCore, event: MdEvent) {}

    fn on_tick_book(&mut self, bot: &BotCore, event: MdEvent) {}

    fn on_timer(&mut self, bot: &BotCore) {}

    fn on_order_submitted(&mut self, bot: &BotCore, order: &Arc<Order>) {}

    fn on_order_live(&mut self, bot: &BotCore, order: &Arc<Order>) {}

    fn on_order_closed(&mut self, bot: &BotCore, order: &Arc<Order>) {}

    fn on_order_fill(&mut self, bot: &BotCore, order: &Arc<Order>, fill: &OrderFill) {}
}

type SharedLogic = Arc<Mutex<Box<dyn BotLogic>>>;

#[derive(Default)]
struct OrderCacheInner {
    pending: Vec<Arc<Order>>,
    live: Vec<Arc<Order>>,
}

/// Tracks the pending and live orders belonging to a single bot.
pub struct OrderCache {
    inner: Arc<Mutex<OrderCacheInner>>,
}

impl std::fmt::Debug for OrderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("OrderCache")
            .field("pending", &inner.pending.len())
            .field("live", &inner.live.len())
            .finish()
    }
}

impl Default for OrderCache {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(OrderCacheInner::default())),
        }
    }
}

impl OrderCache {
    pub fn add_new_order(&self, order: &Arc<Order>) {
        self.inner.lock().pending.push(Arc::clone(order));

        let inner = Arc::downgrade(&self.inner);
        let handle = Arc::downgrade(order);
        order.subscribe_events(move |event| {
            if !event.flags.is_state_change() {
                return;
            }
            let (Some(inner), Some(order)) = (inner.upgrade(), handle.upgrade()) else {
                return;
            };
            let mut inner = inner.lock();
            if order.is_live() {
                inner.pending.retain(|o| !Arc::ptr_eq(o, &order));
                if !inner.live.iter().any(|o| Arc::ptr_eq(o, &order)) {
                    inner.live.push(Arc::clone(&order));
                }
            }
            if order.is_closed() {
                inner.pending.retain(|o| !Arc::ptr_eq(o, &order));
                inner.live.retain(|o| !Arc::ptr_eq(o, &order));
            }
        });
    }

    pub fn live_orders(&self) -> Vec<Arc<Order>> {
        self.inner.lock().live.clone()
    }

    pub fn pending_orders(&self) -> Vec<Arc<Order>> {
        self.inner.lock().pending.clone()
    }

    pub fn has_live_orders(&self) -> bool {
        !self.inner.lock().live.is_empty()
    }

    pub fn has_pending_orders(&self) -> bool {
        !self.inner.lock().pending.is_empty()
    }

    pub fn open_order_count(&self) -> usize {
        let inner = self.inner.lock();
        inner.pending.len() + inner.live.len()
    }
}

/// The per-instrument trading context handed to [`BotLogic`] callbacks: market data,
/// position, order creation and rounding utilities.
pub struct BotCore {
    services: Arc<Services>,
    strategy_id: StrategyId,
    instrument: Instrument,
    market: Arc<MarketData>,
    router: Arc<dyn OrderRouter>,
    position: Mutex<Position>,
    order_cache: OrderCache,
    stopping: AtomicBool,
    logic: Mutex<Weak<Mutex<Box<dyn BotLogic>>>>,
    handle: Weak<BotCore>,
}

impl std::fmt::Debug for BotCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotCore")
            .field("instrument", &self.instrument.id)
            .field("orders", &self.order_cache.open_order_count())
            .finish()
    }
}

impl BotCore {
    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn ticker(&self) -> String {
        self.instrument.ticker()
    }

    pub fn market(&self) -> &Arc<MarketData> {
        &self.market
    }

    pub fn position(&self) -> Position {
        *self.position.lock()
    }

    pub fn order_cache(&self) -> &OrderCache {
        &self.order_cache
    }

    pub fn last_price(&self) -> f64 {
        self.market.last().price
    }

    pub fn has_last_price(&self) -> bool {
        self.market.has_last()
    }

    pub fn market_data_ok(&self) -> bool {
        self.market.has_last()
    }

    pub fn om_session_up(&self) -> bool {
        self.router.is_up()
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    /// Round an order price in the passive direction: down for buys, up for sells.
    pub fn round_price_passive(&self, raw: f64, side: Side) -> f64 {
        self.instrument.spec.tick_size.round_passive(raw, side)
    }

    /// Round an order size down to the lot increment.
    pub fn round_size(&self, raw: f64) -> f64 {
        self.instrument.spec.lot_size.round_down(raw)
    }

    /// Minimum order size at the intended price, inferred from the instrument's minimum
    /// notional and rounded up to the lot increment.
    pub fn min_order_size(&self, price: f64) -> f64 {
        if !price.is_finite() || price <= 0.0 {
            return f64::NAN;
        }
        let min_notional = self.instrument.spec.min_notional.to_f64().unwrap_or(0.0);
        let min_size = self.instrument.spec.min_size.to_f64().unwrap_or(0.0);
        let by_notional = self.instrument.spec.lot_size.round_up(min_notional / price);
        by_notional.max(min_size)
    }

    /// Whether the quote asset marks 1:1 against USD.
    pub fn fx_to_usd(&self) -> f64 {
        if USD_PROXIES.contains(&self.instrument.quote.symbol.as_str()) {
            1.0
        } else {
            f64::NAN
        }
    }

    pub fn net_position_usd(&self) -> f64 {
        if self.has_last_price() {
            self.position().net_qty() * self.last_price() * self.fx_to_usd()
        } else {
            f64::NAN
        }
    }

    /// Create (but do not send) a limit order. A size that rounds to zero on the lot
    /// increment never reaches the router.
    pub fn create_order(
        &self,
        side: Side,
        size: f64,
        price: f64,
        tif: TimeInForce,
        user_data: Option<Box<dyn Any + Send>>,
    ) -> Result<Arc<Order>, ApexError> {
        if self.is_stopping() {
            return Err(ApexError::Execution(ExecutionError::InvalidParams(
                "bot is stopping".into(),
            )));
        }

        let rounded = self.round_size(size);
        if !rounded.is_finite() || rounded <= 0.0 {
            return Err(ApexError::Execution(ExecutionError::InvalidParams(format!(
                "order size {size} rounds to zero on lot {}",
                self.instrument.spec.lot_size
            ))));
        }

        let order = self.services.order_service().create(
            Arc::clone(&self.router),
            self.instrument.clone(),
            side,
            rounded,
            price,
            tif,
            &self.strategy_id,
            user_data,
        )?;

        self.order_cache.add_new_order(&order);
        self.wire_order_events(&order);
        Ok(order)
    }

    /// Accounting runs synchronously with the order event; logic callbacks are re-posted
    /// to the event loop so they never run under the logic lock.
    fn wire_order_events(&self, order: &Arc<Order>) {
        let core = self.handle.clone();
        order.subscribe_events(move |event| {
            let Some(core) = core.upgrade() else {
                return;
            };

            let fill = event.flags.is_fill().then(|| event.order.last_fill()).flatten();

            if let Some(fill) = fill {
                let position = {
                    let mut position = core.position.lock();
                    position.apply_fill(event.order.side(), fill.size, fill.price);
                    *position
                };

                if let Err(persist_error) = core.services.persistence_service()
                    .persist_instrument_position(
                        core.strategy_id.as_str(),
                        &core.instrument,
                        position.net_qty(),
                        core.services.now(),
                    )
                {
                    warn!(%persist_error, "failed to persist position");
                }

                core.services.auditor().add_transaction(
                    event.time,
                    core.strategy_id.as_str(),
                    &event.order,
                    Some(&fill),
                    &position,
                    &core.market,
                    core.fx_to_usd(),
                );
            } else if event.flags.is_state_change() {
                let position = *core.position.lock();
                core.services.auditor().add_transaction(
                    event.time,
                    core.strategy_id.as_str(),
                    &event.order,
                    None,
                    &position,
                    &core.market,
                    core.fx_to_usd(),
                );
            }

            let logic = core.logic.lock().clone();
            let event = event.clone();
            let core_handle = core.handle.clone();
            core.services.evloop().dispatch(move || {
                let (Some(core), Some(logic)) = (core_handle.upgrade(), logic.upgrade()) else {
                    return;
                };
                let mut logic = logic.lock();

                // a fully-filled order carries fill and close in one event; the fill
                // callback is delivered first
                if event.flags.is_fill() {
                    if let Some(fill) = event.order.last_fill() {
                        logic.on_order_fill(&core, &event.order, &fill);
                    }
                }
                if event.flags.is_state_change() {
                    use apex_execution::order::OrderState;
                    match event.new_state {
                        OrderState::Sent => logic.on_order_submitted(&core, &event.order),
                        OrderState::Live => logic.on_order_live(&core, &event.order),
                        OrderState::Closed => logic.on_order_closed(&core, &event.order),
                        OrderState::Init => {}
                    }
                }
            });
        });
    }

    fn set_startup_position(&self, qty: f64) {
        *self.position.lock() = Position::new(qty);
    }

    /// Request a cooperative stop: cancel every open order from the event loop.
    fn stop(&self) {
        self.stopping.store(true, Ordering::Release);

        let core = self.handle.clone();
        self.services.evloop().dispatch(move || {
            let Some(core) = core.upgrade() else {
                return;
            };
            for order in core
                .order_cache
                .live_orders()
                .into_iter()
                .chain(core.order_cache.pending_orders())
            {
                if !order.is_closed_or_canceling() {
                    info!(order_id = %order.order_id(), "cancelling order for stop");
                    order.cancel();
                }
            }
        });
    }
}

/// A per-instrument trading container: owns the market subscription, position, order cache
/// and the strategy-supplied [`BotLogic`].
pub struct Bot {
    core: Arc<BotCore>,
    logic: SharedLogic,
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot").field("core", &self.core).finish()
    }
}

impl Bot {
    pub fn new(
        services: &Arc<Services>,
        strategy_id: StrategyId,
        instrument: Instrument,
        logic: Box<dyn BotLogic>,
    ) -> Result<Self, ApexError> {
        let market = services.market_data_service().find_market_data(&instrument)?;
        let router = services
            .order_router_service()
            .get_order_router(&instrument, &strategy_id)?;

        let core = Arc::new_cyclic(|handle| BotCore {
            services: Arc::clone(services),
            strategy_id,
            instrument,
            market,
            router,
            position: Mutex::new(Position::default()),
            order_cache: OrderCache::default(),
            stopping: AtomicBool::new(false),
            logic: Mutex::new(Weak::new()),
            handle: handle.clone(),
        });

        let logic: SharedLogic = Arc::new(Mutex::new(logic));
        *core.logic.lock() = Arc::downgrade(&logic);

        Ok(Self { core, logic })
    }

    pub fn core(&self) -> &Arc<BotCore> {
        &self.core
    }

    pub fn instrument(&self) -> &Instrument {
        &self.core.instrument
    }

    /// Initialise the bot: seed the restored position, subscribe to market data, start
    /// the periodic timer, and let the logic run its own setup.
    pub fn init(&self, startup_position: f64) {
        info!(
            instrument = %self.core.instrument,
            startup_position,
            "initialising bot"
        );
        self.core.set_startup_position(startup_position);

        let core = self.core.handle.clone();
        let logic = Arc::downgrade(&self.logic);
        self.core.market.subscribe_events(move |event| {
            let (Some(core), Some(logic)) = (core.upgrade(), logic.upgrade()) else {
                return;
            };
            if core.is_stopping() {
                return;
            }
            let mut logic = logic.lock();
            if event.is_trade() {
                logic.on_tick_trade(&core, *event);
            }
            if event.is_top() {
                logic.on_tick_book(&core, *event);
            }
        });

        let core = self.core.handle.clone();
        let logic = Arc::downgrade(&self.logic);
        self.core
            .services
            .evloop()
            .dispatch_timer(BOT_TIMER_INTERVAL, move || {
                match (core.upgrade(), logic.upgrade()) {
                    (Some(core), Some(logic)) => {
                        if !core.is_stopping() {
                            logic.lock().on_timer(&core);
                        }
                        BOT_TIMER_INTERVAL
                    }
                    _ => Duration::ZERO,
                }
            });

        self.logic.lock().on_init(&self.core);
    }

    pub fn stop(&self) {
        self.core.stop();
    }

    /// Whether every order belonging to this bot has reached a terminal state.
    pub fn is_stopped(&self) -> bool {
        self.core.order_cache.open_order_count() == 0
    }
}
