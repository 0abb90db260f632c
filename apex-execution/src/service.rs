use crate::{
    error::ExecutionError,
    order::{
        id::{OrderId, OrderIdGenerator, StrategyId},
        Order, OrderFill, OrderUpdate, TimeInForce,
    },
    router::OrderRouter,
};
use apex_instrument::{instrument::Instrument, Side};
use apex_integration::{event_loop::EventLoop, time::Time};
use fnv::{FnvHashMap, FnvHashSet};
use parking_lot::Mutex;
use std::{
    any::Any,
    collections::VecDeque,
    sync::{Arc, Weak},
};
use tracing::{debug, warn};

/// How many closed order ids are remembered. A fill or update arriving for one of these is
/// a normal race (eg/ a websocket cancel landing after the REST cancel reply) and is
/// dropped silently.
const RECENT_DEAD_CAPACITY: usize = 4096;

#[derive(Debug, Default)]
struct RecentDead {
    ids: FnvHashSet<OrderId>,
    order: VecDeque<OrderId>,
}

impl RecentDead {
    fn insert(&mut self, id: OrderId) {
        if self.ids.insert(id.clone()) {
            self.order.push_back(id);
            while self.order.len() > RECENT_DEAD_CAPACITY {
                if let Some(evicted) = self.order.pop_front() {
                    self.ids.remove(&evicted);
                }
            }
        }
    }

    fn contains(&self, id: &OrderId) -> bool {
        self.ids.contains(id)
    }
}

/// Process-wide registry of every order created by the strategy.
///
/// Allocates order ids, tracks live orders by id so that asynchronous venue responses can
/// be routed back, and remembers recently closed ids so late messages for them can be
/// ignored without noise.
pub struct OrderService {
    evloop: Arc<dyn EventLoop>,
    generator: OrderIdGenerator,
    orders: Mutex<FnvHashMap<OrderId, Arc<Order>>>,
    dead: Mutex<RecentDead>,
}

impl std::fmt::Debug for OrderService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderService")
            .field("live_orders", &self.orders.lock().len())
            .finish()
    }
}

impl OrderService {
    pub fn new(evloop: Arc<dyn EventLoop>, startup_time: Time) -> Arc<Self> {
        Arc::new(Self {
            evloop,
            generator: OrderIdGenerator::new(startup_time),
            orders: Mutex::new(FnvHashMap::default()),
            dead: Mutex::new(RecentDead::default()),
        })
    }

    /// Create a new order, registering it for inbound routing until it closes.
    pub fn create(
        self: &Arc<Self>,
        router: Arc<dyn OrderRouter>,
        instrument: Instrument,
        side: Side,
        size: f64,
        price: f64,
        tif: TimeInForce,
        strategy_id: &StrategyId,
        user_data: Option<Box<dyn Any + Send>>,
    ) -> Result<Arc<Order>, ExecutionError> {
        let order_id = self.generator.next(strategy_id)?;

        let order = Order::new(
            Arc::clone(&self.evloop),
            router,
            instrument,
            side,
            size,
            price,
            tif,
            order_id.clone(),
            user_data,
        );

        // drop the registry entry once the order closes; keep only a weak handle so the
        // listener cannot keep either side alive
        let service = Arc::downgrade(self);
        let handle: Weak<Order> = Arc::downgrade(&order);
        order.subscribe_events(move |event| {
            if !event.flags.is_state_change() {
                return;
            }
            let (Some(service), Some(order)) = (service.upgrade(), handle.upgrade()) else {
                return;
            };
            if order.is_closed() {
                let removed = service.orders.lock().remove(order.order_id());
                if removed.is_some() {
                    service.dead.lock().insert(order.order_id().clone());
                }
            }
        });

        self.orders.lock().insert(order_id, Arc::clone(&order));
        Ok(order)
    }

    pub fn find_order(&self, order_id: &str) -> Option<Arc<Order>> {
        self.orders.lock().get(&OrderId::new(order_id)).cloned()
    }

    pub fn live_order_count(&self) -> usize {
        self.orders.lock().len()
    }

    /// Route an inbound fill to its order by id.
    pub fn route_fill_to_order(&self, order_id: &str, fill: OrderFill) {
        // the lookup clones the Arc so the registry lock is not held across listener
        // callbacks, which may themselves remove the order
        match self.find_order(order_id) {
            Some(order) => order.apply_fill(fill),
            None => {
                if self.dead.lock().contains(&OrderId::new(order_id)) {
                    debug!(order_id, "dropping order-fill for recently closed order");
                } else {
                    warn!(order_id, "dropping order-fill, no order found with id");
                }
            }
        }
    }

    /// Route an inbound state update to its order by id.
    pub fn route_update_to_order(&self, order_id: &str, update: &OrderUpdate) {
        match self.find_order(order_id) {
            Some(order) => order.apply_update(update),
            None => {
                if self.dead.lock().contains(&OrderId::new(order_id)) {
                    debug!(order_id, "dropping order-update for recently closed order");
                } else {
                    warn!(order_id, "dropping order-update, no order found with id");
                }
            }
        }
    }
}
