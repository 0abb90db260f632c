use crate::{error::ExecutionError, router::OrderRouter};
use apex_instrument::{exchange::ExchangeId, instrument::Instrument, Side};
use apex_integration::{
    event_loop::EventLoop,
    subject::Subject,
    time::Time,
};
use chrono::TimeDelta;
use parking_lot::Mutex;
use smol_str::SmolStr;
use std::{any::Any, sync::Arc};
use tracing::warn;

pub mod id;
pub mod state;

pub use id::{OrderId, StrategyId, STRATEGY_ID_SIZE};
pub use state::{CancelState, CloseReason, OrderState, OrderType, TimeInForce};

/// Parameters of an order as carried through the gateway to a venue.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderParams {
    pub symbol: SmolStr,
    pub exchange: ExchangeId,
    pub side: Side,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub size: f64,
    pub price: f64,
    pub order_id: String,
}

/// An asynchronous state change applied to an order: venue ack, cancel confirm, lapse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderUpdate {
    pub state: Option<OrderState>,
    pub close_reason: Option<CloseReason>,
    pub ext_order_id: String,
}

/// One execution applied to an order.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct OrderFill {
    pub is_fully_filled: bool,
    pub recv_time: Time,
    pub price: f64,
    pub size: f64,
}

/// Bitmask describing what an [`OrderEvent`] carries.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct OrderEventFlags(pub u32);

impl OrderEventFlags {
    pub const STATE_CHANGE: OrderEventFlags = OrderEventFlags(1 << 0);
    pub const FILL: OrderEventFlags = OrderEventFlags(1 << 1);

    pub fn is_state_change(&self) -> bool {
        self.0 & Self::STATE_CHANGE.0 != 0
    }

    pub fn is_fill(&self) -> bool {
        self.0 & Self::FILL.0 != 0
    }
}

/// Event published on an order's event stream.
///
/// Holds a strong reference to the order so the instance cannot be released while a
/// listener is running.
#[derive(Clone)]
pub struct OrderEvent {
    pub order: Arc<Order>,
    pub flags: OrderEventFlags,
    pub time: Time,
    pub old_state: OrderState,
    pub new_state: OrderState,
}

impl std::fmt::Debug for OrderEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderEvent")
            .field("order_id", &self.order.order_id())
            .field("flags", &self.flags)
            .field("old_state", &self.old_state)
            .field("new_state", &self.new_state)
            .finish()
    }
}

#[derive(Debug)]
struct OrderMut {
    order_state: OrderState,
    cancel_state: CancelState,
    close_reason: Option<CloseReason>,
    ext_order_id: String,
    error_code: String,
    error_text: String,
    sent_time: Time,
    live_time: Time,
    filled_size: f64,
    fills: Vec<OrderFill>,
}

/// A single order at a venue: attributes, state machine, fill ledger and event stream.
///
/// Orders are constructed by the [`OrderService`](crate::service::OrderService) and shared
/// between the originating bot, the service registry and in-flight asynchronous callbacks.
/// After construction, all mutation happens on the event-loop thread.
pub struct Order {
    instrument: Instrument,
    side: Side,
    size: f64,
    price: f64,
    tif: TimeInForce,
    order_id: OrderId,
    evloop: Arc<dyn EventLoop>,
    router: Arc<dyn OrderRouter>,
    state: Mutex<OrderMut>,
    events: Subject<OrderEvent>,
    user_data: Mutex<Option<Box<dyn Any + Send>>>,
}

impl std::fmt::Debug for Order {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Order")
            .field("order_id", &self.order_id)
            .field("instrument", &self.instrument.id)
            .field("side", &self.side)
            .field("size", &self.size)
            .field("price", &self.price)
            .field("state", &state.order_state)
            .field("filled", &state.filled_size)
            .finish()
    }
}

impl Order {
    pub fn new(
        evloop: Arc<dyn EventLoop>,
        router: Arc<dyn OrderRouter>,
        instrument: Instrument,
        side: Side,
        size: f64,
        price: f64,
        tif: TimeInForce,
        order_id: OrderId,
        user_data: Option<Box<dyn Any + Send>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            instrument,
            side,
            size,
            price,
            tif,
            order_id,
            evloop,
            router,
            state: Mutex::new(OrderMut {
                order_state: OrderState::Init,
                cancel_state: CancelState::None,
                close_reason: None,
                ext_order_id: String::new(),
                error_code: String::new(),
                error_text: String::new(),
                sent_time: Time::zero(),
                live_time: Time::zero(),
                filled_size: 0.0,
                fills: Vec::new(),
            }),
            events: Subject::new(),
            user_data: Mutex::new(user_data),
        })
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn symbol(&self) -> &str {
        self.instrument.native_symbol.as_str()
    }

    pub fn ticker(&self) -> String {
        self.instrument.ticker()
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn time_in_force(&self) -> TimeInForce {
        self.tif
    }

    pub fn order_id(&self) -> &OrderId {
        &self.order_id
    }

    pub fn ext_order_id(&self) -> String {
        self.state.lock().ext_order_id.clone()
    }

    pub fn state(&self) -> OrderState {
        self.state.lock().order_state
    }

    pub fn cancel_state(&self) -> CancelState {
        self.state.lock().cancel_state
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.state.lock().close_reason
    }

    pub fn error_code(&self) -> String {
        self.state.lock().error_code.clone()
    }

    pub fn error_text(&self) -> String {
        self.state.lock().error_text.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == OrderState::Closed
    }

    pub fn is_live(&self) -> bool {
        self.state() == OrderState::Live
    }

    pub fn is_rejected(&self) -> bool {
        let state = self.state.lock();
        state.order_state == OrderState::Closed
            && state.close_reason == Some(CloseReason::Rejected)
    }

    pub fn is_canceling(&self) -> bool {
        self.cancel_state() == CancelState::Canceling
    }

    pub fn is_cancel_rejected(&self) -> bool {
        self.cancel_state() == CancelState::Rejected
    }

    pub fn is_closed_or_canceling(&self) -> bool {
        let state = self.state.lock();
        state.order_state == OrderState::Closed || state.cancel_state == CancelState::Canceling
    }

    pub fn filled_size(&self) -> f64 {
        self.state.lock().filled_size
    }

    pub fn remain_size(&self) -> f64 {
        (self.size - self.filled_size()).max(0.0)
    }

    pub fn has_fills(&self) -> bool {
        !self.state.lock().fills.is_empty()
    }

    pub fn last_fill(&self) -> Option<OrderFill> {
        self.state.lock().fills.last().copied()
    }

    pub fn sent_time(&self) -> Time {
        self.state.lock().sent_time
    }

    pub fn live_time(&self) -> Time {
        self.state.lock().live_time
    }

    /// Elapsed time since the order was sent; `None` if it never was.
    pub fn duration_since_sent(&self) -> Option<TimeDelta> {
        let sent_time = self.sent_time();
        (!sent_time.is_empty()).then(|| self.evloop.time() - sent_time)
    }

    /// Elapsed time since the order went live; `None` if it never did.
    pub fn duration_live(&self) -> Option<TimeDelta> {
        let live_time = self.live_time();
        (!live_time.is_empty()).then(|| self.evloop.time() - live_time)
    }

    /// Run `f` against the bot-supplied user data, if present and of type `T`.
    pub fn with_user_data<T: 'static, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.user_data
            .lock()
            .as_mut()
            .and_then(|data| data.downcast_mut::<T>())
            .map(f)
    }

    pub fn subscribe_events(&self, listener: impl FnMut(&OrderEvent) + Send + 'static) {
        self.events.subscribe(listener);
    }

    /// Send this order to the venue. Valid only in the `Init` state.
    pub fn send(self: &Arc<Self>) -> Result<(), ExecutionError> {
        let state = self.state();
        if state != OrderState::Init {
            return Err(ExecutionError::SendInvalidState(state));
        }

        self.router.send_order(self);

        let now = self.evloop.time();
        self.state.lock().sent_time = now;
        self.set_state_impl(now, OrderState::Sent, false, None);
        Ok(())
    }

    /// Request a cancel at the venue. Returns whether the request was sent; cancellation
    /// itself is asynchronous, so success or rejection arrives later.
    pub fn cancel(self: &Arc<Self>) -> bool {
        self.state.lock().cancel_state = CancelState::Canceling;
        match self.router.cancel_order(self) {
            Ok(()) => true,
            Err(error) => {
                warn!(order_id = %self.order_id, %error, "error when attempting cancel");
                self.state.lock().cancel_state = CancelState::Error;
                false
            }
        }
    }

    /// Apply an asynchronous venue state change.
    pub fn apply_update(self: &Arc<Self>, update: &OrderUpdate) {
        {
            let mut state = self.state.lock();
            if !update.ext_order_id.is_empty() {
                state.ext_order_id = update.ext_order_id.clone();
            }
            if update.close_reason == Some(CloseReason::Cancelled)
                && state.cancel_state == CancelState::Canceling
            {
                state.cancel_state = CancelState::Canceled;
            }
        }

        let Some(new_state) = update.state else {
            return;
        };
        self.set_state_impl(self.evloop.time(), new_state, false, update.close_reason);
    }

    /// Apply an execution. A fully-filled fill closes the order with reason `Filled`.
    pub fn apply_fill(self: &Arc<Self>, fill: OrderFill) {
        let current = {
            let mut state = self.state.lock();
            if state.order_state == OrderState::Closed {
                warn!(
                    order_id = %self.order_id,
                    "dropping fill applied to closed order"
                );
                return;
            }

            let remain = (self.size - state.filled_size).max(0.0);
            let applied = if fill.size > remain {
                warn!(
                    order_id = %self.order_id,
                    fill_size = fill.size,
                    remain,
                    "fill exceeds order remaining size; capping"
                );
                remain
            } else {
                fill.size
            };

            state.filled_size += applied;
            state.fills.push(OrderFill {
                size: applied,
                ..fill
            });
            state.order_state
        };

        if fill.is_fully_filled {
            self.set_state_impl(fill.recv_time, OrderState::Closed, true, Some(CloseReason::Filled));
        } else {
            // a fill event without a state change
            self.set_state_impl(fill.recv_time, current, true, None);
        }
    }

    /// Mark the order rejected by the venue or router, recording the error code and text.
    pub fn set_is_rejected(self: &Arc<Self>, code: &str, text: &str) {
        {
            let mut state = self.state.lock();
            state.error_code = code.to_string();
            state.error_text = text.to_string();
        }
        self.set_is_closed(self.evloop.time(), CloseReason::Rejected);
    }

    pub fn set_is_closed(self: &Arc<Self>, time: Time, reason: CloseReason) {
        self.set_state_impl(time, OrderState::Closed, false, Some(reason));
    }

    /// The venue rejected a cancel request; order state is unchanged.
    pub fn apply_cancel_reject(&self, code: &str, text: &str) {
        let mut state = self.state.lock();
        state.cancel_state = CancelState::Rejected;
        state.error_code = code.to_string();
        state.error_text = text.to_string();
        warn!(
            symbol = self.symbol(),
            order_id = %self.order_id,
            code,
            text,
            "cancel request rejected"
        );
    }

    fn set_state_impl(
        self: &Arc<Self>,
        time: Time,
        new_state: OrderState,
        with_fill: bool,
        close_reason: Option<CloseReason>,
    ) {
        let (old_state, changed) = {
            let mut state = self.state.lock();
            let old_state = state.order_state;

            if old_state != new_state {
                if old_state == OrderState::Closed {
                    warn!(
                        symbol = self.symbol(),
                        order_id = %self.order_id,
                        ?new_state,
                        "ignoring state transition out of closed"
                    );
                    return;
                }
                if new_state == OrderState::Live && old_state != OrderState::Sent {
                    warn!(
                        symbol = self.symbol(),
                        order_id = %self.order_id,
                        "attempt to set order state live but is not sent"
                    );
                    return;
                }

                if new_state == OrderState::Live && state.live_time.is_empty() {
                    state.live_time = self.evloop.time();
                }
                if new_state == OrderState::Closed {
                    state.close_reason = close_reason.or(state.close_reason);
                }

                state.order_state = new_state;
                (old_state, true)
            } else {
                (old_state, false)
            }
        };

        let mut flags = 0;
        if with_fill {
            flags |= OrderEventFlags::FILL.0;
        }
        if changed {
            flags |= OrderEventFlags::STATE_CHANGE.0;
        }

        let event = OrderEvent {
            order: Arc::clone(self),
            flags: OrderEventFlags(flags),
            time,
            old_state,
            new_state: if changed { new_state } else { old_state },
        };
        self.events.next(&event);
    }
}
