use apex_data::{
    subscription::MdStream,
    tick::{TickTop, TickTrade},
};
use apex_execution::order::{OrderFill, OrderParams, OrderUpdate};
use apex_instrument::exchange::ExchangeId;

pub mod binance;

/// Options attached to a venue market-data subscription.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SubscriptionOptions {
    pub stream: MdStream,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            stream: MdStream::AggTrades,
        }
    }
}

/// Reply callbacks for one order submit or cancel request.
pub struct SubmitCallbacks {
    pub on_reply: Box<dyn FnOnce(OrderUpdate) + Send>,
    /// `(code, text)` for a venue rejection.
    pub on_rejected: Box<dyn FnOnce(String, String) + Send>,
}

impl std::fmt::Debug for SubmitCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SubmitCallbacks")
    }
}

/// Wallet change pushed by a venue (reserved).
#[derive(Debug, Clone, PartialEq)]
pub struct AccountUpdate {
    pub symbol: String,
    pub exchange: ExchangeId,
    pub avail: f64,
}

/// Unsolicited execution events pushed by a venue adapter into the gateway, keyed by the
/// engine order-id so they can be demultiplexed back to the owning strategy.
pub struct ExchangeEvents {
    pub on_order_fill: Box<dyn Fn(ExchangeId, &str, OrderFill) + Send + Sync>,
    pub on_order_cancel: Box<dyn Fn(ExchangeId, &str, OrderUpdate) + Send + Sync>,
}

impl std::fmt::Debug for ExchangeEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ExchangeEvents")
    }
}

/// A connection to a specific venue: market-data subscriptions plus order entry.
///
/// All callbacks are invoked on the event-loop thread.
pub trait ExchangeSession: Send + Sync {
    fn exchange_id(&self) -> ExchangeId;

    /// Begin connection management. Idempotent.
    fn start(&self);

    fn subscribe_trades(
        &self,
        symbol: &str,
        options: SubscriptionOptions,
        callback: Box<dyn FnMut(TickTrade) + Send>,
    );

    fn subscribe_top(
        &self,
        symbol: &str,
        options: SubscriptionOptions,
        callback: Box<dyn FnMut(TickTop) + Send>,
    );

    /// Reserved: account subscriptions are scaffolding for a future feature.
    fn subscribe_account(&self, callback: Box<dyn FnMut(&[AccountUpdate]) + Send>);

    fn submit_order(&self, params: OrderParams, callbacks: SubmitCallbacks);

    fn cancel_order(
        &self,
        symbol: &str,
        order_id: &str,
        ext_order_id: &str,
        callbacks: SubmitCallbacks,
    );
}
