use crate::{
    client::convert,
    error::ExecutionError,
    order::{Order, OrderFill, OrderUpdate, StrategyId},
    router::OrderRouter,
    service::OrderService,
};
use apex_data::{
    market_data::MarketData,
    tick::{TickTop, TickTrade, TradeKind},
};
use apex_instrument::exchange::ExchangeId;
use apex_integration::{
    error::code,
    event_loop::{EventLoop, EventLoopExt},
    protocol::gx::{
        encode_frame,
        message::{
            CancelOrder, ErrorReply, NewOrder, OmLogonReply, OmLogonRequest, OrderExecution,
            OrderFillReport, OrderUpdateReason, SubscribeTicks, TopTick, TradeTick,
        },
        FrameCodec, FrameHeader, MsgType,
    },
    reactor::{Reactor, TcpConnection},
    subject::Subject,
    time::Time,
    RunMode,
};
use bytes::Bytes;
use fnv::FnvHashMap;
use parking_lot::Mutex;
use prost::Message;
use smol_str::SmolStr;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};
use tracing::{debug, error, info, warn};

const RECONNECT_CHECK_INTERVAL: Duration = Duration::from_secs(1);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// One market-data subscription held by the client: symbol, venue, and the model ticks are
/// applied to.
#[derive(Clone)]
pub struct MarketSubscription {
    pub symbol: SmolStr,
    pub exchange: ExchangeId,
    pub market: Arc<MarketData>,
}

impl std::fmt::Debug for MarketSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketSubscription")
            .field("symbol", &self.symbol)
            .field("exchange", &self.exchange)
            .finish()
    }
}

#[derive(Default)]
struct ClientState {
    conn: Option<TcpConnection>,
    connect_in_flight: bool,
    next_req_id: u32,
    pending_submit: FnvHashMap<u32, Weak<Order>>,
    pending_cancel: FnvHashMap<u32, Weak<Order>>,
    /// Subscriptions not yet sent; drained on the event loop once connected.
    pending_subs: Vec<MarketSubscription>,
    active_subs: FnvHashMap<SmolStr, MarketSubscription>,
}

/// Client side of a gateway connection, used by a trading engine.
///
/// Owns the TCP socket (reconnecting with a periodic check and bounded connect timeout),
/// performs logon, replays subscriptions on reconnect, and demultiplexes inbound replies
/// onto the event loop: ticks into market-data models, executions and fills back to their
/// orders via correlation id or the order service.
pub struct GatewayClientSession {
    host: String,
    port: u16,
    evloop: Arc<dyn EventLoop>,
    reactor: Arc<Reactor>,
    order_service: Arc<OrderService>,
    state: Mutex<ClientState>,
    connected_events: Subject<bool>,
    /// Logon replies; the payload is the error string, empty on success.
    logon_events: Subject<String>,
}

impl std::fmt::Debug for GatewayClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClientSession")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl GatewayClientSession {
    pub fn new(
        host: &str,
        port: u16,
        evloop: Arc<dyn EventLoop>,
        reactor: Arc<Reactor>,
        order_service: Arc<OrderService>,
    ) -> Arc<Self> {
        Arc::new(Self {
            host: host.to_string(),
            port,
            evloop,
            reactor,
            order_service,
            state: Mutex::new(ClientState::default()),
            connected_events: Subject::new(),
            logon_events: Subject::new(),
        })
    }

    /// Begin the periodic connection check on the event loop.
    pub fn start_connecting(self: &Arc<Self>) {
        let session = Arc::downgrade(self);
        self.evloop.dispatch_timer(RECONNECT_CHECK_INTERVAL, move || {
            if let Some(session) = session.upgrade() {
                session.check_connection();
                RECONNECT_CHECK_INTERVAL
            } else {
                Duration::ZERO
            }
        });
    }

    pub fn is_connected(&self) -> bool {
        self.state
            .lock()
            .conn
            .as_ref()
            .is_some_and(|conn| conn.is_connected())
    }

    pub fn subscribe_connected(&self, listener: impl FnMut(&bool) + Send + 'static) {
        self.connected_events.subscribe(listener);
    }

    pub fn subscribe_logon(&self, listener: impl FnMut(&String) + Send + 'static) {
        self.logon_events.subscribe(listener);
    }

    /// Register a market-data subscription. Callable from any thread; the wire request is
    /// sent from the event loop, and re-sent after every reconnect.
    pub fn subscribe(
        self: &Arc<Self>,
        symbol: &str,
        exchange: ExchangeId,
        market: Arc<MarketData>,
    ) {
        let sub = MarketSubscription {
            symbol: SmolStr::new(symbol),
            exchange,
            market,
        };

        self.state.lock().pending_subs.push(sub);

        let session = Arc::downgrade(self);
        self.evloop.dispatch(move || {
            if let Some(session) = session.upgrade() {
                session.perform_subscriptions();
            }
        });
    }

    /// Send the strategy logon request. Runs on the event loop.
    pub fn strategy_logon(&self, strategy_id: &StrategyId, run_mode: RunMode) {
        debug_assert!(self.evloop.this_thread_is_ev());

        let msg = OmLogonRequest {
            strategy_id: strategy_id.as_str().to_string(),
            run_mode: convert::run_mode_to_wire(run_mode) as i32,
        };

        let mut state = self.state.lock();
        let req_id = state.next_req_id();
        if let Some(conn) = state.conn.clone() {
            drop(state);
            let frame = encode_frame(MsgType::OmLogon, req_id, &msg);
            if let Err(error) = conn.write(&frame) {
                warn!(%error, "failed to send logon");
            }
        }
    }

    /// Submit a new order over the gateway, correlating the eventual reply by request id.
    pub fn new_order(&self, order: &Arc<Order>) -> Result<(), ExecutionError> {
        debug_assert!(self.evloop.this_thread_is_ev());

        let mut state = self.state.lock();
        let Some(conn) = state.conn.clone() else {
            return Err(ExecutionError::GatewayDown);
        };

        let msg = NewOrder {
            symbol: order.symbol().to_string(),
            exchange: order.instrument().exchange.as_str().to_string(),
            side: convert::side_to_wire(order.side()) as i32,
            price: order.price(),
            size: order.size(),
            tif: convert::tif_to_wire(order.time_in_force()) as i32,
            order_id: order.order_id().as_str().to_string(),
        };

        let req_id = state.next_req_id();
        state.pending_submit.insert(req_id, Arc::downgrade(order));
        drop(state);

        let frame = encode_frame(MsgType::NewOrder, req_id, &msg);
        conn.write(&frame)?;
        Ok(())
    }

    /// Request a cancel over the gateway.
    pub fn cancel_order(&self, order: &Arc<Order>) -> Result<(), ExecutionError> {
        debug_assert!(self.evloop.this_thread_is_ev());

        let mut state = self.state.lock();
        let Some(conn) = state.conn.clone() else {
            return Err(ExecutionError::GatewayDown);
        };

        let msg = CancelOrder {
            symbol: order.symbol().to_string(),
            exchange: order.instrument().exchange.as_str().to_string(),
            order_id: order.order_id().as_str().to_string(),
            ext_order_id: order.ext_order_id(),
        };

        let req_id = state.next_req_id();
        state.pending_cancel.insert(req_id, Arc::downgrade(order));
        drop(state);

        let frame = encode_frame(MsgType::CancelOrder, req_id, &msg);
        conn.write(&frame)?;
        Ok(())
    }

    fn check_connection(self: &Arc<Self>) {
        debug_assert!(self.evloop.this_thread_is_ev());

        {
            let mut state = self.state.lock();
            if let Some(conn) = &state.conn {
                if conn.is_connected() {
                    return;
                }
                state.conn = None;
                drop(state);
                self.connected_events.next(&false);
                return;
            }
            if state.connect_in_flight {
                return;
            }
            state.connect_in_flight = true;
        }

        info!(host = %self.host, port = self.port, "connecting to gateway");
        let session = Arc::downgrade(self);
        let evloop = Arc::clone(&self.evloop);
        self.reactor
            .connect(&self.host, self.port, CONNECT_TIMEOUT, move |result| {
                evloop.dispatch(move || {
                    if let Some(session) = session.upgrade() {
                        session.on_connect_result(result);
                    }
                });
            });
    }

    fn on_connect_result(
        self: &Arc<Self>,
        result: Result<TcpConnection, apex_integration::error::SocketError>,
    ) {
        self.state.lock().connect_in_flight = false;

        match result {
            Ok(conn) => self.install_connection(conn),
            Err(error) => warn!(%error, "gateway connect failed"),
        }
    }

    fn install_connection(self: &Arc<Self>, conn: TcpConnection) {
        {
            let mut state = self.state.lock();
            // every previously-active subscription must be re-requested on this socket
            let resubscribe: Vec<MarketSubscription> =
                state.active_subs.drain().map(|(_, sub)| sub).collect();
            state.pending_subs.extend(resubscribe);
            state.conn = Some(conn.clone());
        }

        let session = Arc::downgrade(self);
        let conn_on_err = conn.clone();
        let mut codec = FrameCodec::default();
        let read_result = conn.start_read(move |result| {
            // reactor thread: reassemble frames, then marshal typed work to the event loop
            let Some(session) = session.upgrade() else {
                return;
            };
            match result {
                Ok(bytes) if bytes.is_empty() => {
                    info!("connection lost to gateway");
                    conn_on_err.close();
                }
                Err(error) => {
                    error!(%error, "gateway socket read error");
                    conn_on_err.close();
                }
                Ok(bytes) => {
                    if let Err(error) = codec.consume(&bytes) {
                        error!(%error, "gateway session fatal decode error");
                        conn_on_err.close();
                        return;
                    }
                    loop {
                        match codec.next_frame() {
                            Ok(Some((header, payload))) => session.io_on_frame(header, payload),
                            Ok(None) => break,
                            Err(error) => {
                                error!(%error, "gateway session fatal decode error");
                                conn_on_err.close();
                                break;
                            }
                        }
                    }
                }
            }
        });

        if let Err(error) = read_result {
            warn!(%error, "failed to start gateway read");
            return;
        }

        info!("connected to gateway");
        self.perform_subscriptions();
        self.connected_events.next(&true);
    }

    fn perform_subscriptions(&self) {
        let mut state = self.state.lock();
        let Some(conn) = state.conn.clone() else {
            return;
        };
        if !conn.is_connected() {
            return;
        }

        for sub in std::mem::take(&mut state.pending_subs) {
            let msg = SubscribeTicks {
                symbol: sub.symbol.to_string(),
                exchange: sub.exchange.as_str().to_string(),
            };
            let frame = encode_frame(MsgType::Subscribe, 0, &msg);
            if let Err(error) = conn.write(&frame) {
                warn!(symbol = %sub.symbol, %error, "failed to send subscribe");
            }
            state.active_subs.insert(sub.symbol.clone(), sub);
        }
    }

    /// Runs on the reactor thread: decode the payload and post a typed handler to the
    /// event loop. Parse failures drop the message, never the session.
    fn io_on_frame(self: &Arc<Self>, header: FrameHeader, payload: Bytes) {
        let Some(msg_type) = header.msg_type() else {
            warn!(
                msg_type = header.msg_type,
                len = header.len,
                "dropping gateway message with unknown type"
            );
            return;
        };

        match msg_type {
            MsgType::Trade => {
                let Ok(msg) = TradeTick::decode(payload) else {
                    warn!("dropping undecodable trade tick");
                    return;
                };
                let session = Arc::downgrade(self);
                let evloop = Arc::clone(&self.evloop);
                self.evloop.dispatch(move || {
                    let Some(session) = session.upgrade() else {
                        return;
                    };
                    let Some(sub) = session.find_subscription(&msg.symbol) else {
                        warn!(symbol = %msg.symbol, "received unexpected trade tick");
                        return;
                    };
                    sub.market.apply_trade(TickTrade {
                        price: msg.price,
                        qty: msg.size,
                        exchange_time: Time::zero(),
                        capture_time: evloop.time(),
                        aggr_side: convert::side_from_wire(msg.side),
                        kind: TradeKind::Aggregate,
                    });
                });
            }
            MsgType::TickTop => {
                let Ok(msg) = TopTick::decode(payload) else {
                    warn!("dropping undecodable top tick");
                    return;
                };
                let session = Arc::downgrade(self);
                self.evloop.dispatch(move || {
                    let Some(session) = session.upgrade() else {
                        return;
                    };
                    let Some(sub) = session.find_subscription(&msg.symbol) else {
                        warn!(symbol = %msg.symbol, "received unexpected top tick");
                        return;
                    };
                    sub.market.apply_top(&TickTop {
                        bid_price: msg.bid_price,
                        bid_qty: 0.0,
                        ask_price: msg.ask_price,
                        ask_qty: 0.0,
                    });
                });
            }
            MsgType::OrderExec => {
                let Ok(msg) = OrderExecution::decode(payload) else {
                    warn!("dropping undecodable order execution");
                    return;
                };
                let session = Arc::downgrade(self);
                let req_id = header.req_id;
                self.evloop.dispatch(move || {
                    if let Some(session) = session.upgrade() {
                        session.on_order_execution(req_id, &msg);
                    }
                });
            }
            MsgType::OrderFill => {
                let Ok(msg) = OrderFillReport::decode(payload) else {
                    warn!("dropping undecodable order fill");
                    return;
                };
                let session = Arc::downgrade(self);
                let evloop = Arc::clone(&self.evloop);
                self.evloop.dispatch(move || {
                    if let Some(session) = session.upgrade() {
                        session.order_service.route_fill_to_order(
                            &msg.order_id,
                            OrderFill {
                                is_fully_filled: msg.fully_filled,
                                recv_time: evloop.time(),
                                price: msg.price,
                                size: msg.size,
                            },
                        );
                    }
                });
            }
            MsgType::Error => {
                let Ok(msg) = ErrorReply::decode(payload) else {
                    warn!("dropping undecodable error reply");
                    return;
                };
                let session = Arc::downgrade(self);
                let req_id = header.req_id;
                self.evloop.dispatch(move || {
                    if let Some(session) = session.upgrade() {
                        session.on_error_reply(req_id, &msg);
                    }
                });
            }
            MsgType::OmLogon => {
                let Ok(msg) = OmLogonReply::decode(payload) else {
                    warn!("dropping undecodable logon reply");
                    return;
                };
                let session = Arc::downgrade(self);
                self.evloop.dispatch(move || {
                    if let Some(session) = session.upgrade() {
                        session.logon_events.next(&msg.error);
                    }
                });
            }
            MsgType::AccountUpdate => {
                // account subscriptions are a reserved wire type
                debug!("dropping account update (reserved)");
            }
            other => {
                warn!(?other, "unhandled gateway message type");
            }
        }
    }

    fn find_subscription(&self, symbol: &str) -> Option<MarketSubscription> {
        self.state.lock().active_subs.get(symbol).cloned()
    }

    fn on_order_execution(&self, req_id: u32, msg: &OrderExecution) {
        let update = OrderUpdate {
            state: convert::order_state_from_wire(msg.order_state),
            close_reason: convert::close_reason_from_wire(msg.close_reason),
            ext_order_id: msg.ext_order_id.clone(),
        };

        match OrderUpdateReason::try_from(msg.reason) {
            Ok(OrderUpdateReason::NewAck) => {
                let pending = self.state.lock().pending_submit.remove(&req_id);
                match pending {
                    Some(order) => {
                        if let Some(order) = order.upgrade() {
                            order.apply_update(&update);
                        }
                    }
                    None => warn!(req_id, "cannot find original order for order_exec(new-order)"),
                }
            }
            Ok(OrderUpdateReason::CancelAck) => {
                let pending = self.state.lock().pending_cancel.remove(&req_id);
                match pending {
                    Some(order) => {
                        if let Some(order) = order.upgrade() {
                            order.apply_update(&update);
                        }
                    }
                    None => {
                        warn!(req_id, "cannot find original order for order_exec(cancel-order)")
                    }
                }
            }
            Ok(OrderUpdateReason::Unsolicited) => {
                self.order_service
                    .route_update_to_order(&msg.order_id, &update);
            }
            _ => warn!(reason = msg.reason, "unhandled order execution reason"),
        }
    }

    fn on_error_reply(&self, req_id: u32, msg: &ErrorReply) {
        match MsgType::from_u8(msg.orig_request_type as u8) {
            Some(MsgType::NewOrder) => {
                let pending = self.state.lock().pending_submit.remove(&req_id);
                match pending {
                    Some(order) => {
                        if let Some(order) = order.upgrade() {
                            order.set_is_rejected(&msg.code, &msg.text);
                        }
                    }
                    None => warn!(req_id, "received unexpected send-order error"),
                }
            }
            Some(MsgType::CancelOrder) => {
                let pending = self.state.lock().pending_cancel.remove(&req_id);
                match pending {
                    Some(order) => {
                        if let Some(order) = order.upgrade() {
                            order.apply_cancel_reject(&msg.code, &msg.text);
                        }
                    }
                    None => warn!(req_id, "received unexpected cancel-order error"),
                }
            }
            other => warn!(
                ?other,
                code = %msg.code,
                "received gateway error for unknown request type"
            ),
        }
    }
}

impl ClientState {
    fn next_req_id(&mut self) -> u32 {
        self.next_req_id = self.next_req_id.wrapping_add(1).max(1);
        self.next_req_id
    }
}

/// Realtime order router backed by a [`GatewayClientSession`].
///
/// `is_up` is true only after a successful `om_logon` reply on the current connection; the
/// router re-issues logon whenever the session reconnects.
pub struct GatewayRouter {
    evloop: Arc<dyn EventLoop>,
    session: Arc<GatewayClientSession>,
    up: Arc<AtomicBool>,
}

impl std::fmt::Debug for GatewayRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayRouter")
            .field("up", &self.is_up())
            .finish()
    }
}

impl GatewayRouter {
    pub fn new(
        evloop: Arc<dyn EventLoop>,
        session: Arc<GatewayClientSession>,
        strategy_id: StrategyId,
        run_mode: RunMode,
    ) -> Arc<Self> {
        let up = Arc::new(AtomicBool::new(false));

        let up_on_logon = Arc::clone(&up);
        let logon_strategy = strategy_id.clone();
        session.subscribe_logon(move |logon_error| {
            if logon_error.is_empty() {
                up_on_logon.store(true, Ordering::Release);
                info!(strategy_id = %logon_strategy, "order-router logon successful");
            } else {
                up_on_logon.store(false, Ordering::Release);
                error!(error = %logon_error, "gateway strategy logon failed");
            }
        });

        let up_on_conn = Arc::clone(&up);
        let session_handle = Arc::downgrade(&session);
        let conn_strategy = strategy_id.clone();
        session.subscribe_connected(move |is_connected| {
            if !*is_connected {
                up_on_conn.store(false, Ordering::Release);
                return;
            }
            if let Some(session) = session_handle.upgrade() {
                session.strategy_logon(&conn_strategy, run_mode);
            }
        });

        // the session may have connected before this router existed; log on now if so
        if session.is_connected() {
            let session_handle = Arc::downgrade(&session);
            evloop.dispatch(move || {
                if let Some(session) = session_handle.upgrade() {
                    session.strategy_logon(&strategy_id, run_mode);
                }
            });
        }

        Arc::new(Self { evloop, session, up })
    }
}

impl OrderRouter for GatewayRouter {
    fn send_order(&self, order: &Arc<Order>) {
        if !self.is_up() {
            let handle = Arc::downgrade(order);
            self.evloop.dispatch(move || {
                if let Some(order) = handle.upgrade() {
                    order.set_is_rejected(code::GATEWAY_DOWN, "gateway not connected");
                }
            });
            return;
        }

        if let Err(send_error) = self.session.new_order(order) {
            warn!(order_id = %order.order_id(), error = %send_error, "gateway order send failed");
            let handle = Arc::downgrade(order);
            self.evloop.dispatch(move || {
                if let Some(order) = handle.upgrade() {
                    order.set_is_rejected(code::GATEWAY_DOWN, "gateway send failed");
                }
            });
        }
    }

    fn cancel_order(&self, order: &Arc<Order>) -> Result<(), ExecutionError> {
        if !self.session.is_connected() {
            return Err(ExecutionError::GatewayDown);
        }
        self.session.cancel_order(order)
    }

    fn is_up(&self) -> bool {
        self.up.load(Ordering::Acquire)
    }
}
