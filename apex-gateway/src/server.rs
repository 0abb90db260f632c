use crate::{
    exchange::{ExchangeEvents, ExchangeSession, SubmitCallbacks, SubscriptionOptions},
    session::{
        CancelRequest, GatewayServerSession, LogonRequest, SessionHandlers, SessionRequest,
        SubscribeRequest,
    },
};
use apex_data::{
    subscription::MdStream,
    tick::{TickTop, TickTrade},
};
use apex_execution::order::{
    id::split_strategy_prefix, OrderFill, OrderParams, OrderUpdate,
};
use apex_instrument::exchange::ExchangeId;
use apex_integration::{
    error::{code, SocketError},
    event_loop::{EventLoop, EventLoopExt},
    protocol::gx::message::OrderUpdateReason,
    reactor::{Reactor, TcpListenerHandle},
    RunMode,
};
use fnv::FnvHashMap;
use parking_lot::Mutex;
use smol_str::SmolStr;
use std::{collections::BTreeMap, sync::Arc};
use tracing::{info, warn};

/// One venue-side market-data subscription fanned out to every gateway session that asked
/// for it. A session whose socket cannot keep up is dropped from the list, not throttled.
pub struct ExchangeSubscription {
    symbol: SmolStr,
    exchange: ExchangeId,
    subscribers: Mutex<Vec<Arc<GatewayServerSession>>>,
}

impl std::fmt::Debug for ExchangeSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeSubscription")
            .field("symbol", &self.symbol)
            .field("exchange", &self.exchange)
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}

impl ExchangeSubscription {
    fn new(symbol: SmolStr, exchange: ExchangeId) -> Arc<Self> {
        Arc::new(Self {
            symbol,
            exchange,
            subscribers: Mutex::new(Vec::new()),
        })
    }

    fn add_subscriber(&self, session: Arc<GatewayServerSession>) {
        let mut subscribers = self.subscribers.lock();
        if !subscribers.iter().any(|s| Arc::ptr_eq(s, &session)) {
            subscribers.push(session);
        }
    }

    fn remove_subscriber(&self, session: &Arc<GatewayServerSession>) {
        self.subscribers.lock().retain(|s| !Arc::ptr_eq(s, session));
    }

    fn fan_out(&self, send: impl Fn(&GatewayServerSession) -> Result<(), SocketError>) {
        // a failed write drops the slow consumer from the list entirely
        self.subscribers.lock().retain(|session| {
            match send(session) {
                Ok(()) => true,
                Err(error) => {
                    warn!(
                        symbol = %self.symbol,
                        %error,
                        "dropping gateway session from subscription fan-out"
                    );
                    false
                }
            }
        });
    }

    fn on_trade(&self, tick: &TickTrade) {
        self.fan_out(|session| session.send_trade(self.symbol.as_str(), self.exchange, tick));
    }

    fn on_top(&self, tick: &TickTop) {
        self.fan_out(|session| session.send_top(self.symbol.as_str(), self.exchange, tick));
    }
}

#[derive(Default)]
struct ServerState {
    listener: Option<TcpListenerHandle>,
    sessions: Vec<Arc<GatewayServerSession>>,
    /// Logged-on sessions by strategy id, for routing unsolicited venue events back.
    session_map: FnvHashMap<SmolStr, Arc<GatewayServerSession>>,
    exchange_sessions: FnvHashMap<ExchangeId, Arc<dyn ExchangeSession>>,
    subscriptions: BTreeMap<(ExchangeId, SmolStr), Arc<ExchangeSubscription>>,
}

/// The gateway server: owns the listen socket, the accepted client sessions, and one venue
/// session per exchange.
pub struct GatewayServer {
    run_mode: RunMode,
    evloop: Arc<dyn EventLoop>,
    reactor: Arc<Reactor>,
    state: Mutex<ServerState>,
}

impl std::fmt::Debug for GatewayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("GatewayServer")
            .field("run_mode", &self.run_mode)
            .field("sessions", &state.sessions.len())
            .field("venues", &state.exchange_sessions.len())
            .finish()
    }
}

impl GatewayServer {
    pub fn new(
        run_mode: RunMode,
        evloop: Arc<dyn EventLoop>,
        reactor: Arc<Reactor>,
    ) -> Arc<Self> {
        Arc::new(Self {
            run_mode,
            evloop,
            reactor,
            state: Mutex::new(ServerState::default()),
        })
    }

    /// Register a venue session. Venues are fixed at startup.
    pub fn add_venue(&self, venue: Arc<dyn ExchangeSession>) {
        let exchange = venue.exchange_id();
        info!(%exchange, "gateway: adding venue");
        self.state.lock().exchange_sessions.insert(exchange, venue);
    }

    /// Event callbacks a venue adapter uses to push unsolicited fills and cancels into the
    /// gateway for strategy routing.
    pub fn exchange_events(self: &Arc<Self>) -> ExchangeEvents {
        let on_fill_server = Arc::downgrade(self);
        let on_cancel_server = Arc::downgrade(self);

        ExchangeEvents {
            on_order_fill: Box::new(move |exchange, order_id, fill| {
                if let Some(server) = on_fill_server.upgrade() {
                    server.route_fill(exchange, order_id, fill);
                }
            }),
            on_order_cancel: Box::new(move |exchange, order_id, update| {
                if let Some(server) = on_cancel_server.upgrade() {
                    server.route_unsol_cancel(exchange, order_id, update);
                }
            }),
        }
    }

    /// Bind the listen socket and begin accepting client sessions. Pass port 0 to let the
    /// OS choose (the bound port is available via [`listen_port`](Self::listen_port)).
    pub fn start(self: &Arc<Self>, port: u16) -> Result<(), SocketError> {
        let server = Arc::downgrade(self);
        let evloop = Arc::clone(&self.evloop);

        let listener = self.reactor.listen("0.0.0.0", port, move |conn| {
            let server = server.clone();
            evloop.dispatch(move || {
                if let Some(server) = server.upgrade() {
                    server.on_new_client(conn);
                }
            });
        })?;

        info!(port = listener.local_addr().port(), "gateway listening");
        self.state.lock().listener = Some(listener);
        Ok(())
    }

    pub fn listen_port(&self) -> Option<u16> {
        self.state
            .lock()
            .listener
            .as_ref()
            .map(|listener| listener.local_addr().port())
    }

    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    fn on_new_client(self: &Arc<Self>, conn: apex_integration::reactor::TcpConnection) {
        info!(peer = ?conn.peer_addr(), "gateway: new client session");

        let handlers = SessionHandlers {
            on_subscribe: {
                let server = Arc::downgrade(self);
                Box::new(move |session, request| {
                    if let Some(server) = server.upgrade() {
                        server.handle_subscribe(session, request);
                    }
                })
            },
            on_submit_order: {
                let server = Arc::downgrade(self);
                Box::new(move |session, request, params| {
                    if let Some(server) = server.upgrade() {
                        server.handle_submit_order(session, request, params);
                    }
                })
            },
            on_cancel_order: {
                let server = Arc::downgrade(self);
                Box::new(move |session, request, cancel| {
                    if let Some(server) = server.upgrade() {
                        server.handle_cancel_order(session, request, cancel);
                    }
                })
            },
            on_logon: {
                let server = Arc::downgrade(self);
                Box::new(move |session, request| {
                    server
                        .upgrade()
                        .map(|server| server.handle_logon(session, request))
                        .unwrap_or(false)
                })
            },
            on_closed: {
                let server = Arc::downgrade(self);
                Box::new(move |session| {
                    if let Some(server) = server.upgrade() {
                        server.on_session_closed(session);
                    }
                })
            },
        };

        let session = GatewayServerSession::new(conn, Arc::clone(&self.evloop), handlers);
        if let Err(error) = session.start() {
            warn!(%error, "failed to start client session");
            return;
        }
        self.state.lock().sessions.push(session);
    }

    fn on_session_closed(&self, session: &Arc<GatewayServerSession>) {
        let mut state = self.state.lock();
        state.sessions.retain(|s| !Arc::ptr_eq(s, session));
        // the session might appear under several strategy ids
        state
            .session_map
            .retain(|_, s| !Arc::ptr_eq(s, session));
        for subscription in state.subscriptions.values() {
            subscription.remove_subscriber(session);
        }
    }

    fn handle_logon(
        &self,
        _session: &Arc<GatewayServerSession>,
        request: LogonRequest,
    ) -> bool {
        if request.run_mode != Some(self.run_mode) {
            warn!(
                strategy_id = %request.strategy_id,
                "om-logon rejected, client's run-mode does not match gateway run-mode"
            );
            return false;
        }

        let key = SmolStr::new(&request.strategy_id);
        let mut state = self.state.lock();
        if state.session_map.contains_key(&key) {
            warn!(
                strategy_id = %request.strategy_id,
                "om-logon rejected, strategy-id already connected"
            );
            return false;
        }

        state.session_map.insert(key, Arc::clone(_session));
        info!(strategy_id = %request.strategy_id, "om-logon accepted");
        true
    }

    fn handle_subscribe(
        self: &Arc<Self>,
        session: &Arc<GatewayServerSession>,
        request: SubscribeRequest,
    ) {
        let key = (request.exchange, request.symbol.clone());
        let mut state = self.state.lock();

        if let Some(subscription) = state.subscriptions.get(&key) {
            subscription.add_subscriber(Arc::clone(session));
            return;
        }

        let Some(venue) = state.exchange_sessions.get(&request.exchange).cloned() else {
            warn!(
                exchange = %request.exchange,
                symbol = %request.symbol,
                "subscribe request for unknown exchange"
            );
            return;
        };

        info!(
            exchange = %request.exchange,
            symbol = %request.symbol,
            "gateway: starting venue subscription"
        );

        let subscription = ExchangeSubscription::new(request.symbol.clone(), request.exchange);
        subscription.add_subscriber(Arc::clone(session));
        state.subscriptions.insert(key, Arc::clone(&subscription));
        drop(state);

        let trade_target = Arc::downgrade(&subscription);
        venue.subscribe_trades(
            request.symbol.as_str(),
            SubscriptionOptions {
                stream: MdStream::AggTrades,
            },
            Box::new(move |tick| {
                if let Some(subscription) = trade_target.upgrade() {
                    subscription.on_trade(&tick);
                }
            }),
        );

        let top_target = Arc::downgrade(&subscription);
        venue.subscribe_top(
            request.symbol.as_str(),
            SubscriptionOptions {
                stream: MdStream::L1,
            },
            Box::new(move |tick| {
                if let Some(subscription) = top_target.upgrade() {
                    subscription.on_top(&tick);
                }
            }),
        );
    }

    fn handle_submit_order(
        &self,
        session: &Arc<GatewayServerSession>,
        request: SessionRequest,
        params: OrderParams,
    ) {
        let venue = self.state.lock().exchange_sessions.get(&params.exchange).cloned();
        let Some(venue) = venue else {
            session.send_error(request, code::INTERNAL, "unknown exchange");
            return;
        };

        let reply_session = Arc::downgrade(session);
        let reject_session = Arc::downgrade(session);
        venue.submit_order(
            params,
            SubmitCallbacks {
                on_reply: Box::new(move |update| {
                    if let Some(session) = reply_session.upgrade() {
                        session.send_order_execution(request, &update, OrderUpdateReason::NewAck);
                    }
                }),
                on_rejected: Box::new(move |code, text| {
                    if let Some(session) = reject_session.upgrade() {
                        session.send_error(request, &code, &text);
                    }
                }),
            },
        );
    }

    fn handle_cancel_order(
        &self,
        session: &Arc<GatewayServerSession>,
        request: SessionRequest,
        cancel: CancelRequest,
    ) {
        let venue = self.state.lock().exchange_sessions.get(&cancel.exchange).cloned();
        let Some(venue) = venue else {
            session.send_error(request, code::INTERNAL, "unknown exchange");
            return;
        };

        let reply_session = Arc::downgrade(session);
        let reject_session = Arc::downgrade(session);
        venue.cancel_order(
            cancel.symbol.as_str(),
            &cancel.order_id,
            &cancel.ext_order_id,
            SubmitCallbacks {
                on_reply: Box::new(move |update| {
                    if let Some(session) = reply_session.upgrade() {
                        session.send_order_execution(
                            request,
                            &update,
                            OrderUpdateReason::CancelAck,
                        );
                    }
                }),
                on_rejected: Box::new(move |code, text| {
                    if let Some(session) = reject_session.upgrade() {
                        session.send_error(request, &code, &text);
                    }
                }),
            },
        );
    }

    /// Route a venue fill back to the owning strategy by order-id prefix.
    fn route_fill(&self, exchange: ExchangeId, order_id: &str, fill: OrderFill) {
        match self.find_session_by_order_id(order_id) {
            Some(session) => {
                if let Err(error) = session.send_order_fill(order_id, &fill) {
                    warn!(%error, order_id, "failed to relay order fill");
                }
            }
            None => warn!(
                %exchange,
                order_id,
                "no gateway session found for order-fill"
            ),
        }
    }

    /// Route an unsolicited venue cancel back to the owning strategy by order-id prefix.
    fn route_unsol_cancel(&self, exchange: ExchangeId, order_id: &str, update: OrderUpdate) {
        match self.find_session_by_order_id(order_id) {
            Some(session) => {
                if let Err(error) = session.send_order_unsol_cancel(order_id, &update) {
                    warn!(%error, order_id, "failed to relay unsolicited cancel");
                }
            }
            None => warn!(
                %exchange,
                order_id,
                "no gateway session found for order-unsol-cancel"
            ),
        }
    }

    fn find_session_by_order_id(&self, order_id: &str) -> Option<Arc<GatewayServerSession>> {
        let (strategy_id, _) = split_strategy_prefix(order_id)?;
        self.state.lock().session_map.get(strategy_id).cloned()
    }

    /// Close the listener and every client session.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if let Some(listener) = state.listener.take() {
            listener.close();
        }
        for session in state.sessions.drain(..) {
            session.close();
        }
        state.session_map.clear();
    }
}
