use crate::{
    error::GatewayError,
    exchange::{
        AccountUpdate, ExchangeEvents, ExchangeSession, SubmitCallbacks, SubscriptionOptions,
    },
};
use apex_data::tick::{TickTop, TickTrade, TradeKind};
use apex_execution::order::{
    CloseReason, OrderFill, OrderParams, OrderState, OrderUpdate, TimeInForce,
};
use apex_instrument::{exchange::ExchangeId, Side};
use apex_integration::{
    error::code,
    event_loop::{EventLoop, EventLoopExt},
    reactor::Reactor,
    time::Time,
    RunMode,
};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::{
    sync::{Arc, Weak},
    time::{Duration, Instant},
};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, error, info, warn};

pub mod model;
pub mod signer;

use model::{
    BinanceAggTrade, BinanceBookTicker, BinanceExecutionReport, BinanceListenKey, BinanceOrderAck,
    BinanceRestError,
};

const CONNECTION_CHECK_INTERVAL: Duration = Duration::from_secs(1);
/// Venue-published rate limits make one subscribe request per interval the safe cadence.
const SUBSCRIBE_FLUSH_INTERVAL: Duration = Duration::from_millis(250);
const LISTEN_KEY_REFRESH_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Static venue configuration for one [`BinanceSession`].
#[derive(Debug, Clone)]
pub struct BinanceParams {
    pub api_key: String,
    pub api_secret: String,
    pub rest_endpoint: String,
    pub ws_endpoint: String,
    pub recv_window: u64,
}

impl Default for BinanceParams {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            rest_endpoint: "https://api.binance.com".into(),
            ws_endpoint: "wss://stream.binance.com:9443".into(),
            recv_window: 5_000,
        }
    }
}

/// Connection lifecycle of the venue session.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum ConnState {
    Connecting,
    Connected,
    Resetting,
}

enum SubHandler {
    Trade(Box<dyn FnMut(TickTrade) + Send>),
    Top(Box<dyn FnMut(TickTop) + Send>),
}

struct Subscription {
    id: u32,
    /// Stream name, eg/ "btcusdt@aggTrade".
    channel: String,
    /// Whether the subscribe request has been sent on the current socket.
    requested: bool,
    handler: SubHandler,
}

#[derive(Default)]
struct BinanceState {
    conn_state: Option<ConnState>,
    subscriptions: Vec<Subscription>,
    next_sub_id: u32,
    md_ws_tx: Option<tokio::sync::mpsc::UnboundedSender<String>>,
    md_connecting: bool,
    user_ws_alive: bool,
    user_connecting: bool,
    listen_key: Option<String>,
    listen_key_requested: bool,
    listen_key_refreshed: Option<Instant>,
    next_paper_id: u64,
    started: bool,
    account_callback: Option<Box<dyn FnMut(&[AccountUpdate]) + Send>>,
}

/// Venue adapter for Binance spot: market-data WebSocket, user-data WebSocket (live only,
/// via a periodically refreshed listen key) and signed REST order entry.
///
/// Subscribe requests issued before the socket is open are queued un-requested and flushed
/// one per interval after connect; a market-data disconnect marks every subscription
/// un-requested so it is re-issued on reconnect.
pub struct BinanceSession {
    exchange: ExchangeId,
    run_mode: RunMode,
    params: BinanceParams,
    evloop: Arc<dyn EventLoop>,
    reactor: Arc<Reactor>,
    events: ExchangeEvents,
    http: reqwest::Client,
    state: Mutex<BinanceState>,
    /// Non-owning handle to self, promoted by spawned tasks and timers.
    handle: Weak<BinanceSession>,
}

impl std::fmt::Debug for BinanceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceSession")
            .field("exchange", &self.exchange)
            .field("run_mode", &self.run_mode)
            .finish()
    }
}

impl BinanceSession {
    pub fn new(
        events: ExchangeEvents,
        params: BinanceParams,
        run_mode: RunMode,
        evloop: Arc<dyn EventLoop>,
        reactor: Arc<Reactor>,
    ) -> Result<Arc<Self>, GatewayError> {
        if run_mode.is_backtest() {
            return Err(GatewayError::BacktestRunMode);
        }

        Ok(Arc::new_cyclic(|handle| Self {
            exchange: ExchangeId::Binance,
            run_mode,
            params,
            evloop,
            reactor,
            events,
            http: reqwest::Client::new(),
            state: Mutex::new(BinanceState::default()),
            handle: handle.clone(),
        }))
    }

    fn is_live(&self) -> bool {
        self.run_mode == RunMode::Live
    }

    /// Whether the market-data connection is currently established.
    pub fn is_up(&self) -> bool {
        matches!(self.state.lock().conn_state, Some(ConnState::Connected))
    }

    // ---- connection management (event loop) ----

    fn manage_connection(self: &Arc<Self>) {
        let (need_md, need_listen_key, need_user_ws, listen_key) = {
            let mut state = self.state.lock();

            let need_md = state.md_ws_tx.is_none() && !state.md_connecting;
            if need_md {
                state.md_connecting = true;
                state.conn_state = Some(match state.conn_state {
                    None => ConnState::Connecting,
                    Some(_) => ConnState::Resetting,
                });
            }

            let key_stale = state
                .listen_key_refreshed
                .map(|at| at.elapsed() >= LISTEN_KEY_REFRESH_INTERVAL)
                .unwrap_or(true);
            let need_listen_key = self.is_live() && key_stale && !state.listen_key_requested;
            if need_listen_key {
                state.listen_key_requested = true;
            }

            let need_user_ws = self.is_live()
                && state.listen_key.is_some()
                && !state.user_ws_alive
                && !state.user_connecting;
            if need_user_ws {
                state.user_connecting = true;
            }

            (need_md, need_listen_key, need_user_ws, state.listen_key.clone())
        };

        if need_md {
            self.open_market_data_ws();
        }
        if need_listen_key {
            self.request_listen_key();
        }
        if need_user_ws {
            if let Some(listen_key) = listen_key {
                self.open_user_data_ws(listen_key);
            }
        }
    }

    fn open_market_data_ws(self: &Arc<Self>) {
        let url = format!("{}/ws", self.params.ws_endpoint);
        info!(%url, "binance: opening market-data websocket");

        let session = Arc::downgrade(self);
        let evloop = Arc::clone(&self.evloop);

        self.reactor.handle().spawn(async move {
            let connected = connect_async(url.as_str()).await;

            let (ws, _) = match connected {
                Ok(ok) => ok,
                Err(ws_error) => {
                    warn!(error = %ws_error, "binance: market-data websocket connect failed");
                    dispatch_session(&evloop, &session, |session| {
                        session.state.lock().md_connecting = false;
                    });
                    return;
                }
            };

            let (mut sink, mut stream) = ws.split();
            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();

            // writer half: subscribe requests queued from the event loop
            tokio::spawn(async move {
                while let Some(text) = rx.recv().await {
                    if sink.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
            });

            dispatch_session(&evloop, &session, move |session| {
                session.on_md_connected(tx);
            });

            while let Some(message) = stream.next().await {
                match message {
                    Ok(WsMessage::Text(text)) => match serde_json::from_str::<Value>(&text) {
                        Ok(json) => {
                            dispatch_session(&evloop, &session, move |session| {
                                session.on_md_message(json);
                            });
                        }
                        Err(parse_error) => {
                            warn!(%parse_error, "binance: dropping unparsable md message");
                        }
                    },
                    Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {}
                    Ok(WsMessage::Close(frame)) => {
                        info!(?frame, "binance: market-data websocket closed");
                        break;
                    }
                    Ok(_) => {}
                    Err(ws_error) => {
                        warn!(error = %ws_error, "binance: market-data websocket error");
                        break;
                    }
                }
            }

            dispatch_session(&evloop, &session, |session| {
                session.on_md_disconnected();
            });
        });
    }

    fn on_md_connected(&self, tx: tokio::sync::mpsc::UnboundedSender<String>) {
        info!("binance: market-data websocket connected");
        let mut state = self.state.lock();
        state.md_connecting = false;
        state.md_ws_tx = Some(tx);
        state.conn_state = Some(ConnState::Connected);
        // every subscription must be re-requested on this socket
        for sub in state.subscriptions.iter_mut() {
            sub.requested = false;
        }
    }

    fn on_md_disconnected(&self) {
        warn!("binance: market-data websocket disconnected");
        let mut state = self.state.lock();
        state.md_ws_tx = None;
        state.conn_state = Some(ConnState::Resetting);
        for sub in state.subscriptions.iter_mut() {
            sub.requested = false;
        }
    }

    /// Send at most one pending subscribe request, respecting the venue's rate limits.
    fn flush_subscriptions(&self) {
        let mut state = self.state.lock();
        let Some(tx) = state.md_ws_tx.clone() else {
            return;
        };

        let Some(sub) = state.subscriptions.iter_mut().find(|sub| !sub.requested) else {
            return;
        };

        let request = format!(
            r#"{{"method":"SUBSCRIBE","params":["{}"],"id":{}}}"#,
            sub.channel, sub.id
        );
        debug!(channel = %sub.channel, "binance: sending subscribe");
        if tx.send(request).is_ok() {
            sub.requested = true;
        }
    }

    fn on_md_message(&self, json: Value) {
        match json.get("e").and_then(Value::as_str) {
            Some("aggTrade") => {
                let trade: BinanceAggTrade = match serde_json::from_value(json) {
                    Ok(trade) => trade,
                    Err(parse_error) => {
                        warn!(%parse_error, "binance: dropping malformed aggTrade");
                        return;
                    }
                };

                let tick = TickTrade {
                    price: trade.price,
                    qty: trade.qty,
                    exchange_time: Time::from_epoch_ms(trade.trade_time),
                    capture_time: self.evloop.time(),
                    aggr_side: Some(if trade.buyer_is_maker {
                        Side::Sell
                    } else {
                        Side::Buy
                    }),
                    kind: TradeKind::Aggregate,
                };

                let channel = format!("{}@aggTrade", trade.symbol.to_lowercase());
                self.deliver_trade(&channel, tick);
            }
            Some(other) => {
                debug!(event = other, "binance: ignoring md event type");
            }
            None => {
                // bookTicker messages carry no event discriminator
                if json.get("b").is_some() && json.get("a").is_some() && json.get("s").is_some() {
                    let top: BinanceBookTicker = match serde_json::from_value(json) {
                        Ok(top) => top,
                        Err(parse_error) => {
                            warn!(%parse_error, "binance: dropping malformed bookTicker");
                            return;
                        }
                    };
                    let tick = TickTop {
                        bid_price: top.bid_price,
                        bid_qty: top.bid_qty,
                        ask_price: top.ask_price,
                        ask_qty: top.ask_qty,
                    };
                    let channel = format!("{}@bookTicker", top.symbol.to_lowercase());
                    self.deliver_top(&channel, tick);
                } else if json.get("result").is_some() {
                    debug!("binance: subscribe ack");
                }
            }
        }
    }

    fn deliver_trade(&self, channel: &str, tick: TickTrade) {
        let mut state = self.state.lock();
        for sub in state.subscriptions.iter_mut() {
            if sub.channel == channel {
                if let SubHandler::Trade(handler) = &mut sub.handler {
                    handler(tick);
                }
            }
        }
    }

    fn deliver_top(&self, channel: &str, tick: TickTop) {
        let mut state = self.state.lock();
        for sub in state.subscriptions.iter_mut() {
            if sub.channel == channel {
                if let SubHandler::Top(handler) = &mut sub.handler {
                    handler(tick);
                }
            }
        }
    }

    // ---- user-data stream (live only) ----

    fn request_listen_key(self: &Arc<Self>) {
        info!("binance: requesting user-stream listen key");

        let url = format!("{}/api/v3/userDataStream", self.params.rest_endpoint);
        let request = self
            .http
            .post(url)
            .header("X-MBX-APIKEY", self.params.api_key.clone());

        let session = Arc::downgrade(self);
        let evloop = Arc::clone(&self.evloop);
        self.reactor.handle().spawn(async move {
            let outcome = async {
                let response = request.send().await?;
                let status = response.status();
                let body = response.text().await?;
                Ok::<_, reqwest::Error>((status, body))
            }
            .await;

            dispatch_session(&evloop, &session, move |session| {
                let mut state = session.state.lock();
                state.listen_key_requested = false;
                match outcome {
                    Ok((status, body)) if status.is_success() => {
                        match serde_json::from_str::<BinanceListenKey>(&body) {
                            Ok(reply) => {
                                info!("binance: obtained user-data listen key");
                                state.listen_key = Some(reply.listen_key);
                                state.listen_key_refreshed = Some(Instant::now());
                            }
                            Err(parse_error) => {
                                error!(%parse_error, "binance: listen key missing in response");
                            }
                        }
                    }
                    Ok((status, body)) => {
                        error!(%status, body, "binance: listen key request failed");
                    }
                    Err(http_error) => {
                        error!(error = %http_error, "binance: listen key request failed");
                    }
                }
            });
        });
    }

    fn open_user_data_ws(self: &Arc<Self>, listen_key: String) {
        let url = format!("{}/ws/{}", self.params.ws_endpoint, listen_key);
        info!("binance: opening user-data websocket");

        let session = Arc::downgrade(self);
        let evloop = Arc::clone(&self.evloop);

        self.reactor.handle().spawn(async move {
            let connected = connect_async(url.as_str()).await;

            let (ws, _) = match connected {
                Ok(ok) => ok,
                Err(ws_error) => {
                    warn!(error = %ws_error, "binance: user-data websocket connect failed");
                    dispatch_session(&evloop, &session, |session| {
                        session.state.lock().user_connecting = false;
                    });
                    return;
                }
            };

            dispatch_session(&evloop, &session, |session| {
                let mut state = session.state.lock();
                state.user_connecting = false;
                state.user_ws_alive = true;
            });

            let (_sink, mut stream) = ws.split();
            while let Some(message) = stream.next().await {
                match message {
                    Ok(WsMessage::Text(text)) => match serde_json::from_str::<Value>(&text) {
                        Ok(json) => {
                            dispatch_session(&evloop, &session, move |session| {
                                session.on_user_message(json);
                            });
                        }
                        Err(parse_error) => {
                            warn!(%parse_error, "binance: dropping unparsable user message");
                        }
                    },
                    Ok(WsMessage::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }

            dispatch_session(&evloop, &session, |session| {
                warn!("binance: user-data websocket disconnected");
                let mut state = session.state.lock();
                state.user_ws_alive = false;
            });
        });
    }

    fn on_user_message(&self, json: Value) {
        match json.get("e").and_then(Value::as_str) {
            Some("executionReport") => {
                let report: BinanceExecutionReport = match serde_json::from_value(json) {
                    Ok(report) => report,
                    Err(parse_error) => {
                        warn!(%parse_error, "binance: dropping malformed execution report");
                        return;
                    }
                };
                self.on_execution_report(report);
            }
            Some("listenKeyExpired") => {
                warn!("binance: listen key expired");
                let mut state = self.state.lock();
                state.listen_key = None;
                state.listen_key_refreshed = None;
            }
            Some(other) => {
                debug!(event = other, "binance: ignoring user event type");
            }
            None => {}
        }
    }

    /// Only `CANCELED | EXPIRED | TRADE` surface: the first two as an unsolicited cancel
    /// with close-reason lapsed, the last as a fill mirroring the venue's FILLED status.
    fn on_execution_report(&self, report: BinanceExecutionReport) {
        match report.execution_type.as_str() {
            "TRADE" => {
                let fill = OrderFill {
                    is_fully_filled: report.order_status == "FILLED",
                    recv_time: self.evloop.time(),
                    price: report.last_exec_price,
                    size: report.last_exec_qty,
                };
                (self.events.on_order_fill)(self.exchange, &report.client_order_id, fill);
            }
            "CANCELED" | "EXPIRED" => {
                let order_id = report
                    .orig_client_order_id
                    .as_deref()
                    .filter(|id| !id.is_empty())
                    .unwrap_or(&report.client_order_id);

                let update = OrderUpdate {
                    state: Some(OrderState::Closed),
                    close_reason: Some(CloseReason::Lapsed),
                    ext_order_id: report.venue_order_id.to_string(),
                };
                (self.events.on_order_cancel)(self.exchange, order_id, update);
            }
            other => {
                debug!(execution_type = other, "binance: ignoring execution type");
            }
        }
    }

    // ---- order entry ----

    fn signed_query(&self, params: &[(&str, String)]) -> Result<String, GatewayError> {
        let mut query = serde_urlencoded::to_string(params)
            .map_err(|encode_error| GatewayError::Venue(encode_error.to_string()))?;
        query.push_str(&format!(
            "&recvWindow={}&timestamp={}",
            self.params.recv_window,
            signer::build_timestamp_ms()
        ));
        let digest = signer::sign_query(&self.params.api_secret, &query);
        query.push_str(&format!("&signature={digest}"));
        Ok(query)
    }

    fn paper_ack(&self, callbacks: SubmitCallbacks, update: OrderUpdate) {
        self.evloop.dispatch(move || {
            (callbacks.on_reply)(update);
        });
    }

    fn rest_submit_order(self: &Arc<Self>, params: OrderParams, callbacks: SubmitCallbacks) {
        let tif = match params.time_in_force {
            TimeInForce::Gtc => "GTC",
            TimeInForce::Ioc => "IOC",
            TimeInForce::Fok => "FOK",
        };
        let side = match params.side {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        };

        let query = self.signed_query(&[
            ("symbol", params.symbol.to_string()),
            ("side", side.to_string()),
            ("type", "LIMIT".to_string()),
            ("timeInForce", tif.to_string()),
            ("quantity", format!("{}", params.size)),
            ("price", format!("{}", params.price)),
            ("newClientOrderId", params.order_id.clone()),
        ]);

        let query = match query {
            Ok(query) => query,
            Err(sign_error) => {
                let evloop = Arc::clone(&self.evloop);
                evloop.dispatch(move || {
                    (callbacks.on_rejected)(code::INTERNAL.to_string(), sign_error.to_string());
                });
                return;
            }
        };

        let url = format!("{}/api/v3/order?{}", self.params.rest_endpoint, query);
        let request = self
            .http
            .post(url)
            .header("X-MBX-APIKEY", self.params.api_key.clone());

        let evloop = Arc::clone(&self.evloop);
        self.reactor.handle().spawn(async move {
            let outcome = async {
                let response = request.send().await?;
                let status = response.status();
                let body = response.text().await?;
                Ok::<_, reqwest::Error>((status, body))
            }
            .await;

            evloop.dispatch(move || match outcome {
                Ok((status, body)) if status.is_success() => {
                    match serde_json::from_str::<BinanceOrderAck>(&body) {
                        Ok(ack) => (callbacks.on_reply)(OrderUpdate {
                            state: Some(OrderState::Live),
                            close_reason: None,
                            ext_order_id: ack.order_id.to_string(),
                        }),
                        Err(parse_error) => (callbacks.on_rejected)(
                            code::PROTOCOL.to_string(),
                            format!("unparsable venue order ack: {parse_error}"),
                        ),
                    }
                }
                Ok((_, body)) => {
                    let text = serde_json::from_str::<BinanceRestError>(&body)
                        .map(|venue| format!("venue code {}: {}", venue.code, venue.msg))
                        .unwrap_or(body);
                    (callbacks.on_rejected)(code::VENUE_REJECT.to_string(), text);
                }
                Err(http_error) => {
                    (callbacks.on_rejected)(code::VENUE_REJECT.to_string(), http_error.to_string())
                }
            });
        });
    }

    fn rest_cancel_order(
        self: &Arc<Self>,
        symbol: &str,
        order_id: &str,
        callbacks: SubmitCallbacks,
    ) {
        let query = self.signed_query(&[
            ("symbol", symbol.to_string()),
            ("origClientOrderId", order_id.to_string()),
        ]);

        let query = match query {
            Ok(query) => query,
            Err(sign_error) => {
                let evloop = Arc::clone(&self.evloop);
                evloop.dispatch(move || {
                    (callbacks.on_rejected)(code::INTERNAL.to_string(), sign_error.to_string());
                });
                return;
            }
        };

        let url = format!("{}/api/v3/order?{}", self.params.rest_endpoint, query);
        let request = self
            .http
            .delete(url)
            .header("X-MBX-APIKEY", self.params.api_key.clone());

        let evloop = Arc::clone(&self.evloop);
        self.reactor.handle().spawn(async move {
            let outcome = async {
                let response = request.send().await?;
                let status = response.status();
                let body = response.text().await?;
                Ok::<_, reqwest::Error>((status, body))
            }
            .await;

            evloop.dispatch(move || match outcome {
                Ok((status, _body)) if status.is_success() => {
                    (callbacks.on_reply)(OrderUpdate {
                        state: Some(OrderState::Closed),
                        close_reason: Some(CloseReason::Cancelled),
                        ext_order_id: String::new(),
                    });
                }
                Ok((_, body)) => {
                    let text = serde_json::from_str::<BinanceRestError>(&body)
                        .map(|venue| format!("venue code {}: {}", venue.code, venue.msg))
                        .unwrap_or(body);
                    (callbacks.on_rejected)(code::VENUE_CANCEL_REJECT.to_string(), text);
                }
                Err(http_error) => (callbacks.on_rejected)(
                    code::VENUE_CANCEL_REJECT.to_string(),
                    http_error.to_string(),
                ),
            });
        });
    }
}

fn dispatch_session(
    evloop: &Arc<dyn EventLoop>,
    session: &Weak<BinanceSession>,
    f: impl FnOnce(&Arc<BinanceSession>) + Send + 'static,
) {
    let session = session.clone();
    evloop.dispatch(move || {
        if let Some(session) = session.upgrade() {
            f(&session);
        }
    });
}

impl ExchangeSession for BinanceSession {
    fn exchange_id(&self) -> ExchangeId {
        self.exchange
    }

    fn start(&self) {
        {
            let mut state = self.state.lock();
            if state.started {
                return;
            }
            state.started = true;
        }

        let manage = self.handle.clone();
        self.evloop.dispatch_timer(CONNECTION_CHECK_INTERVAL, move || {
            match manage.upgrade() {
                Some(session) => {
                    session.manage_connection();
                    CONNECTION_CHECK_INTERVAL
                }
                None => Duration::ZERO,
            }
        });

        let flush = self.handle.clone();
        self.evloop.dispatch_timer(SUBSCRIBE_FLUSH_INTERVAL, move || {
            match flush.upgrade() {
                Some(session) => {
                    session.flush_subscriptions();
                    SUBSCRIBE_FLUSH_INTERVAL
                }
                None => Duration::ZERO,
            }
        });
    }

    fn subscribe_trades(
        &self,
        symbol: &str,
        _options: SubscriptionOptions,
        callback: Box<dyn FnMut(TickTrade) + Send>,
    ) {
        let mut state = self.state.lock();
        let id = state.next_sub_id;
        state.next_sub_id += 1;
        state.subscriptions.push(Subscription {
            id,
            channel: format!("{}@aggTrade", symbol.to_lowercase()),
            requested: false,
            handler: SubHandler::Trade(callback),
        });
    }

    fn subscribe_top(
        &self,
        symbol: &str,
        _options: SubscriptionOptions,
        callback: Box<dyn FnMut(TickTop) + Send>,
    ) {
        let mut state = self.state.lock();
        let id = state.next_sub_id;
        state.next_sub_id += 1;
        state.subscriptions.push(Subscription {
            id,
            channel: format!("{}@bookTicker", symbol.to_lowercase()),
            requested: false,
            handler: SubHandler::Top(callback),
        });
    }

    fn subscribe_account(&self, callback: Box<dyn FnMut(&[AccountUpdate]) + Send>) {
        // reserved future feature; retain the callback but never invoke it
        self.state.lock().account_callback = Some(callback);
    }

    fn submit_order(&self, params: OrderParams, callbacks: SubmitCallbacks) {
        if !self.is_live() {
            // paper trading: acknowledge without touching the venue
            let paper_id = {
                let mut state = self.state.lock();
                state.next_paper_id += 1;
                state.next_paper_id
            };
            self.paper_ack(
                callbacks,
                OrderUpdate {
                    state: Some(OrderState::Live),
                    close_reason: None,
                    ext_order_id: format!("paper-{paper_id:08x}"),
                },
            );
            return;
        }

        if let Some(this) = self.handle.upgrade() {
            this.rest_submit_order(params, callbacks);
        }
    }

    fn cancel_order(
        &self,
        symbol: &str,
        order_id: &str,
        _ext_order_id: &str,
        callbacks: SubmitCallbacks,
    ) {
        if !self.is_live() {
            self.paper_ack(
                callbacks,
                OrderUpdate {
                    state: Some(OrderState::Closed),
                    close_reason: Some(CloseReason::Cancelled),
                    ext_order_id: String::new(),
                },
            );
            return;
        }

        if let Some(this) = self.handle.upgrade() {
            this.rest_cancel_order(symbol, order_id, callbacks);
        }
    }
}
