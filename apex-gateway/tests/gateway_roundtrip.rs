use apex_data::{
    market_data::MarketData,
    tick::{TickTop, TickTrade, TradeKind},
};
use apex_execution::{
    client::gateway::{GatewayClientSession, GatewayRouter},
    order::{CloseReason, Order, OrderFill, OrderParams, OrderState, OrderUpdate, StrategyId,
        TimeInForce},
    router::OrderRouter,
    service::OrderService,
};
use apex_gateway::{
    exchange::{AccountUpdate, ExchangeEvents, ExchangeSession, SubmitCallbacks,
        SubscriptionOptions},
    server::GatewayServer,
};
use apex_instrument::{
    asset::Asset,
    exchange::ExchangeId,
    instrument::{spec::InstrumentSpec, spec::ScaledNum, Instrument, InstrumentKind},
    Side,
};
use apex_integration::{
    event_loop::{EventLoop, EventLoopExt, RealtimeEventLoop},
    reactor::Reactor,
    time::Time,
    RunMode,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if condition() {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("timed out waiting for: {what}");
}

fn instrument() -> Instrument {
    Instrument::new(
        InstrumentKind::CoinPair,
        "BTCUSDT.simulated",
        Asset::from_parts("BTC", ExchangeId::Simulated, 8),
        Asset::from_parts("USDT", ExchangeId::Simulated, 8),
        "BTCUSDT",
        ExchangeId::Simulated,
        InstrumentSpec::new(
            ScaledNum::new(1, 2),
            ScaledNum::new(1, 4),
            Decimal::new(1, 4),
            Decimal::new(10, 0),
        ),
    )
}

/// In-process venue standing in for an exchange session: acks submits and cancels
/// immediately, and lets the test inject ticks and unsolicited events.
struct StubExchange {
    evloop: Arc<dyn EventLoop>,
    events: ExchangeEvents,
    state: Mutex<StubState>,
}

#[derive(Default)]
struct StubState {
    trade_subs: Vec<(String, Box<dyn FnMut(TickTrade) + Send>)>,
    top_subs: Vec<(String, Box<dyn FnMut(TickTop) + Send>)>,
    submit_count: u64,
}

impl StubExchange {
    fn new(events: ExchangeEvents, evloop: Arc<dyn EventLoop>) -> Arc<Self> {
        Arc::new(Self {
            evloop,
            events,
            state: Mutex::new(StubState::default()),
        })
    }

    fn subscribe_count(&self) -> usize {
        let state = self.state.lock();
        state.trade_subs.len() + state.top_subs.len()
    }

    /// Push a trade tick to subscribers. Must run on the gateway event loop.
    fn emit_trade(&self, symbol: &str, price: f64, qty: f64) {
        let tick = TickTrade {
            price,
            qty,
            exchange_time: Time::realtime_now(),
            capture_time: Time::realtime_now(),
            aggr_side: Some(Side::Buy),
            kind: TradeKind::Aggregate,
        };
        let mut state = self.state.lock();
        for (sub_symbol, handler) in state.trade_subs.iter_mut() {
            if sub_symbol == symbol {
                handler(tick);
            }
        }
    }

    fn emit_unsol_cancel(&self, order_id: &str) {
        let update = OrderUpdate {
            state: Some(OrderState::Closed),
            close_reason: Some(CloseReason::Lapsed),
            ext_order_id: "stub-lapsed".to_string(),
        };
        (self.events.on_order_cancel)(ExchangeId::Simulated, order_id, update);
    }

    fn emit_fill(&self, order_id: &str, price: f64, size: f64, fully: bool) {
        let fill = OrderFill {
            is_fully_filled: fully,
            recv_time: Time::realtime_now(),
            price,
            size,
        };
        (self.events.on_order_fill)(ExchangeId::Simulated, order_id, fill);
    }
}

impl ExchangeSession for StubExchange {
    fn exchange_id(&self) -> ExchangeId {
        ExchangeId::Simulated
    }

    fn start(&self) {}

    fn subscribe_trades(
        &self,
        symbol: &str,
        _options: SubscriptionOptions,
        callback: Box<dyn FnMut(TickTrade) + Send>,
    ) {
        self.state
            .lock()
            .trade_subs
            .push((symbol.to_string(), callback));
    }

    fn subscribe_top(
        &self,
        symbol: &str,
        _options: SubscriptionOptions,
        callback: Box<dyn FnMut(TickTop) + Send>,
    ) {
        self.state
            .lock()
            .top_subs
            .push((symbol.to_string(), callback));
    }

    fn subscribe_account(&self, _callback: Box<dyn FnMut(&[AccountUpdate]) + Send>) {}

    fn submit_order(&self, _params: OrderParams, callbacks: SubmitCallbacks) {
        let ext_id = {
            let mut state = self.state.lock();
            state.submit_count += 1;
            format!("stub-{:08x}", state.submit_count)
        };
        self.evloop.dispatch(move || {
            (callbacks.on_reply)(OrderUpdate {
                state: Some(OrderState::Live),
                close_reason: None,
                ext_order_id: ext_id,
            });
        });
    }

    fn cancel_order(
        &self,
        _symbol: &str,
        _order_id: &str,
        _ext_order_id: &str,
        callbacks: SubmitCallbacks,
    ) {
        self.evloop.dispatch(move || {
            (callbacks.on_reply)(OrderUpdate {
                state: Some(OrderState::Closed),
                close_reason: Some(CloseReason::Cancelled),
                ext_order_id: String::new(),
            });
        });
    }
}

struct Harness {
    reactor: Arc<Reactor>,
    server_evloop: Arc<RealtimeEventLoop>,
    client_evloop: Arc<RealtimeEventLoop>,
    server: Arc<GatewayServer>,
    stub: Arc<StubExchange>,
    client: Arc<GatewayClientSession>,
    router: Arc<GatewayRouter>,
    order_service: Arc<OrderService>,
    port: u16,
}

impl Harness {
    fn new(strategy_id: &str) -> Self {
        let reactor = Reactor::new().unwrap();
        let server_evloop = RealtimeEventLoop::with_default_panic_handler();
        let client_evloop = RealtimeEventLoop::with_default_panic_handler();

        let server = GatewayServer::new(
            RunMode::Paper,
            Arc::clone(&server_evloop) as Arc<dyn EventLoop>,
            Arc::clone(&reactor),
        );
        let stub = StubExchange::new(
            server.exchange_events(),
            Arc::clone(&server_evloop) as Arc<dyn EventLoop>,
        );
        server.add_venue(Arc::clone(&stub) as Arc<dyn ExchangeSession>);
        server.start(0).unwrap();
        let port = server.listen_port().unwrap();

        let order_service = OrderService::new(
            Arc::clone(&client_evloop) as Arc<dyn EventLoop>,
            Time::realtime_now(),
        );
        let client = GatewayClientSession::new(
            "127.0.0.1",
            port,
            Arc::clone(&client_evloop) as Arc<dyn EventLoop>,
            Arc::clone(&reactor),
            Arc::clone(&order_service),
        );
        let router = GatewayRouter::new(
            Arc::clone(&client_evloop) as Arc<dyn EventLoop>,
            Arc::clone(&client),
            StrategyId::new(strategy_id).unwrap(),
            RunMode::Paper,
        );
        client.start_connecting();

        Self {
            reactor,
            server_evloop,
            client_evloop,
            server,
            stub,
            client,
            router,
            order_service,
            port,
        }
    }

    fn wait_logged_on(&self) {
        let router = Arc::clone(&self.router);
        wait_until("gateway logon", move || router.is_up());
    }

    fn place_order(&self) -> Arc<Order> {
        let order = self
            .order_service
            .create(
                Arc::clone(&self.router) as Arc<dyn OrderRouter>,
                instrument(),
                Side::Buy,
                1.0,
                100.0,
                TimeInForce::Gtc,
                &StrategyId::new("DEMO1").unwrap(),
                None,
            )
            .unwrap();

        let to_send = Arc::clone(&order);
        self.client_evloop.dispatch(move || {
            to_send.send().unwrap();
        });
        order
    }

    fn emit_trade(&self, symbol: &'static str, price: f64, qty: f64) {
        let stub = Arc::clone(&self.stub);
        self.server_evloop.dispatch(move || {
            stub.emit_trade(symbol, price, qty);
        });
    }

    fn shutdown(self) {
        self.server.stop();
        self.reactor.sync_stop();
        self.client_evloop.sync_stop();
        self.server_evloop.sync_stop();
    }
}

#[test]
fn test_subscribe_and_trade_delivery() {
    let harness = Harness::new("DEMO1");
    harness.wait_logged_on();

    let market = Arc::new(MarketData::new());
    harness
        .client
        .subscribe("BTCUSDT", ExchangeId::Simulated, Arc::clone(&market));

    let stub = Arc::clone(&harness.stub);
    wait_until("venue subscription", move || stub.subscribe_count() >= 2);

    harness.emit_trade("BTCUSDT", 42_000.5, 0.25);

    let market_check = Arc::clone(&market);
    wait_until("trade delivery", move || market_check.has_last());
    assert_eq!(market.last().price, 42_000.5);
    assert_eq!(market.last().qty, 0.25);

    harness.shutdown();
}

#[test]
fn test_submit_and_cancel_round_trip() {
    let harness = Harness::new("DEMO1");
    harness.wait_logged_on();

    // submit: expect order_exec(NEW_ACK, state=live) within the latency window
    let order = harness.place_order();
    let order_check = Arc::clone(&order);
    wait_until("new-order ack", move || order_check.is_live());
    assert!(order.ext_order_id().starts_with("stub-"));

    // cancel: expect order_exec(CANCEL_ACK, state=closed, close_reason=cancelled)
    let to_cancel = Arc::clone(&order);
    harness.client_evloop.dispatch(move || {
        assert!(to_cancel.cancel());
    });

    let order_check = Arc::clone(&order);
    wait_until("cancel ack", move || order_check.is_closed());
    assert_eq!(order.close_reason(), Some(CloseReason::Cancelled));

    harness.shutdown();
}

#[test]
fn test_unsolicited_cancel_demultiplexed_by_strategy_prefix() {
    let harness = Harness::new("DEMO1");
    harness.wait_logged_on();

    let order = harness.place_order();
    let order_check = Arc::clone(&order);
    wait_until("new-order ack", move || order_check.is_live());

    // the venue reports an unsolicited cancel, keyed only by the order id; the gateway
    // must route it to the DEMO1 session by the fixed-width prefix
    let stub = Arc::clone(&harness.stub);
    let order_id = order.order_id().as_str().to_string();
    harness.server_evloop.dispatch(move || {
        stub.emit_unsol_cancel(&order_id);
    });

    let order_check = Arc::clone(&order);
    wait_until("unsolicited cancel", move || order_check.is_closed());
    assert_eq!(order.close_reason(), Some(CloseReason::Lapsed));

    // an id with an unknown strategy prefix is logged and dropped, nothing more
    let stub = Arc::clone(&harness.stub);
    harness.server_evloop.dispatch(move || {
        stub.emit_unsol_cancel("ZZZZ9aabbccdd00000001");
        stub.emit_fill("ZZZZ9aabbccdd00000001", 1.0, 1.0, true);
    });
    std::thread::sleep(Duration::from_millis(100));

    harness.shutdown();
}

#[test]
fn test_fill_routed_back_to_order() {
    let harness = Harness::new("DEMO1");
    harness.wait_logged_on();

    let order = harness.place_order();
    let order_check = Arc::clone(&order);
    wait_until("new-order ack", move || order_check.is_live());

    let stub = Arc::clone(&harness.stub);
    let order_id = order.order_id().as_str().to_string();
    harness.server_evloop.dispatch(move || {
        stub.emit_fill(&order_id, 100.0, 1.0, true);
    });

    let order_check = Arc::clone(&order);
    wait_until("fill routed", move || order_check.is_closed());
    assert_eq!(order.close_reason(), Some(CloseReason::Filled));
    assert_eq!(order.filled_size(), 1.0);

    harness.shutdown();
}

#[test]
fn test_duplicate_strategy_logon_rejected() {
    let harness = Harness::new("DEMO1");
    harness.wait_logged_on();

    // a second client claiming the same strategy id must be rejected
    let second_service = OrderService::new(
        Arc::clone(&harness.client_evloop) as Arc<dyn EventLoop>,
        Time::realtime_now(),
    );
    let second_client = GatewayClientSession::new(
        "127.0.0.1",
        harness.port,
        Arc::clone(&harness.client_evloop) as Arc<dyn EventLoop>,
        Arc::clone(&harness.reactor),
        second_service,
    );

    let logon_error: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let logon_error_store = Arc::clone(&logon_error);
    second_client.subscribe_logon(move |error| {
        *logon_error_store.lock() = Some(error.clone());
    });

    let second_router = GatewayRouter::new(
        Arc::clone(&harness.client_evloop) as Arc<dyn EventLoop>,
        Arc::clone(&second_client),
        StrategyId::new("DEMO1").unwrap(),
        RunMode::Paper,
    );
    second_client.start_connecting();

    let logon_check = Arc::clone(&logon_error);
    wait_until("duplicate logon reply", move || {
        logon_check.lock().as_deref().is_some_and(|e| !e.is_empty())
    });
    assert!(!second_router.is_up());

    harness.shutdown();
}

#[test]
fn test_run_mode_mismatch_rejected() {
    let harness = Harness::new("DEMO1");
    harness.wait_logged_on();

    let second_service = OrderService::new(
        Arc::clone(&harness.client_evloop) as Arc<dyn EventLoop>,
        Time::realtime_now(),
    );
    let second_client = GatewayClientSession::new(
        "127.0.0.1",
        harness.port,
        Arc::clone(&harness.client_evloop) as Arc<dyn EventLoop>,
        Arc::clone(&harness.reactor),
        second_service,
    );

    let logon_error: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let logon_error_store = Arc::clone(&logon_error);
    second_client.subscribe_logon(move |error| {
        *logon_error_store.lock() = Some(error.clone());
    });

    // gateway runs paper; a live client must be rejected
    let second_router = GatewayRouter::new(
        Arc::clone(&harness.client_evloop) as Arc<dyn EventLoop>,
        Arc::clone(&second_client),
        StrategyId::new("DEMO2").unwrap(),
        RunMode::Live,
    );
    second_client.start_connecting();

    let logon_check = Arc::clone(&logon_error);
    wait_until("mismatched logon reply", move || {
        logon_check.lock().as_deref().is_some_and(|e| !e.is_empty())
    });
    assert!(!second_router.is_up());

    harness.shutdown();
}

#[test]
fn test_client_reconnects_and_resubscribes() {
    let harness = Harness::new("DEMO1");
    harness.wait_logged_on();

    let market = Arc::new(MarketData::new());
    harness
        .client
        .subscribe("BTCUSDT", ExchangeId::Simulated, Arc::clone(&market));

    let stub = Arc::clone(&harness.stub);
    wait_until("venue subscription", move || stub.subscribe_count() >= 2);

    harness.emit_trade("BTCUSDT", 100.0, 1.0);
    let market_check = Arc::clone(&market);
    wait_until("first trade", move || market_check.has_last());

    // drop every client session server-side; the client must notice within its check
    // interval, reconnect, re-logon and re-issue its subscription - with no strategy
    // restart and the same market-data sink
    harness.server.stop();
    harness.server.start(harness.port).unwrap();

    let client = Arc::clone(&harness.client);
    wait_until("client observed disconnect", move || !client.is_connected());

    let router = Arc::clone(&harness.router);
    wait_until("re-logon", move || router.is_up());

    harness.emit_trade("BTCUSDT", 123.0, 2.0);
    let market_check = Arc::clone(&market);
    wait_until("trade after reconnect", move || {
        market_check.last().price == 123.0
    });

    harness.shutdown();
}
