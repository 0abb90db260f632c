use apex_execution::{
    error::ExecutionError,
    order::{
        CancelState, CloseReason, Order, OrderFill, OrderState, OrderUpdate, StrategyId,
        TimeInForce,
    },
    router::OrderRouter,
    service::OrderService,
};
use apex_instrument::{
    asset::Asset,
    exchange::ExchangeId,
    instrument::{spec::InstrumentSpec, spec::ScaledNum, Instrument, InstrumentKind},
    Side,
};
use apex_integration::{
    event_loop::{BacktestEventLoop, EventLoop},
    time::Time,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::{str::FromStr, sync::Arc};

#[derive(Debug, Default)]
struct NullRouter;

impl OrderRouter for NullRouter {
    fn send_order(&self, _order: &Arc<Order>) {}

    fn cancel_order(&self, _order: &Arc<Order>) -> Result<(), ExecutionError> {
        Ok(())
    }

    fn is_up(&self) -> bool {
        true
    }
}

fn instrument() -> Instrument {
    Instrument::new(
        InstrumentKind::CoinPair,
        "BTCUSDT.binance",
        Asset::from_parts("BTC", ExchangeId::Binance, 8),
        Asset::from_parts("USDT", ExchangeId::Binance, 8),
        "BTCUSDT",
        ExchangeId::Binance,
        InstrumentSpec::new(
            ScaledNum::new(1, 2),
            ScaledNum::new(1, 4),
            Decimal::new(1, 4),
            Decimal::new(10, 0),
        ),
    )
}

struct Fixture {
    evloop: Arc<BacktestEventLoop>,
    service: Arc<OrderService>,
    strategy: StrategyId,
}

impl Fixture {
    fn new() -> Self {
        let t0 = Time::from_str("2024-02-01T00:00:00").unwrap();
        let evloop = Arc::new(BacktestEventLoop::new(t0));
        let service = OrderService::new(
            Arc::clone(&evloop) as Arc<dyn EventLoop>,
            t0,
        );
        Self {
            evloop,
            service,
            strategy: StrategyId::new("DEMO1").unwrap(),
        }
    }

    fn create_order(&self, side: Side, size: f64, price: f64) -> Arc<Order> {
        self.service
            .create(
                Arc::new(NullRouter),
                instrument(),
                side,
                size,
                price,
                TimeInForce::Gtc,
                &self.strategy,
                None,
            )
            .unwrap()
    }
}

fn live_update(ext: &str) -> OrderUpdate {
    OrderUpdate {
        state: Some(OrderState::Live),
        close_reason: None,
        ext_order_id: ext.to_string(),
    }
}

#[test]
fn test_happy_path_init_sent_live_closed() {
    let fixture = Fixture::new();
    let order = fixture.create_order(Side::Buy, 1.0, 100.0);

    assert_eq!(order.state(), OrderState::Init);
    assert!(order.live_time().is_empty());

    order.send().unwrap();
    assert_eq!(order.state(), OrderState::Sent);
    assert!(!order.sent_time().is_empty());

    order.apply_update(&live_update("X-1"));
    assert_eq!(order.state(), OrderState::Live);
    assert_eq!(order.ext_order_id(), "X-1");
    let live_time = order.live_time();
    assert!(!live_time.is_empty());

    order.apply_fill(OrderFill {
        is_fully_filled: true,
        recv_time: fixture.evloop.time(),
        price: 100.0,
        size: 1.0,
    });
    assert_eq!(order.state(), OrderState::Closed);
    assert_eq!(order.close_reason(), Some(CloseReason::Filled));
    assert_eq!(order.filled_size(), 1.0);

    // live_time is never reset
    assert_eq!(order.live_time(), live_time);
}

#[test]
fn test_send_twice_is_rejected() {
    let fixture = Fixture::new();
    let order = fixture.create_order(Side::Buy, 1.0, 100.0);

    order.send().unwrap();
    assert!(matches!(
        order.send(),
        Err(ExecutionError::SendInvalidState(OrderState::Sent))
    ));
}

#[test]
fn test_exactly_one_transition_into_closed() {
    let fixture = Fixture::new();
    let order = fixture.create_order(Side::Buy, 1.0, 100.0);

    let closes = Arc::new(Mutex::new(0u32));
    let closes_ref = Arc::clone(&closes);
    order.subscribe_events(move |event| {
        if event.flags.is_state_change() && event.new_state == OrderState::Closed {
            *closes_ref.lock() += 1;
        }
    });

    order.send().unwrap();
    order.apply_update(&live_update("X-1"));
    order.set_is_closed(fixture.evloop.time(), CloseReason::Cancelled);

    // further close attempts must not leave or re-enter the terminal state
    order.set_is_closed(fixture.evloop.time(), CloseReason::Error);
    order.apply_update(&live_update("X-2"));
    order.apply_update(&OrderUpdate {
        state: Some(OrderState::Closed),
        close_reason: Some(CloseReason::Lapsed),
        ext_order_id: String::new(),
    });

    assert_eq!(*closes.lock(), 1);
    assert_eq!(order.state(), OrderState::Closed);
    assert_eq!(order.close_reason(), Some(CloseReason::Cancelled));
}

#[test]
fn test_sent_to_closed_on_immediate_reject() {
    let fixture = Fixture::new();
    let order = fixture.create_order(Side::Sell, 2.0, 50.0);

    order.send().unwrap();
    order.set_is_rejected("e0100", "venue says no");

    assert!(order.is_rejected());
    assert_eq!(order.error_code(), "e0100");
    assert_eq!(order.error_text(), "venue says no");
}

#[test]
fn test_live_requires_sent() {
    let fixture = Fixture::new();
    let order = fixture.create_order(Side::Buy, 1.0, 100.0);

    // ack arriving before send must not transition
    order.apply_update(&live_update("X-1"));
    assert_eq!(order.state(), OrderState::Init);
}

#[test]
fn test_filled_size_is_monotonic_and_capped() {
    let fixture = Fixture::new();
    let order = fixture.create_order(Side::Buy, 1.0, 100.0);
    order.send().unwrap();
    order.apply_update(&live_update("X-1"));

    let observed = Arc::new(Mutex::new(Vec::new()));
    let observed_ref = Arc::clone(&observed);
    order.subscribe_events(move |event| {
        if event.flags.is_fill() {
            observed_ref.lock().push(event.order.filled_size());
        }
    });

    let fill = |size: f64, fully: bool| OrderFill {
        is_fully_filled: fully,
        recv_time: fixture.evloop.time(),
        price: 100.0,
        size,
    };

    order.apply_fill(fill(0.25, false));
    order.apply_fill(fill(0.25, false));
    // reports more than remains: capped at the order size
    order.apply_fill(fill(0.75, true));

    let observed = observed.lock().clone();
    assert_eq!(observed, vec![0.25, 0.5, 1.0]);
    assert!(observed.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(order.filled_size(), 1.0);
    assert_eq!(order.remain_size(), 0.0);
    assert_eq!(order.state(), OrderState::Closed);
    assert_eq!(order.close_reason(), Some(CloseReason::Filled));
}

#[test]
fn test_cancel_reject_leaves_order_state_unchanged() {
    let fixture = Fixture::new();
    let order = fixture.create_order(Side::Buy, 1.0, 100.0);
    order.send().unwrap();
    order.apply_update(&live_update("X-1"));

    assert!(order.cancel());
    assert!(order.is_canceling());

    order.apply_cancel_reject("e0103", "venue cancel reject");
    assert!(order.is_cancel_rejected());
    assert_eq!(order.state(), OrderState::Live);
    assert_eq!(order.error_code(), "e0103");
}

#[test]
fn test_cancel_confirm_sets_cancel_state() {
    let fixture = Fixture::new();
    let order = fixture.create_order(Side::Buy, 1.0, 100.0);
    order.send().unwrap();
    order.apply_update(&live_update("X-1"));

    assert!(order.cancel());
    order.apply_update(&OrderUpdate {
        state: Some(OrderState::Closed),
        close_reason: Some(CloseReason::Cancelled),
        ext_order_id: String::new(),
    });

    assert_eq!(order.cancel_state(), CancelState::Canceled);
    assert_eq!(order.close_reason(), Some(CloseReason::Cancelled));
}

#[test]
fn test_service_registry_and_recent_dead_routing() {
    let fixture = Fixture::new();
    let order = fixture.create_order(Side::Buy, 1.0, 100.0);
    let order_id = order.order_id().as_str().to_string();

    assert_eq!(fixture.service.live_order_count(), 1);
    assert!(fixture.service.find_order(&order_id).is_some());

    order.send().unwrap();
    fixture
        .service
        .route_update_to_order(&order_id, &live_update("X-9"));
    assert!(order.is_live());

    fixture.service.route_fill_to_order(
        &order_id,
        OrderFill {
            is_fully_filled: true,
            recv_time: fixture.evloop.time(),
            price: 100.0,
            size: 1.0,
        },
    );

    // closed orders leave the registry
    assert_eq!(fixture.service.live_order_count(), 0);
    assert!(fixture.service.find_order(&order_id).is_none());

    // a late fill for the recently closed id is dropped silently
    fixture.service.route_fill_to_order(
        &order_id,
        OrderFill {
            is_fully_filled: true,
            recv_time: fixture.evloop.time(),
            price: 100.0,
            size: 1.0,
        },
    );
    assert_eq!(order.filled_size(), 1.0);

    // an id never seen is also safe
    fixture
        .service
        .route_update_to_order("DEMO1ffffffff00000000", &live_update(""));
}

#[test]
fn test_user_data_is_accessible_and_dropped() {
    struct Marker(Arc<Mutex<bool>>);
    impl Drop for Marker {
        fn drop(&mut self) {
            *self.0.lock() = true;
        }
    }

    let dropped = Arc::new(Mutex::new(false));
    let fixture = Fixture::new();
    let order = fixture
        .service
        .create(
            Arc::new(NullRouter),
            instrument(),
            Side::Buy,
            1.0,
            100.0,
            TimeInForce::Gtc,
            &fixture.strategy,
            Some(Box::new(Marker(Arc::clone(&dropped)))),
        )
        .unwrap();

    assert!(order
        .with_user_data::<Marker, bool>(|marker| *marker.0.lock())
        .is_some());

    order.send().unwrap();
    order.set_is_closed(fixture.evloop.time(), CloseReason::Cancelled);
    drop(order);
    assert!(*dropped.lock());
}
