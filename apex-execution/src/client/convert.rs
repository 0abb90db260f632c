use crate::order::{CloseReason, OrderState, TimeInForce};
use apex_instrument::Side;
use apex_integration::{
    protocol::gx::message::{
        WireCloseReason, WireOrderState, WireRunMode, WireSide, WireTimeInForce,
    },
    RunMode,
};

pub fn side_to_wire(side: Side) -> WireSide {
    match side {
        Side::Buy => WireSide::Buy,
        Side::Sell => WireSide::Sell,
    }
}

pub fn side_from_wire(raw: i32) -> Option<Side> {
    match WireSide::try_from(raw).ok()? {
        WireSide::Buy => Some(Side::Buy),
        WireSide::Sell => Some(Side::Sell),
        WireSide::SideNone => None,
    }
}

pub fn tif_to_wire(tif: TimeInForce) -> WireTimeInForce {
    match tif {
        TimeInForce::Gtc => WireTimeInForce::Gtc,
        TimeInForce::Ioc => WireTimeInForce::Ioc,
        TimeInForce::Fok => WireTimeInForce::Fok,
    }
}

pub fn tif_from_wire(raw: i32) -> Option<TimeInForce> {
    match WireTimeInForce::try_from(raw).ok()? {
        WireTimeInForce::Gtc => Some(TimeInForce::Gtc),
        WireTimeInForce::Ioc => Some(TimeInForce::Ioc),
        WireTimeInForce::Fok => Some(TimeInForce::Fok),
        WireTimeInForce::TifNone => None,
    }
}

pub fn run_mode_to_wire(run_mode: RunMode) -> WireRunMode {
    match run_mode {
        RunMode::Live => WireRunMode::Live,
        RunMode::Paper => WireRunMode::Paper,
        RunMode::Backtest => WireRunMode::Backtest,
    }
}

pub fn run_mode_from_wire(raw: i32) -> Option<RunMode> {
    match WireRunMode::try_from(raw).ok()? {
        WireRunMode::Live => Some(RunMode::Live),
        WireRunMode::Paper => Some(RunMode::Paper),
        WireRunMode::Backtest => Some(RunMode::Backtest),
        WireRunMode::RunModeNone => None,
    }
}

pub fn order_state_to_wire(state: OrderState) -> WireOrderState {
    match state {
        OrderState::Init => WireOrderState::Init,
        OrderState::Sent => WireOrderState::Sent,
        OrderState::Live => WireOrderState::Live,
        OrderState::Closed => WireOrderState::Closed,
    }
}

pub fn order_state_from_wire(raw: i32) -> Option<OrderState> {
    match WireOrderState::try_from(raw).ok()? {
        WireOrderState::Init => Some(OrderState::Init),
        WireOrderState::Sent => Some(OrderState::Sent),
        WireOrderState::Live => Some(OrderState::Live),
        WireOrderState::Closed => Some(OrderState::Closed),
        WireOrderState::StateNone => None,
    }
}

pub fn close_reason_to_wire(reason: Option<CloseReason>) -> WireCloseReason {
    match reason {
        None => WireCloseReason::ReasonNone,
        Some(CloseReason::Cancelled) => WireCloseReason::Cancelled,
        Some(CloseReason::Filled) => WireCloseReason::Filled,
        Some(CloseReason::Rejected) => WireCloseReason::Rejected,
        Some(CloseReason::Lapsed) => WireCloseReason::Lapsed,
        Some(CloseReason::Error) => WireCloseReason::Error,
    }
}

pub fn close_reason_from_wire(raw: i32) -> Option<CloseReason> {
    match WireCloseReason::try_from(raw).ok()? {
        WireCloseReason::Cancelled => Some(CloseReason::Cancelled),
        WireCloseReason::Filled => Some(CloseReason::Filled),
        WireCloseReason::Rejected => Some(CloseReason::Rejected),
        WireCloseReason::Lapsed => Some(CloseReason::Lapsed),
        WireCloseReason::Error => Some(CloseReason::Error),
        WireCloseReason::ReasonNone => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trips() {
        for side in [Side::Buy, Side::Sell] {
            assert_eq!(side_from_wire(side_to_wire(side) as i32), Some(side));
        }
        for tif in [TimeInForce::Gtc, TimeInForce::Ioc, TimeInForce::Fok] {
            assert_eq!(tif_from_wire(tif_to_wire(tif) as i32), Some(tif));
        }
        for state in [
            OrderState::Init,
            OrderState::Sent,
            OrderState::Live,
            OrderState::Closed,
        ] {
            assert_eq!(
                order_state_from_wire(order_state_to_wire(state) as i32),
                Some(state)
            );
        }
        for reason in [
            CloseReason::Cancelled,
            CloseReason::Filled,
            CloseReason::Rejected,
            CloseReason::Lapsed,
            CloseReason::Error,
        ] {
            assert_eq!(
                close_reason_from_wire(close_reason_to_wire(Some(reason)) as i32),
                Some(reason)
            );
        }
        assert_eq!(side_from_wire(99), None);
    }
}
