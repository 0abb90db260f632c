//! Payload messages carried by proto3-flagged frames.
//!
//! Field tags and types are fixed per message; prices and sizes travel as IEEE-754 doubles.

/// Order side on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum WireSide {
    SideNone = 0,
    Buy = 1,
    Sell = 2,
}

/// Time-in-force on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum WireTimeInForce {
    TifNone = 0,
    Gtc = 1,
    Ioc = 2,
    Fok = 3,
}

/// Client run mode carried by the logon request; the gateway only admits clients whose run
/// mode matches its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum WireRunMode {
    RunModeNone = 0,
    Live = 1,
    Paper = 2,
    Backtest = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum WireOrderState {
    StateNone = 0,
    Init = 1,
    Sent = 2,
    Live = 3,
    Closed = 4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum WireCloseReason {
    ReasonNone = 0,
    Cancelled = 1,
    Filled = 2,
    Rejected = 3,
    Lapsed = 4,
    Error = 5,
}

/// Why an `OrderExecution` was sent: reply to a submit, reply to a cancel, or unsolicited.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum OrderUpdateReason {
    Unknown = 0,
    NewAck = 1,
    CancelAck = 2,
    Unsolicited = 3,
}

/// C→S: start streaming trades and top-of-book for an instrument.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeTicks {
    #[prost(string, tag = "1")]
    pub symbol: String,
    #[prost(string, tag = "2")]
    pub exchange: String,
}

/// C→S: subscribe to wallet updates (reserved).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeAccount {
    #[prost(string, tag = "1")]
    pub exchange: String,
}

/// C→S: submit a new limit order.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NewOrder {
    #[prost(string, tag = "1")]
    pub symbol: String,
    #[prost(string, tag = "2")]
    pub exchange: String,
    #[prost(enumeration = "WireSide", tag = "3")]
    pub side: i32,
    #[prost(double, tag = "4")]
    pub price: f64,
    #[prost(double, tag = "5")]
    pub size: f64,
    #[prost(enumeration = "WireTimeInForce", tag = "6")]
    pub tif: i32,
    #[prost(string, tag = "7")]
    pub order_id: String,
}

/// C→S: cancel an existing order.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CancelOrder {
    #[prost(string, tag = "1")]
    pub symbol: String,
    #[prost(string, tag = "2")]
    pub exchange: String,
    #[prost(string, tag = "3")]
    pub order_id: String,
    #[prost(string, tag = "4")]
    pub ext_order_id: String,
}

/// C→S: authorise the client with a strategy id, unique per gateway.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OmLogonRequest {
    #[prost(string, tag = "1")]
    pub strategy_id: String,
    #[prost(enumeration = "WireRunMode", tag = "2")]
    pub run_mode: i32,
}

/// S→C: logon reply; `error` empty on success.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OmLogonReply {
    #[prost(string, tag = "1")]
    pub error: String,
}

/// S→C: public trade tick.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TradeTick {
    #[prost(string, tag = "1")]
    pub symbol: String,
    #[prost(string, tag = "2")]
    pub exchange: String,
    #[prost(double, tag = "3")]
    pub price: f64,
    #[prost(double, tag = "4")]
    pub size: f64,
    #[prost(enumeration = "WireSide", tag = "5")]
    pub side: i32,
}

/// S→C: top-of-book tick.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TopTick {
    #[prost(string, tag = "1")]
    pub symbol: String,
    #[prost(string, tag = "2")]
    pub exchange: String,
    #[prost(double, tag = "3")]
    pub bid_price: f64,
    #[prost(double, tag = "4")]
    pub ask_price: f64,
}

/// S→C: order state change.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OrderExecution {
    #[prost(string, tag = "1")]
    pub order_id: String,
    #[prost(string, tag = "2")]
    pub ext_order_id: String,
    #[prost(enumeration = "WireOrderState", tag = "3")]
    pub order_state: i32,
    #[prost(enumeration = "WireCloseReason", tag = "4")]
    pub close_reason: i32,
    #[prost(enumeration = "OrderUpdateReason", tag = "5")]
    pub reason: i32,
}

/// S→C: execution report.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OrderFillReport {
    #[prost(string, tag = "1")]
    pub order_id: String,
    #[prost(double, tag = "2")]
    pub size: f64,
    #[prost(double, tag = "3")]
    pub price: f64,
    #[prost(bool, tag = "4")]
    pub fully_filled: bool,
}

/// S→C: wallet change (reserved).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AccountUpdateMsg {
    #[prost(string, tag = "1")]
    pub symbol: String,
    #[prost(string, tag = "2")]
    pub exchange: String,
    #[prost(double, tag = "3")]
    pub position: f64,
}

/// S→C: reply-with-error to any request, correlated by the frame's request id.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ErrorReply {
    /// The `MsgType` discriminator of the request this error replies to.
    #[prost(uint32, tag = "1")]
    pub orig_request_type: u32,
    #[prost(string, tag = "2")]
    pub code: String,
    #[prost(string, tag = "3")]
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_payload_round_trips() {
        let exec = OrderExecution {
            order_id: "DEMO1aabbccdd00000001".into(),
            ext_order_id: "X-123".into(),
            order_state: WireOrderState::Closed as i32,
            close_reason: WireCloseReason::Cancelled as i32,
            reason: OrderUpdateReason::CancelAck as i32,
        };

        let bytes = exec.encode_to_vec();
        let decoded = OrderExecution::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, exec);
        assert_eq!(decoded.encode_to_vec(), bytes);

        assert_eq!(
            WireOrderState::try_from(decoded.order_state).unwrap(),
            WireOrderState::Closed
        );
    }
}
