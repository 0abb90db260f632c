//! Binance WebSocket and REST payloads, limited to the fields the gateway consumes.

use apex_integration::de::de_str;
use serde::Deserialize;

/// Real-time aggregate trade message from the market-data stream.
///
/// ### Raw Payload Example
/// ```json
/// {
///     "e":"aggTrade","E":1649324825173,"s":"BTCUSDT","a":1000000000,
///     "p":"42000.19","q":"0.239000","f":1,"l":2,"T":1649324825170,"m":false,"M":true
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BinanceAggTrade {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p", deserialize_with = "de_str")]
    pub price: f64,
    #[serde(rename = "q", deserialize_with = "de_str")]
    pub qty: f64,
    /// Trade time, ms since epoch.
    #[serde(rename = "T")]
    pub trade_time: i64,
    /// Event time, ms since epoch.
    #[serde(rename = "E")]
    pub event_time: i64,
    /// Whether the buyer is the maker; the aggressor is then the seller.
    #[serde(rename = "m")]
    pub buyer_is_maker: bool,
}

/// Real-time best bid/ask message. Note the raw stream carries no `"e"` discriminator.
///
/// ### Raw Payload Example
/// ```json
/// {"u":400900217,"s":"BNBUSDT","b":"25.35190000","B":"31.21000000","a":"25.36520000","A":"40.66000000"}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BinanceBookTicker {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "b", deserialize_with = "de_str")]
    pub bid_price: f64,
    #[serde(rename = "B", deserialize_with = "de_str")]
    pub bid_qty: f64,
    #[serde(rename = "a", deserialize_with = "de_str")]
    pub ask_price: f64,
    #[serde(rename = "A", deserialize_with = "de_str")]
    pub ask_qty: f64,
}

/// User-data stream execution report. Only `x ∈ {CANCELED, EXPIRED, TRADE}` surfaces from
/// the adapter; all other execution types are handled via the request/reply path.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BinanceExecutionReport {
    #[serde(rename = "s")]
    pub symbol: String,
    /// Client order id, ie/ the engine-assigned order id.
    #[serde(rename = "c")]
    pub client_order_id: String,
    /// Original client order id; populated on cancels.
    #[serde(rename = "C", default)]
    pub orig_client_order_id: Option<String>,
    /// Venue order id.
    #[serde(rename = "i")]
    pub venue_order_id: i64,
    /// Current execution type.
    #[serde(rename = "x")]
    pub execution_type: String,
    /// Current order status.
    #[serde(rename = "X")]
    pub order_status: String,
    /// Last executed quantity.
    #[serde(rename = "l", deserialize_with = "de_str")]
    pub last_exec_qty: f64,
    /// Last executed price.
    #[serde(rename = "L", deserialize_with = "de_str")]
    pub last_exec_price: f64,
}

/// Reply to `POST /api/v3/userDataStream`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BinanceListenKey {
    #[serde(rename = "listenKey")]
    pub listen_key: String,
}

/// Reply to `POST /api/v3/order`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BinanceOrderAck {
    pub symbol: String,
    #[serde(rename = "orderId")]
    pub order_id: i64,
    #[serde(rename = "clientOrderId")]
    pub client_order_id: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// REST error body.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BinanceRestError {
    pub code: i64,
    pub msg: String,
}
