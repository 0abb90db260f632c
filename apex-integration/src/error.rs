use thiserror::Error;

/// All socket and wire-protocol errors generated in `apex-integration`.
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("socket outbound buffer full")]
    NoSpace,

    #[error("socket is not connected")]
    NotConnected,

    #[error("socket already closed")]
    Closed,

    #[error("failed to resolve address: {0}")]
    Resolve(String),

    #[error("connect timed out to {0}")]
    ConnectTimeout(String),

    #[error("reactor runtime unavailable: {0}")]
    Runtime(String),

    #[error("inbound decode buffer overflow: frame of {frame_len} exceeds max {max_size}")]
    DecodeBufferOverflow { frame_len: usize, max_size: usize },

    #[error("malformed frame header: {0}")]
    BadFrame(String),

    #[error("deserialising protobuf payload error: {0}")]
    DeserialiseProtobuf(#[from] prost::DecodeError),
}

impl From<tokio::sync::mpsc::error::SendError<bytes::Bytes>> for SocketError {
    fn from(_: tokio::sync::mpsc::error::SendError<bytes::Bytes>) -> Self {
        SocketError::Closed
    }
}

/// Stable short error codes identifying the originating check of a rejection.
///
/// Codes are attached to order/cancel rejections along with human readable text; the code is
/// the stable contract, the text is for logging only.
pub mod code {
    /// Order parameters failed local validation (eg/ size rounds to zero).
    pub const INVALID_ORDER_PARAMS: &str = "e0001";

    /// Order-id space exhausted for this process.
    pub const ORDER_ID_EXHAUSTED: &str = "e0002";

    /// Gateway connection is not up.
    pub const GATEWAY_DOWN: &str = "e0003";

    /// Venue rejected the order submission.
    pub const VENUE_REJECT: &str = "e0100";

    /// Duplicate client order id at the matching engine.
    pub const DUPLICATE_ORDER_ID: &str = "e0101";

    /// Cancel target order not found.
    pub const ORDER_NOT_FOUND: &str = "e0102";

    /// Venue rejected the cancel request.
    pub const VENUE_CANCEL_REJECT: &str = "e0103";

    /// Internal error while handling the request.
    pub const INTERNAL: &str = "e0200";

    /// Wire protocol decode failure.
    pub const PROTOCOL: &str = "e0201";
}
