use crate::order::state::OrderState;
use apex_integration::error::SocketError;
use thiserror::Error;

/// Errors raised by the order lifecycle engine and order routing.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("cannot send order in state {0}, must be init")]
    SendInvalidState(OrderState),

    #[error("invalid order parameters: {0}")]
    InvalidParams(String),

    #[error("invalid strategy id: {0}")]
    InvalidStrategyId(String),

    #[error("no more order ids available, cannot create order")]
    OrderIdExhausted,

    #[error("gateway connection is down")]
    GatewayDown,

    #[error("cancel failed: {0}")]
    CancelFailed(String),

    #[error("socket error: {0}")]
    Socket(#[from] SocketError),
}
