use apex_integration::{config::ConfigError, error::SocketError};
use thiserror::Error;

/// Errors raised by the gateway server and venue adapters.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("socket error: {0}")]
    Socket(#[from] SocketError),

    #[error("unknown exchange: {0}")]
    UnknownExchange(String),

    #[error("venue adapter cannot run in backtest mode")]
    BacktestRunMode,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("venue error: {0}")]
    Venue(String),
}
