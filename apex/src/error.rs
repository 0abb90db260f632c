use apex_data::error::DataError;
use apex_execution::error::ExecutionError;
use apex_integration::{
    config::ConfigError, error::SocketError, event_loop::BacktestLoopError,
};
use thiserror::Error;

/// Top-level error of the trading runtime.
#[derive(Debug, Error)]
pub enum ApexError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("config error: {0}")]
    BadConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("data error: {0}")]
    Data(#[from] DataError),

    #[error("socket error: {0}")]
    Socket(#[from] SocketError),

    #[error("backtest error: {0}")]
    Backtest(#[from] BacktestLoopError),

    #[error("reference data error: {0}")]
    RefData(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
