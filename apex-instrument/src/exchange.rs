use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};
use thiserror::Error;

/// Unique identifier for an execution venue.
///
/// ### Notes
/// A venue may have a distinct server for different [`InstrumentKinds`](crate::instrument::InstrumentKind).
/// For example, Binance spot and Binance USD-margined futures have distinct APIs, and are
/// therefore represented as unique variants.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeId {
    /// In-process simulated venue, used by paper-trading and backtests.
    Simulated,
    Binance,
    BinanceFuturesUsd,
    BinanceFuturesCoin,
}

impl ExchangeId {
    /// Return the &str representation of this [`ExchangeId`].
    ///
    /// These names are stable: they appear in wire messages, tick-file directory layouts and
    /// persisted position records.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeId::Simulated => "simulated",
            ExchangeId::Binance => "binance",
            ExchangeId::BinanceFuturesUsd => "binance_futures_usd",
            ExchangeId::BinanceFuturesCoin => "binance_futures_coin",
        }
    }
}

impl Display for ExchangeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("unknown ExchangeId: {0}")]
pub struct ParseExchangeIdError(pub String);

impl FromStr for ExchangeId {
    type Err = ParseExchangeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simulated" => Ok(ExchangeId::Simulated),
            "binance" => Ok(ExchangeId::Binance),
            "binance_futures_usd" => Ok(ExchangeId::BinanceFuturesUsd),
            "binance_futures_coin" => Ok(ExchangeId::BinanceFuturesCoin),
            other => Err(ParseExchangeIdError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_id_str_round_trip() {
        for exchange in [
            ExchangeId::Simulated,
            ExchangeId::Binance,
            ExchangeId::BinanceFuturesUsd,
            ExchangeId::BinanceFuturesCoin,
        ] {
            assert_eq!(ExchangeId::from_str(exchange.as_str()).unwrap(), exchange);
        }
    }
}
