use crate::{asset::Asset, exchange::ExchangeId, instrument::spec::InstrumentSpec};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt::{Display, Formatter};

pub mod spec;

/// Defines the type of [`Instrument`] which is being traded on a given `base_quote` market.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    /// Spot coin pair, eg/ BTC-USDT.
    CoinPair,
    Perpetual,
    Future,
}

impl Default for InstrumentKind {
    fn default() -> Self {
        Self::CoinPair
    }
}

impl Display for InstrumentKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                InstrumentKind::CoinPair => "coinpair",
                InstrumentKind::Perpetual => "perpetual",
                InstrumentKind::Future => "future",
            }
        )
    }
}

/// A financial product on a venue that can be bought and sold, priced in the quote [`Asset`].
///
/// Ordering and equality are defined by the `(exchange, native_symbol)` pair, which uniquely
/// identifies an instrument across the platform.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub struct Instrument {
    pub exchange: ExchangeId,
    /// Native venue symbol, eg/ "BTCUSDT".
    pub native_symbol: SmolStr,
    pub kind: InstrumentKind,
    /// Internal instrument identifier, eg/ "BTCUSDT.binance".
    pub id: SmolStr,
    pub base: Asset,
    pub quote: Asset,
    pub spec: InstrumentSpec,
}

impl Instrument {
    pub fn new<S: AsRef<str>>(
        kind: InstrumentKind,
        id: S,
        base: Asset,
        quote: Asset,
        native_symbol: S,
        exchange: ExchangeId,
        spec: InstrumentSpec,
    ) -> Self {
        Self {
            exchange,
            native_symbol: SmolStr::new(native_symbol),
            kind,
            id: SmolStr::new(id),
            base,
            quote,
            spec,
        }
    }

    /// Human readable "symbol/exchange" ticker, eg/ "BTCUSDT/binance".
    pub fn ticker(&self) -> String {
        format!("{}/{}", self.native_symbol, self.exchange)
    }
}

impl Display for Instrument {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.native_symbol, self.exchange)
    }
}

/// Lookup key for an [`Instrument`] in a reference-data set.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub struct InstrumentQuery {
    pub exchange: ExchangeId,
    pub native_symbol: SmolStr,
}

impl InstrumentQuery {
    pub fn new<S: AsRef<str>>(exchange: ExchangeId, native_symbol: S) -> Self {
        Self {
            exchange,
            native_symbol: SmolStr::new(native_symbol),
        }
    }
}
