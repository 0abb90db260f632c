use crate::exchange::ExchangeId;
use derive_more::Constructor;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt::{Display, Formatter};

/// An [`Asset`] as known to a specific venue.
///
/// Two assets are equal iff symbol, exchange and precision all match.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Constructor,
)]
pub struct Asset {
    /// Native asset symbol on the venue, eg/ "BTC".
    pub symbol: SmolStr,
    pub exchange: ExchangeId,
    /// Number of decimal places the venue quotes this asset to.
    pub precision: u32,
}

impl Asset {
    pub fn from_parts<S: AsRef<str>>(symbol: S, exchange: ExchangeId, precision: u32) -> Self {
        Self {
            symbol: SmolStr::new(symbol),
            exchange,
            precision,
        }
    }
}

impl Display for Asset {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.exchange, self.symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_equality_requires_all_fields() {
        let base = Asset::from_parts("BTC", ExchangeId::Binance, 8);

        assert_eq!(base, Asset::from_parts("BTC", ExchangeId::Binance, 8));
        assert_ne!(base, Asset::from_parts("ETH", ExchangeId::Binance, 8));
        assert_ne!(base, Asset::from_parts("BTC", ExchangeId::Simulated, 8));
        assert_ne!(base, Asset::from_parts("BTC", ExchangeId::Binance, 6));
    }
}
