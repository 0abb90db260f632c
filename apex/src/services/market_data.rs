use crate::{
    error::ApexError,
    services::{backtest::BacktestService, gateway::GatewayService},
};
use apex_data::{market_data::MarketData, subscription::MdStream};
use apex_instrument::instrument::Instrument;
use parking_lot::Mutex;
use std::{collections::BTreeMap, sync::Arc};
use tracing::info;

/// Per-instrument [`MarketData`] registry.
///
/// On first request for an instrument the service wires the data source: a gateway
/// subscription in live/paper mode, tick replayers in backtest mode. Subsequent requests
/// share the same model.
pub struct MarketDataService {
    markets: Mutex<BTreeMap<Instrument, Arc<MarketData>>>,
    gateways: Arc<GatewayService>,
    backtest: Option<Arc<BacktestService>>,
}

impl std::fmt::Debug for MarketDataService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataService")
            .field("markets", &self.markets.lock().len())
            .finish()
    }
}

impl MarketDataService {
    pub fn new(gateways: Arc<GatewayService>, backtest: Option<Arc<BacktestService>>) -> Self {
        Self {
            markets: Mutex::new(BTreeMap::new()),
            gateways,
            backtest,
        }
    }

    pub fn find_market_data(&self, instrument: &Instrument) -> Result<Arc<MarketData>, ApexError> {
        if let Some(market) = self.markets.lock().get(instrument) {
            return Ok(Arc::clone(market));
        }

        let market = Arc::new(MarketData::new());

        // default stream configuration: aggregated trades plus top-of-book
        let streams = [MdStream::AggTrades, MdStream::L1];

        match &self.backtest {
            Some(backtest) => {
                backtest.subscribe_canned_data(instrument, &market, &streams)?;
            }
            None => {
                let session =
                    self.gateways
                        .find_session(instrument.exchange)
                        .ok_or_else(|| {
                            ApexError::BadConfig(format!(
                                "no gateway configured for exchange {}",
                                instrument.exchange
                            ))
                        })?;

                info!(%instrument, "subscribing to market data");
                session.subscribe(
                    instrument.native_symbol.as_str(),
                    instrument.exchange,
                    Arc::clone(&market),
                );
            }
        }

        self.markets
            .lock()
            .insert(instrument.clone(), Arc::clone(&market));
        Ok(market)
    }
}
