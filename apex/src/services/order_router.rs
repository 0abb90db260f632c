use crate::{
    error::ApexError,
    services::{gateway::GatewayService, market_data::MarketDataService},
};
use apex_execution::{
    client::gateway::GatewayRouter,
    order::StrategyId,
    router::OrderRouter,
    sim::{SimExchange, DEFAULT_SIM_LATENCY},
};
use apex_instrument::{exchange::ExchangeId, instrument::Instrument};
use apex_integration::{event_loop::EventLoop, RunMode};
use fnv::FnvHashMap;
use parking_lot::Mutex;
use smol_str::SmolStr;
use std::sync::Arc;
use tracing::info;

/// Hands out [`OrderRouter`] implementations per (instrument, strategy).
///
/// Paper and backtest modes route into a per-exchange [`SimExchange`] fed by the same
/// market-data stream the strategy sees; live mode routes through the gateway client
/// session fronting the venue.
pub struct OrderRouterService {
    run_mode: RunMode,
    evloop: Arc<dyn EventLoop>,
    gateways: Arc<GatewayService>,
    market_data: Arc<MarketDataService>,
    sim_exchanges: Mutex<FnvHashMap<ExchangeId, Arc<SimExchange>>>,
    routers: Mutex<FnvHashMap<(ExchangeId, SmolStr), Arc<GatewayRouter>>>,
}

impl std::fmt::Debug for OrderRouterService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderRouterService")
            .field("run_mode", &self.run_mode)
            .finish()
    }
}

impl OrderRouterService {
    pub fn new(
        run_mode: RunMode,
        evloop: Arc<dyn EventLoop>,
        gateways: Arc<GatewayService>,
        market_data: Arc<MarketDataService>,
    ) -> Self {
        Self {
            run_mode,
            evloop,
            gateways,
            market_data,
            sim_exchanges: Mutex::new(FnvHashMap::default()),
            routers: Mutex::new(FnvHashMap::default()),
        }
    }

    pub fn get_order_router(
        &self,
        instrument: &Instrument,
        strategy_id: &StrategyId,
    ) -> Result<Arc<dyn OrderRouter>, ApexError> {
        match self.run_mode {
            RunMode::Paper | RunMode::Backtest => {
                let sim = {
                    let mut sims = self.sim_exchanges.lock();
                    Arc::clone(sims.entry(instrument.exchange).or_insert_with(|| {
                        info!(exchange = %instrument.exchange, "created exchange simulator");
                        SimExchange::new(Arc::clone(&self.evloop), DEFAULT_SIM_LATENCY)
                    }))
                };

                // the simulator consumes the same tick stream the strategy sees
                let market = self.market_data.find_market_data(instrument)?;
                sim.register_instrument(instrument, &market);
                Ok(sim as Arc<dyn OrderRouter>)
            }
            RunMode::Live => {
                let key = (instrument.exchange, SmolStr::new(strategy_id.as_str()));
                if let Some(router) = self.routers.lock().get(&key) {
                    return Ok(Arc::clone(router) as Arc<dyn OrderRouter>);
                }

                let session = self
                    .gateways
                    .find_session(instrument.exchange)
                    .ok_or_else(|| {
                        ApexError::BadConfig(format!(
                            "cannot find gateway session for exchange {}",
                            instrument.exchange
                        ))
                    })?;

                info!(exchange = %instrument.exchange, "creating order router");
                let router = GatewayRouter::new(
                    Arc::clone(&self.evloop),
                    session,
                    strategy_id.clone(),
                    self.run_mode,
                );
                self.routers.lock().insert(key, Arc::clone(&router));
                Ok(router as Arc<dyn OrderRouter>)
            }
        }
    }
}
