use crate::{
    bot::{Bot, BotLogic},
    error::ApexError,
    services::Services,
};
use apex_execution::order::StrategyId;
use apex_instrument::instrument::{Instrument, InstrumentQuery};
use parking_lot::Mutex;
use std::{
    collections::BTreeMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{info, warn};

const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// The strategy shell: a set of per-instrument bots sharing one strategy id.
pub struct Strategy {
    services: Arc<Services>,
    strategy_id: StrategyId,
    bots: Mutex<BTreeMap<Instrument, Bot>>,
}

impl std::fmt::Debug for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy")
            .field("strategy_id", &self.strategy_id)
            .field("bots", &self.bots.lock().len())
            .finish()
    }
}

impl Strategy {
    /// Construct with a validated strategy id (the fixed-width order-id prefix).
    pub fn new(services: Arc<Services>, strategy_id: &str) -> Result<Self, ApexError> {
        let strategy_id = StrategyId::new(strategy_id)?;
        Ok(Self {
            services,
            strategy_id,
            bots: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn strategy_id(&self) -> &StrategyId {
        &self.strategy_id
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    /// Create a bot trading `instrument` with the provided logic.
    pub fn create_bot(
        &self,
        instrument: Instrument,
        logic: Box<dyn BotLogic>,
    ) -> Result<(), ApexError> {
        let mut bots = self.bots.lock();
        if bots.contains_key(&instrument) {
            return Err(ApexError::BadConfig(format!(
                "bot already exists for instrument {instrument}"
            )));
        }

        let bot = Bot::new(
            &self.services,
            self.strategy_id.clone(),
            instrument.clone(),
            logic,
        )?;
        bots.insert(instrument, bot);
        Ok(())
    }

    /// Create a bot for an instrument looked up in reference data.
    pub fn create_bot_for(
        &self,
        query: &InstrumentQuery,
        logic: Box<dyn BotLogic>,
    ) -> Result<(), ApexError> {
        let instrument = self.services.ref_data_service().get_instrument(query)?;
        self.create_bot(instrument, logic)
    }

    pub fn bot_count(&self) -> usize {
        self.bots.lock().len()
    }

    /// Initialise every bot, seeding positions restored from persistence.
    pub fn init_bots(&self) -> Result<(), ApexError> {
        let restored = self
            .services
            .persistence_service()
            .restore_instrument_positions(self.strategy_id.as_str())?;

        for (instrument, bot) in self.bots.lock().iter() {
            let startup = restored
                .iter()
                .find(|record| {
                    record.native_symbol == instrument.native_symbol.as_str()
                        && record.exchange == instrument.exchange.as_str()
                })
                .map(|record| record.qty)
                .unwrap_or(0.0);
            bot.init(startup);
        }
        Ok(())
    }

    /// Cooperative stop: request cancels from every bot, then wait for open orders to
    /// reach terminal states. Runs off the event loop so it may wait on event-loop work.
    ///
    /// In backtest mode the loop has already drained by the time this is called, so there
    /// is nothing to wait for.
    pub fn stop(&self) {
        info!(strategy_id = %self.strategy_id, "strategy stopping");

        let bots = self.bots.lock();
        for bot in bots.values() {
            bot.stop();
        }

        if self.services.is_backtest() {
            return;
        }

        let deadline = Instant::now() + STOP_TIMEOUT;
        loop {
            if bots.values().all(|bot| bot.is_stopped()) {
                info!("all bots stopped");
                return;
            }
            if Instant::now() >= deadline {
                let open: usize = bots
                    .values()
                    .map(|bot| bot.core().order_cache().open_order_count())
                    .sum();
                warn!(open_orders = open, "stop timed out with open orders");
                return;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }
}
