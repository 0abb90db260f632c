use crate::{audit::Auditor, error::ApexError, paths::PathsConfig};
use apex_execution::service::OrderService;
use apex_integration::{
    config::Config,
    event_loop::{BacktestEventLoop, BacktestPeriod, EventLoop, RealtimeEventLoop},
    reactor::Reactor,
    time::Time,
    RunMode,
};
use std::{str::FromStr, sync::Arc};
use tracing::info;

pub mod backtest;
pub mod gateway;
pub mod market_data;
pub mod order_router;
pub mod persistence;
pub mod refdata;

use backtest::BacktestService;
use gateway::GatewayService;
use market_data::MarketDataService;
use order_router::OrderRouterService;
use persistence::PersistenceService;
use refdata::RefDataService;

/// Creates and provides access to the core components every Apex application needs: the
/// event loop (realtime or backtest), the I/O reactor (live/paper only), and the
/// per-concern services.
///
/// The single authoritative "now" is [`Services::now`], which consults the event loop -
/// wall clock in live/paper, virtual time in backtest. Direct use of the OS clock in
/// mode-sensitive code is a bug.
pub struct Services {
    run_mode: RunMode,
    config: Config,
    paths: PathsConfig,
    startup_time: Time,
    reactor: Option<Arc<Reactor>>,
    evloop: Arc<dyn EventLoop>,
    bt_evloop: Option<Arc<BacktestEventLoop>>,
    order_service: Arc<OrderService>,
    ref_data: Arc<RefDataService>,
    gateways: Arc<GatewayService>,
    market_data: Arc<MarketDataService>,
    order_routers: OrderRouterService,
    persistence: PersistenceService,
    backtest: Option<Arc<BacktestService>>,
    auditor: Arc<Auditor>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("run_mode", &self.run_mode)
            .field("startup_time", &self.startup_time)
            .finish()
    }
}

impl Services {
    /// Construct with the filesystem layout resolved from the environment.
    pub fn new(
        run_mode: RunMode,
        config: Config,
        backtest_period: Option<BacktestPeriod>,
    ) -> Result<Arc<Self>, ApexError> {
        Self::with_paths(run_mode, config, backtest_period, PathsConfig::resolve())
    }

    /// Construct with an explicit filesystem layout, eg/ for embedded or test setups.
    pub fn with_paths(
        run_mode: RunMode,
        config: Config,
        backtest_period: Option<BacktestPeriod>,
        paths: PathsConfig,
    ) -> Result<Arc<Self>, ApexError> {
        let (evloop, bt_evloop, reactor, startup_time, backtest) = match run_mode {
            RunMode::Backtest => {
                let period = backtest_period.ok_or_else(|| {
                    ApexError::BadConfig("backtest run-mode requires a backtest period".into())
                })?;

                let bt = Arc::new(BacktestEventLoop::new(period.from));
                let evloop: Arc<dyn EventLoop> = Arc::clone(&bt) as Arc<dyn EventLoop>;

                let tick_format = config
                    .sub_config_or_empty("backtest")
                    .get_string_or("tick_format", "tardis");
                let tick_format = apex_data::replay::TickFormat::from_str(&tick_format)
                    .map_err(|error| ApexError::BadConfig(error.to_string()))?;

                let backtest = Arc::new(BacktestService::new(
                    paths.tickdata.clone(),
                    tick_format,
                    period,
                    Arc::clone(&bt),
                )?);

                (evloop, Some(bt), None, period.from, Some(backtest))
            }
            RunMode::Live | RunMode::Paper => {
                let evloop: Arc<dyn EventLoop> =
                    RealtimeEventLoop::with_default_panic_handler() as Arc<dyn EventLoop>;
                let reactor = Reactor::new()?;
                (evloop, None, Some(reactor), Time::realtime_now(), None)
            }
        };

        info!(%run_mode, root = %paths.root.display(), "initialising services");

        let order_service = OrderService::new(Arc::clone(&evloop), startup_time);

        let instruments_csv = config
            .sub_config_or_empty("ref_data")
            .get_string_or("instruments_csv", "");
        let instruments_csv = if instruments_csv.is_empty() {
            paths.instruments_csv()
        } else {
            instruments_csv.into()
        };
        let ref_data = Arc::new(RefDataService::load(&instruments_csv)?);

        let gateways = GatewayService::new(
            &config.sub_config_or_empty("gateways"),
            reactor.clone(),
            Arc::clone(&evloop),
            Arc::clone(&order_service),
        )?;

        let market_data = Arc::new(MarketDataService::new(
            Arc::clone(&gateways),
            backtest.clone(),
        ));

        let order_routers = OrderRouterService::new(
            run_mode,
            Arc::clone(&evloop),
            Arc::clone(&gateways),
            Arc::clone(&market_data),
        );

        let persist_path = config.sub_config_or_empty("persist").get_string_or("path", "");
        let persist_path = if persist_path.is_empty() {
            paths.persist.clone()
        } else {
            persist_path.into()
        };
        let persistence = PersistenceService::new(persist_path);
        let auditor = Auditor::new(&paths.log, &evloop)?;

        Ok(Arc::new(Self {
            run_mode,
            config,
            paths,
            startup_time,
            reactor,
            evloop,
            bt_evloop,
            order_service,
            ref_data,
            gateways,
            market_data,
            order_routers,
            persistence,
            backtest,
            auditor,
        }))
    }

    pub fn run_mode(&self) -> RunMode {
        self.run_mode
    }

    pub fn is_backtest(&self) -> bool {
        self.run_mode.is_backtest()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn paths(&self) -> &PathsConfig {
        &self.paths
    }

    pub fn startup_time(&self) -> Time {
        self.startup_time
    }

    /// The authoritative current time for this process.
    pub fn now(&self) -> Time {
        self.evloop.time()
    }

    pub fn evloop(&self) -> &Arc<dyn EventLoop> {
        &self.evloop
    }

    pub fn backtest_evloop(&self) -> Option<&Arc<BacktestEventLoop>> {
        self.bt_evloop.as_ref()
    }

    pub fn reactor(&self) -> Option<&Arc<Reactor>> {
        self.reactor.as_ref()
    }

    pub fn order_service(&self) -> &Arc<OrderService> {
        &self.order_service
    }

    pub fn ref_data_service(&self) -> &Arc<RefDataService> {
        &self.ref_data
    }

    pub fn gateway_service(&self) -> &Arc<GatewayService> {
        &self.gateways
    }

    pub fn market_data_service(&self) -> &Arc<MarketDataService> {
        &self.market_data
    }

    pub fn order_router_service(&self) -> &OrderRouterService {
        &self.order_routers
    }

    pub fn persistence_service(&self) -> &PersistenceService {
        &self.persistence
    }

    pub fn backtest_service(&self) -> Option<&Arc<BacktestService>> {
        self.backtest.as_ref()
    }

    pub fn auditor(&self) -> &Arc<Auditor> {
        &self.auditor
    }

    /// Run until completion (backtest) or until interrupted (live/paper).
    pub fn run(&self) -> Result<(), ApexError> {
        match &self.bt_evloop {
            Some(bt_evloop) => {
                let period = self
                    .backtest
                    .as_ref()
                    .map(|backtest| backtest.period())
                    .unwrap_or(BacktestPeriod {
                        from: Time::zero(),
                        upto: Time::zero(),
                    });
                let events = bt_evloop.run_loop(period.upto)?;
                info!(events, "backtest complete");
                Ok(())
            }
            None => {
                let (interrupt_tx, interrupt_rx) = std::sync::mpsc::channel();
                ctrlc::set_handler(move || {
                    let _ = interrupt_tx.send(());
                })
                .map_err(|error| ApexError::BadConfig(error.to_string()))?;

                let _ = interrupt_rx.recv();
                info!("interrupt received, shutting down");
                Ok(())
            }
        }
    }

    /// Stop the worker threads. Must be called off the event-loop thread.
    pub fn stop(&self) {
        if let Some(reactor) = &self.reactor {
            reactor.sync_stop();
        }
        self.evloop.sync_stop();
    }
}
