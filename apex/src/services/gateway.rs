use crate::error::ApexError;
use apex_execution::{client::gateway::GatewayClientSession, service::OrderService};
use apex_instrument::exchange::ExchangeId;
use apex_integration::{
    config::Config,
    event_loop::EventLoop,
    reactor::Reactor,
};
use fnv::FnvHashMap;
use parking_lot::Mutex;
use std::{str::FromStr, sync::Arc};
use tracing::warn;

/// Holds the gateway client connections of a strategy process, one per venue.
///
/// Configured from `services.gateways`, a list of `{host, port, provides}` entries where
/// `provides` names the exchange the gateway fronts.
pub struct GatewayService {
    reactor: Option<Arc<Reactor>>,
    evloop: Arc<dyn EventLoop>,
    order_service: Arc<OrderService>,
    sessions: Mutex<FnvHashMap<ExchangeId, Arc<GatewayClientSession>>>,
    default_session: Mutex<Option<Arc<GatewayClientSession>>>,
}

impl std::fmt::Debug for GatewayService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayService")
            .field("sessions", &self.sessions.lock().len())
            .finish()
    }
}

impl GatewayService {
    pub fn new(
        config: &Config,
        reactor: Option<Arc<Reactor>>,
        evloop: Arc<dyn EventLoop>,
        order_service: Arc<OrderService>,
    ) -> Result<Arc<Self>, ApexError> {
        let service = Arc::new(Self {
            reactor,
            evloop,
            order_service,
            sessions: Mutex::new(FnvHashMap::default()),
            default_session: Mutex::new(None),
        });

        if config.is_empty() {
            warn!("no gateways configured");
            return Ok(service);
        }

        for index in 0..config.array_len() {
            let gateway_config = config.array_item(index)?;
            let host = gateway_config.get_string("host")?;
            let port = gateway_config.get_uint("port")? as u16;
            let provides = gateway_config.get_string("provides")?;

            let exchange = ExchangeId::from_str(&provides)
                .map_err(|error| ApexError::BadConfig(error.to_string()))?;

            if service.sessions.lock().contains_key(&exchange) {
                return Err(ApexError::BadConfig(format!(
                    "multiple gateways configured for exchange {provides:?}"
                )));
            }

            let session = service.create_session(&host, port)?;
            service.sessions.lock().insert(exchange, session);
        }

        Ok(service)
    }

    fn create_session(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Arc<GatewayClientSession>, ApexError> {
        let Some(reactor) = self.reactor.as_ref() else {
            return Err(ApexError::BadConfig(
                "gateway connections are not available in backtest mode".into(),
            ));
        };

        let session = GatewayClientSession::new(
            host,
            port,
            Arc::clone(&self.evloop),
            Arc::clone(reactor),
            Arc::clone(&self.order_service),
        );
        session.start_connecting();
        Ok(session)
    }

    /// The session fronting `exchange`, falling back to the default gateway if set.
    pub fn find_session(&self, exchange: ExchangeId) -> Option<Arc<GatewayClientSession>> {
        self.sessions
            .lock()
            .get(&exchange)
            .cloned()
            .or_else(|| self.default_session.lock().clone())
    }

    /// Point the default gateway at a local port; convenient for embedded setups where the
    /// listen port is discovered at runtime.
    pub fn set_default_gateway(&self, port: u16) -> Result<(), ApexError> {
        let session = self.create_session("127.0.0.1", port)?;
        *self.default_session.lock() = Some(session);
        Ok(())
    }
}
