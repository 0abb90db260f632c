use crate::error::ApexError;
use apex_data::market_data::MarketData;
use apex_execution::{
    order::{Order, OrderFill},
    position::Position,
};
use apex_instrument::Side;
use apex_integration::{
    event_loop::{EventLoop, EventLoopExt},
    time::{Resolution, Time},
};
use parking_lot::Mutex;
use std::{
    fs::File,
    path::{Path, PathBuf},
    sync::{Arc, Weak},
    time::Duration,
};
use tracing::{error, info};

const FLUSH_INTERVAL: Duration = Duration::from_secs(5);

const COLUMNS: [&str; 30] = [
    "time",
    "symbol",
    "venue",
    "event",
    "order_state",
    "order_id",
    "side",
    "qty",
    "price",
    "value_usd",
    "done_qty",
    "remain_qty",
    "fill_qty",
    "fill_price",
    "exch_order_id",
    "buy_qty",
    "sell_qty",
    "net_qty",
    "buy_cost",
    "sell_cost",
    "turnover",
    "total_pnl",
    "bid",
    "ask",
    "last",
    "last_qty",
    "last_time",
    "fx_to_usd",
    "iside",
    "strat_id",
];

fn fmt(value: f64) -> String {
    if value.is_finite() {
        format!("{value}")
    } else {
        String::new()
    }
}

/// Append-only audit log: one CSV row per order transaction (state change or fill),
/// written to `log/audit-transactions-<utc-timestamp>.csv` and flushed periodically.
///
/// The audit file is a log, not state: position recovery reads the persisted position
/// records, never this file.
pub struct Auditor {
    path: PathBuf,
    writer: Mutex<csv::Writer<File>>,
}

impl std::fmt::Debug for Auditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auditor").field("path", &self.path).finish()
    }
}

impl Auditor {
    pub fn new(log_dir: &Path, evloop: &Arc<dyn EventLoop>) -> Result<Arc<Self>, ApexError> {
        std::fs::create_dir_all(log_dir)?;

        let filename = format!(
            "audit-transactions-{}.csv",
            Time::realtime_now().strftime("%Y%m%d_%H%M%S")
        );
        let path = log_dir.join(filename);
        info!(path = %path.display(), "auditor transactions file");

        let mut writer = csv::Writer::from_writer(File::create(&path)?);
        writer
            .write_record(COLUMNS)
            .map_err(|e| ApexError::Io(std::io::Error::other(e)))?;

        let auditor = Arc::new(Self {
            path,
            writer: Mutex::new(writer),
        });

        let handle: Weak<Auditor> = Arc::downgrade(&auditor);
        evloop.dispatch_timer(FLUSH_INTERVAL, move || match handle.upgrade() {
            Some(auditor) => {
                if let Err(flush_error) = auditor.writer.lock().flush() {
                    error!(%flush_error, "transactions file flush failed");
                    return Duration::ZERO;
                }
                FLUSH_INTERVAL
            }
            None => Duration::ZERO,
        });

        Ok(auditor)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one transaction row.
    pub fn add_transaction(
        &self,
        time: Time,
        strategy_id: &str,
        order: &Order,
        fill: Option<&OrderFill>,
        position: &Position,
        market: &MarketData,
        fx_to_usd: f64,
    ) {
        let last = market.last();
        let iside = match order.side() {
            Side::Buy => "1",
            Side::Sell => "-1",
        };

        let row = [
            time.as_iso8601(Resolution::Micro),
            order.instrument().native_symbol.to_string(),
            order.instrument().exchange.to_string(),
            if fill.is_some() { "fill" } else { "order" }.to_string(),
            order.state().to_string(),
            order.order_id().to_string(),
            order.side().to_string(),
            fmt(order.size()),
            fmt(order.price()),
            fmt(order.size() * order.price() * fx_to_usd),
            fmt(order.filled_size()),
            fmt(order.remain_size()),
            fill.map(|f| fmt(f.size)).unwrap_or_default(),
            fill.map(|f| fmt(f.price)).unwrap_or_default(),
            order.ext_order_id(),
            fmt(position.buy_qty()),
            fmt(position.sell_qty()),
            fmt(position.net_qty()),
            fmt(position.buy_cost()),
            fmt(position.sell_cost()),
            fmt(position.total_turnover(last.price)),
            fmt(position.total_pnl(last.price)),
            fmt(market.bid()),
            fmt(market.ask()),
            fmt(last.price),
            fmt(last.qty),
            if last.exchange_time.is_empty() {
                String::new()
            } else {
                last.exchange_time.as_iso8601(Resolution::Micro)
            },
            fmt(fx_to_usd),
            iside.to_string(),
            strategy_id.to_string(),
        ];

        if let Err(write_error) = self.writer.lock().write_record(row) {
            error!(%write_error, "failed to write audit transaction");
        }
    }

    pub fn flush(&self) -> Result<(), ApexError> {
        self.writer.lock().flush()?;
        Ok(())
    }
}
