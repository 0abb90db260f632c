use crate::error::ApexError;
use apex_data::{
    market_data::MarketData,
    replay::{TickFormat, TickReplayer},
    subscription::MdStream,
};
use apex_instrument::instrument::Instrument;
use apex_integration::{
    event_loop::{BacktestEventLoop, BacktestPeriod},
    time::Time,
};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::info;

/// All whole days touched by the replay period.
pub fn get_dates_in_range(from: Time, upto: Time) -> Result<Vec<Time>, ApexError> {
    if from >= upto {
        return Err(ApexError::BadConfig(
            "backtest from-time must be before upto-time".into(),
        ));
    }

    const ONE_DAY: Duration = Duration::from_secs(24 * 3600);
    let day_upto = upto.round_to_earliest_day() + ONE_DAY;

    let mut dates = Vec::new();
    let mut day = from.round_to_earliest_day();
    while day < day_upto {
        dates.push(day);
        day += ONE_DAY;
    }
    Ok(dates)
}

/// Locates recorded tick data for backtests and wires replayers into the backtest loop.
#[derive(Debug)]
pub struct BacktestService {
    tick_dir: PathBuf,
    tick_format: TickFormat,
    period: BacktestPeriod,
    dates: Vec<Time>,
    evloop: Arc<BacktestEventLoop>,
}

impl BacktestService {
    pub fn new(
        tick_dir: PathBuf,
        tick_format: TickFormat,
        period: BacktestPeriod,
        evloop: Arc<BacktestEventLoop>,
    ) -> Result<Self, ApexError> {
        let dates = get_dates_in_range(period.from, period.upto)?;
        info!(dates = dates.len(), %tick_format, "backtest date range");
        Ok(Self {
            tick_dir,
            tick_format,
            period,
            dates,
            evloop,
        })
    }

    pub fn period(&self) -> BacktestPeriod {
        self.period
    }

    /// Create a tick replayer per requested stream for this instrument, feeding `market`,
    /// and attach each to the backtest loop. No tick files at all is a configuration
    /// error.
    pub fn subscribe_canned_data(
        &self,
        instrument: &Instrument,
        market: &Arc<MarketData>,
        streams: &[MdStream],
    ) -> Result<(), ApexError> {
        if streams.is_empty() {
            return Err(ApexError::BadConfig(format!(
                "no market-data streams configured when subscribing to {instrument}"
            )));
        }

        for stream in streams {
            let replayer = TickReplayer::new(
                &self.tick_dir,
                self.tick_format,
                instrument.clone(),
                Arc::clone(market),
                *stream,
                self.period.from,
                &self.dates,
            )?;

            if replayer.file_count() == 0 {
                return Err(ApexError::BadConfig(format!(
                    "no tick-data files found for stream {instrument}/{stream} under {}",
                    self.tick_dir.display()
                )));
            }

            info!(
                %instrument,
                %stream,
                files = replayer.file_count(),
                "tick-data files found"
            );
            self.evloop.add_event_source(Box::new(replayer));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_dates_in_range() {
        let from = Time::from_str("2024-02-01T12:00:00").unwrap();
        let upto = Time::from_str("2024-02-03T06:00:00").unwrap();

        let dates = get_dates_in_range(from, upto).unwrap();
        let days: Vec<String> = dates.iter().map(|d| d.strftime("%Y-%m-%d")).collect();
        assert_eq!(days, vec!["2024-02-01", "2024-02-02", "2024-02-03"]);
    }

    #[test]
    fn test_inverted_range_is_config_error() {
        let from = Time::from_str("2024-02-03").unwrap();
        let upto = Time::from_str("2024-02-01").unwrap();
        assert!(get_dates_in_range(from, upto).is_err());
    }
}
