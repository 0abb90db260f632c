use crate::error::ApexError;
use apex_instrument::{
    asset::Asset,
    exchange::ExchangeId,
    instrument::{
        spec::{InstrumentSpec, ScaledNum},
        Instrument, InstrumentKind, InstrumentQuery,
    },
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use smol_str::SmolStr;
use std::{collections::BTreeMap, path::Path, str::FromStr};
use tracing::{info, warn};

/// Instrument reference data loaded from `instruments.csv`.
///
/// Expected columns: `instId,symbol,type,venue,baseAsset,quoteAsset,lotQty,tickSize,
/// minNotional,minQty,baseAssetPrecision,quoteAssetPrecision`.
#[derive(Debug, Default)]
pub struct RefDataService {
    instruments: Mutex<BTreeMap<SmolStr, Instrument>>,
}

impl RefDataService {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load from the given CSV path. A missing file yields an empty (but usable) service,
    /// so embedded and test setups can register instruments programmatically.
    pub fn load(path: &Path) -> Result<Self, ApexError> {
        if !path.is_file() {
            warn!(path = %path.display(), "instruments ref-data file not found; starting empty");
            return Ok(Self::empty());
        }

        info!(path = %path.display(), "reading ref-data csv file");
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .map_err(|error| ApexError::RefData(error.to_string()))?;

        let headers = reader
            .headers()
            .map_err(|error| ApexError::RefData(error.to_string()))?
            .clone();
        let column = |name: &str| -> Result<usize, ApexError> {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| ApexError::RefData(format!("missing column {name:?}")))
        };

        let col_inst_id = column("instId")?;
        let col_symbol = column("symbol")?;
        let col_type = column("type")?;
        let col_venue = column("venue")?;
        let col_base = column("baseAsset")?;
        let col_quote = column("quoteAsset")?;
        let col_lot = column("lotQty")?;
        let col_tick = column("tickSize")?;
        let col_min_notional = column("minNotional")?;
        let col_min_qty = column("minQty")?;
        let col_base_precision = column("baseAssetPrecision")?;
        let col_quote_precision = column("quoteAssetPrecision")?;

        let service = Self::empty();
        for record in reader.records() {
            let record = record.map_err(|error| ApexError::RefData(error.to_string()))?;
            let field = |index: usize| -> Result<&str, ApexError> {
                record
                    .get(index)
                    .ok_or_else(|| ApexError::RefData(format!("short record: {record:?}")))
            };

            let venue = ExchangeId::from_str(field(col_venue)?)
                .map_err(|error| ApexError::RefData(error.to_string()))?;
            let kind = match field(col_type)? {
                "coinpair" => InstrumentKind::CoinPair,
                "perpetual" => InstrumentKind::Perpetual,
                "future" => InstrumentKind::Future,
                other => {
                    return Err(ApexError::RefData(format!("unknown instrument type {other:?}")))
                }
            };

            let parse_decimal = |raw: &str| -> Result<Decimal, ApexError> {
                Decimal::from_str(raw)
                    .map_err(|_| ApexError::RefData(format!("bad decimal {raw:?}")))
            };
            let parse_scaled = |raw: &str| -> Result<ScaledNum, ApexError> {
                ScaledNum::from_str(raw)
                    .map_err(|_| ApexError::RefData(format!("bad scaled number {raw:?}")))
            };
            let parse_precision = |raw: &str| -> Result<u32, ApexError> {
                raw.parse::<u32>()
                    .map_err(|_| ApexError::RefData(format!("bad precision {raw:?}")))
            };

            let instrument = Instrument::new(
                kind,
                field(col_inst_id)?,
                Asset::from_parts(field(col_base)?, venue, parse_precision(field(col_base_precision)?)?),
                Asset::from_parts(
                    field(col_quote)?,
                    venue,
                    parse_precision(field(col_quote_precision)?)?,
                ),
                field(col_symbol)?,
                venue,
                InstrumentSpec::new(
                    parse_scaled(field(col_tick)?)?,
                    parse_scaled(field(col_lot)?)?,
                    parse_decimal(field(col_min_qty)?)?,
                    parse_decimal(field(col_min_notional)?)?,
                ),
            );
            service.add_instrument(instrument)?;
        }

        info!(
            instruments = service.instruments.lock().len(),
            "refdata loaded"
        );
        Ok(service)
    }

    /// Register an instrument. Redefinition with different attributes is an error.
    pub fn add_instrument(&self, instrument: Instrument) -> Result<(), ApexError> {
        let mut instruments = self.instruments.lock();
        match instruments.get(&instrument.id) {
            None => {
                instruments.insert(instrument.id.clone(), instrument);
                Ok(())
            }
            Some(existing) if *existing == instrument => {
                warn!(id = %instrument.id, "skipping duplicate instrument");
                Ok(())
            }
            Some(_) => Err(ApexError::RefData(format!(
                "ref-data instrument defined twice: {}",
                instrument.id
            ))),
        }
    }

    pub fn get_instrument(&self, query: &InstrumentQuery) -> Result<Instrument, ApexError> {
        let instruments = self.instruments.lock();
        let matches: Vec<&Instrument> = instruments
            .values()
            .filter(|instrument| {
                instrument.native_symbol == query.native_symbol
                    && instrument.exchange == query.exchange
            })
            .collect();

        match matches.as_slice() {
            [instrument] => Ok((*instrument).clone()),
            [] => Err(ApexError::RefData(format!(
                "instrument not found for query {query:?}"
            ))),
            _ => Err(ApexError::RefData(format!(
                "multiple instruments match query {query:?}"
            ))),
        }
    }

    pub fn instrument_count(&self) -> usize {
        self.instruments.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CSV: &str = "\
instId,symbol,type,venue,baseAsset,quoteAsset,lotQty,tickSize,minNotional,minQty,baseAssetPrecision,quoteAssetPrecision
BTCUSDT.binance,BTCUSDT,coinpair,binance,BTC,USDT,0.0001,0.01,10,0.0001,8,8
ETHUSDT.binance,ETHUSDT,coinpair,binance,ETH,USDT,0.001,0.01,10,0.001,8,8
";

    #[test]
    fn test_load_and_query() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instruments.csv");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(CSV.as_bytes())
            .unwrap();

        let service = RefDataService::load(&path).unwrap();
        assert_eq!(service.instrument_count(), 2);

        let instrument = service
            .get_instrument(&InstrumentQuery::new(ExchangeId::Binance, "BTCUSDT"))
            .unwrap();
        assert_eq!(instrument.id, "BTCUSDT.binance");
        assert_eq!(instrument.spec.tick_size, ScaledNum::new(1, 2));
        assert_eq!(instrument.spec.lot_size, ScaledNum::new(1, 4));

        assert!(service
            .get_instrument(&InstrumentQuery::new(ExchangeId::Binance, "XRPUSDT"))
            .is_err());
    }

    #[test]
    fn test_missing_file_starts_empty() {
        let service = RefDataService::load(Path::new("/nonexistent/instruments.csv")).unwrap();
        assert_eq!(service.instrument_count(), 0);
    }
}
