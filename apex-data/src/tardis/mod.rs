//! Readers for tardis-layout gzipped CSV tick files.
//!
//! Two dataset schemas are handled: individual trades, and 5-level book snapshots. Header
//! rows are validated exactly against the expected field names; any malformed record halts
//! the reader without advancing.

use crate::{
    error::DataError,
    market_data::MarketData,
    replay::TickFileReader,
    tick::{TickTop, TickTrade, TradeKind},
};
use apex_instrument::Side;
use apex_integration::time::Time;
use csv::StringRecord;
use flate2::read::GzDecoder;
use std::{
    fs::File,
    io::{BufReader, Read},
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{error, info};

const TRADES_HEADER: [&str; 8] = [
    "exchange",
    "symbol",
    "timestamp",
    "local_timestamp",
    "id",
    "side",
    "price",
    "amount",
];

const BOOK_LEVELS: usize = 5;

fn book_snapshot_header() -> Vec<String> {
    let mut fields = vec![
        "exchange".to_string(),
        "symbol".to_string(),
        "timestamp".to_string(),
        "local_timestamp".to_string(),
    ];
    for level in 0..BOOK_LEVELS {
        fields.push(format!("asks[{level}].price"));
        fields.push(format!("asks[{level}].amount"));
        fields.push(format!("bids[{level}].price"));
        fields.push(format!("bids[{level}].amount"));
    }
    fields
}

/// Which tardis dataset schema a file holds.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TardisSchema {
    Trades,
    BookSnapshot5,
}

#[derive(Debug, Copy, Clone)]
enum PendingEvent {
    Trade(Time, TickTrade),
    Top(Time, TickTop),
}

impl PendingEvent {
    fn time(&self) -> Time {
        match self {
            PendingEvent::Trade(time, _) => *time,
            PendingEvent::Top(time, _) => *time,
        }
    }
}

/// Streaming reader over one gzipped tardis CSV file.
pub struct TardisReader {
    path: PathBuf,
    schema: TardisSchema,
    market: Arc<MarketData>,
    rows: csv::StringRecordsIntoIter<Box<dyn Read + Send>>,
    expected_fields: usize,
    next: Option<PendingEvent>,
    bad: bool,
}

impl std::fmt::Debug for TardisReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TardisReader")
            .field("path", &self.path)
            .field("schema", &self.schema)
            .field("bad", &self.bad)
            .finish()
    }
}

impl TardisReader {
    pub fn open(
        path: &Path,
        market: Arc<MarketData>,
        schema: TardisSchema,
    ) -> Result<Self, DataError> {
        if !path.is_file() {
            return Err(DataError::FileNotFound(path.to_path_buf()));
        }

        info!(path = %path.display(), ?schema, "reading tardis csv file");
        let file = File::open(path)?;
        let decoder: Box<dyn Read + Send> = Box::new(GzDecoder::new(BufReader::new(file)));

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(decoder);

        let expected: Vec<String> = match schema {
            TardisSchema::Trades => TRADES_HEADER.iter().map(|s| s.to_string()).collect(),
            TardisSchema::BookSnapshot5 => book_snapshot_header(),
        };

        let headers = reader.headers()?.clone();
        let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
        if actual != expected {
            return Err(DataError::BadCsvHeader {
                expected: expected.join(","),
                actual: actual.join(","),
            });
        }

        let mut this = Self {
            path: path.to_path_buf(),
            schema,
            market,
            rows: reader.into_records(),
            expected_fields: expected.len(),
            next: None,
            bad: false,
        };
        this.read_ahead();
        Ok(this)
    }

    /// Whether the reader hit a malformed record and halted.
    pub fn is_bad(&self) -> bool {
        self.bad
    }

    fn read_ahead(&mut self) {
        self.next = None;
        if self.bad {
            return;
        }

        let record = match self.rows.next() {
            None => return,
            Some(Err(err)) => {
                error!(path = %self.path.display(), %err, "tardis csv record error; halting reader");
                self.bad = true;
                return;
            }
            Some(Ok(record)) => record,
        };

        match self.parse_record(&record) {
            Ok(event) => self.next = Some(event),
            Err(err) => {
                error!(path = %self.path.display(), %err, "tardis csv parse error; halting reader");
                self.bad = true;
            }
        }
    }

    fn parse_record(&self, record: &StringRecord) -> Result<PendingEvent, DataError> {
        if record.len() != self.expected_fields {
            return Err(DataError::BadCsvField(format!(
                "expected {} fields, found {}",
                self.expected_fields,
                record.len()
            )));
        }

        let timestamp = parse_i64(record, 2)?;
        let local_timestamp = parse_i64(record, 3)?;
        let event_time = Time::from_epoch_us(timestamp);
        let capture_time = Time::from_epoch_us(local_timestamp);

        match self.schema {
            TardisSchema::Trades => {
                let side = match field(record, 5)? {
                    "buy" => Some(Side::Buy),
                    "sell" => Some(Side::Sell),
                    other => {
                        return Err(DataError::BadCsvField(format!("unknown side: {other:?}")))
                    }
                };

                let tick = TickTrade {
                    price: parse_f64(record, 6)?,
                    qty: parse_f64(record, 7)?,
                    exchange_time: event_time,
                    capture_time,
                    aggr_side: side,
                    kind: TradeKind::Single,
                };
                Ok(PendingEvent::Trade(event_time, tick))
            }
            TardisSchema::BookSnapshot5 => {
                // level 0 drives the top-of-book model; deeper levels are not modelled
                let tick = TickTop {
                    ask_price: parse_f64(record, 4)?,
                    ask_qty: parse_f64(record, 5)?,
                    bid_price: parse_f64(record, 6)?,
                    bid_qty: parse_f64(record, 7)?,
                };
                Ok(PendingEvent::Top(event_time, tick))
            }
        }
    }
}

fn field<'a>(record: &'a StringRecord, index: usize) -> Result<&'a str, DataError> {
    record
        .get(index)
        .ok_or_else(|| DataError::BadCsvField(format!("missing field {index}")))
}

fn parse_f64(record: &StringRecord, index: usize) -> Result<f64, DataError> {
    let raw = field(record, index)?;
    raw.parse::<f64>()
        .map_err(|_| DataError::BadCsvField(format!("field {index} is not a number: {raw:?}")))
}

fn parse_i64(record: &StringRecord, index: usize) -> Result<i64, DataError> {
    let raw = field(record, index)?;
    raw.parse::<i64>()
        .map_err(|_| DataError::BadCsvField(format!("field {index} is not an integer: {raw:?}")))
}

impl TickFileReader for TardisReader {
    fn wind_forward(&mut self, upto: Time) {
        while self.next.is_some_and(|event| event.time() < upto) {
            self.read_ahead();
        }
    }

    fn has_next_event(&self) -> bool {
        self.next.is_some()
    }

    fn next_event_time(&self) -> Time {
        self.next.map(|event| event.time()).unwrap_or_else(Time::zero)
    }

    fn consume_next_event(&mut self) {
        let Some(event) = self.next else {
            return;
        };

        match event {
            PendingEvent::Trade(_, tick) => self.market.apply_trade(tick),
            PendingEvent::Top(_, tick) => self.market.apply_top(&tick),
        }

        self.read_ahead();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;

    fn write_gz(path: &Path, content: &str) {
        let file = File::create(path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(content.as_bytes()).unwrap();
        encoder.finish().unwrap();
    }

    fn trades_csv() -> String {
        let mut csv = String::from(
            "exchange,symbol,timestamp,local_timestamp,id,side,price,amount\n",
        );
        csv.push_str("binance,BTCUSDT,1706745600000000,1706745600000100,1,buy,42000.5,0.25\n");
        csv.push_str("binance,BTCUSDT,1706745601000000,1706745601000100,2,sell,42000.0,0.5\n");
        csv
    }

    #[test]
    fn test_trades_schema_parses_and_applies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("BTCUSDT.csv.gz");
        write_gz(&path, &trades_csv());

        let market = Arc::new(MarketData::new());
        let mut reader = TardisReader::open(&path, Arc::clone(&market), TardisSchema::Trades)
            .unwrap();

        assert!(reader.has_next_event());
        assert_eq!(
            reader.next_event_time(),
            Time::from_epoch_us(1_706_745_600_000_000)
        );

        reader.consume_next_event();
        assert_eq!(market.last().price, 42_000.5);
        assert_eq!(market.last().aggr_side, Some(Side::Buy));

        reader.consume_next_event();
        assert_eq!(market.last().price, 42_000.0);
        assert!(!reader.has_next_event());
        assert!(!reader.is_bad());
    }

    #[test]
    fn test_book_snapshot_schema_applies_level_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("BTCUSDT.csv.gz");

        let mut csv = book_snapshot_header().join(",");
        csv.push('\n');
        csv.push_str("binance,BTCUSDT,1706745600000000,1706745600000100");
        for level in 0..5 {
            csv.push_str(&format!(
                ",{},{},{},{}",
                42_001.0 + level as f64,
                1.0,
                41_999.0 - level as f64,
                2.0
            ));
        }
        csv.push('\n');
        write_gz(&path, &csv);

        let market = Arc::new(MarketData::new());
        let mut reader =
            TardisReader::open(&path, Arc::clone(&market), TardisSchema::BookSnapshot5).unwrap();

        reader.consume_next_event();
        assert_eq!(market.ask(), 42_001.0);
        assert_eq!(market.bid(), 41_999.0);
    }

    #[test]
    fn test_header_mismatch_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("BTCUSDT.csv.gz");
        write_gz(
            &path,
            "exchange,symbol,timestamp,local_timestamp,id,side,price\nx,y,1,2,3,buy,4\n",
        );

        let market = Arc::new(MarketData::new());
        assert!(matches!(
            TardisReader::open(&path, market, TardisSchema::Trades),
            Err(DataError::BadCsvHeader { .. })
        ));
    }

    #[test]
    fn test_short_record_halts_reader_without_advancing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("BTCUSDT.csv.gz");

        let mut csv = trades_csv();
        // one field too few
        csv.push_str("binance,BTCUSDT,1706745602000000,1706745602000100,3,buy,42001.0\n");
        csv.push_str("binance,BTCUSDT,1706745603000000,1706745603000100,4,buy,42002.0,1.0\n");
        write_gz(&path, &csv);

        let market = Arc::new(MarketData::new());
        let mut reader = TardisReader::open(&path, market, TardisSchema::Trades).unwrap();

        reader.consume_next_event();
        reader.consume_next_event();

        // the malformed third row halts the reader; the fourth row is never surfaced
        assert!(!reader.has_next_event());
        assert!(reader.is_bad());
        assert_eq!(reader.next_event_time(), Time::zero());
    }

    #[test]
    fn test_extra_field_halts_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("BTCUSDT.csv.gz");

        let mut csv = String::from(
            "exchange,symbol,timestamp,local_timestamp,id,side,price,amount\n",
        );
        // one field too many
        csv.push_str("binance,BTCUSDT,1706745600000000,1706745600000100,1,buy,42000.5,0.25,XX\n");
        write_gz(&path, &csv);

        let market = Arc::new(MarketData::new());
        let reader = TardisReader::open(&path, market, TardisSchema::Trades).unwrap();
        assert!(reader.is_bad());
        assert!(!reader.has_next_event());
    }
}
