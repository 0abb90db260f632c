use crate::error::ApexError;
use apex_instrument::instrument::Instrument;
use apex_integration::time::{Resolution, Time};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const APP_NAME: &str = "apex";
const TABLE_NAME: &str = "instrument_positions";

/// One persisted position record, as stored on disk.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
struct PositionRecord {
    exchange: String,
    symbol: String,
    strategyid: String,
    ts: String,
    qty: f64,
}

/// A position restored at strategy startup.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoredPosition {
    pub strategy_id: String,
    pub exchange: String,
    pub native_symbol: String,
    pub qty: f64,
}

/// File-per-record persistence of instrument positions, written atomically via
/// write-tmp-then-rename under `persist/apex/instrument_positions/`.
#[derive(Debug)]
pub struct PersistenceService {
    persist_path: PathBuf,
}

impl PersistenceService {
    pub fn new(persist_path: PathBuf) -> Self {
        Self { persist_path }
    }

    fn table_dir(&self) -> PathBuf {
        self.persist_path.join(APP_NAME).join(TABLE_NAME)
    }

    /// Persist the position for (strategy, instrument), overwriting any previous record.
    pub fn persist_instrument_position(
        &self,
        strategy_id: &str,
        instrument: &Instrument,
        qty: f64,
        now: Time,
    ) -> Result<(), ApexError> {
        let record = PositionRecord {
            exchange: instrument.exchange.as_str().to_string(),
            symbol: instrument.native_symbol.to_string(),
            strategyid: strategy_id.to_string(),
            ts: now.as_iso8601(Resolution::Milli),
            qty,
        };

        let dir = self.table_dir();
        std::fs::create_dir_all(&dir)?;

        let record_key = format!(
            "{strategy_id}.{}.{}",
            instrument.exchange.as_str(),
            instrument.native_symbol
        );
        let path = dir.join(format!("{record_key}.json"));

        write_file_atomic(&path, &serde_json::to_string(&record)?)?;
        Ok(())
    }

    /// Scan the table directory for records belonging to `strategy_id` (filename prefix
    /// match) and parse each.
    pub fn restore_instrument_positions(
        &self,
        strategy_id: &str,
    ) -> Result<Vec<RestoredPosition>, ApexError> {
        let dir = self.table_dir();
        std::fs::create_dir_all(&dir)?;

        let mut records = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let Some(filename) = path.file_name().and_then(|f| f.to_str()) else {
                continue;
            };
            let tokens: Vec<&str> = filename.split('.').collect();
            if tokens.len() != 4 {
                warn!(path = %path.display(), "skipping position file with unexpected name format");
                continue;
            }
            if tokens[0] != strategy_id {
                continue;
            }

            let raw = std::fs::read_to_string(&path)?;
            let record: PositionRecord = serde_json::from_str(&raw)?;
            records.push(RestoredPosition {
                strategy_id: record.strategyid,
                exchange: record.exchange,
                native_symbol: record.symbol,
                qty: record.qty,
            });
        }

        info!(
            strategy_id,
            restored = records.len(),
            "restored instrument positions"
        );
        Ok(records)
    }
}

/// Write then rename, so readers never observe a partial record.
fn write_file_atomic(path: &Path, content: &str) -> Result<(), ApexError> {
    let mut tmp_path = path.as_os_str().to_owned();
    tmp_path.push(".tmp");
    let tmp_path = PathBuf::from(tmp_path);

    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
