use super::{build_preamble, serialise_top, serialise_trade, TickbinMeta};
use crate::{
    error::DataError,
    subscription::{StreamInfo, TickFileBucket},
    tick::{TickTop, TickTrade},
};
use apex_integration::time::Time;
use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use tracing::info;

/// Appends tickbin records to a per-day capture file, creating the preamble when the file is
/// first created.
#[derive(Debug)]
pub struct TickbinWriter {
    path: PathBuf,
    file: File,
}

impl TickbinWriter {
    pub fn new(
        dir: &Path,
        filename: &str,
        bucket: TickFileBucket,
        stream: &StreamInfo,
        collect_meta: serde_json::Value,
    ) -> Result<Self, DataError> {
        let path = dir.join(filename);

        if !path.exists() {
            std::fs::create_dir_all(dir)?;

            let meta = TickbinMeta {
                exchange: stream.instrument.exchange.as_str().to_string(),
                channel: stream.channel.as_channel_str().to_string(),
                symbol: stream.instrument.native_symbol.to_string(),
                instrument_id: stream.instrument.id.to_string(),
                bucket: bucket.to_string(),
                collect_meta,
            };

            let preamble = build_preamble(&meta)?;
            info!(path = %path.display(), "creating tickbin file");
            let mut file = File::create(&path)?;
            file.write_all(&preamble)?;
        }

        let file = OpenOptions::new().append(true).open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_trade(&mut self, capture_time: Time, tick: &TickTrade) -> Result<(), DataError> {
        let record = serialise_trade(capture_time, tick);
        self.file.write_all(&record)?;
        Ok(())
    }

    pub fn write_top(&mut self, capture_time: Time, tick: &TickTop) -> Result<(), DataError> {
        let record = serialise_top(capture_time, tick);
        self.file.write_all(&record)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), DataError> {
        self.file.flush()?;
        Ok(())
    }
}
