use crate::{
    error::DataError,
    market_data::MarketData,
    subscription::MdStream,
    tardis::{TardisReader, TardisSchema},
    tickbin::TickbinReader,
};
use apex_instrument::instrument::Instrument;
use apex_integration::{event_loop::EventSource, time::Time};
use std::{
    collections::VecDeque,
    fmt::Display,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};
use thiserror::Error;
use tracing::{info, warn};

/// On-disk tick-file format. The format string is the authoritative selector for how files
/// are located and decoded.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TickFormat {
    Tickbin1,
    Tardis,
}

impl TickFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            TickFormat::Tickbin1 => "tickbin1",
            TickFormat::Tardis => "tardis",
        }
    }
}

impl Display for TickFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("unknown tick format: {0}")]
pub struct ParseTickFormatError(pub String);

impl FromStr for TickFormat {
    type Err = ParseTickFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tickbin1" => Ok(TickFormat::Tickbin1),
            "tardis" => Ok(TickFormat::Tardis),
            other => Err(ParseTickFormatError(other.to_string())),
        }
    }
}

/// Uniform contract over a single open tick file, regardless of format.
pub trait TickFileReader: Send {
    /// Skip events with timestamps strictly before `upto`, without applying them.
    fn wind_forward(&mut self, upto: Time);

    fn has_next_event(&self) -> bool;

    /// Time of the next event; empty iff drained.
    fn next_event_time(&self) -> Time;

    /// Decode the next event, apply it to the bound market-data model, and advance.
    fn consume_next_event(&mut self);
}

/// Replays the tick files of one (instrument, channel) pair across a date range, as an
/// event source for the backtest loop.
///
/// Files live under `<base>/<format>/<exchange>/<channel>/<yyyy>/<mm>/<dd>/<symbol>.<ext>`.
pub struct TickReplayer {
    format: TickFormat,
    instrument: Instrument,
    market: Arc<MarketData>,
    stream: MdStream,
    replay_from: Time,
    filenames: VecDeque<PathBuf>,
    reader: Option<Box<dyn TickFileReader>>,
    /// Channel directory under the exchange directory.
    subdir: &'static str,
    base_dir: PathBuf,
}

impl std::fmt::Debug for TickReplayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickReplayer")
            .field("format", &self.format)
            .field("instrument", &self.instrument.id)
            .field("stream", &self.stream)
            .field("files_remaining", &self.filenames.len())
            .finish()
    }
}

impl TickReplayer {
    pub fn new(
        tick_dir: &Path,
        format: TickFormat,
        instrument: Instrument,
        market: Arc<MarketData>,
        stream: MdStream,
        replay_from: Time,
        dates: &[Time],
    ) -> Result<Self, DataError> {
        let subdir = match (format, stream) {
            (TickFormat::Tickbin1, MdStream::AggTrades) => "aggtrades",
            (TickFormat::Tickbin1, MdStream::L1) => "l1",
            // tardis datasets have no aggtrades, so plain trades stand in
            (TickFormat::Tardis, MdStream::AggTrades | MdStream::Trades) => "trades",
            // tardis has no L1 dataset, so the smallest book snapshot stands in
            (TickFormat::Tardis, MdStream::L1 | MdStream::BookSnapshot5) => "book_snapshot_5",
            (format, stream) => {
                return Err(DataError::UnsupportedStream {
                    format: format.to_string(),
                    stream: stream.to_string(),
                })
            }
        };

        let base_dir = tick_dir
            .join(format.as_str())
            .join(instrument.exchange.as_str());

        let mut this = Self {
            format,
            instrument,
            market,
            stream,
            replay_from,
            filenames: VecDeque::new(),
            reader: None,
            subdir,
            base_dir,
        };

        let mut missing = Vec::new();
        for date in dates {
            let path = this.build_filename(*date);
            if path.is_file() {
                this.filenames.push_back(path);
            } else {
                missing.push(path);
            }
        }

        if missing.is_empty() {
            info!(
                instrument = %this.instrument,
                format = %format,
                stream = %stream,
                found = this.filenames.len(),
                "tick files summary"
            );
        } else {
            warn!(
                instrument = %this.instrument,
                format = %format,
                stream = %stream,
                found = this.filenames.len(),
                missing = missing.len(),
                first_missing = %missing[0].display(),
                "tick files summary"
            );
        }

        Ok(this)
    }

    pub fn file_count(&self) -> usize {
        self.filenames.len()
    }

    fn build_filename(&self, date: Time) -> PathBuf {
        let ext = match self.format {
            TickFormat::Tickbin1 => "bin",
            TickFormat::Tardis => "csv.gz",
        };

        self.base_dir
            .join(self.subdir)
            .join(date.strftime("%Y"))
            .join(date.strftime("%m"))
            .join(date.strftime("%d"))
            .join(format!("{}.{ext}", self.instrument.native_symbol))
    }

    fn open_reader(&self, path: &Path) -> Result<Box<dyn TickFileReader>, DataError> {
        match self.format {
            TickFormat::Tickbin1 => Ok(Box::new(TickbinReader::open(
                path,
                Arc::clone(&self.market),
                self.stream,
            )?)),
            TickFormat::Tardis => {
                let schema = match self.subdir {
                    "trades" => TardisSchema::Trades,
                    _ => TardisSchema::BookSnapshot5,
                };
                Ok(Box::new(TardisReader::open(
                    path,
                    Arc::clone(&self.market),
                    schema,
                )?))
            }
        }
    }

    /// Drain finished readers and open the next tick file with a usable event.
    fn ensure_reader(&mut self) {
        if self.reader.as_ref().is_some_and(|r| r.has_next_event()) {
            return;
        }

        self.reader = None;
        while self.reader.is_none() {
            let Some(path) = self.filenames.pop_front() else {
                return;
            };

            match self.open_reader(&path) {
                Ok(mut reader) => {
                    // skip any leading events that fall before the replay period; the
                    // reader is free to short-circuit this internally
                    reader.wind_forward(self.replay_from);
                    if reader.has_next_event() {
                        self.reader = Some(reader);
                    }
                }
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping unreadable tick file");
                }
            }
        }
    }
}

impl EventSource for TickReplayer {
    fn next_event_time(&mut self) -> Time {
        self.ensure_reader();
        self.reader
            .as_ref()
            .map(|reader| reader.next_event_time())
            .unwrap_or_else(Time::zero)
    }

    fn consume_next_event(&mut self) {
        if let Some(reader) = self.reader.as_mut() {
            reader.consume_next_event();
        }
    }

    fn init_backtest_time_range(&mut self, from: Time, _upto: Time) {
        if self.replay_from.is_empty() {
            self.replay_from = from;
        }
    }
}
