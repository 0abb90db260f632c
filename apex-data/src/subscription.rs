use apex_instrument::instrument::Instrument;
use apex_integration::time::Time;
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};
use thiserror::Error;

/// A named market-data stream on a venue.
///
/// The channel strings are stable: they appear in wire messages and tick-file directory
/// layouts.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MdStream {
    /// Top bid/ask.
    L1,
    /// Trades aggregated at price.
    AggTrades,
    /// Individual trades.
    Trades,
    /// 5-level book snapshots.
    BookSnapshot5,
}

impl MdStream {
    pub fn as_channel_str(&self) -> &'static str {
        match self {
            MdStream::L1 => "l1",
            MdStream::AggTrades => "aggtrades",
            MdStream::Trades => "trades",
            MdStream::BookSnapshot5 => "book_snapshot_5",
        }
    }
}

impl Display for MdStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_channel_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("unknown market-data channel: {0}")]
pub struct ParseMdStreamError(pub String);

impl FromStr for MdStream {
    type Err = ParseMdStreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "l1" => Ok(MdStream::L1),
            "aggtrades" => Ok(MdStream::AggTrades),
            "trades" => Ok(MdStream::Trades),
            "book_snapshot_5" => Ok(MdStream::BookSnapshot5),
            other => Err(ParseMdStreamError(other.to_string())),
        }
    }
}

/// A single (instrument, channel) market-data subscription.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct StreamInfo {
    pub instrument: Instrument,
    pub channel: MdStream,
}

/// Year/month/day triple used to partition tick files on disk.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub struct TickFileBucket {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl TickFileBucket {
    pub fn from_time(time: Time) -> Self {
        let date = time.as_datetime().date_naive();
        use chrono::Datelike;
        Self {
            year: date.year(),
            month: date.month(),
            day: date.day(),
        }
    }
}

impl Display for TickFileBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}{:02}{:02}", self.year, self.month, self.day)
    }
}
