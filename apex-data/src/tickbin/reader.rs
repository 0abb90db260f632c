use super::{
    deserialise_top, deserialise_trade, parse_preamble, RecordHeader, TickbinMeta,
    RECORD_HEADER_LEN,
};
use crate::{error::DataError, market_data::MarketData, replay::TickFileReader,
    subscription::MdStream};
use apex_integration::time::Time;
use memmap2::Mmap;
use std::{fs::File, path::Path, sync::Arc};
use tracing::{debug, info};

enum Decoder {
    Level1,
    AggTrade,
}

/// Memory-mapped reader over one tickbin file, exposing the tick-file event-source contract.
///
/// `consume_next_event` deserialises the next record and applies it to the bound
/// [`MarketData`]; `wind_forward` skips records without applying them.
pub struct TickbinReader {
    mmap: Mmap,
    offset: usize,
    decoder: Decoder,
    meta: TickbinMeta,
    market: Arc<MarketData>,
}

impl std::fmt::Debug for TickbinReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickbinReader")
            .field("offset", &self.offset)
            .field("len", &self.mmap.len())
            .field("meta", &self.meta)
            .finish()
    }
}

impl TickbinReader {
    pub fn open(
        path: &Path,
        market: Arc<MarketData>,
        stream: MdStream,
    ) -> Result<Self, DataError> {
        if !path.is_file() {
            return Err(DataError::FileNotFound(path.to_path_buf()));
        }

        info!(path = %path.display(), "reading tickbin file");
        let file = File::open(path)?;
        // Safety: the capture files are append-only and never truncated while mapped.
        let mmap = unsafe { Mmap::map(&file)? };

        let (preamble_len, meta) = parse_preamble(&mmap)?;

        let decoder = match stream {
            MdStream::L1 => Decoder::Level1,
            MdStream::AggTrades | MdStream::Trades => Decoder::AggTrade,
            other => {
                return Err(DataError::UnsupportedStream {
                    format: "tickbin1".into(),
                    stream: other.to_string(),
                })
            }
        };

        Ok(Self {
            mmap,
            offset: preamble_len,
            decoder,
            meta,
            market,
        })
    }

    pub fn meta(&self) -> &TickbinMeta {
        &self.meta
    }

    fn peek_header(&self) -> Option<RecordHeader> {
        let remaining = self.mmap.len() - self.offset;
        if remaining < RECORD_HEADER_LEN {
            return None;
        }

        let header = RecordHeader::decode(&self.mmap[self.offset..]).ok()?;
        if (header.size as usize) < RECORD_HEADER_LEN || remaining < header.size as usize {
            return None;
        }
        Some(header)
    }

    fn advance(&mut self, apply: bool) {
        let Some(header) = self.peek_header() else {
            return;
        };

        let record = &self.mmap[self.offset..self.offset + header.size as usize];
        if apply {
            match self.decoder {
                Decoder::Level1 => {
                    if let Ok((_, tick)) = deserialise_top(record) {
                        self.market.apply_top(&tick);
                    }
                }
                Decoder::AggTrade => {
                    if let Ok((_, tick)) = deserialise_trade(record) {
                        self.market.apply_trade(tick);
                    }
                }
            }
        }

        self.offset += header.size as usize;
    }
}

impl TickFileReader for TickbinReader {
    fn wind_forward(&mut self, upto: Time) {
        let mut consumed = 0u64;
        while self
            .peek_header()
            .is_some_and(|header| header.capture_time() < upto)
        {
            self.advance(false);
            consumed += 1;
        }

        debug!(
            consumed,
            next_event_time = %self.next_event_time(),
            seek = %upto,
            "wind-forward complete"
        );
    }

    fn has_next_event(&self) -> bool {
        self.peek_header().is_some()
    }

    fn next_event_time(&self) -> Time {
        self.peek_header()
            .map(|header| header.capture_time())
            .unwrap_or_else(Time::zero)
    }

    fn consume_next_event(&mut self) {
        self.advance(true);
    }
}
