//! The tickbin binary tick-file format.
//!
//! A file is a preamble (version tag, ASCII length, JSON metadata, zero-padded to the next
//! 1024-byte multiple) followed by tightly packed records. Each record is a 10-byte
//! little-endian header `(u64 capture_time_us, u8 msg_type, u8 size)` and a body whose
//! layout depends on `msg_type`.

use crate::{
    error::DataError,
    tick::{TickTop, TickTrade, TradeKind},
};
use apex_instrument::Side;
use apex_integration::time::Time;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

mod reader;
mod writer;

pub use reader::TickbinReader;
pub use writer::TickbinWriter;

/// Record header length: u64 capture time + u8 msg type + u8 total record size.
pub const RECORD_HEADER_LEN: usize = 10;

/// Full record length of a [`MsgType::TickLevel1`] record: header + 4 doubles.
pub const TICK_LEVEL1_LEN: usize = RECORD_HEADER_LEN + 32;

/// Full record length of a [`MsgType::TickAggTrade`] record: header + price + qty +
/// exchange time + side char + 3 pad bytes.
pub const TICK_AGG_TRADE_LEN: usize = RECORD_HEADER_LEN + 28;

/// Length of the fixed lead of the file preamble: 8-byte version tag + 8-byte ASCII length.
pub const PREAMBLE_LEAD_LEN: usize = 16;

/// Version tag at the start of every tickbin file: `"TICK1"` padded with spaces to 8 bytes.
pub const VERSION_TAG: &[u8; 8] = b"TICK1   ";

/// Preambles are sized in whole blocks, sympathetic to later memory mapping.
pub const PREAMBLE_BLOCK: usize = 1024;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
pub enum MsgType {
    TickLevel1 = 1,
    TickAggTrade = 2,
}

/// Decoded record header.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RecordHeader {
    pub capture_time_us: u64,
    pub msg_type: u8,
    pub size: u8,
}

impl RecordHeader {
    pub fn capture_time(&self) -> Time {
        Time::from_epoch_us(self.capture_time_us as i64)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, DataError> {
        if buf.len() < RECORD_HEADER_LEN {
            return Err(DataError::BadRecord(format!(
                "short record header: {} bytes",
                buf.len()
            )));
        }
        let mut buf = buf;
        Ok(Self {
            capture_time_us: buf.get_u64_le(),
            msg_type: buf.get_u8(),
            size: buf.get_u8(),
        })
    }
}

pub fn encode_side(side: Option<Side>) -> u8 {
    match side {
        Some(Side::Buy) => b'b',
        Some(Side::Sell) => b's',
        None => b' ',
    }
}

pub fn decode_side(c: u8) -> Option<Side> {
    match c {
        b'b' => Some(Side::Buy),
        b's' => Some(Side::Sell),
        _ => None,
    }
}

/// Serialise a level-1 tick into a complete record.
pub fn serialise_top(capture_time: Time, tick: &TickTop) -> Bytes {
    let mut buf = BytesMut::with_capacity(TICK_LEVEL1_LEN);
    buf.put_u64_le(capture_time.as_epoch_us() as u64);
    buf.put_u8(MsgType::TickLevel1 as u8);
    buf.put_u8(TICK_LEVEL1_LEN as u8);
    buf.put_f64_le(tick.ask_price);
    buf.put_f64_le(tick.ask_qty);
    buf.put_f64_le(tick.bid_price);
    buf.put_f64_le(tick.bid_qty);
    buf.freeze()
}

/// Serialise an aggregate-trade tick into a complete record.
pub fn serialise_trade(capture_time: Time, tick: &TickTrade) -> Bytes {
    let mut buf = BytesMut::with_capacity(TICK_AGG_TRADE_LEN);
    buf.put_u64_le(capture_time.as_epoch_us() as u64);
    buf.put_u8(MsgType::TickAggTrade as u8);
    buf.put_u8(TICK_AGG_TRADE_LEN as u8);
    buf.put_f64_le(tick.price);
    buf.put_f64_le(tick.qty);
    buf.put_u64_le(tick.exchange_time.as_epoch_us() as u64);
    buf.put_u8(encode_side(tick.aggr_side));
    buf.put_bytes(0, 3);
    buf.freeze()
}

/// Deserialise a level-1 record (header included) back into a tick.
pub fn deserialise_top(record: &[u8]) -> Result<(Time, TickTop), DataError> {
    let header = RecordHeader::decode(record)?;
    if record.len() < TICK_LEVEL1_LEN {
        return Err(DataError::BadRecord(format!(
            "short TickLevel1 record: {} bytes",
            record.len()
        )));
    }
    let mut body = &record[RECORD_HEADER_LEN..];
    let tick = TickTop {
        ask_price: body.get_f64_le(),
        ask_qty: body.get_f64_le(),
        bid_price: body.get_f64_le(),
        bid_qty: body.get_f64_le(),
    };
    Ok((header.capture_time(), tick))
}

/// Deserialise an aggregate-trade record (header included) back into a tick.
pub fn deserialise_trade(record: &[u8]) -> Result<(Time, TickTrade), DataError> {
    let header = RecordHeader::decode(record)?;
    if record.len() < TICK_AGG_TRADE_LEN {
        return Err(DataError::BadRecord(format!(
            "short TickAggTrade record: {} bytes",
            record.len()
        )));
    }
    let mut body = &record[RECORD_HEADER_LEN..];
    let price = body.get_f64_le();
    let qty = body.get_f64_le();
    let exchange_time = Time::from_epoch_us(body.get_u64_le() as i64);
    let aggr_side = decode_side(body.get_u8());

    let tick = TickTrade {
        price,
        qty,
        exchange_time,
        capture_time: header.capture_time(),
        aggr_side,
        kind: TradeKind::Aggregate,
    };
    Ok((header.capture_time(), tick))
}

/// JSON metadata stored inside the file preamble.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct TickbinMeta {
    /// Exchange name.
    #[serde(rename = "e")]
    pub exchange: String,
    /// Channel name, eg/ "aggtrades".
    #[serde(rename = "c")]
    pub channel: String,
    /// Native venue symbol.
    #[serde(rename = "s")]
    pub symbol: String,
    /// Internal instrument id.
    #[serde(rename = "i")]
    pub instrument_id: String,
    /// Date bucket, eg/ "20240201".
    #[serde(rename = "bin")]
    pub bucket: String,
    /// Free-form capture metadata.
    #[serde(rename = "cm")]
    pub collect_meta: serde_json::Value,
}

/// Decoded fixed lead of the file preamble.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PreambleHeader {
    pub version: String,
    /// Entire preamble length: lead, metadata and padding.
    pub length: usize,
}

/// Parse the 16-byte preamble lead.
pub fn decode_preamble_header(buf: &[u8]) -> Result<PreambleHeader, DataError> {
    if buf.len() < PREAMBLE_LEAD_LEN {
        return Err(DataError::BadPreamble(format!(
            "file shorter than preamble lead: {} bytes",
            buf.len()
        )));
    }

    let version = std::str::from_utf8(&buf[0..8])
        .map_err(|_| DataError::BadPreamble("version tag is not UTF-8".into()))?
        .trim()
        .to_string();

    if version != "TICK1" {
        return Err(DataError::BadPreamble(format!(
            "unsupported version tag: {version:?}"
        )));
    }

    // 7 ASCII digits followed by NUL
    let digits = &buf[8..15];
    let length = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.trim_start_matches('0').parse::<usize>().ok().or_else(|| {
            if s.chars().all(|c| c == '0') {
                Some(0)
            } else {
                None
            }
        }))
        .ok_or_else(|| DataError::BadPreamble("preamble length is not numeric".into()))?;

    if buf[15] != 0 {
        return Err(DataError::BadPreamble(
            "preamble length missing NUL terminator".into(),
        ));
    }

    Ok(PreambleHeader { version, length })
}

/// Build the full preamble image for a new tickbin file: version tag, length field, JSON
/// metadata, zero-padded up to the next whole [`PREAMBLE_BLOCK`].
pub fn build_preamble(meta: &TickbinMeta) -> Result<Vec<u8>, DataError> {
    let meta_json = serde_json::to_string(meta)?;
    let lead_plus_meta = PREAMBLE_LEAD_LEN + meta_json.len() + 1; // +1 for NUL term

    let preamble_len = (1 + (lead_plus_meta >> 10)) << 10;
    debug_assert!(preamble_len % PREAMBLE_BLOCK == 0);

    let mut preamble = vec![0u8; preamble_len];
    preamble[0..8].copy_from_slice(VERSION_TAG);

    let length_field = format!("{preamble_len:07}");
    preamble[8..15].copy_from_slice(length_field.as_bytes());
    // preamble[15] remains NUL

    preamble[PREAMBLE_LEAD_LEN..PREAMBLE_LEAD_LEN + meta_json.len()]
        .copy_from_slice(meta_json.as_bytes());

    Ok(preamble)
}

/// Parse a full preamble, returning its length and metadata.
pub fn parse_preamble(buf: &[u8]) -> Result<(usize, TickbinMeta), DataError> {
    let header = decode_preamble_header(buf)?;

    if header.length > buf.len() || header.length < PREAMBLE_LEAD_LEN {
        return Err(DataError::BadPreamble(format!(
            "preamble length {} out of range for file of {} bytes",
            header.length,
            buf.len()
        )));
    }

    let meta_region = &buf[PREAMBLE_LEAD_LEN..header.length];
    let meta_end = meta_region
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(meta_region.len());
    let meta: TickbinMeta = serde_json::from_slice(&meta_region[..meta_end])?;

    Ok((header.length, meta))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> TickbinMeta {
        TickbinMeta {
            exchange: "binance".into(),
            channel: "aggtrades".into(),
            symbol: "BTCUSDT".into(),
            instrument_id: "BTCUSDT.binance".into(),
            bucket: "20240201".into(),
            collect_meta: serde_json::json!({"host": "cap01"}),
        }
    }

    #[test]
    fn test_trade_record_round_trip_is_byte_identical() {
        let capture = Time::from_epoch_us(1_706_774_400_123_456);
        let tick = TickTrade {
            price: 42_000.55,
            qty: 0.125,
            exchange_time: Time::from_epoch_us(1_706_774_400_123_000),
            capture_time: capture,
            aggr_side: Some(Side::Sell),
            kind: TradeKind::Aggregate,
        };

        let first = serialise_trade(capture, &tick);
        assert_eq!(first.len(), TICK_AGG_TRADE_LEN);

        let (decoded_capture, decoded) = deserialise_trade(&first).unwrap();
        assert_eq!(decoded_capture, capture);

        let second = serialise_trade(decoded_capture, &decoded);
        assert_eq!(first, second);
    }

    #[test]
    fn test_top_record_round_trip_is_byte_identical() {
        let capture = Time::from_epoch_us(1_706_774_401_000_000);
        let tick = TickTop {
            bid_price: 41_999.99,
            bid_qty: 3.5,
            ask_price: 42_000.01,
            ask_qty: 1.25,
        };

        let first = serialise_top(capture, &tick);
        assert_eq!(first.len(), TICK_LEVEL1_LEN);

        let (decoded_capture, decoded) = deserialise_top(&first).unwrap();
        let second = serialise_top(decoded_capture, &decoded);
        assert_eq!(first, second);
        assert_eq!(decoded, tick);
    }

    #[test]
    fn test_side_codes() {
        assert_eq!(encode_side(Some(Side::Buy)), b'b');
        assert_eq!(encode_side(Some(Side::Sell)), b's');
        assert_eq!(encode_side(None), b' ');
        assert_eq!(decode_side(b'b'), Some(Side::Buy));
        assert_eq!(decode_side(b's'), Some(Side::Sell));
        assert_eq!(decode_side(b' '), None);
    }

    #[test]
    fn test_preamble_is_block_padded_and_parsable() {
        let meta = meta();
        let preamble = build_preamble(&meta).unwrap();

        assert_eq!(preamble.len() % PREAMBLE_BLOCK, 0);
        let meta_json_len = serde_json::to_string(&meta).unwrap().len();
        assert!(preamble.len() > PREAMBLE_LEAD_LEN + meta_json_len);

        let (length, parsed) = parse_preamble(&preamble).unwrap();
        assert_eq!(length, preamble.len());
        assert_eq!(parsed, meta);
    }

    #[test]
    fn test_preamble_header_fields() {
        let preamble = build_preamble(&meta()).unwrap();
        let header = decode_preamble_header(&preamble).unwrap();
        assert_eq!(header.version, "TICK1");
        assert_eq!(header.length, preamble.len());
    }

    #[test]
    fn test_bad_version_tag_rejected() {
        let mut preamble = build_preamble(&meta()).unwrap();
        preamble[0..8].copy_from_slice(b"TOCK9   ");
        assert!(matches!(
            decode_preamble_header(&preamble),
            Err(DataError::BadPreamble(_))
        ));
    }
}
