use apex_data::{
    market_data::MarketData,
    replay::{TickFormat, TickReplayer},
    subscription::{MdStream, StreamInfo, TickFileBucket},
    tick::{TickTrade, TradeKind},
    tickbin::TickbinWriter,
};
use apex_instrument::{
    asset::Asset,
    exchange::ExchangeId,
    instrument::{spec::InstrumentSpec, spec::ScaledNum, Instrument, InstrumentKind},
    Side,
};
use apex_integration::{
    event_loop::BacktestEventLoop,
    time::Time,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::{path::Path, str::FromStr, sync::Arc};

fn instrument() -> Instrument {
    Instrument::new(
        InstrumentKind::CoinPair,
        "BTCUSDT.binance",
        Asset::from_parts("BTC", ExchangeId::Binance, 8),
        Asset::from_parts("USDT", ExchangeId::Binance, 8),
        "BTCUSDT",
        ExchangeId::Binance,
        InstrumentSpec::new(
            ScaledNum::new(1, 2),
            ScaledNum::new(1, 4),
            Decimal::new(1, 4),
            Decimal::new(10, 0),
        ),
    )
}

fn write_day_file(tick_dir: &Path, instrument: &Instrument, date: Time, prices: &[f64]) {
    let day_dir = tick_dir
        .join("tickbin1")
        .join(instrument.exchange.as_str())
        .join("aggtrades")
        .join(date.strftime("%Y"))
        .join(date.strftime("%m"))
        .join(date.strftime("%d"));

    let stream = StreamInfo {
        instrument: instrument.clone(),
        channel: MdStream::AggTrades,
    };

    let mut writer = TickbinWriter::new(
        &day_dir,
        &format!("{}.bin", instrument.native_symbol),
        TickFileBucket::from_time(date),
        &stream,
        serde_json::json!({"src": "test"}),
    )
    .unwrap();

    for (index, price) in prices.iter().enumerate() {
        let capture = date + std::time::Duration::from_millis(100 * (index as u64 + 1));
        let tick = TickTrade {
            price: *price,
            qty: 1.0,
            exchange_time: capture,
            capture_time: capture,
            aggr_side: Some(Side::Buy),
            kind: TradeKind::Aggregate,
        };
        writer.write_trade(capture, &tick).unwrap();
    }
    writer.flush().unwrap();
}

#[test]
fn test_replayer_merges_files_across_dates_in_time_order() {
    let dir = tempfile::tempdir().unwrap();
    let instrument = instrument();

    let day1 = Time::from_str("2024-02-01").unwrap();
    let day2 = Time::from_str("2024-02-02").unwrap();
    write_day_file(dir.path(), &instrument, day1, &[100.0, 101.0]);
    write_day_file(dir.path(), &instrument, day2, &[102.0, 103.0]);

    let market = Arc::new(MarketData::new());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let market_ref = Arc::clone(&market);
    let seen_ref = Arc::clone(&seen);
    market.subscribe_events(move |event| {
        if event.is_trade() {
            seen_ref.lock().push(market_ref.last().price);
        }
    });

    let replayer = TickReplayer::new(
        dir.path(),
        TickFormat::Tickbin1,
        instrument,
        Arc::clone(&market),
        MdStream::AggTrades,
        Time::zero(),
        &[day1, day2],
    )
    .unwrap();
    assert_eq!(replayer.file_count(), 2);

    let evloop = BacktestEventLoop::new(Time::zero());
    evloop.add_event_source(Box::new(replayer));
    let events = evloop.run_loop(Time::zero()).unwrap();

    assert_eq!(events, 4);
    assert_eq!(*seen.lock(), vec![100.0, 101.0, 102.0, 103.0]);
}

#[test]
fn test_replay_from_winds_past_older_events() {
    let dir = tempfile::tempdir().unwrap();
    let instrument = instrument();

    let day1 = Time::from_str("2024-02-01").unwrap();
    write_day_file(dir.path(), &instrument, day1, &[100.0, 101.0, 102.0]);

    let market = Arc::new(MarketData::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let market_ref = Arc::clone(&market);
    let seen_ref = Arc::clone(&seen);
    market.subscribe_events(move |event| {
        if event.is_trade() {
            seen_ref.lock().push(market_ref.last().price);
        }
    });

    // start the replay after the second tick's capture time
    let replay_from = day1 + std::time::Duration::from_millis(250);
    let replayer = TickReplayer::new(
        dir.path(),
        TickFormat::Tickbin1,
        instrument,
        Arc::clone(&market),
        MdStream::AggTrades,
        replay_from,
        &[day1],
    )
    .unwrap();

    let evloop = BacktestEventLoop::new(Time::zero());
    evloop.add_event_source(Box::new(replayer));
    evloop.run_loop(Time::zero()).unwrap();

    assert_eq!(*seen.lock(), vec![102.0]);
}

#[test]
fn test_missing_files_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let instrument = instrument();

    let day1 = Time::from_str("2024-02-01").unwrap();
    let day_missing = Time::from_str("2024-02-02").unwrap();
    write_day_file(dir.path(), &instrument, day1, &[100.0]);

    let market = Arc::new(MarketData::new());
    let replayer = TickReplayer::new(
        dir.path(),
        TickFormat::Tickbin1,
        instrument,
        market,
        MdStream::AggTrades,
        Time::zero(),
        &[day1, day_missing],
    )
    .unwrap();

    assert_eq!(replayer.file_count(), 1);
}
