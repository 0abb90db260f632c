use apex::services::persistence::PersistenceService;
use apex_instrument::{
    asset::Asset,
    exchange::ExchangeId,
    instrument::{spec::InstrumentSpec, spec::ScaledNum, Instrument, InstrumentKind},
};
use apex_integration::time::Time;
use rust_decimal::Decimal;
use std::str::FromStr;

fn instrument(symbol: &str) -> Instrument {
    Instrument::new(
        InstrumentKind::CoinPair,
        format!("{symbol}.binance").as_str(),
        Asset::from_parts("BTC", ExchangeId::Binance, 8),
        Asset::from_parts("USDT", ExchangeId::Binance, 8),
        symbol,
        ExchangeId::Binance,
        InstrumentSpec::new(
            ScaledNum::new(1, 2),
            ScaledNum::new(1, 4),
            Decimal::new(1, 4),
            Decimal::new(10, 0),
        ),
    )
}

#[test]
fn test_position_round_trip_preserves_precision() {
    let dir = tempfile::tempdir().unwrap();
    let service = PersistenceService::new(dir.path().to_path_buf());

    let now = Time::from_str("2024-02-01T10:30:00").unwrap();
    service
        .persist_instrument_position("DEM02", &instrument("BTCUSDT"), 0.12345678, now)
        .unwrap();

    let restored = service.restore_instrument_positions("DEM02").unwrap();
    assert_eq!(restored.len(), 1);

    let record = &restored[0];
    assert_eq!(record.strategy_id, "DEM02");
    assert_eq!(record.exchange, "binance");
    assert_eq!(record.native_symbol, "BTCUSDT");
    assert!((record.qty - 0.12345678).abs() < 1e-8);
}

#[test]
fn test_restore_filters_by_strategy_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let service = PersistenceService::new(dir.path().to_path_buf());
    let now = Time::from_str("2024-02-01T10:30:00").unwrap();

    service
        .persist_instrument_position("DEMO1", &instrument("BTCUSDT"), 1.0, now)
        .unwrap();
    service
        .persist_instrument_position("DEMO1", &instrument("ETHUSDT"), 2.0, now)
        .unwrap();
    service
        .persist_instrument_position("OTHER", &instrument("BTCUSDT"), 9.0, now)
        .unwrap();

    let restored = service.restore_instrument_positions("DEMO1").unwrap();
    assert_eq!(restored.len(), 2);
    assert!(restored.iter().all(|record| record.strategy_id == "DEMO1"));
}

#[test]
fn test_rewrite_overwrites_previous_record() {
    let dir = tempfile::tempdir().unwrap();
    let service = PersistenceService::new(dir.path().to_path_buf());
    let now = Time::from_str("2024-02-01T10:30:00").unwrap();

    service
        .persist_instrument_position("DEMO1", &instrument("BTCUSDT"), 1.0, now)
        .unwrap();
    service
        .persist_instrument_position("DEMO1", &instrument("BTCUSDT"), -0.5, now)
        .unwrap();

    let restored = service.restore_instrument_positions("DEMO1").unwrap();
    assert_eq!(restored.len(), 1);
    assert!((restored[0].qty - (-0.5)).abs() < 1e-8);
}

#[test]
fn test_restore_from_empty_directory() {
    let dir = tempfile::tempdir().unwrap();
    let service = PersistenceService::new(dir.path().to_path_buf());
    assert!(service
        .restore_instrument_positions("DEMO1")
        .unwrap()
        .is_empty());
}
