#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments)]

//! # Apex-Data
//! Per-instrument market-data model and event fan-out, the tickbin binary tick-file format,
//! tardis CSV tick-file readers, and the [`TickReplayer`](replay::TickReplayer) that drives
//! the backtest event loop from recorded ticks.

/// Tick structs applied to the market-data model.
pub mod tick;

/// Per-instrument last-trade + top-of-book record with event subscription.
pub mod market_data;

/// Market-data stream (channel) identifiers and tick-file bucket naming.
pub mod subscription;

/// The proprietary tickbin binary tick-file format: record codec, file preamble, writer and
/// memory-mapped reader.
pub mod tickbin;

/// Tardis-layout gzipped CSV tick-file readers.
pub mod tardis;

/// Tick replay: per-instrument streams of tick files across a date range, exposed as
/// backtest event sources.
pub mod replay;

pub mod error;
