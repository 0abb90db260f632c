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

//! # Apex
//! The trading runtime: a [`Services`](services::Services) container wiring the event loop,
//! reactor, market data, order routing, reference data, persistence and audit together; the
//! [`Strategy`](strategy::Strategy) shell with its per-instrument [`Bot`](bot::Bot)s; and
//! the strategy-process runner.
//!
//! The same strategy code runs unchanged in three run modes:
//! * `live` - wall-clock time, real venue connections through a gateway.
//! * `paper` - wall-clock time, real market data, simulated matching.
//! * `backtest` - virtual time driven by recorded ticks, simulated matching.

/// Core services container and the per-concern services it owns.
pub mod services;

/// Per-instrument trading container and the strategy-supplied logic trait.
pub mod bot;

/// Strategy shell: bot set, position restore, cooperative stop.
pub mod strategy;

/// Audit CSV writer: one append-only row per order transaction.
pub mod audit;

/// Strategy process runner: CLI, config, services, signal handling.
pub mod runner;

/// Process logging initialisation.
pub mod logging;

/// Filesystem layout resolved from `APEX_HOME`.
pub mod paths;

pub mod error;
