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

//! # Apex-Integration
//! Low-level runtime shared by every Apex process: the [`Time`](time::Time) type, the
//! event-loop pair (realtime and backtest), the socket-owning I/O [`Reactor`](reactor::Reactor),
//! callback fan-out, and the gateway wire protocol.

use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};
use thiserror::Error;

/// Uniform timestamp type with an empty sentinel, plus parsing/formatting utilities.
pub mod time;

/// Event loops: the threaded [`RealtimeEventLoop`](event_loop::RealtimeEventLoop) used in
/// live/paper mode, and the virtual-time [`BacktestEventLoop`](event_loop::BacktestEventLoop)
/// driven by [`EventSource`](event_loop::EventSource) implementations.
pub mod event_loop;

/// Socket-owning I/O reactor thread. All socket callbacks run on the reactor thread and
/// marshal work into an event loop.
pub mod reactor;

/// Gateway wire protocol: 8-byte frame header, bounded decode buffer, prost payloads.
pub mod protocol;

/// Callback-list fan-out used for order events, market-data events and session observables.
pub mod subject;

/// Channel wrappers around tokio mpsc used by the reactor internals.
pub mod channel;

/// Error taxonomy and the stable short error codes attached to order rejections.
pub mod error;

/// JSON application configuration with `${VAR}` environment interpolation.
pub mod config;

/// SerDe helpers for venue payloads.
pub mod de;

/// Process run mode. Determines the time source and whether order routing hits a venue or
/// the simulated matching engine.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Live,
    Paper,
    Backtest,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Live => "live",
            RunMode::Paper => "paper",
            RunMode::Backtest => "backtest",
        }
    }

    pub fn is_backtest(&self) -> bool {
        matches!(self, RunMode::Backtest)
    }
}

impl Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("unknown run_mode: {0} (expected live|paper|backtest)")]
pub struct ParseRunModeError(pub String);

impl FromStr for RunMode {
    type Err = ParseRunModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live" => Ok(RunMode::Live),
            "paper" => Ok(RunMode::Paper),
            "backtest" => Ok(RunMode::Backtest),
            other => Err(ParseRunModeError(other.to_string())),
        }
    }
}
