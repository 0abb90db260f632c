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

//! # Apex-Gateway
//! The gateway process: accepts strategy clients over the framed wire protocol, fans
//! market-data subscriptions out from shared venue connections, forwards order submissions
//! and cancels to venue adapters, and routes fills and unsolicited updates back to the
//! originating strategy by order-id prefix.

/// Venue adapter contract and implementations.
pub mod exchange;

/// Per-client server session: frame parsing and typed request callbacks.
pub mod session;

/// The gateway server: listener, session registry, venue sessions and subscription fan-out.
pub mod server;

pub mod error;

// used by the apex-gx binary
use clap as _;
use ctrlc as _;
use tracing_subscriber as _;
