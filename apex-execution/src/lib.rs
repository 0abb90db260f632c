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

//! # Apex-Execution
//! The order lifecycle engine: the [`Order`](order::Order) state machine and fill ledger,
//! process-wide [`OrderService`](service::OrderService) registry, the
//! [`OrderRouter`](router::OrderRouter) contract with its gateway-backed and simulated
//! implementations, and per-instrument [`Position`](position::Position) accounting.

/// Order object, attributes, state machine and events.
pub mod order;

/// Process-wide order registry, id allocation and inbound routing.
pub mod service;

/// The `send_order`/`cancel_order`/`is_up` routing contract.
pub mod router;

/// Gateway client session and the realtime order router built on it.
pub mod client;

/// Simulated matching engine: price-indexed resting books fed by the market-data stream.
pub mod sim;

/// Position accounting: startup, bought/sold quantity and cost, PnL.
pub mod position;

pub mod error;
