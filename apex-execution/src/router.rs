use crate::{error::ExecutionError, order::Order};
use std::sync::Arc;

/// Routing contract between an [`Order`] and whatever executes it: the gateway client in
/// live/paper mode, the simulated matching engine in backtests.
///
/// `send_order` never fails synchronously - a router that cannot route schedules an
/// asynchronous rejection onto the event loop, exactly as a venue reject would arrive.
pub trait OrderRouter: Send + Sync {
    fn send_order(&self, order: &Arc<Order>);

    /// Request a cancel. An error means the request could not even be issued; rejection by
    /// the venue arrives asynchronously instead.
    fn cancel_order(&self, order: &Arc<Order>) -> Result<(), ExecutionError>;

    /// Whether this router currently has a route to the venue.
    fn is_up(&self) -> bool;
}
