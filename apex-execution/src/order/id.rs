use crate::error::ExecutionError;
use apex_integration::time::Time;
use derive_more::Display;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Fixed width of the strategy-id prefix embedded at the front of every order id.
///
/// Inbound fills and unsolicited updates are demultiplexed at the gateway by this prefix
/// alone, so the width is part of the wire contract.
pub const STRATEGY_ID_SIZE: usize = 5;

/// Engine-assigned order identifier, unique for the process lifetime:
/// `<strategy-id><hex8 process-start-epoch-seconds><hex8 monotonic counter>`.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
pub struct OrderId(pub SmolStr);

impl OrderId {
    pub fn new<S: AsRef<str>>(id: S) -> Self {
        Self(SmolStr::new(id))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Split into (strategy-id prefix, remainder). `None` if the id is too short to carry
    /// a prefix.
    pub fn split_strategy_prefix(&self) -> Option<(&str, &str)> {
        split_strategy_prefix(self.0.as_str())
    }
}

/// Split any order-id string into its fixed-width strategy prefix and remainder.
pub fn split_strategy_prefix(order_id: &str) -> Option<(&str, &str)> {
    if order_id.len() < STRATEGY_ID_SIZE || !order_id.is_char_boundary(STRATEGY_ID_SIZE) {
        return None;
    }
    Some(order_id.split_at(STRATEGY_ID_SIZE))
}

/// Strategy identifier: the fixed-width order-id prefix, unique per gateway.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
pub struct StrategyId(pub SmolStr);

impl StrategyId {
    /// Construct after validating the exact prefix width and charset.
    pub fn new<S: AsRef<str>>(id: S) -> Result<Self, ExecutionError> {
        let id = id.as_ref();
        if id.len() != STRATEGY_ID_SIZE {
            return Err(ExecutionError::InvalidStrategyId(format!(
                "strategy id {id:?} must be exactly {STRATEGY_ID_SIZE} chars"
            )));
        }
        if !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ExecutionError::InvalidStrategyId(format!(
                "strategy id {id:?} must be ASCII alphanumeric"
            )));
        }
        Ok(Self(SmolStr::new(id)))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Allocates process-unique order ids from a strictly monotonic counter.
///
/// Exhaustion of the 32-bit counter is a fatal error: no further orders can be created by
/// this process.
#[derive(Debug)]
pub struct OrderIdGenerator {
    start_epoch_sec: u32,
    counter: Mutex<u32>,
}

impl OrderIdGenerator {
    pub fn new(startup_time: Time) -> Self {
        Self {
            start_epoch_sec: (startup_time.as_epoch_ms() / 1_000) as u32,
            counter: Mutex::new(0),
        }
    }

    pub fn next(&self, strategy_id: &StrategyId) -> Result<OrderId, ExecutionError> {
        let mut counter = self.counter.lock();
        if *counter == u32::MAX {
            return Err(ExecutionError::OrderIdExhausted);
        }
        let id = format!(
            "{}{:08x}{:08x}",
            strategy_id.as_str(),
            self.start_epoch_sec,
            *counter
        );
        *counter += 1;
        Ok(OrderId::new(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_id_format_and_split_round_trip() {
        let strategy = StrategyId::new("DEMO1").unwrap();
        let generator = OrderIdGenerator::new(Time::from_epoch_us(1_700_000_000_000_000));

        let id = generator.next(&strategy).unwrap();
        assert_eq!(id.as_str().len(), STRATEGY_ID_SIZE + 16);

        let (prefix, remainder) = id.split_strategy_prefix().unwrap();
        assert_eq!(prefix, "DEMO1");
        assert_eq!(remainder.len(), 16);

        // rejoining yields the original id
        assert_eq!(format!("{prefix}{remainder}"), id.as_str());
    }

    #[test]
    fn test_generator_is_strictly_monotonic() {
        let strategy = StrategyId::new("DEMO1").unwrap();
        let generator = OrderIdGenerator::new(Time::from_epoch_us(1_700_000_000_000_000));

        let ids: Vec<String> = (0..100)
            .map(|_| generator.next(&strategy).unwrap().as_str().to_string())
            .collect();

        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        sorted.dedup();
        assert_eq!(sorted.len(), 100);
    }

    #[test]
    fn test_strategy_id_width_enforced() {
        assert!(StrategyId::new("DEMO1").is_ok());
        assert!(StrategyId::new("DEMO").is_err());
        assert!(StrategyId::new("DEMO12").is_err());
        assert!(StrategyId::new("DE O1").is_err());
    }

    #[test]
    fn test_split_rejects_short_ids() {
        assert!(split_strategy_prefix("DEM").is_none());
        assert_eq!(
            split_strategy_prefix("DEMO1abcd"),
            Some(("DEMO1", "abcd"))
        );
    }
}
