use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};
use thiserror::Error;

/// Lifecycle state of an [`Order`](super::Order).
///
/// Allowed transitions: `Init→Sent` (on send), `Sent→Live` (on ack), `Sent→Closed`
/// (immediate reject or fill), `Live→Closed` (cancel, fill, lapse or error). `Closed` is
/// terminal: no transition ever leaves it.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Init,
    Sent,
    Live,
    Closed,
}

impl Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                OrderState::Init => "init",
                OrderState::Sent => "sent",
                OrderState::Live => "live",
                OrderState::Closed => "closed",
            }
        )
    }
}

/// Why an order reached [`OrderState::Closed`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    Cancelled,
    Filled,
    Rejected,
    /// Expired or unsolicited venue cancel.
    Lapsed,
    Error,
}

impl Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                CloseReason::Cancelled => "cancelled",
                CloseReason::Filled => "filled",
                CloseReason::Rejected => "rejected",
                CloseReason::Lapsed => "lapsed",
                CloseReason::Error => "error",
            }
        )
    }
}

/// Orthogonal cancel-request state. Transitions here do not change the order state until
/// the venue confirms the cancel.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelState {
    None,
    /// Cancel request is pending at the venue.
    Canceling,
    /// Cancel request rejected by the venue.
    Rejected,
    /// Cancel confirmed; the order is closed.
    Canceled,
    /// Cancel request failed internally.
    Error,
}

/// Order duration policy.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeInForce {
    Gtc,
    Ioc,
    Fok,
}

impl Display for TimeInForce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                TimeInForce::Gtc => "gtc",
                TimeInForce::Ioc => "ioc",
                TimeInForce::Fok => "fok",
            }
        )
    }
}

#[derive(Debug, Clone, Error)]
#[error("unknown time-in-force: {0}")]
pub struct ParseTimeInForceError(pub String);

impl FromStr for TimeInForce {
    type Err = ParseTimeInForceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gtc" => Ok(TimeInForce::Gtc),
            "ioc" => Ok(TimeInForce::Ioc),
            "fok" => Ok(TimeInForce::Fok),
            other => Err(ParseTimeInForceError(other.to_string())),
        }
    }
}

/// Order pricing policy. Only limit orders rest on a book.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Limit,
    Market,
}

impl Default for OrderType {
    fn default() -> Self {
        Self::Limit
    }
}
