use crate::Side;
use derive_more::Constructor;
use rust_decimal::{
    prelude::{FromPrimitive, ToPrimitive},
    Decimal,
};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};
use thiserror::Error;

/// Venue trading rules for an [`Instrument`](crate::instrument::Instrument).
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Constructor,
)]
pub struct InstrumentSpec {
    /// Minimum price increment.
    pub tick_size: ScaledNum,
    /// Minimum quantity increment.
    pub lot_size: ScaledNum,
    /// Minimum order quantity, in base asset units.
    pub min_size: Decimal,
    /// Minimum order notional, in quote asset units.
    pub min_notional: Decimal,
}

/// Exact scaled-integer quantity: `mantissa * 10^-scale`.
///
/// Used for tick and lot sizes so that rounding a raw price or quantity up, down, or in the
/// passive direction is exact, with no binary floating point residue.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Constructor,
)]
pub struct ScaledNum {
    pub mantissa: i64,
    pub scale: u32,
}

#[derive(Debug, Clone, Error)]
#[error("invalid ScaledNum: {0}")]
pub struct ParseScaledNumError(pub String);

impl ScaledNum {
    pub fn zero() -> Self {
        Self::new(0, 0)
    }

    pub fn is_zero(&self) -> bool {
        self.mantissa == 0
    }

    pub fn as_decimal(&self) -> Decimal {
        Decimal::new(self.mantissa, self.scale)
    }

    pub fn as_f64(&self) -> f64 {
        self.as_decimal().to_f64().unwrap_or(f64::NAN)
    }

    /// Round `value` down to the nearest multiple of this increment.
    ///
    /// A zero increment, or a non-finite `value`, returns `value` unchanged.
    pub fn round_down(&self, value: f64) -> f64 {
        self.round_with(value, Decimal::floor)
    }

    /// Round `value` up to the nearest multiple of this increment.
    pub fn round_up(&self, value: f64) -> f64 {
        self.round_with(value, Decimal::ceil)
    }

    /// Round `value` away from the touch: down for a buy, up for a sell.
    pub fn round_passive(&self, value: f64, side: Side) -> f64 {
        match side {
            Side::Buy => self.round_down(value),
            Side::Sell => self.round_up(value),
        }
    }

    fn round_with(&self, value: f64, f: impl Fn(&Decimal) -> Decimal) -> f64 {
        if self.is_zero() || !value.is_finite() {
            return value;
        }
        let step = self.as_decimal();
        let Some(value) = Decimal::from_f64(value) else {
            return value;
        };
        (f(&(value / step)) * step).to_f64().unwrap_or(f64::NAN)
    }
}

impl Display for ScaledNum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_decimal())
    }
}

impl FromStr for ScaledNum {
    type Err = ParseScaledNumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal = Decimal::from_str(s)
            .map_err(|_| ParseScaledNumError(s.to_string()))?
            .normalize();

        let mantissa = i64::try_from(decimal.mantissa())
            .map_err(|_| ParseScaledNumError(s.to_string()))?;

        Ok(Self::new(mantissa, decimal.scale()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_num_parse() {
        struct TestCase {
            input: &'static str,
            expected: ScaledNum,
        }

        let cases = vec![
            TestCase {
                input: "0.01",
                expected: ScaledNum::new(1, 2),
            },
            TestCase {
                input: "0.0001",
                expected: ScaledNum::new(1, 4),
            },
            TestCase {
                input: "0.010",
                expected: ScaledNum::new(1, 2),
            },
            TestCase {
                input: "5",
                expected: ScaledNum::new(5, 0),
            },
            TestCase {
                input: "0.25",
                expected: ScaledNum::new(25, 2),
            },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            assert_eq!(
                ScaledNum::from_str(test.input).unwrap(),
                test.expected,
                "TC{index} failed"
            );
        }
    }

    #[test]
    fn test_round_down_and_up_are_exact() {
        let tick = ScaledNum::new(1, 2); // 0.01

        assert_eq!(tick.round_down(100.019), 100.01);
        assert_eq!(tick.round_up(100.011), 100.02);
        assert_eq!(tick.round_down(100.01), 100.01);
        assert_eq!(tick.round_up(100.01), 100.01);
    }

    #[test]
    fn test_round_passive_direction() {
        let tick = ScaledNum::new(1, 2);

        // buy rounds down (away from the offer)
        assert_eq!(tick.round_passive(100.019, Side::Buy), 100.01);
        assert!(tick.round_passive(100.019, Side::Buy) <= 100.019);

        // sell rounds up (away from the bid)
        assert_eq!(tick.round_passive(100.011, Side::Sell), 100.02);
        assert!(tick.round_passive(100.011, Side::Sell) >= 100.011);
    }

    #[test]
    fn test_round_passive_idempotent() {
        let tick = ScaledNum::new(1, 4);

        for side in [Side::Buy, Side::Sell] {
            for raw in [0.12345678, 99.99995, 3.0, 0.0001] {
                let once = tick.round_passive(raw, side);
                let twice = tick.round_passive(once, side);
                assert_eq!(once, twice, "round_passive not idempotent for {raw} {side}");
            }
        }
    }

    #[test]
    fn test_zero_increment_is_identity() {
        let none = ScaledNum::zero();
        assert_eq!(none.round_down(123.456), 123.456);
        assert_eq!(none.round_up(123.456), 123.456);
    }
}
