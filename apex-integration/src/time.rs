use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    ops::{Add, AddAssign, Sub},
    str::FromStr,
    time::Duration,
};
use thiserror::Error;

/// Formatting resolution for [`Time::as_iso8601`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Resolution {
    Milli,
    Micro,
}

/// A point in time: microseconds since the unix epoch.
///
/// `Time::zero()` is the empty sentinel, meaning "no time set" - drained event sources and
/// unset order timestamps use it.
///
/// Caution: [`Time::realtime_now`] always returns the real wall-clock time, never the
/// simulation time. Components that may run in backtest mode must obtain "now" from the
/// event loop instead.
#[derive(
    Debug, Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
pub struct Time(i64);

#[derive(Debug, Clone, Error)]
#[error("cannot parse Time from: {0}")]
pub struct ParseTimeError(pub String);

impl Time {
    pub const fn zero() -> Self {
        Self(0)
    }

    pub const fn from_epoch_us(us: i64) -> Self {
        Self(us)
    }

    pub fn from_epoch_ms(ms: i64) -> Self {
        Self(ms * 1_000)
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp_micros())
    }

    /// Real wall-clock time. Must not be used by any code path that can run in backtest mode.
    pub fn realtime_now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Whether this is the "no time set" sentinel.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn as_epoch_us(&self) -> i64 {
        self.0
    }

    pub fn as_epoch_ms(&self) -> i64 {
        self.0 / 1_000
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_micros(self.0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// ISO-8601 representation, eg/ "2024-02-01T08:30:00.123Z".
    pub fn as_iso8601(&self, resolution: Resolution) -> String {
        match resolution {
            Resolution::Milli => self.as_datetime().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            Resolution::Micro => self.as_datetime().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
        }
    }

    /// Format with a chrono strftime-style specifier.
    pub fn strftime(&self, format: &str) -> String {
        self.as_datetime().format(format).to_string()
    }

    /// Truncate to midnight UTC of the same day.
    pub fn round_to_earliest_day(&self) -> Self {
        const US_PER_DAY: i64 = 86_400 * 1_000_000;
        Self(self.0 - self.0.rem_euclid(US_PER_DAY))
    }
}

impl Add<Duration> for Time {
    type Output = Time;

    fn add(self, rhs: Duration) -> Self::Output {
        Time(self.0 + rhs.as_micros() as i64)
    }
}

impl AddAssign<Duration> for Time {
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs.as_micros() as i64;
    }
}

impl Sub<Time> for Time {
    type Output = TimeDelta;

    fn sub(self, rhs: Time) -> Self::Output {
        TimeDelta::microseconds(self.0 - rhs.0)
    }
}

impl Display for Time {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_iso8601(Resolution::Milli))
    }
}

impl FromStr for Time {
    type Err = ParseTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const DATETIME_FORMATS: [&str; 4] = [
            "%Y-%m-%dT%H:%M:%S%.f",
            "%Y-%m-%dT%H:%M:%S%.fZ",
            "%Y-%m-%d %H:%M:%S%.f",
            "%Y%m%d-%H:%M:%S%.f",
        ];
        const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y%m%d"];

        for format in DATETIME_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                return Ok(Self::from_datetime(naive.and_utc()));
            }
        }

        for format in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(s, format) {
                let naive = date
                    .and_hms_opt(0, 0, 0)
                    .ok_or_else(|| ParseTimeError(s.to_string()))?;
                return Ok(Self::from_datetime(naive.and_utc()));
            }
        }

        Err(ParseTimeError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_parse_formats() {
        struct TestCase {
            input: &'static str,
            expected_iso: &'static str,
        }

        let cases = vec![
            TestCase {
                input: "2024-02-01T08:30:00.123",
                expected_iso: "2024-02-01T08:30:00.123Z",
            },
            TestCase {
                input: "2024-02-01 08:30:00",
                expected_iso: "2024-02-01T08:30:00.000Z",
            },
            TestCase {
                input: "2024-02-01",
                expected_iso: "2024-02-01T00:00:00.000Z",
            },
            TestCase {
                input: "20240201",
                expected_iso: "2024-02-01T00:00:00.000Z",
            },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            let time = Time::from_str(test.input).unwrap();
            assert_eq!(
                time.as_iso8601(Resolution::Milli),
                test.expected_iso,
                "TC{index} failed"
            );
        }
    }

    #[test]
    fn test_time_parse_rejects_garbage() {
        assert!(Time::from_str("not-a-time").is_err());
    }

    #[test]
    fn test_micro_resolution_formatting() {
        let time = Time::from_epoch_us(1_706_774_400_123_456);
        assert!(time.as_iso8601(Resolution::Micro).ends_with(".123456Z"));
        assert!(time.as_iso8601(Resolution::Milli).ends_with(".123Z"));
    }

    #[test]
    fn test_time_ordering_and_arithmetic() {
        let t0 = Time::from_epoch_us(1_000_000);
        let t1 = t0 + Duration::from_millis(500);

        assert!(t1 > t0);
        assert_eq!((t1 - t0).num_microseconds(), Some(500_000));

        let mut t2 = t0;
        t2 += Duration::from_micros(1);
        assert!(t2 > t0);
    }

    #[test]
    fn test_empty_sentinel() {
        assert!(Time::zero().is_empty());
        assert!(!Time::realtime_now().is_empty());
        assert_eq!(Time::default(), Time::zero());
    }

    #[test]
    fn test_round_to_earliest_day() {
        let time = Time::from_str("2024-02-01T08:30:00.123").unwrap();
        let day = time.round_to_earliest_day();
        assert_eq!(day.as_iso8601(Resolution::Milli), "2024-02-01T00:00:00.000Z");
    }
}
