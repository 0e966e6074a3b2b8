//! Time interval values (`"90"`, `"30s"`, `"5m"`, `"2h"`, `"7d"`, `"1w"`).

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// A configured time interval.
///
/// Deserializes from a bare integer (seconds) or a string with an optional
/// unit suffix. Serializes back to the largest unit that divides it exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "IntervalRepr", into = "IntervalRepr")]
pub struct Interval(Duration);

impl Interval {
    /// Create an interval from whole seconds.
    pub fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    /// The interval as a [`Duration`].
    pub fn as_duration(&self) -> Duration {
        self.0
    }

    /// The interval in whole seconds.
    pub fn as_secs(&self) -> u64 {
        self.0.as_secs()
    }
}

impl From<Duration> for Interval {
    fn from(d: Duration) -> Self {
        Self(d)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.as_secs();
        for (unit, size) in UNITS_DESC {
            if secs != 0 && secs % size == 0 {
                return write!(f, "{}{}", secs / size, unit);
            }
        }
        write!(f, "{}s", secs)
    }
}

const UNITS_DESC: [(&str, u64); 4] = [("w", 604_800), ("d", 86_400), ("h", 3_600), ("m", 60)];

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum IntervalRepr {
    Seconds(u64),
    Text(String),
}

impl TryFrom<IntervalRepr> for Interval {
    type Error = ConfigError;

    fn try_from(repr: IntervalRepr) -> Result<Self> {
        match repr {
            IntervalRepr::Seconds(secs) => Ok(Interval::from_secs(secs)),
            IntervalRepr::Text(text) => parse_interval(&text),
        }
    }
}

impl From<Interval> for IntervalRepr {
    fn from(interval: Interval) -> Self {
        IntervalRepr::Text(interval.to_string())
    }
}

/// Parse a time interval.
///
/// Accepts a number of seconds, optionally followed by a unit:
/// `s`/`sec`/`seconds`, `m`/`min`/`minutes`, `h`/`hour`/`hours`,
/// `d`/`day`/`days`, `w`/`week`/`weeks`.
pub fn parse_interval(input: &str) -> Result<Interval> {
    let text = input.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, unit) = text.split_at(split);
    if digits.is_empty() {
        return Err(ConfigError::InvalidInterval(input.to_string()));
    }

    let amount: u64 = digits
        .parse()
        .map_err(|_| ConfigError::InvalidInterval(input.to_string()))?;
    let multiplier = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" => 60,
        "h" | "hr" | "hour" | "hours" => 3_600,
        "d" | "day" | "days" => 86_400,
        "w" | "week" | "weeks" => 604_800,
        _ => return Err(ConfigError::InvalidInterval(input.to_string())),
    };

    amount
        .checked_mul(multiplier)
        .map(Interval::from_secs)
        .ok_or_else(|| ConfigError::InvalidInterval(input.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_interval("90").unwrap().as_secs(), 90);
        assert_eq!(parse_interval("30s").unwrap().as_secs(), 30);
        assert_eq!(parse_interval("5m").unwrap().as_secs(), 300);
        assert_eq!(parse_interval("2h").unwrap().as_secs(), 7_200);
        assert_eq!(parse_interval("30 days").unwrap().as_secs(), 2_592_000);
        assert_eq!(parse_interval("1W").unwrap().as_secs(), 604_800);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_interval("soon"),
            Err(ConfigError::InvalidInterval(_))
        ));
        assert!(parse_interval("").is_err());
        assert!(parse_interval("10y").is_err());
        assert!(parse_interval("99999999999999999999d").is_err());
    }

    #[test]
    fn test_display_picks_largest_exact_unit() {
        assert_eq!(Interval::from_secs(0).to_string(), "0s");
        assert_eq!(Interval::from_secs(45).to_string(), "45s");
        assert_eq!(Interval::from_secs(120).to_string(), "2m");
        assert_eq!(Interval::from_secs(86_400 * 3).to_string(), "3d");
        assert_eq!(Interval::from_secs(3_601).to_string(), "3601s");
    }
}
