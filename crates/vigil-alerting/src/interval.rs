//! Schedule intervals (`"10s"`, `"5m"`, `"1h"`, `"1d"`).

use crate::error::{AlertingError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Unit of an [`Interval`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntervalUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl IntervalUnit {
    fn from_suffix(c: char) -> Option<Self> {
        match c {
            's' => Some(Self::Seconds),
            'm' => Some(Self::Minutes),
            'h' => Some(Self::Hours),
            'd' => Some(Self::Days),
            _ => None,
        }
    }

    fn suffix(self) -> char {
        match self {
            Self::Seconds => 's',
            Self::Minutes => 'm',
            Self::Hours => 'h',
            Self::Days => 'd',
        }
    }

    fn seconds(self) -> i64 {
        match self {
            Self::Seconds => 1,
            Self::Minutes => 60,
            Self::Hours => 60 * 60,
            Self::Days => 24 * 60 * 60,
        }
    }
}

/// Longest accepted interval: 100 years.
pub const MAX_INTERVAL_SECONDS: i64 = 100 * 365 * 24 * 60 * 60;

/// A positive whole number of seconds, minutes, hours or days, at most
/// [`MAX_INTERVAL_SECONDS`] long.
///
/// Serializes as its string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    value: u32,
    unit: IntervalUnit,
}

impl Interval {
    pub fn new(value: u32, unit: IntervalUnit) -> Result<Self> {
        if value == 0 || i64::from(value) * unit.seconds() > MAX_INTERVAL_SECONDS {
            return Err(AlertingError::InvalidInterval(format!("{value}{}", unit.suffix())));
        }
        Ok(Self { value, unit })
    }

    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || AlertingError::InvalidInterval(s.to_string());

        let mut chars = s.chars();
        let unit = chars
            .next_back()
            .and_then(IntervalUnit::from_suffix)
            .ok_or_else(invalid)?;
        let digits = chars.as_str();

        if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let value = digits.parse::<u32>().map_err(|_| invalid())?;
        Self::new(value, unit).map_err(|_| invalid())
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn unit(&self) -> IntervalUnit {
        self.unit
    }

    pub fn as_duration(&self) -> Duration {
        Duration::seconds(i64::from(self.value) * self.unit.seconds())
    }

    pub fn as_std(&self) -> std::time::Duration {
        std::time::Duration::from_secs(u64::from(self.value) * self.unit.seconds() as u64)
    }

    /// Next run time for a run that started at `started_at`.
    ///
    /// Fails when the result is outside the representable date range.
    pub fn next_run_at(&self, started_at: DateTime<Utc>) -> Result<DateTime<Utc>> {
        started_at
            .checked_add_signed(self.as_duration())
            .ok_or_else(|| AlertingError::InvalidInterval(self.to_string()))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.suffix())
    }
}

impl FromStr for Interval {
    type Err = AlertingError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Interval {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Interval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
