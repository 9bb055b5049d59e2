//! Timestamp normalization into calendar-aware canonical instants.

use std::borrow::Cow;
use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::features::FeatureError;

/// Text form used when an instant is written back to storage.
pub const CANONICAL_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Offset-less grammars, tried in order after RFC 3339.
const NAIVE_DATETIME_FORMATS: [&str; 8] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
];

/// Offset-carrying grammars that RFC 3339 does not cover: missing seconds,
/// space separator, colon-less offsets. `%z` also accepts `+01:00`.
const OFFSET_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%d %H:%M%z",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

/// An instant in UTC wall-clock time with the calendar fields the model uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CanonicalTimestamp {
    instant: NaiveDateTime,
}

impl CanonicalTimestamp {
    pub fn from_naive(instant: NaiveDateTime) -> Self {
        Self { instant }
    }

    pub fn instant(&self) -> NaiveDateTime {
        self.instant
    }

    pub fn hour(&self) -> u32 {
        self.instant.hour()
    }

    /// 0 = Monday .. 6 = Sunday.
    pub fn day_of_week(&self) -> u32 {
        self.instant.weekday().num_days_from_monday()
    }

    pub fn month(&self) -> u32 {
        self.instant.month()
    }

    pub fn is_weekend(&self) -> bool {
        self.day_of_week() >= 5
    }

    pub fn to_canonical_string(&self) -> String {
        self.instant.format(CANONICAL_TIMESTAMP_FORMAT).to_string()
    }
}

impl fmt::Display for CanonicalTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.instant.format(CANONICAL_TIMESTAMP_FORMAT))
    }
}

impl Serialize for CanonicalTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_canonical_string())
    }
}

impl<'de> Deserialize<'de> for CanonicalTimestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        normalize_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}

/// Parses `text` against the enumerated grammars.
///
/// Offsets are folded into UTC so that `2025-12-07T16:00:00+01:00` and
/// `2025-12-07 15:00:00` normalize to the same value.
pub fn normalize_timestamp(text: &str) -> Result<CanonicalTimestamp, FeatureError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(FeatureError::InvalidTimestamp(text.to_string()));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(CanonicalTimestamp::from_naive(
            dt.with_timezone(&Utc).naive_utc(),
        ));
    }

    let numeric = with_numeric_utc_offset(trimmed);
    for format in OFFSET_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&numeric, format) {
            return Ok(CanonicalTimestamp::from_naive(
                dt.with_timezone(&Utc).naive_utc(),
            ));
        }
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(CanonicalTimestamp::from_naive(naive));
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
                return Ok(CanonicalTimestamp::from_naive(midnight));
            }
        }
    }

    Err(FeatureError::InvalidTimestamp(text.to_string()))
}

/// Rewrites a trailing `Z` designator as `+00:00` so the `%z` grammars see it.
fn with_numeric_utc_offset(text: &str) -> Cow<'_, str> {
    match text.strip_suffix(|c: char| c == 'Z' || c == 'z') {
        Some(rest) if !rest.is_empty() => Cow::Owned(format!("{rest}+00:00")),
        _ => Cow::Borrowed(text),
    }
}
