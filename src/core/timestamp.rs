//! Freeze timestamps.
//!
//! The wire grammar is `YYYYMMDDTHHMMSSNNNNNN±ZZZZ`: date, literal `T`,
//! time with microseconds, numeric UTC offset. Example:
//! `20260824T153012123456+0200`. Archives embed the timestamp both in
//! their filename and in their metadata.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::error::{Error, Result};

const FORMAT: &[FormatItem<'static>] = format_description!(
    "[year][month][day]T[hour][minute][second][subsecond digits:6][offset_hour sign:mandatory][offset_minute]"
);

/// The moment a bead was frozen, microsecond precision, offset preserved.
///
/// Ordering is by UTC instant; the raw string breaks ties so that the same
/// instant written with different offsets still sorts deterministically.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FreezeTime {
    raw: String,
    instant: OffsetDateTime,
}

impl FreezeTime {
    /// Parse the strict bead grammar. No defaulting, no trailing garbage.
    pub fn parse(s: &str) -> Result<Self> {
        let instant = OffsetDateTime::parse(s, FORMAT).map_err(|e| Error::InvalidTimestamp {
            raw: s.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            raw: s.to_string(),
            instant,
        })
    }

    /// Capture the current wall-clock time, rendered in UTC.
    pub fn now() -> Self {
        Self::from_instant(OffsetDateTime::now_utc())
    }

    pub(crate) fn from_instant(instant: OffsetDateTime) -> Self {
        // Truncate below microseconds so the rendered string parses back to
        // the same instant.
        let instant = instant
            .replace_nanosecond(instant.microsecond() * 1000)
            .unwrap_or(instant);
        let raw = instant
            .format(FORMAT)
            .unwrap_or_else(|_| String::from("19700101T000000000000+0000"));
        Self { raw, instant }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn instant(&self) -> OffsetDateTime {
        self.instant
    }
}

impl PartialEq for FreezeTime {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for FreezeTime {}

impl std::hash::Hash for FreezeTime {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl PartialOrd for FreezeTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FreezeTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.instant
            .cmp(&other.instant)
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl fmt::Debug for FreezeTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FreezeTime({})", self.raw)
    }
}

impl fmt::Display for FreezeTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl TryFrom<String> for FreezeTime {
    type Error = Error;
    fn try_from(s: String) -> Result<Self> {
        FreezeTime::parse(&s)
    }
}

impl From<FreezeTime> for String {
    fn from(t: FreezeTime) -> String {
        t.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_form() {
        let t = FreezeTime::parse("20260824T153012123456+0200").unwrap();
        assert_eq!(t.as_str(), "20260824T153012123456+0200");
        assert_eq!(t.instant().year(), 2026);
        assert_eq!(t.instant().microsecond(), 123456);
        assert_eq!(t.instant().offset().whole_hours(), 2);
    }

    #[test]
    fn rejects_malformed_input() {
        for bad in [
            "",
            "20260824",
            "20260824T153012+0200",
            "20260824T153012123456",
            "20260824T153012123456+0200x",
            "2026-08-24T15:30:12.123456+02:00",
        ] {
            assert!(FreezeTime::parse(bad).is_err(), "{:?} should fail", bad);
        }
    }

    #[test]
    fn orders_by_utc_instant_across_offsets() {
        // 10:00+0200 is 08:00 UTC, earlier than 09:00+0000.
        let a = FreezeTime::parse("20260824T100000000000+0200").unwrap();
        let b = FreezeTime::parse("20260824T090000000000+0000").unwrap();
        assert!(a < b);
    }

    #[test]
    fn same_instant_ties_on_raw_string() {
        let a = FreezeTime::parse("20260824T080000000000+0000").unwrap();
        let b = FreezeTime::parse("20260824T100000000000+0200").unwrap();
        assert_ne!(a, b);
        assert_eq!(a.instant(), b.instant());
        assert!(a < b);
    }

    #[test]
    fn now_roundtrips_through_its_own_rendering() {
        let now = FreezeTime::now();
        let back = FreezeTime::parse(now.as_str()).unwrap();
        assert_eq!(now, back);
    }
}
