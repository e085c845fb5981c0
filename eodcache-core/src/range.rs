//! Closed calendar-date intervals.
//!
//! Coverage is tracked at daily granularity: two ranges are adjacent when the
//! second starts exactly one day after the first ends.

use crate::error::ArchiveError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Date format used in segment names and the index file.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Inclusive `[start, end]` range of calendar days. `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ArchiveError> {
        if start > end {
            return Err(ArchiveError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Caller guarantees `start <= end`.
    pub(crate) fn from_bounds(start: NaiveDate, end: NaiveDate) -> Self {
        debug_assert!(start <= end, "inverted range {start}..{end}");
        Self { start, end }
    }

    /// Range covering a single day.
    pub fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// Parse two `YYYY-MM-DD` strings into a range.
    pub fn parse(start: &str, end: &str) -> Result<Self, ArchiveError> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of calendar days in the range.
    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// True when `other` starts no later than the day after `self` ends.
    ///
    /// Expects `self.start <= other.start`. Overlap counts as touching.
    pub fn touches(&self, other: &DateRange) -> bool {
        match next_day(self.end) {
            Some(after) => other.start <= after,
            None => true,
        }
    }

    /// Clip to `bounds`, `None` when disjoint.
    pub fn intersect(&self, bounds: &DateRange) -> Option<DateRange> {
        if !self.overlaps(bounds) {
            return None;
        }
        Some(DateRange {
            start: self.start.max(bounds.start),
            end: self.end.min(bounds.end),
        })
    }

    /// Smallest range spanning both.
    pub fn span(&self, other: &DateRange) -> DateRange {
        DateRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{}",
            self.start.format(DATE_FORMAT),
            self.end.format(DATE_FORMAT)
        )
    }
}

pub fn parse_date(s: &str) -> Result<NaiveDate, ArchiveError> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).map_err(|e| ArchiveError::InvalidDate {
        value: s.to_string(),
        reason: e.to_string(),
    })
}

pub(crate) fn next_day(date: NaiveDate) -> Option<NaiveDate> {
    date.succ_opt()
}

pub(crate) fn previous_day(date: NaiveDate) -> Option<NaiveDate> {
    date.pred_opt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn rejects_inverted_range() {
        let err = DateRange::new(d(2020, 1, 5), d(2020, 1, 1)).unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidRange { .. }));
    }

    #[test]
    fn single_day_range_is_valid() {
        let r = DateRange::new(d(2020, 1, 1), d(2020, 1, 1)).unwrap();
        assert_eq!(r.num_days(), 1);
        assert_eq!(r, DateRange::day(d(2020, 1, 1)));
    }

    #[test]
    fn touching_is_one_day_threshold() {
        let a = DateRange::parse("2020-01-01", "2020-01-05").unwrap();
        let adjacent = DateRange::parse("2020-01-06", "2020-01-10").unwrap();
        let apart = DateRange::parse("2020-01-07", "2020-01-10").unwrap();
        let overlapping = DateRange::parse("2020-01-03", "2020-01-10").unwrap();

        assert!(a.touches(&adjacent));
        assert!(!a.touches(&apart));
        assert!(a.touches(&overlapping));
    }

    #[test]
    fn touching_at_max_date() {
        let a = DateRange::day(NaiveDate::MAX);
        assert!(a.touches(&DateRange::day(NaiveDate::MAX)));
    }

    #[test]
    fn intersect_clips_to_bounds() {
        let r = DateRange::parse("2020-01-01", "2020-01-31").unwrap();
        let bounds = DateRange::parse("2020-01-10", "2020-02-10").unwrap();
        assert_eq!(
            r.intersect(&bounds),
            Some(DateRange::parse("2020-01-10", "2020-01-31").unwrap())
        );
        let disjoint = DateRange::parse("2021-01-01", "2021-01-02").unwrap();
        assert_eq!(r.intersect(&disjoint), None);
    }

    #[test]
    fn display_uses_iso_dates() {
        let r = DateRange::parse("2020-01-01", "2020-01-05").unwrap();
        assert_eq!(r.to_string(), "2020-01-01..2020-01-05");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            parse_date("2020-13-01"),
            Err(ArchiveError::InvalidDate { .. })
        ));
    }
}
