//! Daily OHLCV row, the payload stored in segment files.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One end-of-day row. Field order is the CSV column order (date first).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub adj_close: f64,
}

/// Column names, used when rendering rows with a header (segment files have none).
pub const BAR_COLUMNS: [&str; 7] = [
    "date",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "adj_close",
];

/// Sort rows by date and drop later duplicates of the same day.
pub fn sort_and_dedup(bars: &mut Vec<Bar>) {
    bars.sort_by_key(|b| b.date);
    bars.dedup_by_key(|b| b.date);
}

#[cfg(test)]
pub(crate) fn sample_bar(date: NaiveDate, close: f64) -> Bar {
    Bar {
        date,
        open: close - 1.0,
        high: close + 1.0,
        low: close - 2.0,
        close,
        volume: 1_000,
        adj_close: close,
    }
}
