//! Error taxonomy for the archive.
//!
//! Everything surfaces to the immediate caller. The only recovery performed
//! internally is treating "already exists" as success when creating symbol
//! directories.

use crate::data::provider::DataError;
use crate::range::DateRange;
use chrono::NaiveDate;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("storage error: {op} {}: {source}", path.display())]
    Storage {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("fetch failed for {symbol} over {range}: {source}")]
    Provider {
        symbol: String,
        range: DateRange,
        #[source]
        source: DataError,
    },

    #[error("corrupt archive index {} (line {line}): {reason}", path.display())]
    IndexCorruption {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("malformed segment rows in {}: {source}", path.display())]
    Payload {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("invalid symbol '{symbol}': {reason}")]
    InvalidSymbol { symbol: String, reason: &'static str },

    #[error("invalid date range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("invalid date '{value}': {reason}")]
    InvalidDate { value: String, reason: String },

    #[error("unknown data source '{name}'")]
    UnknownSource { name: String },

    #[error("cannot read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config TOML: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config error: {0}")]
    Config(String),
}

impl ArchiveError {
    pub(crate) fn storage<'a>(
        op: &'static str,
        path: &'a Path,
    ) -> impl FnOnce(io::Error) -> Self + 'a {
        move |source| ArchiveError::Storage {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn payload(path: &Path) -> impl FnOnce(csv::Error) -> Self + '_ {
        move |source| ArchiveError::Payload {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Reject symbols that cannot be used as both a directory name and an index section.
pub fn validate_symbol(symbol: &str) -> Result<(), ArchiveError> {
    let invalid = |reason| {
        Err(ArchiveError::InvalidSymbol {
            symbol: symbol.to_string(),
            reason,
        })
    };
    if symbol.is_empty() {
        return invalid("empty");
    }
    if symbol.starts_with('.') {
        return invalid("leading dot (hidden or reserved path component)");
    }
    if symbol.eq_ignore_ascii_case("DEFAULT") {
        return invalid("reserved index section name");
    }
    if symbol
        .chars()
        .any(|c| matches!(c, '/' | '\\' | '[' | ']') || c.is_whitespace() || c.is_control())
    {
        return invalid("contains a path separator, bracket or whitespace");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_tickers() {
        for sym in ["AAPL", "BRK.B", "^GSPC", "BTC-USD", "aapl"] {
            assert!(validate_symbol(sym).is_ok(), "{sym} should be valid");
        }
    }

    #[test]
    fn rejects_path_like_symbols() {
        for sym in ["", ".", "..", ".INX", "a/b", "a\\b", "[X]", "A B", "DEFAULT"] {
            assert!(
                matches!(validate_symbol(sym), Err(ArchiveError::InvalidSymbol { .. })),
                "{sym:?} should be rejected"
            );
        }
    }

    #[test]
    fn storage_error_names_the_path() {
        let err = ArchiveError::storage("rename", Path::new("/tmp/x.csv"))(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "denied",
        ));
        let msg = err.to_string();
        assert!(msg.contains("rename"));
        assert!(msg.contains("/tmp/x.csv"));
    }
}
