//! Durable index format.
//!
//! INI-style text, one section per symbol, each range stored as a numbered
//! pair of keys:
//!
//! ```text
//! [AAPL]
//! s0 = 2020-01-01
//! e0 = 2020-01-10
//! s1 = 2020-02-01
//! e1 = 2020-03-31
//! ```
//!
//! The reader tolerates `:` separators, `#`/`;` comments, upper-case keys and a
//! `[DEFAULT]` section, which is what other INI writers produce for the same data.

use super::index::{CoverageSet, IntervalIndex};
use crate::error::ArchiveError;
use crate::range::{parse_date, DateRange, DATE_FORMAT};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::Path;
use tracing::warn;

/// Section name ignored by the reader.
const DEFAULT_SECTION: &str = "DEFAULT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Start,
    End,
}

/// Keys collected for the section currently being parsed.
struct SectionBuilder {
    name: String,
    header_line: usize,
    starts: BTreeMap<u32, (NaiveDate, usize)>,
    ends: BTreeMap<u32, (NaiveDate, usize)>,
}

impl SectionBuilder {
    fn new(name: String, header_line: usize) -> Self {
        Self {
            name,
            header_line,
            starts: BTreeMap::new(),
            ends: BTreeMap::new(),
        }
    }

    fn finish(self, path: &Path) -> Result<(String, CoverageSet), ArchiveError> {
        let corrupt = |line, reason: String| ArchiveError::IndexCorruption {
            path: path.to_path_buf(),
            line,
            reason,
        };

        if let Some((n, (_, line))) = self.ends.iter().find(|(n, _)| !self.starts.contains_key(*n)) {
            return Err(corrupt(*line, format!("[{}] e{n} has no matching s{n}", self.name)));
        }

        let mut ranges = Vec::with_capacity(self.starts.len());
        for (n, (start, line)) in &self.starts {
            let Some((end, _)) = self.ends.get(n) else {
                return Err(corrupt(*line, format!("[{}] s{n} has no matching e{n}", self.name)));
            };
            let range = DateRange::new(*start, *end)
                .map_err(|e| corrupt(*line, format!("[{}] range {n}: {e}", self.name)))?;
            ranges.push(range);
        }

        let coverage = CoverageSet::from_ranges(ranges.clone());
        if coverage.ranges() != ranges.as_slice() {
            warn!(
                symbol = %self.name,
                line = self.header_line,
                "index section is unsorted or has touching ranges, normalizing"
            );
        }
        Ok((self.name, coverage))
    }
}

/// Parse the index file contents. `path` is only used for error reporting.
pub fn parse(content: &str, path: &Path) -> Result<IntervalIndex, ArchiveError> {
    let corrupt = |line, reason: String| ArchiveError::IndexCorruption {
        path: path.to_path_buf(),
        line,
        reason,
    };

    let mut index = IntervalIndex::new();
    let mut current: Option<SectionBuilder> = None;
    let mut seen = BTreeSet::new();
    let mut in_default = false;

    for (i, raw) in content.lines().enumerate() {
        let line_no = i + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(rest) = line.strip_prefix('[') {
            let name = rest
                .strip_suffix(']')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .ok_or_else(|| corrupt(line_no, format!("malformed section header '{line}'")))?;

            if let Some(done) = current.take() {
                let (symbol, coverage) = done.finish(path)?;
                insert_section(&mut index, symbol, coverage);
            }
            in_default = name == DEFAULT_SECTION;
            if in_default {
                continue;
            }
            if !seen.insert(name.to_string()) {
                return Err(corrupt(line_no, format!("duplicate section [{name}]")));
            }
            current = Some(SectionBuilder::new(name.to_string(), line_no));
            continue;
        }

        if in_default {
            continue;
        }

        let Some(section) = current.as_mut() else {
            return Err(corrupt(line_no, format!("key outside any section: '{line}'")));
        };

        let (key, value) = line
            .split_once(|c| c == '=' || c == ':')
            .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim()))
            .ok_or_else(|| corrupt(line_no, format!("expected 'key = value', got '{line}'")))?;

        let (bound, n) = parse_key(&key)
            .ok_or_else(|| corrupt(line_no, format!("unknown key '{key}' in [{}]", section.name)))?;
        let date = parse_date(value)
            .map_err(|e| corrupt(line_no, format!("[{}] {key}: {e}", section.name)))?;

        let slot = match bound {
            Bound::Start => &mut section.starts,
            Bound::End => &mut section.ends,
        };
        if slot.insert(n, (date, line_no)).is_some() {
            return Err(corrupt(line_no, format!("duplicate key '{key}' in [{}]", section.name)));
        }
    }

    if let Some(done) = current.take() {
        let (symbol, coverage) = done.finish(path)?;
        insert_section(&mut index, symbol, coverage);
    }
    Ok(index)
}

fn insert_section(index: &mut IntervalIndex, symbol: String, coverage: CoverageSet) {
    // A section with no keys says nothing about coverage.
    if !coverage.is_empty() {
        index.insert(symbol, coverage);
    }
}

/// `s12` → (Start, 12), `e0` → (End, 0).
fn parse_key(key: &str) -> Option<(Bound, u32)> {
    let (bound, digits) = match key.as_bytes().first()? {
        b's' => (Bound::Start, &key[1..]),
        b'e' => (Bound::End, &key[1..]),
        _ => return None,
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().map(|n| (bound, n))
}

/// Render the whole index. Sections appear in symbol order.
pub fn render(index: &IntervalIndex) -> String {
    let mut out = String::new();
    for (symbol, coverage) in index.iter() {
        if coverage.is_empty() {
            continue;
        }
        let _ = writeln!(out, "[{symbol}]");
        for (n, range) in coverage.ranges().iter().enumerate() {
            let _ = writeln!(out, "s{n} = {}", range.start().format(DATE_FORMAT));
            let _ = writeln!(out, "e{n} = {}", range.end().format(DATE_FORMAT));
        }
        out.push('\n');
    }
    out
}
