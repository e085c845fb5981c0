//! In-memory interval index: symbol → coverage set.
//!
//! A coverage set is strictly increasing by start date and pairwise
//! non-overlapping AND non-adjacent. Every constructor normalizes, so a
//! `CoverageSet` value can never violate that.

use crate::range::{next_day, previous_day, DateRange};
use std::collections::BTreeMap;

/// Sorted, coalesced list of cached date ranges for one symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageSet {
    ranges: Vec<DateRange>,
}

impl CoverageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from arbitrary ranges (any order, overlaps allowed).
    pub fn from_ranges(mut ranges: Vec<DateRange>) -> Self {
        ranges.sort();
        Self {
            ranges: coalesce(ranges),
        }
    }

    pub fn ranges(&self) -> &[DateRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Merge pending ranges into this set.
    ///
    /// Two-way merge by start date, then one coalescing pass.
    pub fn merge(&self, pending: &[DateRange]) -> CoverageSet {
        let mut pending = pending.to_vec();
        pending.sort();

        let mut merged = Vec::with_capacity(self.ranges.len() + pending.len());
        let mut existing = self.ranges.iter().peekable();
        let mut incoming = pending.into_iter().peekable();
        loop {
            let take_incoming = match (existing.peek(), incoming.peek()) {
                (Some(e), Some(i)) => i.start() < e.start(),
                (None, Some(_)) => true,
                (Some(_), None) => false,
                (None, None) => break,
            };
            if take_incoming {
                merged.extend(incoming.next());
            } else {
                merged.extend(existing.next().copied());
            }
        }

        CoverageSet {
            ranges: coalesce(merged),
        }
    }

    /// Sub-ranges of `request` not covered by this set, in chronological order.
    pub fn gaps(&self, request: &DateRange) -> Vec<DateRange> {
        let end = request.end();
        let mut gaps = Vec::new();
        // First day not yet known to be covered; None once coverage runs past NaiveDate::MAX.
        let mut uncovered = Some(request.start());

        for cached in &self.ranges {
            let Some(from) = uncovered else { break };
            if from > end || cached.start() > end {
                break;
            }
            if cached.start() > from {
                // cached.start() > from >= NaiveDate::MIN, so the day before exists
                if let Some(until) = previous_day(cached.start()) {
                    gaps.push(DateRange::from_bounds(from, until.min(end)));
                }
            }
            if cached.end() >= from {
                uncovered = next_day(cached.end());
            }
        }

        if let Some(from) = uncovered {
            if from <= end {
                gaps.push(DateRange::from_bounds(from, end));
            }
        }
        gaps
    }

    /// Cached ranges clipped to `request`.
    pub fn filled(&self, request: &DateRange) -> Vec<DateRange> {
        self.ranges
            .iter()
            .filter_map(|r| r.intersect(request))
            .collect()
    }

    /// True when every day of `request` is cached.
    pub fn covers(&self, request: &DateRange) -> bool {
        self.gaps(request).is_empty()
    }
}

/// Fuse consecutive ranges whose gap is less than one full day. Input must be sorted by start.
fn coalesce(sorted: Vec<DateRange>) -> Vec<DateRange> {
    let mut out: Vec<DateRange> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match out.last_mut() {
            Some(last) if last.touches(&range) => *last = last.span(&range),
            _ => out.push(range),
        }
    }
    out
}

/// Mapping from symbol (case-sensitive) to its coverage set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalIndex {
    symbols: BTreeMap<String, CoverageSet>,
}

impl IntervalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, symbol: &str) -> Option<&CoverageSet> {
        self.symbols.get(symbol)
    }

    pub fn insert(&mut self, symbol: impl Into<String>, coverage: CoverageSet) {
        self.symbols.insert(symbol.into(), coverage);
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Symbols in lexical order with their coverage.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CoverageSet)> {
        self.symbols.iter().map(|(s, c)| (s.as_str(), c))
    }

    /// Gaps for `symbol` over `request`. Unknown symbols are one whole gap.
    pub fn compute_gaps(&self, symbol: &str, request: &DateRange) -> Vec<DateRange> {
        match self.symbols.get(symbol) {
            Some(coverage) => coverage.gaps(request),
            None => vec![*request],
        }
    }

    /// Cached parts of `request` for `symbol`.
    pub fn compute_filled(&self, symbol: &str, request: &DateRange) -> Vec<DateRange> {
        self.symbols
            .get(symbol)
            .map(|c| c.filled(request))
            .unwrap_or_default()
    }

    /// Copy of this index with every pending list merged into its symbol.
    pub fn merged_with(&self, pending: &BTreeMap<String, Vec<DateRange>>) -> IntervalIndex {
        let mut next = self.clone();
        for (symbol, ranges) in pending {
            if ranges.is_empty() {
                continue;
            }
            let coverage = match self.symbols.get(symbol) {
                Some(existing) => existing.merge(ranges),
                None => CoverageSet::from_ranges(ranges.clone()),
            };
            next.symbols.insert(symbol.clone(), coverage);
        }
        next
    }
}
