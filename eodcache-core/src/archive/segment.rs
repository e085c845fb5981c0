//! Segment files: one header-less CSV per contiguous cached range.
//!
//! Layout: `{archive}/{SYMBOL}/{start}_to_{end}.csv`
//!
//! A write splices the new rows with the segment ending the day before (if
//! any) and the segment starting the day after (if any), so a contiguous run
//! of cached days always lives in exactly one file.

use super::index::{CoverageSet, IntervalIndex};
use super::store::IndexStore;
use crate::bar::{sort_and_dedup, Bar};
use crate::error::{validate_symbol, ArchiveError};
use crate::range::{next_day, previous_day, DateRange, DATE_FORMAT};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const SEGMENT_EXTENSION: &str = "csv";
const NAME_SEPARATOR: &str = "_to_";

/// One segment file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub range: DateRange,
    pub path: PathBuf,
}

/// `2020-01-01_to_2020-01-31.csv`
pub fn segment_file_name(range: &DateRange) -> String {
    format!(
        "{}{NAME_SEPARATOR}{}.{SEGMENT_EXTENSION}",
        range.start().format(DATE_FORMAT),
        range.end().format(DATE_FORMAT)
    )
}

/// Inverse of [`segment_file_name`]. `None` for anything that is not a segment.
pub fn parse_segment_name(name: &str) -> Option<DateRange> {
    let stem = name.strip_suffix(SEGMENT_EXTENSION)?.strip_suffix('.')?;
    let (start, end) = stem.split_once(NAME_SEPARATOR)?;
    let start = NaiveDate::parse_from_str(start, DATE_FORMAT).ok()?;
    let end = NaiveDate::parse_from_str(end, DATE_FORMAT).ok()?;
    DateRange::new(start, end).ok()
}

fn symbol_dir(root: &Path, symbol: &str) -> PathBuf {
    root.join(symbol)
}

/// Segments of one symbol directory, sorted by range. A missing directory has none.
fn list_dir(dir: &Path) -> Result<Vec<Segment>, ArchiveError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ArchiveError::storage("list segments", dir)(e)),
    };

    let mut segments = Vec::new();
    for entry in entries {
        let entry = entry.map_err(ArchiveError::storage("list segments", dir))?;
        let name = entry.file_name();
        // Skip temp files and anything else that is not `<date>_to_<date>.csv`
        let Some(range) = name.to_str().and_then(parse_segment_name) else {
            continue;
        };
        segments.push(Segment {
            range,
            path: entry.path(),
        });
    }
    segments.sort_by_key(|s| s.range);
    Ok(segments)
}

/// Serialize rows as header-less CSV, date first.
fn encode_rows(bars: &[Bar], path: &Path) -> Result<Vec<u8>, ArchiveError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    for bar in bars {
        writer.serialize(bar).map_err(ArchiveError::payload(path))?;
    }
    writer
        .into_inner()
        .map_err(|e| ArchiveError::storage("encode rows", path)(e.into_error()))
}

fn append_file(out: &mut fs::File, source: &Path, target: &Path) -> Result<(), ArchiveError> {
    let bytes = fs::read(source).map_err(ArchiveError::storage("read segment", source))?;
    out.write_all(&bytes)
        .map_err(ArchiveError::storage("write segment", target))?;
    if !bytes.is_empty() && !bytes.ends_with(b"\n") {
        out.write_all(b"\n")
            .map_err(ArchiveError::storage("write segment", target))?;
    }
    Ok(())
}

/// Pick the longest candidate when a crash left more than one segment at a boundary.
fn pick_neighbour<'a>(candidates: Vec<&'a Segment>, symbol: &str) -> Option<&'a Segment> {
    if candidates.len() > 1 {
        warn!(
            symbol,
            count = candidates.len(),
            "several segments share a boundary, splicing with the longest"
        );
    }
    candidates.into_iter().max_by_key(|s| s.range.num_days())
}

/// Write path: commits fetched rows as segments and records them in the index store.
#[derive(Debug, Clone)]
pub struct SegmentWriter {
    root: PathBuf,
}

impl SegmentWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist `bars` for `range` under `symbol`, splicing with adjacent segments,
    /// then record the range as a pending write in `store`.
    ///
    /// Rows dated outside `range` are dropped. An empty `bars` still produces a
    /// (possibly empty) segment so the calendar range counts as cached.
    pub fn write_segment(
        &self,
        store: &mut IndexStore,
        symbol: &str,
        range: DateRange,
        bars: &[Bar],
    ) -> Result<Segment, ArchiveError> {
        validate_symbol(symbol)?;
        let dir = symbol_dir(&self.root, symbol);
        fs::create_dir_all(&dir).map_err(ArchiveError::storage("create symbol dir", &dir))?;

        let mut rows: Vec<Bar> = bars
            .iter()
            .filter(|b| range.contains(b.date))
            .cloned()
            .collect();
        if rows.len() != bars.len() {
            debug!(
                symbol,
                %range,
                dropped = bars.len() - rows.len(),
                "dropping rows outside the written range"
            );
        }
        sort_and_dedup(&mut rows);
        let payload = encode_rows(&rows, &dir)?;

        let existing = list_dir(&dir)?;
        let previous = previous_day(range.start()).and_then(|boundary| {
            pick_neighbour(
                existing.iter().filter(|s| s.range.end() == boundary).collect(),
                symbol,
            )
        });
        let next = next_day(range.end()).and_then(|boundary| {
            pick_neighbour(
                existing.iter().filter(|s| s.range.start() == boundary).collect(),
                symbol,
            )
        });
        // Older files lying entirely inside the new range hold rows we just re-fetched.
        let superseded: Vec<&Segment> = existing
            .iter()
            .filter(|s| range.start() <= s.range.start() && s.range.end() <= range.end())
            .collect();

        let segment = self.commit_segment(&dir, range, &payload, previous, next)?;
        for stale in superseded {
            if stale.path != segment.path {
                debug!(symbol, path = %stale.path.display(), "removing superseded segment");
                remove_segment(&stale.path)?;
            }
        }

        store.record_write(symbol, range)?;
        Ok(segment)
    }

    /// Write `previous ++ payload ++ next` to a temp file, rename it into place,
    /// then delete the spliced neighbours.
    ///
    /// A crash before the rename leaves the old files untouched; a crash after it
    /// can leave a redundant neighbour next to the complete merged file.
    pub fn commit_segment(
        &self,
        dir: &Path,
        range: DateRange,
        payload: &[u8],
        previous: Option<&Segment>,
        next: Option<&Segment>,
    ) -> Result<Segment, ArchiveError> {
        let mut merged = range;
        if let Some(prev) = previous {
            merged = merged.span(&prev.range);
        }
        if let Some(next) = next {
            merged = merged.span(&next.range);
        }

        let final_path = dir.join(segment_file_name(&merged));
        let tmp_path = dir.join(format!(".{}.tmp", segment_file_name(&merged)));

        let written = (|| -> Result<(), ArchiveError> {
            let mut out = fs::File::create(&tmp_path)
                .map_err(ArchiveError::storage("create segment", &tmp_path))?;
            if let Some(prev) = previous {
                append_file(&mut out, &prev.path, &tmp_path)?;
            }
            out.write_all(payload)
                .map_err(ArchiveError::storage("write segment", &tmp_path))?;
            if let Some(next) = next {
                append_file(&mut out, &next.path, &tmp_path)?;
            }
            out.sync_all()
                .map_err(ArchiveError::storage("sync segment", &tmp_path))?;
            fs::rename(&tmp_path, &final_path)
                .map_err(ArchiveError::storage("rename segment", &final_path))
        })();
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        for spliced in previous.into_iter().chain(next) {
            if spliced.path != final_path {
                debug!(path = %spliced.path.display(), "removing spliced segment");
                remove_segment(&spliced.path)?;
            }
        }

        debug!(
            path = %final_path.display(),
            written = %range,
            merged = %merged,
            "committed segment"
        );
        Ok(Segment {
            range: merged,
            path: final_path,
        })
    }
}

fn remove_segment(path: &Path) -> Result<(), ArchiveError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ArchiveError::storage("remove segment", path)(e)),
    }
}

/// Read path: lists segments and loads cached rows.
#[derive(Debug, Clone)]
pub struct SegmentReader {
    root: PathBuf,
}

impl SegmentReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Segments for `symbol` sorted by start date.
    pub fn list_segments(&self, symbol: &str) -> Result<Vec<Segment>, ArchiveError> {
        validate_symbol(symbol)?;
        list_dir(&symbol_dir(&self.root, symbol))
    }

    /// Cached rows for `symbol` dated within `range`, sorted by date.
    pub fn read_range(&self, symbol: &str, range: &DateRange) -> Result<Vec<Bar>, ArchiveError> {
        let mut bars = Vec::new();
        for segment in self.list_segments(symbol)? {
            if !segment.range.overlaps(range) {
                continue;
            }
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(false)
                .from_path(&segment.path)
                .map_err(ArchiveError::payload(&segment.path))?;
            for row in reader.deserialize::<Bar>() {
                let bar = row.map_err(ArchiveError::payload(&segment.path))?;
                if range.contains(bar.date) {
                    bars.push(bar);
                }
            }
        }
        sort_and_dedup(&mut bars);
        Ok(bars)
    }

    /// Every symbol directory with at least one segment.
    pub fn scan(&self) -> Result<BTreeMap<String, Vec<Segment>>, ArchiveError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(ArchiveError::storage("scan archive", &self.root)(e)),
        };

        let mut symbols = BTreeMap::new();
        for entry in entries {
            let entry = entry.map_err(ArchiveError::storage("scan archive", &self.root))?;
            let is_dir = entry
                .file_type()
                .map_err(ArchiveError::storage("scan archive", &entry.path()))?
                .is_dir();
            let Some(symbol) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !is_dir || validate_symbol(&symbol).is_err() {
                continue;
            }
            let segments = list_dir(&entry.path())?;
            if !segments.is_empty() {
                symbols.insert(symbol, segments);
            }
        }
        Ok(symbols)
    }

    /// Interval index derived purely from segment file names.
    pub fn coverage_index(&self) -> Result<IntervalIndex, ArchiveError> {
        let mut index = IntervalIndex::new();
        for (symbol, segments) in self.scan()? {
            let ranges = segments.into_iter().map(|s| s.range).collect();
            index.insert(symbol, CoverageSet::from_ranges(ranges));
        }
        Ok(index)
    }
}
