//! Durable interval index with an explicit open/closed lifecycle.
//!
//! The store reads the index file at most once per open (`load`), unless asked
//! to `reload`. Writes are buffered as pending ranges by `record_write` and only
//! reach the index file on `flush`, which rewrites the whole file through a temp
//! file and an atomic rename.
//!
//! No locking: two processes sharing one archive can read a stale index or
//! overwrite each other's flush (last writer wins).

use super::index::{CoverageSet, IntervalIndex};
use super::index_file;
use crate::error::{validate_symbol, ArchiveError};
use crate::range::DateRange;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default file name of the index inside the archive root.
pub const INDEX_FILE_NAME: &str = "archive.data";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexState {
    /// Nothing read yet (or explicitly closed).
    Closed,
    /// Index file read; the in-memory copy is authoritative until reload.
    Opened(IntervalIndex),
}

/// Owner of the interval index and the pending update buffer.
#[derive(Debug)]
pub struct IndexStore {
    path: PathBuf,
    state: IndexState,
    pending: BTreeMap<String, Vec<DateRange>>,
}

impl IndexStore {
    /// Store backed by `path`. Nothing is read until first use.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: IndexState::Closed,
            pending: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, IndexState::Opened(_))
    }

    /// Read the index file if the store is closed. A missing file is an empty index.
    pub fn load(&mut self) -> Result<&IntervalIndex, ArchiveError> {
        if let IndexState::Closed = self.state {
            let index = read_index(&self.path)?;
            self.state = IndexState::Opened(index);
        }
        match &self.state {
            IndexState::Opened(index) => Ok(index),
            IndexState::Closed => unreachable!("load leaves the store opened"),
        }
    }

    /// Re-read the index file, discarding the in-memory copy. Pending writes are kept.
    pub fn reload(&mut self) -> Result<&IntervalIndex, ArchiveError> {
        let index = read_index(&self.path)?;
        self.state = IndexState::Opened(index);
        self.load()
    }

    /// Drop the in-memory index. Pending writes are kept.
    pub fn close(&mut self) {
        self.state = IndexState::Closed;
    }

    /// Missing sub-ranges of `request` for `symbol`, oldest first.
    pub fn compute_gaps(
        &mut self,
        symbol: &str,
        request: &DateRange,
    ) -> Result<Vec<DateRange>, ArchiveError> {
        Ok(self.load()?.compute_gaps(symbol, request))
    }

    /// Cached sub-ranges of `request` for `symbol`, oldest first.
    pub fn compute_filled(
        &mut self,
        symbol: &str,
        request: &DateRange,
    ) -> Result<Vec<DateRange>, ArchiveError> {
        Ok(self.load()?.compute_filled(symbol, request))
    }

    /// Coverage for one symbol as last loaded (pending writes not included).
    pub fn coverage(&mut self, symbol: &str) -> Result<Option<CoverageSet>, ArchiveError> {
        Ok(self.load()?.get(symbol).cloned())
    }

    /// Buffer a freshly written range. The index itself is untouched until `flush`.
    ///
    /// Symbols become section headers, so anything `load` could not read back is rejected here.
    pub fn record_write(&mut self, symbol: &str, range: DateRange) -> Result<(), ArchiveError> {
        validate_symbol(symbol)?;
        debug!(symbol, %range, "recording pending write");
        self.pending
            .entry(symbol.to_string())
            .or_default()
            .push(range);
        Ok(())
    }

    pub fn pending(&self) -> &BTreeMap<String, Vec<DateRange>> {
        &self.pending
    }

    pub fn has_pending(&self) -> bool {
        self.pending.values().any(|ranges| !ranges.is_empty())
    }

    /// Merge pending writes into the index and rewrite the index file.
    ///
    /// No-op when nothing is pending. On error the pending buffer and the
    /// in-memory index are left exactly as they were.
    pub fn flush(&mut self) -> Result<(), ArchiveError> {
        if !self.has_pending() {
            return Ok(());
        }

        self.load()?;
        let IndexState::Opened(current) = &self.state else {
            unreachable!("load leaves the store opened");
        };
        let merged = current.merged_with(&self.pending);
        write_index(&self.path, &merged)?;

        info!(
            path = %self.path.display(),
            symbols = self.pending.len(),
            "flushed pending archive writes"
        );
        self.state = IndexState::Opened(merged);
        self.pending.clear();
        Ok(())
    }

    /// Replace the whole index (e.g. rebuilt from segment files) and persist it.
    ///
    /// Pending writes are discarded since `index` is expected to already reflect them.
    pub fn replace(&mut self, index: IntervalIndex) -> Result<(), ArchiveError> {
        for (symbol, _) in index.iter() {
            validate_symbol(symbol)?;
        }
        write_index(&self.path, &index)?;
        self.state = IndexState::Opened(index);
        self.pending.clear();
        Ok(())
    }
}

fn read_index(path: &Path) -> Result<IntervalIndex, ArchiveError> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let index = index_file::parse(&content, path)?;
            debug!(path = %path.display(), symbols = index.len(), "loaded archive index");
            Ok(index)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no archive index yet, starting empty");
            Ok(IntervalIndex::new())
        }
        Err(e) => Err(ArchiveError::storage("read index", path)(e)),
    }
}

/// Regenerate the index file: write to `<path>.tmp`, then rename over `path`.
fn write_index(path: &Path, index: &IntervalIndex) -> Result<(), ArchiveError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(ArchiveError::storage("create archive dir", parent))?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    fs::write(&tmp_path, index_file::render(index))
        .map_err(ArchiveError::storage("write index", &tmp_path))?;

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        ArchiveError::storage("replace index", path)(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn r(start: &str, end: &str) -> DateRange {
        DateRange::parse(start, end).unwrap()
    }

    fn store_in(dir: &TempDir) -> IndexStore {
        IndexStore::open(dir.path().join(INDEX_FILE_NAME))
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        assert!(!store.is_open());
        assert!(store.load().unwrap().is_empty());
        assert!(store.is_open());
    }

    #[test]
    fn flush_persists_and_clears_pending() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.record_write("AAPL", r("2020-01-01", "2020-01-05")).unwrap();
        store.record_write("AAPL", r("2020-01-06", "2020-01-10")).unwrap();
        assert!(store.has_pending());

        store.flush().unwrap();
        assert!(!store.has_pending());

        let content = fs::read_to_string(store.path()).unwrap();
        assert_eq!(content, "[AAPL]\ns0 = 2020-01-01\ne0 = 2020-01-10\n\n");

        let mut fresh = store_in(&dir);
        assert_eq!(
            fresh.coverage("AAPL").unwrap().unwrap().ranges(),
            &[r("2020-01-01", "2020-01-10")]
        );
    }

    #[test]
    fn unreadable_symbols_never_reach_the_index_file() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        for symbol in ["A\n[B", "X]", "DEFAULT", ""] {
            let err = store
                .record_write(symbol, r("2020-01-01", "2020-01-02"))
                .unwrap_err();
            assert!(matches!(err, ArchiveError::InvalidSymbol { .. }), "{symbol:?}");
        }
        assert!(!store.has_pending());

        store.record_write("AAPL", r("2020-01-01", "2020-01-02")).unwrap();
        store.flush().unwrap();
        assert_eq!(store_in(&dir).load().unwrap().len(), 1);
    }

    #[test]
    fn record_write_does_not_touch_index() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.record_write("AAPL", r("2020-01-01", "2020-01-05")).unwrap();
        assert_eq!(
            store.compute_gaps("AAPL", &r("2020-01-01", "2020-01-05")).unwrap(),
            vec![r("2020-01-01", "2020-01-05")]
        );
        assert!(!store.path().exists());
    }

    #[test]
    fn flush_with_nothing_pending_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.flush().unwrap();
        assert!(!store.path().exists());

        store.record_write("SPY", r("2020-01-01", "2020-01-02")).unwrap();
        store.flush().unwrap();
        let before = fs::read_to_string(store.path()).unwrap();
        let modified = fs::metadata(store.path()).unwrap().modified().unwrap();

        store.flush().unwrap();
        assert_eq!(fs::read_to_string(store.path()).unwrap(), before);
        assert_eq!(fs::metadata(store.path()).unwrap().modified().unwrap(), modified);
    }

    #[test]
    fn failed_flush_keeps_pending_and_index() {
        let dir = TempDir::new().unwrap();
        // A directory where the index file should be makes the final rename fail.
        let index_path = dir.path().join(INDEX_FILE_NAME);
        fs::create_dir(&index_path).unwrap();
        fs::write(index_path.join("occupied"), b"x").unwrap();

        let mut store = IndexStore::open(&index_path);
        store.state = IndexState::Opened(IntervalIndex::new());
        store.record_write("AAPL", r("2020-01-01", "2020-01-05")).unwrap();

        let err = store.flush().unwrap_err();
        assert!(matches!(err, ArchiveError::Storage { .. }));
        assert_eq!(store.pending()["AAPL"], vec![r("2020-01-01", "2020-01-05")]);
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn load_is_read_once_until_reload() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        assert!(store.load().unwrap().is_empty());

        // Another writer updates the file behind our back.
        fs::write(store.path(), "[MSFT]\ns0 = 2021-01-01\ne0 = 2021-01-31\n").unwrap();
        assert!(store.load().unwrap().is_empty());

        let reloaded = store.reload().unwrap();
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.get("MSFT").is_some());
    }

    #[test]
    fn close_forces_a_fresh_read() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.load().unwrap();
        fs::write(store.path(), "[MSFT]\ns0 = 2021-01-01\ne0 = 2021-01-31\n").unwrap();
        store.close();
        assert!(!store.is_open());
        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[test]
    fn corrupt_index_is_surfaced() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        fs::write(store.path(), "[AAPL]\ns0 = 2020-01-01\n").unwrap();
        assert!(matches!(store.load(), Err(ArchiveError::IndexCorruption { .. })));
        assert!(!store.is_open());
    }

    #[test]
    fn flush_rewrites_whole_file_from_memory() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        fs::write(
            store.path(),
            "[AAPL]\ns0 = 2020-01-01\ne0 = 2020-01-05\n\n[MSFT]\ns0 = 2021-01-01\ne0 = 2021-01-02\n",
        )
        .unwrap();

        store.record_write("AAPL", r("2020-01-06", "2020-01-06")).unwrap();
        store.flush().unwrap();

        let content = fs::read_to_string(store.path()).unwrap();
        assert_eq!(
            content,
            "[AAPL]\ns0 = 2020-01-01\ne0 = 2020-01-06\n\n[MSFT]\ns0 = 2021-01-01\ne0 = 2021-01-02\n\n"
        );
        assert!(!dir.path().join("archive.data.tmp").exists());
    }

    #[test]
    fn replace_overwrites_index_and_drops_pending() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.record_write("AAPL", r("2020-01-01", "2020-01-05")).unwrap();

        let mut index = IntervalIndex::new();
        index.insert("SPY", CoverageSet::from_ranges(vec![r("2020-02-01", "2020-02-03")]));
        store.replace(index.clone()).unwrap();

        assert!(!store.has_pending());
        assert_eq!(store_in(&dir).load().unwrap(), &index);
    }
}
