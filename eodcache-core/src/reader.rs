//! Top-level read-through API.
//!
//! `get` answers a request from cached segments where it can and fetches only
//! the gaps:
//! 1. compute gaps and filled ranges from the index
//! 2. read cached rows for the filled ranges
//! 3. fetch each gap, commit it as a segment (pending write)
//! 4. flush pending writes into the index file
//!
//! A failed gap fetch aborts the request. Gaps committed before the failure
//! stay on disk and in the pending buffer; the next successful flush records
//! them.

use crate::archive::{CoverageSet, IndexStore, IntervalIndex, SegmentReader, SegmentWriter};
use crate::bar::{sort_and_dedup, Bar};
use crate::config::{normalize_archive_dir, ArchiveConfig};
use crate::data::provider::{DataProvider, ProviderRegistry};
use crate::error::{validate_symbol, ArchiveError};
use crate::range::DateRange;
use std::path::{Path, PathBuf};
use tracing::info;

pub struct EodReader {
    config: ArchiveConfig,
    store: IndexStore,
    writer: SegmentWriter,
    reader: SegmentReader,
    providers: ProviderRegistry,
}

impl EodReader {
    /// Reader over `config.archive_dir` with no providers registered.
    pub fn new(config: ArchiveConfig) -> Self {
        let store = IndexStore::open(config.index_path());
        let writer = SegmentWriter::new(&config.archive_dir);
        let reader = SegmentReader::new(&config.archive_dir);
        Self {
            config,
            store,
            writer,
            reader,
            providers: ProviderRegistry::new(),
        }
    }

    pub fn with_provider(mut self, provider: Box<dyn DataProvider>) -> Self {
        self.providers.register(provider);
        self
    }

    pub fn register_provider(&mut self, provider: Box<dyn DataProvider>) {
        self.providers.register(provider);
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    pub fn archive_dir(&self) -> &Path {
        &self.config.archive_dir
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// Rows for `symbol` over `range`, ordered by date.
    ///
    /// `source` picks the provider for missing ranges; `None` uses the configured default.
    pub fn get(
        &mut self,
        symbol: &str,
        range: DateRange,
        source: Option<&str>,
    ) -> Result<Vec<Bar>, ArchiveError> {
        validate_symbol(symbol)?;
        let source = source.unwrap_or(self.config.default_source.as_str()).to_string();

        let gaps = self.store.compute_gaps(symbol, &range)?;
        let filled = self.store.compute_filled(symbol, &range)?;

        let mut rows = Vec::new();
        for cached in &filled {
            rows.extend(self.reader.read_range(symbol, cached)?);
        }

        if !gaps.is_empty() {
            let provider = self
                .providers
                .get(&source)
                .ok_or_else(|| ArchiveError::UnknownSource { name: source.clone() })?;

            for gap in &gaps {
                info!(symbol, %gap, source = %source, "fetching missing range");
                let fetched = provider
                    .fetch(symbol, gap.start(), gap.end())
                    .map_err(|e| ArchiveError::Provider {
                        symbol: symbol.to_string(),
                        range: *gap,
                        source: e,
                    })?;
                self.writer
                    .write_segment(&mut self.store, symbol, *gap, &fetched)?;
                rows.extend(fetched.into_iter().filter(|b| gap.contains(b.date)));
            }
        }

        self.store.flush()?;
        sort_and_dedup(&mut rows);
        Ok(rows)
    }

    /// Missing ranges for `symbol` without fetching anything.
    pub fn gaps(&mut self, symbol: &str, range: DateRange) -> Result<Vec<DateRange>, ArchiveError> {
        validate_symbol(symbol)?;
        self.store.compute_gaps(symbol, &range)
    }

    /// Coverage of one symbol as recorded in the index.
    pub fn coverage(&mut self, symbol: &str) -> Result<CoverageSet, ArchiveError> {
        validate_symbol(symbol)?;
        Ok(self.store.coverage(symbol)?.unwrap_or_default())
    }

    /// Every symbol's coverage, re-read from disk.
    pub fn status(&mut self) -> Result<IntervalIndex, ArchiveError> {
        Ok(self.store.reload()?.clone())
    }

    /// Write pending updates to the index file.
    pub fn flush(&mut self) -> Result<(), ArchiveError> {
        self.store.flush()
    }

    /// Replace the index with coverage derived from the segment files on disk.
    pub fn rebuild_index(&mut self) -> Result<IntervalIndex, ArchiveError> {
        let index = self.reader.coverage_index()?;
        info!(symbols = index.len(), "rebuilt archive index from segment files");
        self.store.replace(index.clone())?;
        Ok(index)
    }

    /// Point the reader at another archive root.
    ///
    /// Pending writes are flushed into the current archive first.
    pub fn set_archive_directory(&mut self, path: impl Into<PathBuf>) -> Result<(), ArchiveError> {
        self.store.flush()?;
        self.config.archive_dir = normalize_archive_dir(path.into());
        self.store = IndexStore::open(self.config.index_path());
        self.writer = SegmentWriter::new(&self.config.archive_dir);
        self.reader = SegmentReader::new(&self.config.archive_dir);
        info!(archive_dir = %self.config.archive_dir.display(), "archive directory changed");
        Ok(())
    }
}

impl std::fmt::Debug for EodReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EodReader")
            .field("archive_dir", &self.config.archive_dir)
            .field("providers", &self.providers)
            .field("index_open", &self.store.is_open())
            .finish()
    }
}
