//! eodcache core: read-through on-disk cache for end-of-day market data.
//!
//! Cached rows live as CSV segments grouped by symbol, and an interval index
//! records which calendar days each symbol already has:
//! - `range` — closed date intervals with daily adjacency
//! - `archive` — interval index, index file, segment splicing
//! - `data` — provider trait and the Yahoo Finance provider
//! - `reader` — `EodReader`, the fetch-only-the-gaps entry point

pub mod archive;
pub mod bar;
pub mod config;
pub mod data;
pub mod error;
pub mod range;
pub mod reader;

pub use archive::{CoverageSet, IndexStore, IntervalIndex, SegmentReader, SegmentWriter};
pub use bar::Bar;
pub use config::ArchiveConfig;
pub use error::ArchiveError;
pub use range::DateRange;
pub use reader::EodReader;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: the reader can be moved to a worker thread.
    #[allow(dead_code)]
    fn assert_send() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<EodReader>();
        require_send::<IndexStore>();
        require_sync::<IntervalIndex>();
        require_sync::<DateRange>();
        require_sync::<Bar>();
    }
}
