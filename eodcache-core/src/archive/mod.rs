//! On-disk archive: interval index, index file, segment files.

pub mod index;
pub mod index_file;
pub mod segment;
pub mod store;

pub use index::{CoverageSet, IntervalIndex};
pub use segment::{parse_segment_name, segment_file_name, Segment, SegmentReader, SegmentWriter};
pub use store::{IndexState, IndexStore, INDEX_FILE_NAME};
