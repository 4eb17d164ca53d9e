pub mod config;
pub mod constants;
pub mod directory;
pub mod entry;
pub mod extractor;
pub mod manifest;
pub mod merger;
pub mod processor;
pub mod reorder;
pub mod shard;
pub mod window;
pub mod zip_indexer;
pub mod zip_sorter;

#[cfg(test)]
mod tests;

pub use config::IndexConfig;
pub use directory::{EmailDirectory, ShardRange};
pub use entry::{IndexEntry, RecordLayout, Span};
pub use manifest::{PrepareManifest, PreparePhase, ShardMetadata};
pub use processor::{ArtifactPaths, IndexPreparer, PreparedIndex};
pub use zip_indexer::ZipIndex;

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepareStats {
    pub lines_read: usize,
    pub records_indexed: usize,
    pub lines_skipped: usize,
    pub distinct_zip_codes: usize,
    pub raw_email_shards: usize,
    pub final_email_shards: usize,
    pub duplicate_emails_dropped: usize,
    pub reordered_bytes: u64,
    pub extract_time_ms: u64,
    pub zip_time_ms: u64,
    pub email_time_ms: u64,
    pub total_time_ms: u64,
}

impl Default for PrepareStats {
    fn default() -> Self {
        Self {
            lines_read: 0,
            records_indexed: 0,
            lines_skipped: 0,
            distinct_zip_codes: 0,
            raw_email_shards: 0,
            final_email_shards: 0,
            duplicate_emails_dropped: 0,
            reordered_bytes: 0,
            extract_time_ms: 0,
            zip_time_ms: 0,
            email_time_ms: 0,
            total_time_ms: 0,
        }
    }
}

pub fn prepare_index(source: &Path, config: IndexConfig) -> Result<PreparedIndex> {
    IndexPreparer::new(source, config)?.run()
}
