use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::constants::MANIFEST_VERSION;
use crate::index::PrepareStats;

/// Persisted record of a preparation run; a completed manifest is all that is
/// needed to reopen the index for queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareManifest {
    pub version: u32,
    pub timestamp: u64,
    pub phase: PreparePhase,
    pub source_file: PathBuf,
    pub work_directory: PathBuf,
    pub reordered_file: PathBuf,
    pub zip_index_file: PathBuf,
    pub email_shards: Vec<ShardMetadata>,
    pub stats: PrepareStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PreparePhase {
    Initialization,
    Extracting,
    SortingZip,
    Reordering,
    IndexingZip,
    SortingEmailShards,
    MergingEmail,
    Completed,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardMetadata {
    pub shard_id: usize,
    pub file_path: PathBuf,
    pub entry_count: usize,
    pub file_size_bytes: u64,
    pub is_sorted: bool,
    pub first_key: Option<String>,
    pub last_key: Option<String>,
}

impl ShardMetadata {
    pub fn new(shard_id: usize, file_path: PathBuf) -> Self {
        Self {
            shard_id,
            file_path,
            entry_count: 0,
            file_size_bytes: 0,
            is_sorted: false,
            first_key: None,
            last_key: None,
        }
    }
}

impl PrepareManifest {
    pub fn new(
        source_file: PathBuf,
        work_directory: PathBuf,
        reordered_file: PathBuf,
        zip_index_file: PathBuf,
    ) -> Self {
        Self {
            version: MANIFEST_VERSION,
            timestamp: current_timestamp(),
            phase: PreparePhase::Initialization,
            source_file,
            work_directory,
            reordered_file,
            zip_index_file,
            email_shards: Vec::new(),
            stats: PrepareStats::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let manifest: Self = serde_json::from_str(&content)?;
        if manifest.version != MANIFEST_VERSION {
            anyhow::bail!(
                "Unsupported manifest version {} (expected {})",
                manifest.version,
                MANIFEST_VERSION
            );
        }
        Ok(manifest)
    }

    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn update_timestamp(&mut self) {
        self.timestamp = current_timestamp();
    }

    pub fn is_complete(&self) -> bool {
        self.phase == PreparePhase::Completed
    }

    pub fn shard_paths(&self) -> Vec<PathBuf> {
        self.email_shards.iter().map(|s| s.file_path.clone()).collect()
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
