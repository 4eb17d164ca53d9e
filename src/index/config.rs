use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::index::constants::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub work_directory: Option<PathBuf>,
    pub mmap_chunk_size_bytes: u64,
    pub email_shard_size_bytes: u64,
    pub io_buffer_size_kb: usize,
    pub min_fields: usize,
    pub zip_field_index: usize,
    pub email_field_index: usize,
    pub processing_threads: usize,
    pub parallel_shard_sort: bool,
    pub keep_intermediate_files: bool,
    pub memory_usage_percent: f64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            work_directory: None,
            mmap_chunk_size_bytes: MMAP_CHUNK_SIZE_BYTES,
            email_shard_size_bytes: EMAIL_SHARD_SIZE_BYTES,
            io_buffer_size_kb: DEFAULT_IO_BUFFER_SIZE_KB,
            min_fields: MIN_FIELDS_PER_LINE,
            zip_field_index: ZIP_FIELD_INDEX,
            email_field_index: EMAIL_FIELD_INDEX,
            processing_threads: DEFAULT_PROCESSING_THREADS,
            parallel_shard_sort: true,
            keep_intermediate_files: false,
            memory_usage_percent: DEFAULT_MEMORY_USAGE_PERCENT,
        }
    }
}

impl IndexConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.mmap_chunk_size_bytes == 0 {
            return Err(anyhow::anyhow!("mmap_chunk_size_bytes must be greater than 0"));
        }

        if self.email_shard_size_bytes == 0 {
            return Err(anyhow::anyhow!("email_shard_size_bytes must be greater than 0"));
        }

        if self.io_buffer_size_kb < MIN_IO_BUFFER_SIZE_KB {
            return Err(anyhow::anyhow!(
                "io_buffer_size_kb must be at least {}",
                MIN_IO_BUFFER_SIZE_KB
            ));
        }

        if self.zip_field_index >= self.min_fields || self.email_field_index >= self.min_fields {
            return Err(anyhow::anyhow!(
                "Key field indices must be below min_fields ({})",
                self.min_fields
            ));
        }

        if self.zip_field_index == self.email_field_index {
            return Err(anyhow::anyhow!("Zip and email key fields must differ"));
        }

        if self.processing_threads < MIN_PROCESSING_THREADS
            || self.processing_threads > MAX_PROCESSING_THREADS {
            return Err(anyhow::anyhow!(
                "Processing threads must be between {} and {}",
                MIN_PROCESSING_THREADS, MAX_PROCESSING_THREADS
            ));
        }

        if self.memory_usage_percent < MIN_MEMORY_USAGE_PERCENT
            || self.memory_usage_percent > MAX_MEMORY_USAGE_PERCENT {
            return Err(anyhow::anyhow!(
                "Memory usage percent must be between {} and {}",
                MIN_MEMORY_USAGE_PERCENT, MAX_MEMORY_USAGE_PERCENT
            ));
        }

        Ok(())
    }

    pub fn memory_limit_bytes(&self) -> u64 {
        use sysinfo::System;
        let mut system = System::new();
        system.refresh_memory();

        let total_memory = system.total_memory() as f64;
        (total_memory * self.memory_usage_percent / 100.0) as u64
    }

    pub fn io_buffer_size_bytes(&self) -> usize {
        self.io_buffer_size_kb * BYTES_PER_KB
    }

    /// Directory that receives every artifact derived from `source`.
    pub fn work_directory_for(&self, source: &Path) -> PathBuf {
        match &self.work_directory {
            Some(dir) => dir.clone(),
            None => source
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}
