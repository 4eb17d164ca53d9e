use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::constants::LINE_TERMINATOR;
use crate::error::{IndexError, Result};
use crate::index::{EmailDirectory, IndexConfig, PrepareManifest, PreparedIndex, ZipIndex};
use crate::query::cache::{ShardCache, SingleSlotCache};
use crate::query::result::QueryResult;
use crate::query::store::RecordStore;

/// Answers zip and email lookups over a completed preparation.
///
/// Zip lookups read the reordered file, where each zip code is one contiguous
/// span. Email lookups resolve the owning shard through the directory and read
/// the source file, since email spans carry source offsets.
pub struct QueryEngine {
    zip_index: ZipIndex,
    directory: EmailDirectory,
    records: RecordStore,
    reordered: RecordStore,
    chunk_size: u64,
    cache: Mutex<Box<dyn ShardCache>>,
}

impl QueryEngine {
    pub fn from_prepared(prepared: PreparedIndex, config: &IndexConfig) -> Result<Self> {
        if !prepared.manifest.is_complete() {
            return Err(not_complete(&prepared.manifest_path, &prepared.manifest));
        }

        let records = RecordStore::open(&prepared.manifest.source_file)?;
        let reordered = RecordStore::open(&prepared.manifest.reordered_file)?;

        Ok(Self {
            zip_index: prepared.zip_index,
            directory: prepared.directory,
            records,
            reordered,
            chunk_size: config.mmap_chunk_size_bytes,
            cache: Mutex::new(Box::new(SingleSlotCache::new())),
        })
    }

    /// Reopens a finished preparation from its manifest. The zip index is read
    /// back from disk and the email directory is rebuilt from the shard files.
    pub fn open(manifest_path: &Path, config: &IndexConfig) -> Result<Self> {
        let manifest = PrepareManifest::load(manifest_path).map_err(|e| {
            IndexError::NotReady(format!(
                "cannot read manifest {}: {:#}",
                manifest_path.display(),
                e
            ))
        })?;
        if !manifest.is_complete() {
            return Err(not_complete(manifest_path, &manifest));
        }

        let zip_index = ZipIndex::load(&manifest.zip_index_file)?;
        let shards: Vec<(usize, PathBuf)> = manifest
            .email_shards
            .iter()
            .map(|s| (s.shard_id, s.file_path.clone()))
            .collect();
        let directory = EmailDirectory::rebuild(&shards)?;

        info!(
            "Opened index for {} ({} zip codes, {} email shards)",
            manifest.source_file.display(),
            zip_index.len(),
            directory.len()
        );

        Self::from_prepared(
            PreparedIndex {
                manifest,
                manifest_path: manifest_path.to_path_buf(),
                zip_index,
                directory,
            },
            config,
        )
    }

    /// Replaces the shard cache policy.
    pub fn with_cache(mut self, cache: Box<dyn ShardCache>) -> Self {
        self.cache = Mutex::new(cache);
        self
    }

    /// All records with this zip code, in reordered-file order. The count is
    /// the number of line terminators in the result.
    pub fn lookup_by_zip(&self, zip: &str) -> Result<QueryResult> {
        let start = Instant::now();
        if zip.is_empty() {
            return Ok(QueryResult::empty(start.elapsed()));
        }

        let span = match self.zip_index.get(zip) {
            Some(span) => span,
            None => return Ok(QueryResult::empty(start.elapsed())),
        };

        if span.length > self.chunk_size {
            warn!(
                "Zip {} spans {} bytes, more than the {} byte read limit; returning no records",
                zip, span.length, self.chunk_size
            );
            return Ok(QueryResult::empty(start.elapsed()));
        }

        let bytes = self.reordered.read(span)?;
        let record_count = count_terminators(bytes);

        Ok(QueryResult {
            result: String::from_utf8_lossy(bytes).into_owned(),
            record_count,
            elapsed: start.elapsed(),
        })
    }

    /// The record with this email. The count is the number of line
    /// terminators in the result plus one.
    pub fn lookup_by_email(&self, email: &str) -> Result<QueryResult> {
        let start = Instant::now();
        if email.is_empty() {
            return Ok(QueryResult::empty(start.elapsed()));
        }

        let range = match self.directory.locate(email) {
            Some(range) => range,
            None => return Ok(QueryResult::empty(start.elapsed())),
        };

        let span = {
            let mut cache = self.cache.lock();
            cache.lookup(range, email)?
        };
        let span = match span {
            Some(span) => span,
            None => return Ok(QueryResult::empty(start.elapsed())),
        };
        debug!("Email {} found in shard {} at {}+{}", email, range.shard_id, span.offset, span.length);

        let bytes = self.records.read(span)?;

        Ok(QueryResult {
            result: String::from_utf8_lossy(bytes).into_owned(),
            record_count: count_terminators(bytes) + 1,
            elapsed: start.elapsed(),
        })
    }

    pub fn zip_index(&self) -> &ZipIndex {
        &self.zip_index
    }

    pub fn directory(&self) -> &EmailDirectory {
        &self.directory
    }

    pub fn resident_shards(&self) -> Vec<usize> {
        self.cache.lock().resident_shards()
    }
}

fn count_terminators(bytes: &[u8]) -> u64 {
    bytes.iter().filter(|&&b| b == LINE_TERMINATOR).count() as u64
}

fn not_complete(manifest_path: &Path, manifest: &PrepareManifest) -> IndexError {
    IndexError::NotReady(format!(
        "preparation recorded in {} is in phase {:?}",
        manifest_path.display(),
        manifest.phase
    ))
}
