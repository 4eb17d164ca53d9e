use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::constants::*;
use crate::error::{IndexError, PrepareStage, Result};
use crate::index::directory::EmailDirectory;
use crate::index::entry::RecordLayout;
use crate::index::extractor::LineExtractor;
use crate::index::manifest::{PrepareManifest, PreparePhase, ShardMetadata};
use crate::index::merger::{ReshardOutput, ShardMerger};
use crate::index::reorder::DataReorderer;
use crate::index::shard::{remove_if_exists, remove_shard_files, EmailShardSorter};
use crate::index::zip_indexer::{ZipIndex, ZipIndexer};
use crate::index::zip_sorter::ZipSorter;
use crate::index::{IndexConfig, PrepareStats};

/// Every file a preparation run reads or writes, named `<stem>.<suffix>`
/// inside the work directory.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub work_directory: PathBuf,
    pub stem: String,
    pub zip_entries: PathBuf,
    pub zip_grouped: PathBuf,
    pub zip_index: PathBuf,
    pub reordered: PathBuf,
    pub merged_email: PathBuf,
    pub manifest: PathBuf,
}

impl ArtifactPaths {
    pub fn new(source: &Path, work_directory: &Path) -> Self {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "data".to_string());
        let artifact = |suffix: &str| work_directory.join(format!("{}.{}", stem, suffix));

        Self {
            work_directory: work_directory.to_path_buf(),
            zip_entries: artifact(ZIP_ENTRIES_SUFFIX),
            zip_grouped: artifact(ZIP_GROUPED_SUFFIX),
            zip_index: artifact(ZIP_INDEX_SUFFIX),
            reordered: artifact(REORDERED_SUFFIX),
            merged_email: artifact(MERGED_EMAIL_SUFFIX),
            manifest: artifact(MANIFEST_SUFFIX),
            stem,
        }
    }

    pub fn raw_shard_prefix(&self) -> String {
        format!("{}.{}", self.stem, RAW_EMAIL_SHARD_PREFIX)
    }

    pub fn shard_prefix(&self) -> String {
        format!("{}.{}", self.stem, EMAIL_SHARD_PREFIX)
    }
}

/// Everything a query engine needs from a finished preparation.
#[derive(Debug)]
pub struct PreparedIndex {
    pub manifest: PrepareManifest,
    pub manifest_path: PathBuf,
    pub zip_index: ZipIndex,
    pub directory: EmailDirectory,
}

/// Drives the preparation pipeline: extract, then the zip path (sort,
/// reorder, index), then the email path (shard sort, merge, reshard).
pub struct IndexPreparer {
    source: PathBuf,
    config: IndexConfig,
    layout: RecordLayout,
    paths: ArtifactPaths,
    manifest: PrepareManifest,
    stats: PrepareStats,
    start_time: Instant,
}

impl IndexPreparer {
    pub fn new(source: &Path, config: IndexConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| IndexError::InvalidConfig(e.to_string()))?;

        if !source.is_file() {
            return Err(IndexError::SourceNotFound(source.to_path_buf()));
        }
        let source = std::fs::canonicalize(source)?;

        let work_directory = config.work_directory_for(&source);
        std::fs::create_dir_all(&work_directory)?;
        let work_directory = std::fs::canonicalize(&work_directory)?;

        let shard_budget = config
            .email_shard_size_bytes
            .saturating_mul(config.processing_threads as u64);
        let memory_limit = config.memory_limit_bytes();
        if config.parallel_shard_sort && memory_limit > 0 && shard_budget > memory_limit {
            warn!(
                "Sorting {} shards of {:.1} MB at once may exceed the memory limit of {:.1} MB",
                config.processing_threads,
                config.email_shard_size_bytes as f64 / BYTES_PER_MB as f64,
                memory_limit as f64 / BYTES_PER_MB as f64
            );
        }

        let paths = ArtifactPaths::new(&source, &work_directory);
        let manifest = PrepareManifest::new(
            source.clone(),
            work_directory,
            paths.reordered.clone(),
            paths.zip_index.clone(),
        );

        Ok(Self {
            layout: RecordLayout::from_config(&config),
            source,
            config,
            paths,
            manifest,
            stats: PrepareStats::default(),
            start_time: Instant::now(),
        })
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    pub fn manifest_path(&self) -> &Path {
        &self.paths.manifest
    }

    pub fn run(mut self) -> Result<PreparedIndex> {
        info!("Preparing index for {}", self.source.display());
        debug!("Artifacts go to {}", self.paths.work_directory.display());
        self.start_time = Instant::now();

        let stage_start = Instant::now();
        let mut raw_shards = self.stage(PreparePhase::Extracting, PrepareStage::Extract, Self::extract)?;
        self.stats.extract_time_ms = stage_start.elapsed().as_millis() as u64;

        let stage_start = Instant::now();
        self.stage(PreparePhase::SortingZip, PrepareStage::ZipSort, Self::sort_zip)?;
        self.stage(PreparePhase::Reordering, PrepareStage::Reorder, Self::reorder)?;
        let zip_index = self.stage(PreparePhase::IndexingZip, PrepareStage::ZipIndex, Self::index_zip)?;
        self.stats.zip_time_ms = stage_start.elapsed().as_millis() as u64;

        let stage_start = Instant::now();
        self.stage(PreparePhase::SortingEmailShards, PrepareStage::EmailShardSort, |p| {
            p.sort_email_shards(&mut raw_shards)
        })?;
        let resharded = self.stage(PreparePhase::MergingEmail, PrepareStage::EmailMerge, |p| {
            p.merge_email(&raw_shards)
        })?;
        self.stats.email_time_ms = stage_start.elapsed().as_millis() as u64;

        self.finalize(zip_index, resharded)
    }

    /// Records the phase, runs one stage, and turns its failure into a typed
    /// error after marking the manifest as failed.
    fn stage<T>(
        &mut self,
        phase: PreparePhase,
        stage: PrepareStage,
        work: impl FnOnce(&mut Self) -> anyhow::Result<T>,
    ) -> Result<T> {
        self.manifest.phase = phase;
        if let Err(e) = self.save_manifest() {
            return Err(self.fail(stage, e));
        }

        info!("Stage '{}' started", stage);
        let stage_start = Instant::now();
        match work(self) {
            Ok(value) => {
                info!("Stage '{}' finished in {} ms", stage, stage_start.elapsed().as_millis());
                Ok(value)
            }
            Err(e) => Err(self.fail(stage, e)),
        }
    }

    fn extract(&mut self) -> anyhow::Result<Vec<ShardMetadata>> {
        let extractor = LineExtractor::new(
            self.layout,
            self.config.email_shard_size_bytes,
            self.config.io_buffer_size_bytes(),
            self.paths.work_directory.clone(),
            self.paths.raw_shard_prefix(),
        );
        let output = extractor.extract(&self.source, &self.paths.zip_entries)?;

        self.stats.lines_read = output.lines_read;
        self.stats.records_indexed = output.records_indexed;
        self.stats.lines_skipped = output.lines_skipped;
        self.stats.raw_email_shards = output.email_shards.len();

        if output.lines_skipped > 0 {
            warn!("Skipped {} malformed lines", output.lines_skipped);
        }
        info!(
            "Extracted {} records from {} lines ({:.1} MB) into {} email shards",
            output.records_indexed,
            output.lines_read,
            output.source_bytes as f64 / BYTES_PER_MB as f64,
            output.email_shards.len()
        );

        Ok(output.email_shards)
    }

    fn sort_zip(&mut self) -> anyhow::Result<()> {
        let sorter = ZipSorter::new(self.config.io_buffer_size_bytes());
        let output = sorter.sort(&self.paths.zip_entries, &self.paths.zip_grouped)?;
        self.stats.distinct_zip_codes = output.distinct_keys;
        info!("Grouped {} zip entries under {} zip codes", output.entries_written, output.distinct_keys);

        self.discard(&self.paths.zip_entries)?;
        Ok(())
    }

    fn reorder(&mut self) -> anyhow::Result<()> {
        let reorderer = DataReorderer::new(
            self.config.mmap_chunk_size_bytes,
            self.config.io_buffer_size_bytes(),
        );
        let output = reorderer.reorder(&self.source, &self.paths.zip_grouped, &self.paths.reordered)?;
        self.stats.reordered_bytes = output.bytes_written;
        info!(
            "Reordered {} records ({:.1} MB, {} window remaps)",
            output.records_written,
            output.bytes_written as f64 / BYTES_PER_MB as f64,
            output.remaps
        );

        self.discard(&self.paths.zip_grouped)?;
        Ok(())
    }

    fn index_zip(&mut self) -> anyhow::Result<ZipIndex> {
        let indexer = ZipIndexer::new(self.layout, self.config.io_buffer_size_bytes());
        let index = indexer.build(&self.paths.reordered, &self.paths.zip_index)?;
        info!("Zip index holds {} keys", index.len());
        Ok(index)
    }

    fn sort_email_shards(&mut self, shards: &mut [ShardMetadata]) -> anyhow::Result<()> {
        let sorter = EmailShardSorter::new(
            self.config.io_buffer_size_bytes(),
            self.config.processing_threads,
            self.config.parallel_shard_sort,
        );
        let duplicates = sorter.sort_all(shards)?;
        self.stats.duplicate_emails_dropped = duplicates;
        info!("Sorted {} email shards ({} duplicate emails dropped)", shards.len(), duplicates);
        Ok(())
    }

    fn merge_email(&mut self, raw_shards: &[ShardMetadata]) -> anyhow::Result<ReshardOutput> {
        let merger = ShardMerger::new(
            self.config.io_buffer_size_bytes(),
            self.config.email_shard_size_bytes,
            self.paths.work_directory.clone(),
            self.paths.shard_prefix(),
        );

        let merged = merger.merge(raw_shards, &self.paths.merged_email)?;
        if !self.config.keep_intermediate_files {
            remove_shard_files(raw_shards);
        }

        let output = merger.reshard(&self.paths.merged_email)?;
        self.discard(&self.paths.merged_email)?;

        self.stats.final_email_shards = output.shards.len();
        info!("Merged {} email entries into {} final shards", merged, output.shards.len());
        Ok(output)
    }

    fn finalize(mut self, zip_index: ZipIndex, resharded: ReshardOutput) -> Result<PreparedIndex> {
        self.stats.total_time_ms = self.start_time.elapsed().as_millis() as u64;

        self.manifest.email_shards = resharded.shards;
        self.manifest.stats = self.stats.clone();
        self.manifest.phase = PreparePhase::Completed;
        if let Err(e) = self.save_manifest() {
            return Err(self.fail(PrepareStage::Finalize, e));
        }

        info!(
            "Index ready in {} ms: {} zip codes, {} email shards",
            self.stats.total_time_ms,
            zip_index.len(),
            resharded.directory.len()
        );

        Ok(PreparedIndex {
            manifest: self.manifest,
            manifest_path: self.paths.manifest,
            zip_index,
            directory: resharded.directory,
        })
    }

    fn discard(&self, path: &Path) -> anyhow::Result<()> {
        if !self.config.keep_intermediate_files {
            remove_if_exists(path)?;
        }
        Ok(())
    }

    fn save_manifest(&mut self) -> anyhow::Result<()> {
        self.manifest.stats = self.stats.clone();
        self.manifest.update_timestamp();
        self.manifest.save(&self.paths.manifest)
    }

    fn fail(&mut self, stage: PrepareStage, err: anyhow::Error) -> IndexError {
        error!("Preparation failed during {}: {:#}", stage, err);

        self.manifest.phase = PreparePhase::Failed(format!("{}: {:#}", stage, err));
        if let Err(e) = self.save_manifest() {
            warn!("Could not record the failure in the manifest: {}", e);
        }

        IndexError::stage(stage, err)
    }
}
