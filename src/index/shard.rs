use anyhow::Result;
use rayon::prelude::*;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::constants::EMAIL_SHARD_EXTENSION;
use crate::index::entry::{IndexEntry, Span};
use crate::index::manifest::ShardMetadata;

/// Writes index entries into numbered files, starting a new file once the
/// current one has received `shard_size_bytes`.
pub struct ShardWriter {
    directory: PathBuf,
    name_prefix: String,
    shard_size_bytes: u64,
    io_buffer_size: usize,
    current: Option<OpenShard>,
    finished: Vec<ShardMetadata>,
}

struct OpenShard {
    metadata: ShardMetadata,
    writer: BufWriter<File>,
    bytes_written: u64,
    last_key: String,
}

impl ShardWriter {
    pub fn new(
        directory: PathBuf,
        name_prefix: String,
        shard_size_bytes: u64,
        io_buffer_size: usize,
    ) -> Self {
        Self {
            directory,
            name_prefix,
            shard_size_bytes,
            io_buffer_size,
            current: None,
            finished: Vec::new(),
        }
    }

    pub fn shard_path(&self, shard_id: usize) -> PathBuf {
        self.directory.join(format!(
            "{}{}{}",
            self.name_prefix, shard_id, EMAIL_SHARD_EXTENSION
        ))
    }

    pub fn write(&mut self, entry: &IndexEntry) -> Result<()> {
        if self.current.is_none() {
            self.open_next()?;
        }

        let full = match self.current.as_mut() {
            Some(shard) => {
                let written = entry.write_line(&mut shard.writer)?;
                shard.bytes_written += written;
                shard.metadata.entry_count += 1;
                if shard.metadata.first_key.is_none() {
                    shard.metadata.first_key = Some(entry.key.clone());
                }
                shard.last_key.clear();
                shard.last_key.push_str(&entry.key);
                shard.bytes_written >= self.shard_size_bytes
            }
            None => false,
        };

        if full {
            self.close_current()?;
        }
        Ok(())
    }

    /// Closes the shard in progress, even if it never reached the size cap.
    pub fn finish(mut self) -> Result<Vec<ShardMetadata>> {
        self.close_current()?;
        Ok(self.finished)
    }

    fn open_next(&mut self) -> Result<()> {
        let shard_id = self.finished.len() + 1;
        let file_path = self.shard_path(shard_id);
        let file = File::create(&file_path)?;

        self.current = Some(OpenShard {
            metadata: ShardMetadata::new(shard_id, file_path),
            writer: BufWriter::with_capacity(self.io_buffer_size, file),
            bytes_written: 0,
            last_key: String::new(),
        });
        Ok(())
    }

    fn close_current(&mut self) -> Result<()> {
        if let Some(mut shard) = self.current.take() {
            shard.writer.flush()?;
            shard.metadata.file_size_bytes = shard.bytes_written;
            shard.metadata.last_key = Some(shard.last_key);
            debug!(
                "Closed shard {} ({} entries, {} bytes)",
                shard.metadata.file_path.display(),
                shard.metadata.entry_count,
                shard.bytes_written
            );
            self.finished.push(shard.metadata);
        }
        Ok(())
    }
}

/// Sorts each email shard in memory and rewrites it in place.
pub struct EmailShardSorter {
    io_buffer_size: usize,
    processing_threads: usize,
    parallel: bool,
}

impl EmailShardSorter {
    pub fn new(io_buffer_size: usize, processing_threads: usize, parallel: bool) -> Self {
        Self {
            io_buffer_size,
            processing_threads,
            parallel,
        }
    }

    /// Sorts every shard and returns how many duplicate keys were dropped.
    pub fn sort_all(&self, shards: &mut [ShardMetadata]) -> Result<usize> {
        let dropped: Vec<usize> = if self.parallel && shards.len() > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.processing_threads)
                .build()?;
            pool.install(|| {
                shards
                    .par_iter_mut()
                    .map(|shard| self.sort_shard(shard))
                    .collect::<Result<Vec<_>>>()
            })?
        } else {
            shards
                .iter_mut()
                .map(|shard| self.sort_shard(shard))
                .collect::<Result<Vec<_>>>()?
        };

        Ok(dropped.into_iter().sum())
    }

    /// Duplicate keys keep their first occurrence; later ones are dropped.
    pub fn sort_shard(&self, shard: &mut ShardMetadata) -> Result<usize> {
        let entries = self.read_shard(&shard.file_path)?;
        let mut sorted: BTreeMap<String, Span> = BTreeMap::new();
        let mut duplicates = 0;

        for entry in entries {
            match sorted.entry(entry.key) {
                Entry::Vacant(slot) => {
                    slot.insert(entry.span);
                }
                Entry::Occupied(_) => duplicates += 1,
            }
        }

        let file = File::create(&shard.file_path)?;
        let mut writer = BufWriter::with_capacity(self.io_buffer_size, file);
        let mut bytes_written = 0;
        for (key, span) in &sorted {
            bytes_written += IndexEntry::new(key.as_str(), span.offset, span.length)
                .write_line(&mut writer)?;
        }
        writer.flush()?;

        if duplicates > 0 {
            warn!(
                "Shard {} held {} duplicate email keys; kept the first occurrence of each",
                shard.file_path.display(),
                duplicates
            );
        }

        shard.entry_count = sorted.len();
        shard.file_size_bytes = bytes_written;
        shard.first_key = sorted.keys().next().cloned();
        shard.last_key = sorted.keys().next_back().cloned();
        shard.is_sorted = true;

        Ok(duplicates)
    }

    fn read_shard(&self, path: &Path) -> Result<Vec<IndexEntry>> {
        let file = File::open(path)?;
        let reader = BufReader::with_capacity(self.io_buffer_size, file);
        let mut entries = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let entry = IndexEntry::from_index_line(&line).ok_or_else(|| {
                anyhow::anyhow!("Malformed index line in {}: {}", path.display(), line)
            })?;
            entries.push(entry);
        }

        Ok(entries)
    }
}

pub fn remove_shard_files(shards: &[ShardMetadata]) {
    for shard in shards {
        if let Err(e) = remove_if_exists(&shard.file_path) {
            warn!("Failed to remove shard {}: {}", shard.file_path.display(), e);
        }
    }
}

pub fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}
