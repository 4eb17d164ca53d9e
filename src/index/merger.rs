use anyhow::Result;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::constants::*;
use crate::index::constants::*;
use crate::index::directory::EmailDirectory;
use crate::index::entry::IndexEntry;
use crate::index::manifest::ShardMetadata;
use crate::index::shard::ShardWriter;

/// Streams sorted email shards into one globally sorted file and cuts that
/// file into the final, range-disjoint shards.
pub struct ShardMerger {
    io_buffer_size: usize,
    shard_size_bytes: u64,
    shard_directory: PathBuf,
    shard_prefix: String,
}

#[derive(Debug)]
struct MergeEntry {
    entry: IndexEntry,
    shard_index: usize,
}

impl PartialEq for MergeEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MergeEntry {}

impl PartialOrd for MergeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeEntry {
    // Equal keys come out in shard order
    fn cmp(&self, other: &Self) -> Ordering {
        self.entry
            .key
            .cmp(&other.entry.key)
            .then(self.shard_index.cmp(&other.shard_index))
    }
}

#[derive(Debug)]
pub struct ReshardOutput {
    pub shards: Vec<ShardMetadata>,
    pub directory: EmailDirectory,
}

impl ShardMerger {
    pub fn new(
        io_buffer_size: usize,
        shard_size_bytes: u64,
        shard_directory: PathBuf,
        shard_prefix: String,
    ) -> Self {
        Self {
            io_buffer_size,
            shard_size_bytes,
            shard_directory,
            shard_prefix,
        }
    }

    /// K-way merge of sorted shards. Returns the number of entries written.
    pub fn merge(&self, shards: &[ShardMetadata], output_file: &Path) -> Result<usize> {
        let mut readers = Vec::with_capacity(shards.len());
        for shard in shards {
            let file = File::open(&shard.file_path)?;
            readers.push(BufReader::with_capacity(self.io_buffer_size, file));
        }

        let output = File::create(output_file)?;
        let mut writer = BufWriter::with_capacity(OUTPUT_BUFFER_SIZE_KB * BYTES_PER_KB, output);
        let mut merge_heap = BinaryHeap::with_capacity(MERGE_HEAP_INITIAL_CAPACITY.max(shards.len()));

        for (shard_index, reader) in readers.iter_mut().enumerate() {
            if let Some(entry) = read_next_entry(reader, &shards[shard_index].file_path)? {
                merge_heap.push(Reverse(MergeEntry { entry, shard_index }));
            }
        }

        let mut entries_written = 0;
        while let Some(Reverse(merge_entry)) = merge_heap.pop() {
            merge_entry.entry.write_line(&mut writer)?;
            entries_written += 1;

            let shard_index = merge_entry.shard_index;
            if let Some(entry) =
                read_next_entry(&mut readers[shard_index], &shards[shard_index].file_path)?
            {
                merge_heap.push(Reverse(MergeEntry { entry, shard_index }));
            }

            if entries_written % PROGRESS_REPORT_INTERVAL_LINES == 0 {
                debug!("Merged {} email entries", entries_written);
            }
        }

        writer.flush()?;
        Ok(entries_written)
    }

    /// Splits the merged stream into capped shards and records each shard's
    /// key range. The last shard is kept even when it is under the cap.
    pub fn reshard(&self, merged_file: &Path) -> Result<ReshardOutput> {
        let file = File::open(merged_file)?;
        let mut reader = BufReader::with_capacity(self.io_buffer_size, file);
        let mut shard_writer = ShardWriter::new(
            self.shard_directory.clone(),
            self.shard_prefix.clone(),
            self.shard_size_bytes,
            self.io_buffer_size,
        );

        while let Some(entry) = read_next_entry(&mut reader, merged_file)? {
            shard_writer.write(&entry)?;
        }

        let mut shards = shard_writer.finish()?;
        for shard in &mut shards {
            shard.is_sorted = true;
        }
        let directory = EmailDirectory::from_shards(&shards);

        Ok(ReshardOutput { shards, directory })
    }
}

fn read_next_entry(reader: &mut BufReader<File>, path: &Path) -> Result<Option<IndexEntry>> {
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line)? {
            0 => return Ok(None),
            _ => {
                if line.trim_end_matches(['\n', '\r']).is_empty() {
                    continue;
                }
                return IndexEntry::from_index_line(&line)
                    .map(Some)
                    .ok_or_else(|| {
                        anyhow::anyhow!("Malformed index line in {}: {}", path.display(), line.trim_end())
                    });
            }
        }
    }
}
