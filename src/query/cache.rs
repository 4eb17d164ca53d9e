use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use tracing::debug;

use crate::index::{IndexEntry, ShardRange, Span};

/// One final email shard held in memory as a sorted key map.
#[derive(Debug)]
pub struct LoadedShard {
    shard_id: usize,
    entries: BTreeMap<String, Span>,
}

impl LoadedShard {
    /// Loads a shard file. A key that repeats keeps its first span.
    pub fn load(shard_id: usize, path: &Path) -> io::Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let mut entries = BTreeMap::new();

        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let entry = IndexEntry::from_index_line(&line).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Malformed email shard line in {}: {}", path.display(), line),
                )
            })?;
            if let Entry::Vacant(slot) = entries.entry(entry.key) {
                slot.insert(entry.span);
            }
        }

        Ok(Self { shard_id, entries })
    }

    pub fn shard_id(&self) -> usize {
        self.shard_id
    }

    pub fn get(&self, key: &str) -> Option<Span> {
        self.entries.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Keeps email shards resident between lookups.
pub trait ShardCache: Send {
    /// Resolves `key` inside the shard described by `range`, loading the shard
    /// if it is not resident.
    fn lookup(&mut self, range: &ShardRange, key: &str) -> io::Result<Option<Span>>;

    /// Ids of the shards currently held in memory.
    fn resident_shards(&self) -> Vec<usize>;
}

/// At most one shard in memory; a miss replaces it wholesale.
#[derive(Debug, Default)]
pub struct SingleSlotCache {
    slot: Option<LoadedShard>,
    loads: usize,
}

impl SingleSlotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_count(&self) -> usize {
        self.loads
    }
}

impl ShardCache for SingleSlotCache {
    fn lookup(&mut self, range: &ShardRange, key: &str) -> io::Result<Option<Span>> {
        let resident = self.slot.as_ref().map(LoadedShard::shard_id);
        if resident != Some(range.shard_id) {
            // Drop the old shard before reading the next one
            self.slot = None;
            let shard = LoadedShard::load(range.shard_id, &range.file_path)?;
            debug!("Loaded email shard {} ({} keys)", range.shard_id, shard.len());
            self.loads += 1;
            self.slot = Some(shard);
        }

        Ok(self.slot.as_ref().and_then(|shard| shard.get(key)))
    }

    fn resident_shards(&self) -> Vec<usize> {
        self.slot.iter().map(LoadedShard::shard_id).collect()
    }
}
