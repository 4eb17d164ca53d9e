use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::index::entry::IndexEntry;
use crate::index::manifest::ShardMetadata;

const TAIL_PROBE_BYTES: u64 = 4096;

/// The key range one final email shard covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardRange {
    pub first_key: String,
    pub last_key: String,
    pub shard_id: usize,
    pub file_path: PathBuf,
}

impl ShardRange {
    pub fn contains(&self, key: &str) -> bool {
        self.first_key.as_str() <= key && key <= self.last_key.as_str()
    }
}

/// Ordered, non-overlapping key ranges of the final email shards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailDirectory {
    ranges: Vec<ShardRange>,
}

impl EmailDirectory {
    pub fn from_shards(shards: &[ShardMetadata]) -> Self {
        let ranges = shards
            .iter()
            .filter_map(|shard| {
                Some(ShardRange {
                    first_key: shard.first_key.clone()?,
                    last_key: shard.last_key.clone()?,
                    shard_id: shard.shard_id,
                    file_path: shard.file_path.clone(),
                })
            })
            .collect();
        Self { ranges }
    }

    /// Rebuilds the directory from the first and last line of each sorted
    /// shard file, in the given order.
    pub fn rebuild(shards: &[(usize, PathBuf)]) -> io::Result<Self> {
        let mut ranges = Vec::with_capacity(shards.len());
        for (shard_id, path) in shards {
            if let Some((first_key, last_key)) = read_boundary_keys(path)? {
                ranges.push(ShardRange {
                    first_key,
                    last_key,
                    shard_id: *shard_id,
                    file_path: path.clone(),
                });
            }
        }
        Ok(Self { ranges })
    }

    /// Finds the shard whose range holds `key`. When a key sits on the
    /// boundary of two shards the earlier one wins.
    pub fn locate(&self, key: &str) -> Option<&ShardRange> {
        let idx = self.ranges.partition_point(|r| r.last_key.as_str() < key);
        self.ranges.get(idx).filter(|r| r.contains(key))
    }

    pub fn ranges(&self) -> &[ShardRange] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

fn read_boundary_keys(path: &Path) -> io::Result<Option<(String, String)>> {
    let mut file = File::open(path)?;
    let file_len = file.metadata()?.len();

    let mut first_line = String::new();
    BufReader::new(&mut file).read_line(&mut first_line)?;
    let first = match IndexEntry::from_index_line(&first_line) {
        Some(entry) => entry.key,
        None => return Ok(None),
    };

    // Widen the probe from the end until it holds a whole last line
    let mut probe = TAIL_PROBE_BYTES;
    loop {
        let start = file_len.saturating_sub(probe);
        file.seek(SeekFrom::Start(start))?;
        let mut tail = Vec::new();
        (&mut file).take(file_len - start).read_to_end(&mut tail)?;

        let text = String::from_utf8_lossy(&tail);
        let mut lines = text.lines().filter(|l| !l.is_empty());
        let last_line = lines.next_back();
        let whole = start == 0 || lines.next().is_some();

        if whole {
            let last = last_line
                .and_then(IndexEntry::from_index_line)
                .map(|entry| entry.key)
                .ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("Malformed last line in shard {}", path.display()),
                    )
                })?;
            return Ok(Some((first, last)));
        }
        probe *= 2;
    }
}
