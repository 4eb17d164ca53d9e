use anyhow::Result;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::index::entry::{IndexEntry, Span};

#[derive(Debug, Default)]
pub struct ZipSortOutput {
    pub distinct_keys: usize,
    pub entries_written: usize,
}

/// In-memory grouping sort of the zip entry file. Every occurrence of a key is
/// written contiguously, keys ascending, occurrences in source order.
pub struct ZipSorter {
    io_buffer_size: usize,
}

impl ZipSorter {
    pub fn new(io_buffer_size: usize) -> Self {
        Self { io_buffer_size }
    }

    pub fn sort(&self, input: &Path, output: &Path) -> Result<ZipSortOutput> {
        let file = File::open(input)?;
        let reader = BufReader::with_capacity(self.io_buffer_size, file);
        let mut groups: BTreeMap<String, Vec<Span>> = BTreeMap::new();

        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let entry = IndexEntry::from_index_line(&line).ok_or_else(|| {
                anyhow::anyhow!("Malformed zip entry in {}: {}", input.display(), line)
            })?;
            groups.entry(entry.key).or_default().push(entry.span);
        }

        let file = File::create(output)?;
        let mut writer = BufWriter::with_capacity(self.io_buffer_size, file);
        let mut entries_written = 0;

        for (key, spans) in &groups {
            for span in spans {
                IndexEntry::new(key.as_str(), span.offset, span.length).write_line(&mut writer)?;
                entries_written += 1;
            }
        }
        writer.flush()?;

        Ok(ZipSortOutput {
            distinct_keys: groups.len(),
            entries_written,
        })
    }
}
