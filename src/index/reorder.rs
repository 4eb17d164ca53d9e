use anyhow::Result;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::constants::{BYTES_PER_KB, LINE_TERMINATOR};
use crate::index::constants::OUTPUT_BUFFER_SIZE_KB;
use crate::index::entry::IndexEntry;
use crate::index::window::MmapWindow;

#[derive(Debug, Default)]
pub struct ReorderOutput {
    pub records_written: usize,
    pub bytes_written: u64,
    pub remaps: usize,
}

/// Rewrites the source file in the order given by a grouped zip index,
/// re-terminating every record.
pub struct DataReorderer {
    chunk_size: u64,
    io_buffer_size: usize,
}

impl DataReorderer {
    pub fn new(chunk_size: u64, io_buffer_size: usize) -> Self {
        Self {
            chunk_size,
            io_buffer_size,
        }
    }

    pub fn reorder(&self, source: &Path, grouped_index: &Path, output: &Path) -> Result<ReorderOutput> {
        let mut window = MmapWindow::open(source, self.chunk_size)?;
        let plan = BufReader::with_capacity(self.io_buffer_size, File::open(grouped_index)?);
        let mut writer = BufWriter::with_capacity(
            OUTPUT_BUFFER_SIZE_KB * BYTES_PER_KB,
            File::create(output)?,
        );

        let mut records_written = 0;
        let mut bytes_written = 0;

        for line in plan.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let entry = IndexEntry::from_index_line(&line).ok_or_else(|| {
                anyhow::anyhow!("Malformed grouped entry in {}: {}", grouped_index.display(), line)
            })?;

            let record = window.read(entry.span)?;
            writer.write_all(record)?;
            writer.write_all(&[LINE_TERMINATOR])?;

            records_written += 1;
            bytes_written += entry.span.length + 1;
        }

        writer.flush()?;

        Ok(ReorderOutput {
            records_written,
            bytes_written,
            remaps: window.remap_count(),
        })
    }
}
