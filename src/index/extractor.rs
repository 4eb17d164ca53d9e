use anyhow::Result;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::constants::*;
use crate::index::entry::{strip_terminator, IndexEntry, RecordLayout};
use crate::index::manifest::ShardMetadata;
use crate::index::shard::ShardWriter;

#[derive(Debug)]
pub struct ExtractOutput {
    pub email_shards: Vec<ShardMetadata>,
    pub lines_read: usize,
    pub records_indexed: usize,
    pub lines_skipped: usize,
    pub source_bytes: u64,
}

/// Single pass over the source file producing the zip entry file and the
/// size-bounded raw email shards. Offsets refer to the source file.
pub struct LineExtractor {
    layout: RecordLayout,
    shard_size_bytes: u64,
    io_buffer_size: usize,
    shard_directory: PathBuf,
    shard_prefix: String,
}

impl LineExtractor {
    pub fn new(
        layout: RecordLayout,
        shard_size_bytes: u64,
        io_buffer_size: usize,
        shard_directory: PathBuf,
        shard_prefix: String,
    ) -> Self {
        Self {
            layout,
            shard_size_bytes,
            io_buffer_size,
            shard_directory,
            shard_prefix,
        }
    }

    pub fn extract(&self, source: &Path, zip_entries_file: &Path) -> Result<ExtractOutput> {
        let file = File::open(source)?;
        let mut reader = BufReader::with_capacity(self.io_buffer_size, file);
        let mut zip_writer =
            BufWriter::with_capacity(self.io_buffer_size, File::create(zip_entries_file)?);
        let mut email_writer = ShardWriter::new(
            self.shard_directory.clone(),
            self.shard_prefix.clone(),
            self.shard_size_bytes,
            self.io_buffer_size,
        );

        let mut pos: u64 = 0;
        let mut lines_read = 0;
        let mut records_indexed = 0;
        let mut lines_skipped = 0;
        let mut line = Vec::new();

        loop {
            line.clear();
            let bytes_read = reader.read_until(LINE_TERMINATOR, &mut line)?;
            if bytes_read == 0 {
                break;
            }
            lines_read += 1;

            match self.layout.parse(&line) {
                Some(keys) => {
                    let length = strip_terminator(&line).len() as u64;
                    IndexEntry::new(keys.zip, pos, length).write_line(&mut zip_writer)?;
                    email_writer.write(&IndexEntry::new(keys.email, pos, length))?;
                    records_indexed += 1;
                }
                None => lines_skipped += 1,
            }

            // Skipped lines still occupy their bytes in the source
            pos += bytes_read as u64;

            if lines_read % PROGRESS_REPORT_INTERVAL_LINES == 0 {
                debug!("Extracted {} lines ({} bytes)", lines_read, pos);
            }
        }

        zip_writer.flush()?;
        let email_shards = email_writer.finish()?;

        Ok(ExtractOutput {
            email_shards,
            lines_read,
            records_indexed,
            lines_skipped,
            source_bytes: pos,
        })
    }
}
