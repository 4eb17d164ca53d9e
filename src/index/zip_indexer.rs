use anyhow::Result;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::constants::LINE_TERMINATOR;
use crate::index::entry::{IndexEntry, RecordLayout, Span};

/// Zip code to the one span of the reordered file holding all its records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZipIndex {
    entries: BTreeMap<String, Span>,
}

impl ZipIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, zip: &str) -> Option<Span> {
        self.entries.get(zip).copied()
    }

    pub fn insert(&mut self, zip: String, span: Span) {
        self.entries.insert(zip, span);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Span)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Loads a persisted `key,offset,length` index file.
    pub fn load(path: &Path) -> io::Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let mut index = Self::new();

        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let entry = IndexEntry::from_index_line(&line).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Malformed zip index line in {}: {}", path.display(), line),
                )
            })?;
            index.insert(entry.key, entry.span);
        }

        Ok(index)
    }
}

/// Scans the reordered file once, coalescing each run of equal zip codes into
/// a single span.
pub struct ZipIndexer {
    layout: RecordLayout,
    io_buffer_size: usize,
}

impl ZipIndexer {
    pub fn new(layout: RecordLayout, io_buffer_size: usize) -> Self {
        Self {
            layout,
            io_buffer_size,
        }
    }

    pub fn build(&self, reordered: &Path, index_file: &Path) -> Result<ZipIndex> {
        let mut reader = BufReader::with_capacity(self.io_buffer_size, File::open(reordered)?);
        let mut writer = BufWriter::with_capacity(self.io_buffer_size, File::create(index_file)?);
        let mut index = ZipIndex::new();

        let mut pos: u64 = 0;
        let mut current: Option<(String, Span)> = None;
        let mut line = Vec::new();

        loop {
            line.clear();
            let bytes_read = reader.read_until(LINE_TERMINATOR, &mut line)? as u64;
            if bytes_read == 0 {
                break;
            }

            let zip = self.layout.zip_key(&line).ok_or_else(|| {
                anyhow::anyhow!("Unparseable record at byte {} of {}", pos, reordered.display())
            })?;

            match current.as_mut() {
                Some((key, span)) if *key == zip => span.length += bytes_read,
                _ => {
                    if let Some((key, span)) = current.replace((zip, Span::new(pos, bytes_read))) {
                        Self::flush(&mut writer, &mut index, key, span)?;
                    }
                }
            }

            pos += bytes_read;
        }

        // The last run has no following key change to flush it
        if let Some((key, span)) = current.take() {
            Self::flush(&mut writer, &mut index, key, span)?;
        }
        writer.flush()?;

        Ok(index)
    }

    fn flush<W: Write>(writer: &mut W, index: &mut ZipIndex, key: String, span: Span) -> Result<()> {
        IndexEntry::new(key.as_str(), span.offset, span.length).write_line(writer)?;
        index.insert(key, span);
        Ok(())
    }
}
