use anyhow::Result;
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::path::Path;

use crate::index::entry::Span;

/// A bounded read-only mapping over part of a large file. Reads outside the
/// current window relocate it to start at the requested offset.
pub struct MmapWindow {
    file: File,
    file_len: u64,
    chunk_size: u64,
    map: Option<Mmap>,
    window_start: u64,
    remaps: usize,
}

impl MmapWindow {
    pub fn open(path: &Path, chunk_size: u64) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();

        Ok(Self {
            file,
            file_len,
            chunk_size,
            map: None,
            window_start: 0,
            remaps: 0,
        })
    }

    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    /// `(window_start, window_length)` of the current mapping.
    pub fn window(&self) -> (u64, u64) {
        let len = self.map.as_ref().map(|m| m.len() as u64).unwrap_or(0);
        (self.window_start, len)
    }

    pub fn remap_count(&self) -> usize {
        self.remaps
    }

    pub fn contains(&self, span: Span) -> bool {
        let (start, len) = self.window();
        len > 0 && span.offset >= start && span.end() <= start + len
    }

    pub fn read(&mut self, span: Span) -> Result<&[u8]> {
        if span.length == 0 {
            return Ok(&[]);
        }
        if span.end() > self.file_len {
            anyhow::bail!(
                "Span {}..{} lies beyond the end of the file ({} bytes)",
                span.offset,
                span.end(),
                self.file_len
            );
        }
        if span.length > self.chunk_size {
            anyhow::bail!(
                "Span of {} bytes exceeds the mmap chunk size of {} bytes",
                span.length,
                self.chunk_size
            );
        }

        if !self.contains(span) {
            self.remap(span.offset)?;
        }

        let map = self
            .map
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Window is not mapped"))?;
        let start = (span.offset - self.window_start) as usize;
        Ok(&map[start..start + span.length as usize])
    }

    fn remap(&mut self, offset: u64) -> Result<()> {
        let len = self.chunk_size.min(self.file_len - offset);
        self.map = None;

        // SAFETY: the file is opened read-only and is not modified while mapped.
        let map = unsafe {
            MmapOptions::new()
                .offset(offset)
                .len(len as usize)
                .map(&self.file)?
        };

        self.map = Some(map);
        self.window_start = offset;
        self.remaps += 1;
        Ok(())
    }
}
