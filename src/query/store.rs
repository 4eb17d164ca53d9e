use memmap2::Mmap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use crate::index::Span;

/// Read-only mapped view of a record file.
pub struct RecordStore {
    path: PathBuf,
    map: Option<Mmap>,
}

impl RecordStore {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        // Zero-length files cannot be mapped
        let map = if file.metadata()?.len() == 0 {
            None
        } else {
            // SAFETY: the store is opened read-only and record files are never
            // rewritten once preparation has finished.
            Some(unsafe { Mmap::map(&file)? })
        };

        Ok(Self {
            path: path.to_path_buf(),
            map,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.map.as_ref().map(|m| m.len() as u64).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn read(&self, span: Span) -> io::Result<&[u8]> {
        if span.length == 0 {
            return Ok(&[]);
        }
        match &self.map {
            Some(map) if span.end() <= map.len() as u64 => {
                Ok(&map[span.offset as usize..span.end() as usize])
            }
            _ => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "Span {}..{} lies outside {} ({} bytes)",
                    span.offset,
                    span.end(),
                    self.path.display(),
                    self.len()
                ),
            )),
        }
    }
}
