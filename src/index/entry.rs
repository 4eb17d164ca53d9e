use serde::{Deserialize, Serialize};
use std::io::{self, Write};

use crate::constants::*;
use crate::index::IndexConfig;

/// A byte range inside one of the record files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub offset: u64,
    pub length: u64,
}

impl Span {
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// One `key,offset,length` line of an index file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub key: String,
    pub span: Span,
}

impl IndexEntry {
    pub fn new(key: impl Into<String>, offset: u64, length: u64) -> Self {
        Self {
            key: key.into(),
            span: Span::new(offset, length),
        }
    }

    /// Parses an index line. The numeric fields are taken from the right so a
    /// key containing the separator still round-trips.
    pub fn from_index_line(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\n', '\r']);
        if line.is_empty() {
            return None;
        }

        let mut parts = line.rsplitn(3, INDEX_FIELD_SEPARATOR);
        let length = parts.next()?.parse::<u64>().ok()?;
        let offset = parts.next()?.parse::<u64>().ok()?;
        let key = parts.next()?;

        Some(Self::new(key, offset, length))
    }

    pub fn to_index_line(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}",
            self.key,
            self.span.offset,
            self.span.length,
            sep = INDEX_FIELD_SEPARATOR
        )
    }

    /// Writes the entry as one terminated line and returns the bytes written.
    pub fn write_line<W: Write>(&self, writer: &mut W) -> io::Result<u64> {
        let line = self.to_index_line();
        writer.write_all(line.as_bytes())?;
        writer.write_all(&[LINE_TERMINATOR])?;
        Ok(line.len() as u64 + 1)
    }
}

/// The two lookup keys of one data record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordKeys {
    pub zip: String,
    pub email: String,
}

/// Where the key fields live in a data line and how many fields a line needs.
#[derive(Debug, Clone, Copy)]
pub struct RecordLayout {
    pub min_fields: usize,
    pub zip_field: usize,
    pub email_field: usize,
}

impl Default for RecordLayout {
    fn default() -> Self {
        Self {
            min_fields: MIN_FIELDS_PER_LINE,
            zip_field: ZIP_FIELD_INDEX,
            email_field: EMAIL_FIELD_INDEX,
        }
    }
}

impl RecordLayout {
    pub fn from_config(config: &IndexConfig) -> Self {
        Self {
            min_fields: config.min_fields,
            zip_field: config.zip_field_index,
            email_field: config.email_field_index,
        }
    }

    /// Extracts both keys, or `None` for a blank or short line.
    pub fn parse(&self, line: &[u8]) -> Option<RecordKeys> {
        let line = strip_terminator(line);
        if line.iter().all(u8::is_ascii_whitespace) {
            return None;
        }

        let fields = split_fields(line);
        if fields.len() < self.min_fields {
            return None;
        }

        Some(RecordKeys {
            zip: clean_key(fields[self.zip_field]),
            email: clean_key(fields[self.email_field]),
        })
    }

    pub fn zip_key(&self, line: &[u8]) -> Option<String> {
        self.parse(line).map(|keys| keys.zip)
    }
}

/// Drops a trailing `\n` and then a trailing `\r`.
pub fn strip_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(&[LINE_TERMINATOR]).unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Splits on the field separator, ignoring separators inside quotes.
/// Returned slices still carry their quotes.
pub fn split_fields(line: &[u8]) -> Vec<&[u8]> {
    let mut fields = Vec::with_capacity(MIN_FIELDS_PER_LINE);
    let mut in_quotes = false;
    let mut start = 0;

    for (i, &byte) in line.iter().enumerate() {
        match byte {
            QUOTE_CHAR => in_quotes = !in_quotes,
            FIELD_SEPARATOR if !in_quotes => {
                fields.push(&line[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    fields.push(&line[start..]);

    fields
}

/// Removes quoting artifacts and surrounding whitespace from a key field.
pub fn clean_key(raw: &[u8]) -> String {
    let unquoted: Vec<u8> = raw.iter().copied().filter(|&b| b != QUOTE_CHAR).collect();
    String::from_utf8_lossy(&unquoted).trim().to_string()
}
