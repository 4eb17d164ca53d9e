pub const BYTES_PER_KB: usize = 1024;
pub const BYTES_PER_MB: usize = 1_048_576;

// Largest window mapped at once; also the largest zip result that can be served.
pub const MMAP_CHUNK_SIZE_BYTES: u64 = 0x4000_0000;
pub const EMAIL_SHARD_SIZE_BYTES: u64 = 0x1000_0000;

// Record layout of the source file
pub const MIN_FIELDS_PER_LINE: usize = 12;
pub const ZIP_FIELD_INDEX: usize = 7;
pub const EMAIL_FIELD_INDEX: usize = 10;

pub const FIELD_SEPARATOR: u8 = b',';
pub const QUOTE_CHAR: u8 = b'"';
pub const LINE_TERMINATOR: u8 = b'\n';
pub const INDEX_FIELD_SEPARATOR: char = ',';

// Artifact naming, all prefixed with the source file stem
pub const ZIP_ENTRIES_SUFFIX: &str = "zip_entries.idx";
pub const ZIP_GROUPED_SUFFIX: &str = "zip_grouped.idx";
pub const ZIP_INDEX_SUFFIX: &str = "zip.idx";
pub const REORDERED_SUFFIX: &str = "by_zip.csv";
pub const RAW_EMAIL_SHARD_PREFIX: &str = "email_raw_";
pub const EMAIL_SHARD_PREFIX: &str = "email_";
pub const EMAIL_SHARD_EXTENSION: &str = ".idx";
pub const MERGED_EMAIL_SUFFIX: &str = "email_merged.idx";
pub const MANIFEST_SUFFIX: &str = "manifest.json";

pub const MANIFEST_VERSION: u32 = 1;
pub const PROGRESS_REPORT_INTERVAL_LINES: usize = 1_000_000;
