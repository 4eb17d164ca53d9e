pub const DEFAULT_MEMORY_USAGE_PERCENT: f64 = 60.0;
pub const DEFAULT_IO_BUFFER_SIZE_KB: usize = 64;
pub const DEFAULT_PROCESSING_THREADS: usize = 4;

pub const MIN_MEMORY_USAGE_PERCENT: f64 = 10.0;
pub const MAX_MEMORY_USAGE_PERCENT: f64 = 90.0;
pub const MIN_PROCESSING_THREADS: usize = 1;
pub const MAX_PROCESSING_THREADS: usize = 32;
pub const MIN_IO_BUFFER_SIZE_KB: usize = 4;

pub const OUTPUT_BUFFER_SIZE_KB: usize = 512;
pub const MERGE_HEAP_INITIAL_CAPACITY: usize = 64;
