// Crate-wide contract constants and artifact naming
pub mod constants;

pub mod error;

// Preparation pipeline
pub mod index;

// Lookups over a prepared index
pub mod query;

pub mod utils;

// Re-export main types for convenience
pub use error::{IndexError, PrepareStage};
pub use index::{prepare_index, IndexConfig, IndexPreparer, PrepareStats, PreparedIndex};
pub use query::{QueryEngine, QueryResult, Searcher};
