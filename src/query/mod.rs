pub mod cache;
pub mod engine;
pub mod result;
pub mod searcher;
pub mod store;


pub use cache::{LoadedShard, ShardCache, SingleSlotCache};
pub use engine::QueryEngine;
pub use result::QueryResult;
pub use searcher::Searcher;
pub use store::RecordStore;
