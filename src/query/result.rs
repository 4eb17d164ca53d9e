use std::time::Duration;

/// Raw record text of a lookup, how many records it holds, and how long the
/// lookup took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
    pub result: String,
    pub record_count: u64,
    pub elapsed: Duration,
}

impl QueryResult {
    pub fn empty(elapsed: Duration) -> Self {
        Self {
            result: String::new(),
            record_count: 0,
            elapsed,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.record_count == 0 && self.result.is_empty()
    }
}
