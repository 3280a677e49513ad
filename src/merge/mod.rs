//! The synchronized k-way merge and the loops that drive it into sinks.

pub mod engine;
pub mod pipeline;
pub mod row;

pub use engine::{CancelToken, MergeEngine, MergeSummary, PROGRESS_INTERVAL, SourceSummary};
pub use pipeline::DEFAULT_CHANNEL_CAPACITY;
pub use row::Row;
