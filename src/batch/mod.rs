//! Chunked batch writes.

mod coordinator;
mod report;

pub use coordinator::BatchWriteCoordinator;
pub use report::{plan_chunks, BatchReport, ChunkOutcome};
