//! Bulk operations: the generic batch processor and the update/delete engine
//! built on it.

pub mod batch;
mod engine;
mod progress;

pub use batch::{backoff_delay, chunk, process_with_concurrency, retry_with_backoff};
pub use engine::{
    BulkExecutor, BulkOptions, BulkPerformance, BulkReport, DeleteManyOptions, Patch,
    TransformFn, UpdateManyOptions,
};
pub use progress::{BulkError, BulkProgress, ProgressObserver};
