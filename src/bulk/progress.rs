//! Bulk progress reporting.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::warn;

/// Snapshot handed to observers after every chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkProgress {
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub percentage: f64,
    pub request_charge: f64,
    pub elapsed: Duration,
}

/// Receives a snapshot each time a chunk completes.
pub trait ProgressObserver: Send + Sync {
    fn on_chunk_complete(&self, progress: &BulkProgress);
}

impl<F> ProgressObserver for F
where
    F: Fn(&BulkProgress) + Send + Sync,
{
    fn on_chunk_complete(&self, progress: &BulkProgress) {
        self(progress)
    }
}

/// One document the engine could not process.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkError {
    pub id: String,
    pub message: String,
    pub retriable: bool,
}

/// Running counters shared by the chunk workers of one bulk call.
#[derive(Debug)]
pub(crate) struct BulkStats {
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub request_charge: f64,
    pub errors: Vec<BulkError>,
    started: Instant,
}

impl BulkStats {
    pub fn new(total: usize, started: Instant) -> Self {
        Self {
            total,
            processed: 0,
            succeeded: 0,
            failed: 0,
            request_charge: 0.0,
            errors: Vec::new(),
            started,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn snapshot(&self) -> BulkProgress {
        let percentage = if self.total == 0 {
            100.0
        } else {
            self.processed as f64 / self.total as f64 * 100.0
        };
        BulkProgress {
            total: self.total,
            processed: self.processed,
            succeeded: self.succeeded,
            failed: self.failed,
            percentage,
            request_charge: self.request_charge,
            elapsed: self.elapsed(),
        }
    }
}

/// Call the observer; a panicking observer is logged and otherwise ignored.
pub(crate) fn notify(observer: Option<&dyn ProgressObserver>, progress: &BulkProgress) {
    let Some(observer) = observer else {
        return;
    };
    if catch_unwind(AssertUnwindSafe(|| observer.on_chunk_complete(progress))).is_err() {
        warn!(
            "Progress observer panicked at {}/{} documents; continuing",
            progress.processed, progress.total
        );
    }
}
