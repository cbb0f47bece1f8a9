//! Limit/offset handling.
//!
//! Pagination is a single value everywhere in the crate. The dialect only
//! differs at rendering time: a bare limit becomes `SELECT TOP n`, while any
//! offset becomes a trailing `OFFSET s [LIMIT t]`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub take: Option<u64>,
    pub skip: Option<u64>,
}

impl Pagination {
    pub fn new(take: Option<u64>, skip: Option<u64>) -> Self {
        Self { take, skip }
    }

    pub fn is_unbounded(&self) -> bool {
        self.take.is_none() && self.skip.is_none()
    }

    /// `TOP n` when a limit is given without an offset.
    pub fn render_top(&self) -> Option<String> {
        match (self.take, self.skip) {
            (Some(take), None) => Some(format!("TOP {}", take)),
            _ => None,
        }
    }

    /// `OFFSET s` or `OFFSET s LIMIT t` when an offset is given.
    pub fn render_offset(&self) -> Option<String> {
        match (self.skip, self.take) {
            (Some(skip), Some(take)) => Some(format!("OFFSET {} LIMIT {}", skip, take)),
            (Some(skip), None) => Some(format!("OFFSET {}", skip)),
            (None, _) => None,
        }
    }
}
