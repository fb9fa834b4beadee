//! SQL access to the `entries` and `allocations` tables.

pub mod allocations;
pub mod entries;

use serde::Serialize;
use utoipa::ToSchema;

/// Window of a paginated listing. A `limit` of 0 means no limit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Page {
    pub limit: u64,
    pub skip: u64,
}

impl Page {
    pub fn new(limit: i64, skip: i64) -> Self {
        Self {
            limit: limit.max(0) as u64,
            skip: skip.max(0) as u64,
        }
    }

    /// `(LIMIT, OFFSET)` bind values.
    pub fn bounds(&self) -> (u64, u64) {
        let limit = if self.limit == 0 { u64::MAX } else { self.limit };
        (limit, self.skip)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UpdateResult {
    pub matched_count: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteResult {
    pub deleted_count: u64,
}
