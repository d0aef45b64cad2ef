//! Identity types shared by every layer.
//!
//! Two integers identify a stored document:
//!
//! - [`RowId`]: the logical identity. Assigned from a monotonic counter, exposed
//!   to callers and recorded in the command log. Never reused while the row is
//!   alive; after recovery the counter resumes above the highest id in the log.
//! - [`RowHandle`]: the arena slot holding the row in memory. Handles are what
//!   indexes store. They are recycled LIFO by the slot allocator and are never
//!   persisted.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable logical identity of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(pub u64);

impl RowId {
    /// Raw integer value.
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// The id following this one.
    pub fn next(self) -> RowId {
        RowId(self.0 + 1)
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RowId {
    fn from(v: u64) -> Self {
        RowId(v)
    }
}

/// Slot in the in-memory row arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowHandle(pub u32);

impl RowHandle {
    /// Arena position.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<usize> for RowHandle {
    fn from(v: usize) -> Self {
        RowHandle(v as u32)
    }
}

impl fmt::Display for RowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Current time in microseconds since the Unix epoch.
pub fn now_micros() -> u64 {
    chrono::Utc::now().timestamp_micros().max(0) as u64
}

/// Current time in nanoseconds since the Unix epoch.
pub fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}
