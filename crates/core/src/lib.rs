//! Core types for StrataDoc
//!
//! This crate defines the vocabulary shared by every layer of the store:
//! - RowId / RowHandle: logical row identity and in-memory arena slot
//! - IndexOptions / IndexQuery: index definitions and per-kind queries
//! - Command: the durable form of a collection mutation
//! - Error: the error taxonomy (validation, conflict, not-found, durability, corruption)
//! - JSON helpers: merge patch, minimal diff, document limits

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;
pub mod error;
pub mod index_types;
pub mod json;
pub mod types;

pub use command::{Command, CommandOp, PatchChange};
pub use error::{Error, ErrorKind, Result};
pub use index_types::{IndexKind, IndexOptions, IndexQuery, RangeQuery, SortField};
pub use json::{exact_merge_diff, merge_diff, merge_patch, LimitError};
pub use types::{now_micros, now_nanos, RowHandle, RowId};

/// Re-export of the JSON value type used for documents.
pub use serde_json::Value;
