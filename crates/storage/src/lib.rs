//! Row storage for StrataDoc
//!
//! This crate implements the in-memory row store:
//! - SlotAllocator: arena with LIFO slot reuse, issuing the handles indexes store
//! - Row: serialized document + decoded cache + per-row patch lock
//! - RowContainer: identity-ordered, concurrent-keyed and dense-array strategies

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod container;
pub mod row;
pub mod slots;

pub use container::{BTreeContainer, ContainerKind, DenseContainer, KeyedContainer, RowContainer};
pub use row::{Row, RowRef};
pub use slots::SlotAllocator;
