//! Concurrent hash-keyed container.

use super::{ContainerKind, RowContainer};
use crate::row::RowRef;
use dashmap::DashMap;
use stratadoc_core::RowId;

/// Rows in a sharded concurrent map.
///
/// The inherent methods take `&self`, so the container can be mutated from
/// several threads without an outer lock. Traversal order is unspecified.
#[derive(Debug, Default)]
pub struct KeyedContainer {
    rows: DashMap<RowId, RowRef>,
}

impl KeyedContainer {
    /// Create an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert through a shared reference.
    pub fn insert(&self, row: RowRef) -> Option<RowRef> {
        self.rows.insert(row.id(), row)
    }

    /// Remove through a shared reference.
    pub fn remove(&self, id: RowId) -> Option<RowRef> {
        self.rows.remove(&id).map(|(_, row)| row)
    }
}

impl RowContainer for KeyedContainer {
    fn replace_or_insert(&mut self, row: RowRef) -> Option<RowRef> {
        self.insert(row)
    }

    fn delete(&mut self, id: RowId) -> Option<RowRef> {
        self.remove(id)
    }

    fn get(&self, id: RowId) -> Option<RowRef> {
        self.rows.get(&id).map(|r| r.value().clone())
    }

    fn has(&self, id: RowId) -> bool {
        self.rows.contains_key(&id)
    }

    fn len(&self) -> usize {
        self.rows.len()
    }

    fn traverse(&self, visit: &mut dyn FnMut(&RowRef) -> bool) {
        for entry in self.rows.iter() {
            if !visit(entry.value()) {
                return;
            }
        }
    }

    fn kind(&self) -> ContainerKind {
        ContainerKind::Keyed
    }
}
