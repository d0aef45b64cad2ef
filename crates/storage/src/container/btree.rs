//! Identity-ordered container.

use super::{ContainerKind, RowContainer};
use crate::row::RowRef;
use std::collections::BTreeMap;
use std::ops::RangeBounds;
use stratadoc_core::RowId;

/// Rows ordered by identity. Deterministic ascending traversal.
#[derive(Debug, Default)]
pub struct BTreeContainer {
    rows: BTreeMap<RowId, RowRef>,
}

impl BTreeContainer {
    /// Create an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Visit rows in descending identity order.
    pub fn traverse_desc(&self, visit: &mut dyn FnMut(&RowRef) -> bool) {
        for row in self.rows.values().rev() {
            if !visit(row) {
                return;
            }
        }
    }

    /// Visit rows whose identity falls in `range`, ascending.
    pub fn traverse_range<R>(&self, range: R, visit: &mut dyn FnMut(&RowRef) -> bool)
    where
        R: RangeBounds<RowId>,
    {
        for row in self.rows.range(range).map(|(_, r)| r) {
            if !visit(row) {
                return;
            }
        }
    }

    /// Lowest and highest identities held.
    pub fn bounds(&self) -> Option<(RowId, RowId)> {
        let first = *self.rows.keys().next()?;
        let last = *self.rows.keys().next_back()?;
        Some((first, last))
    }
}

impl RowContainer for BTreeContainer {
    fn replace_or_insert(&mut self, row: RowRef) -> Option<RowRef> {
        self.rows.insert(row.id(), row)
    }

    fn delete(&mut self, id: RowId) -> Option<RowRef> {
        self.rows.remove(&id)
    }

    fn get(&self, id: RowId) -> Option<RowRef> {
        self.rows.get(&id).cloned()
    }

    fn has(&self, id: RowId) -> bool {
        self.rows.contains_key(&id)
    }

    fn len(&self) -> usize {
        self.rows.len()
    }

    fn traverse(&self, visit: &mut dyn FnMut(&RowRef) -> bool) {
        for row in self.rows.values() {
            if !visit(row) {
                return;
            }
        }
    }

    fn kind(&self) -> ContainerKind {
        ContainerKind::Btree
    }
}
