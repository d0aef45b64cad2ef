//! Dense array container.
//!
//! Row identity equals array position. Deleting a row moves the last row into
//! the hole and rewrites the moved row's identity to its new position, so
//! deletes are O(1) and the array never has gaps.

use super::{ContainerKind, RowContainer};
use crate::row::RowRef;
use stratadoc_core::RowId;

/// Rows stored at `identity == position`.
#[derive(Debug, Default)]
pub struct DenseContainer {
    rows: Vec<RowRef>,
}

impl DenseContainer {
    /// Create an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity the next appended row will receive.
    pub fn next_id(&self) -> RowId {
        RowId(self.rows.len() as u64)
    }

    fn position(&self, id: RowId) -> Option<usize> {
        let pos = usize::try_from(id.0).ok()?;
        (pos < self.rows.len()).then_some(pos)
    }
}

impl RowContainer for DenseContainer {
    /// Replaces the row at its identity, or appends it. An identity past the
    /// end is rewritten to the append position.
    fn replace_or_insert(&mut self, row: RowRef) -> Option<RowRef> {
        match self.position(row.id()) {
            Some(pos) => Some(std::mem::replace(&mut self.rows[pos], row)),
            None => {
                row.rebind(self.next_id());
                self.rows.push(row);
                None
            }
        }
    }

    fn delete(&mut self, id: RowId) -> Option<RowRef> {
        let pos = self.position(id)?;
        let removed = self.rows.swap_remove(pos);
        if let Some(moved) = self.rows.get(pos) {
            moved.rebind(RowId(pos as u64));
        }
        Some(removed)
    }

    fn get(&self, id: RowId) -> Option<RowRef> {
        self.position(id).map(|pos| self.rows[pos].clone())
    }

    fn len(&self) -> usize {
        self.rows.len()
    }

    fn traverse(&self, visit: &mut dyn FnMut(&RowRef) -> bool) {
        for row in &self.rows {
            if !visit(row) {
                return;
            }
        }
    }

    fn kind(&self) -> ContainerKind {
        ContainerKind::Dense
    }
}
