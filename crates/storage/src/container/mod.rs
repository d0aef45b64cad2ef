//! Row containers
//!
//! A container is the collection's source of truth for which rows exist and
//! in what order they are traversed. Three strategies share one trait:
//!
//! | Strategy | Lookup | Traversal order | Identity stable across deletes |
//! |----------|--------|-----------------|--------------------------------|
//! | [`BTreeContainer`] | O(log n) | ascending identity | yes |
//! | [`KeyedContainer`] | O(1) avg, sharded | unspecified | yes |
//! | [`DenseContainer`] | O(1) | array position | **no** |
//!
//! The dense strategy rewrites the identity of the row it moves on delete, so
//! anything that remembers identities (indexes, the command log, clients)
//! must not sit on top of it.

mod btree;
mod dense;
mod keyed;

pub use btree::BTreeContainer;
pub use dense::DenseContainer;
pub use keyed::KeyedContainer;

use crate::row::RowRef;
use serde::{Deserialize, Serialize};
use stratadoc_core::RowId;

/// Container strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    /// Ordered by identity
    #[default]
    Btree,
    /// Concurrent hash map keyed by identity
    Keyed,
    /// Identity is array position; delete swaps in the last row
    Dense,
}

impl ContainerKind {
    /// Build an empty container of this kind.
    pub fn build(self) -> Box<dyn RowContainer> {
        match self {
            ContainerKind::Btree => Box::new(BTreeContainer::new()),
            ContainerKind::Keyed => Box::new(KeyedContainer::new()),
            ContainerKind::Dense => Box::new(DenseContainer::new()),
        }
    }

    /// Whether row identities survive deletes of other rows.
    pub fn has_stable_identity(self) -> bool {
        !matches!(self, ContainerKind::Dense)
    }
}

/// Common interface of the container strategies.
pub trait RowContainer: Send + Sync {
    /// Insert `row` under its identity, returning the row it replaced.
    fn replace_or_insert(&mut self, row: RowRef) -> Option<RowRef>;

    /// Remove the row with identity `id`.
    fn delete(&mut self, id: RowId) -> Option<RowRef>;

    /// Row with identity `id`.
    fn get(&self, id: RowId) -> Option<RowRef>;

    /// Whether a row with identity `id` exists.
    fn has(&self, id: RowId) -> bool {
        self.get(id).is_some()
    }

    /// Number of rows.
    fn len(&self) -> usize;

    /// True if the container holds no rows.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visit every row in the container's natural order until `visit`
    /// returns `false`.
    fn traverse(&self, visit: &mut dyn FnMut(&RowRef) -> bool);

    /// Strategy of this container.
    fn kind(&self) -> ContainerKind;
}
