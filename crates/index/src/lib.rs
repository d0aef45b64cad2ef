//! Secondary indexes for StrataDoc
//!
//! Three implementations behind one [`Index`] trait:
//! - [`MapIndex`]: exact match on a string (or array-of-strings) field
//! - [`BTreeIndex`]: ordered composite key over string/number fields, range scans
//! - [`FullTextIndex`]: inverted token index with AND semantics
//!
//! # Contract
//!
//! - Indexes store [`RowHandle`]s, never row references. The collection
//!   resolves handles through its arena.
//! - `add_row` either admits the whole document or rejects it with no change;
//!   a multi-key document is never half-inserted.
//! - Each index guards its own structure with a reader/writer lock, so point
//!   lookups do not contend with unrelated collection readers.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod btree;
mod fulltext;
mod key;
mod map;
pub mod tokenizer;

pub use btree::BTreeIndex;
pub use fulltext::FullTextIndex;
pub use key::KeyValue;
pub use map::MapIndex;

use serde_json::Value;
use stratadoc_core::{Error, IndexKind, IndexOptions, IndexQuery, Result, RowHandle};

/// Common interface of the index implementations.
pub trait Index: Send + Sync {
    /// Index name.
    fn name(&self) -> &str;

    /// Options the index was created with.
    fn options(&self) -> &IndexOptions;

    /// Implementation kind.
    fn kind(&self) -> IndexKind {
        self.options().kind
    }

    /// Whether [`Index::add_row`] would admit `document` for `handle`.
    ///
    /// Changes nothing. Callers holding off concurrent writers can check
    /// every index before touching any of them.
    fn check_row(&self, handle: RowHandle, document: &Value) -> Result<()>;

    /// Record `document` as belonging to `handle`.
    ///
    /// On error the index is unchanged.
    fn add_row(&self, handle: RowHandle, document: &Value) -> Result<()>;

    /// Forget the entries `document` produced for `handle`.
    fn remove_row(&self, handle: RowHandle, document: &Value) -> Result<()>;

    /// Visit matching handles until `visit` returns `false`.
    fn traverse(&self, query: &IndexQuery, visit: &mut dyn FnMut(RowHandle) -> bool)
        -> Result<()>;

    /// Number of stored entries (keys, composite entries or tokens).
    fn len(&self) -> usize;

    /// True if nothing is indexed.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Validate `options` and build an empty index.
pub fn build_index(name: &str, options: IndexOptions) -> Result<Box<dyn Index>> {
    options.validate()?;
    Ok(match options.kind {
        IndexKind::Map => Box::new(MapIndex::new(name, options)),
        IndexKind::Btree => Box::new(BTreeIndex::new(name, options)),
        IndexKind::Fulltext => Box::new(FullTextIndex::new(name, options)),
    })
}

/// Collect every handle a query yields, in traversal order.
pub fn collect(index: &dyn Index, query: &IndexQuery) -> Result<Vec<RowHandle>> {
    let mut out = Vec::new();
    index.traverse(query, &mut |h| {
        out.push(h);
        true
    })?;
    Ok(out)
}

/// Field lookup shared by the implementations. Explicit `null` counts as
/// absent.
pub(crate) fn field<'a>(document: &'a Value, name: &str) -> Option<&'a Value> {
    document.get(name).filter(|v| !v.is_null())
}

pub(crate) fn query_mismatch(name: &str, kind: IndexKind, query: &IndexQuery) -> Error {
    Error::invalid_input(format!(
        "index '{}' is a {} index and cannot answer a {} query",
        name,
        kind,
        query.kind()
    ))
}
