//! Ordered composite-key index.

use crate::key::{Component, Entry, Key, KeyValue};
use crate::{field, query_mismatch, Index};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeSet;
use std::ops::Bound;
use stratadoc_core::{
    Error, IndexKind, IndexOptions, IndexQuery, RangeQuery, Result, RowHandle, SortField,
};

/// Ordered index over one or more string/number fields.
///
/// Keys compare lexicographically in declared field order; each field may be
/// descending on its own. Range queries take an inclusive `from` and an
/// exclusive `to`, each a partial object of key fields.
pub struct BTreeIndex {
    name: String,
    options: IndexOptions,
    fields: Vec<SortField>,
    entries: RwLock<BTreeSet<Entry>>,
}

impl BTreeIndex {
    /// Create an empty index. `options` must already be validated.
    pub fn new(name: &str, options: IndexOptions) -> Self {
        BTreeIndex {
            name: name.to_string(),
            fields: options.sort_fields(),
            options,
            entries: RwLock::new(BTreeSet::new()),
        }
    }

    /// Composite key of a document, or `Ok(None)` if a key field is missing.
    fn key_of(&self, document: &Value) -> Result<Option<Key>> {
        let mut key = Key::with_capacity(self.fields.len());
        for sort in &self.fields {
            let Some(value) = field(document, &sort.name) else {
                return Ok(None);
            };
            let value = KeyValue::from_json(value).ok_or_else(|| Error::UnsupportedFieldType {
                index: self.name.clone(),
                field: sort.name.clone(),
                expected: "string or number",
            })?;
            key.push(Component::value(value, sort.descending));
        }
        Ok(Some(key))
    }

    /// Key for a range bound. Fields the bound leaves out become `Low`.
    fn bound_key(&self, bound: &Value) -> Result<Key> {
        let object = bound
            .as_object()
            .ok_or_else(|| Error::invalid_input("range bound must be an object"))?;

        if let Some(unknown) = object
            .keys()
            .find(|k| !self.fields.iter().any(|f| &f.name == *k))
        {
            return Err(Error::invalid_input(format!(
                "range bound field '{}' is not part of index '{}'",
                unknown, self.name
            )));
        }

        self.fields
            .iter()
            .map(|sort| match object.get(&sort.name) {
                None | Some(Value::Null) => Ok(Component::low()),
                Some(value) => KeyValue::from_json(value)
                    .map(|v| Component::value(v, sort.descending))
                    .ok_or_else(|| {
                        Error::invalid_input(format!(
                            "range bound for '{}' must be a string or number",
                            sort.name
                        ))
                    }),
            })
            .collect()
    }

    /// Key `handle` would take, `Ok(None)` for a skipped sparse document.
    fn admissible(
        &self,
        entries: &BTreeSet<Entry>,
        handle: RowHandle,
        document: &Value,
    ) -> Result<Option<Key>> {
        let key = match self.key_of(document)? {
            Some(key) => key,
            None if self.options.sparse => return Ok(None),
            None => {
                let missing = self
                    .fields
                    .iter()
                    .find(|f| field(document, &f.name).is_none())
                    .map(|f| f.name.clone())
                    .unwrap_or_default();
                return Err(Error::MissingField {
                    index: self.name.clone(),
                    field: missing,
                });
            }
        };

        if self.options.unique {
            let lo = Entry::first(key.clone());
            let hi = Entry::last(key.clone());
            if entries.range(lo..=hi).any(|e| e.handle != handle) {
                return Err(Error::UniqueViolation {
                    index: self.name.clone(),
                    key: self.describe(document),
                });
            }
        }
        Ok(Some(key))
    }

    fn describe(&self, document: &Value) -> String {
        self.fields
            .iter()
            .map(|f| {
                let value = document.get(&f.name).cloned().unwrap_or(Value::Null);
                format!("{}={}", f.name, value)
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Visit entries front-to-back or back-to-front until `visit` says stop.
fn walk<'a, I>(iter: I, reverse: bool, visit: &mut dyn FnMut(RowHandle) -> bool)
where
    I: DoubleEndedIterator<Item = &'a Entry>,
{
    if reverse {
        for entry in iter.rev() {
            if !visit(entry.handle) {
                return;
            }
        }
    } else {
        for entry in iter {
            if !visit(entry.handle) {
                return;
            }
        }
    }
}

impl Index for BTreeIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn options(&self) -> &IndexOptions {
        &self.options
    }

    fn check_row(&self, handle: RowHandle, document: &Value) -> Result<()> {
        self.admissible(&self.entries.read(), handle, document)
            .map(|_| ())
    }

    fn add_row(&self, handle: RowHandle, document: &Value) -> Result<()> {
        let mut entries = self.entries.write();
        let Some(key) = self.admissible(&entries, handle, document)? else {
            return Ok(());
        };
        entries.insert(Entry::new(key, handle));
        Ok(())
    }

    fn remove_row(&self, handle: RowHandle, document: &Value) -> Result<()> {
        if let Ok(Some(key)) = self.key_of(document) {
            self.entries.write().remove(&Entry::new(key, handle));
        }
        Ok(())
    }

    fn traverse(
        &self,
        query: &IndexQuery,
        visit: &mut dyn FnMut(RowHandle) -> bool,
    ) -> Result<()> {
        let IndexQuery::Range(RangeQuery { from, to, reverse }) = query else {
            return Err(query_mismatch(&self.name, IndexKind::Btree, query));
        };

        let from = from.as_ref().map(|b| self.bound_key(b)).transpose()?;
        let to = to.as_ref().map(|b| self.bound_key(b)).transpose()?;

        let entries = self.entries.read();
        match (from, to) {
            (None, None) => walk(entries.iter(), *reverse, visit),
            (Some(from), None) => walk(entries.range(Entry::first(from)..), *reverse, visit),
            (None, Some(to)) => walk(entries.range(..Entry::first(to)), *reverse, visit),
            (Some(from), Some(to)) => {
                let lo = Entry::first(from);
                let hi = Entry::first(to);
                // BTreeSet::range panics on an inverted range
                if lo < hi {
                    walk(
                        entries.range((Bound::Included(lo), Bound::Excluded(hi))),
                        *reverse,
                        visit,
                    );
                }
            }
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}
