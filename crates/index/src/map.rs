//! Exact-match index.

use crate::{field, query_mismatch, Index};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;
use smallvec::SmallVec;
use stratadoc_core::{Error, IndexKind, IndexOptions, IndexQuery, Result, RowHandle};

/// Hash index from a string value to the row holding it.
///
/// An array-of-strings field fans out: every element is a key pointing at the
/// same row. Without `unique`, a later row claiming an existing key takes it
/// over (last writer wins); the displaced owners stay stacked under the key so
/// removing the newest owner hands the key back to the previous one.
pub struct MapIndex {
    name: String,
    options: IndexOptions,
    entries: RwLock<FxHashMap<String, Owners>>,
}

/// Rows claiming a key, oldest first. The last one answers lookups.
type Owners = SmallVec<[RowHandle; 1]>;

impl MapIndex {
    /// Create an empty index. `options` must already be validated.
    pub fn new(name: &str, options: IndexOptions) -> Self {
        MapIndex {
            name: name.to_string(),
            options,
            entries: RwLock::new(FxHashMap::default()),
        }
    }

    /// Row holding `value`, if any.
    pub fn get(&self, value: &str) -> Option<RowHandle> {
        self.entries
            .read()
            .get(value)
            .and_then(|owners| owners.last())
            .copied()
    }

    /// Keys derived from a document. `Ok(None)` means the field is absent.
    fn keys<'a>(&self, document: &'a Value) -> Result<Option<Vec<&'a str>>> {
        let Some(value) = field(document, self.options.field()) else {
            return Ok(None);
        };

        match value {
            Value::String(s) => Ok(Some(vec![s.as_str()])),
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_str().ok_or_else(|| self.unsupported()))
                .collect::<Result<Vec<_>>>()
                .map(Some),
            _ => Err(self.unsupported()),
        }
    }

    /// Keys `handle` would claim, `Ok(None)` for a skipped sparse document.
    fn admissible<'a>(
        &self,
        entries: &FxHashMap<String, Owners>,
        handle: RowHandle,
        document: &'a Value,
    ) -> Result<Option<Vec<&'a str>>> {
        let keys = match self.keys(document)? {
            Some(keys) => keys,
            None if self.options.sparse => return Ok(None),
            None => {
                return Err(Error::MissingField {
                    index: self.name.clone(),
                    field: self.options.field().to_string(),
                })
            }
        };

        // Check every key before inserting any
        if self.options.unique {
            for key in &keys {
                let taken = entries
                    .get(*key)
                    .map_or(false, |owners| owners.iter().any(|o| *o != handle));
                if taken {
                    return Err(Error::UniqueViolation {
                        index: self.name.clone(),
                        key: format!("{}={:?}", self.options.field(), key),
                    });
                }
            }
        }
        Ok(Some(keys))
    }

    fn unsupported(&self) -> Error {
        Error::UnsupportedFieldType {
            index: self.name.clone(),
            field: self.options.field().to_string(),
            expected: "string or array of strings",
        }
    }
}

impl Index for MapIndex {
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
        let Some(keys) = self.admissible(&entries, handle, document)? else {
            return Ok(());
        };

        for key in keys {
            let owners = entries.entry(key.to_string()).or_default();
            owners.retain(|o| *o != handle);
            owners.push(handle);
        }
        Ok(())
    }

    fn remove_row(&self, handle: RowHandle, document: &Value) -> Result<()> {
        // A document the index could not have admitted has nothing to remove
        let Ok(Some(keys)) = self.keys(document) else {
            return Ok(());
        };

        let mut entries = self.entries.write();
        for key in keys {
            if let Some(owners) = entries.get_mut(key) {
                owners.retain(|o| *o != handle);
                if owners.is_empty() {
                    entries.remove(key);
                }
            }
        }
        Ok(())
    }

    fn traverse(
        &self,
        query: &IndexQuery,
        visit: &mut dyn FnMut(RowHandle) -> bool,
    ) -> Result<()> {
        let IndexQuery::Value(value) = query else {
            return Err(query_mismatch(&self.name, IndexKind::Map, query));
        };
        if let Some(handle) = self.get(value) {
            visit(handle);
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}
