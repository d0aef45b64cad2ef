//! Inverted full-text index.

use crate::tokenizer::tokenize_unique;
use crate::{field, query_mismatch, Index};
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use stratadoc_core::{Error, IndexKind, IndexOptions, IndexQuery, Result, RowHandle};

/// Token → rows containing it. Queries AND their tokens together.
pub struct FullTextIndex {
    name: String,
    options: IndexOptions,
    postings: RwLock<FxHashMap<String, FxHashSet<RowHandle>>>,
}

impl FullTextIndex {
    /// Create an empty index. `options` must already be validated.
    pub fn new(name: &str, options: IndexOptions) -> Self {
        FullTextIndex {
            name: name.to_string(),
            options,
            postings: RwLock::new(FxHashMap::default()),
        }
    }

    fn text<'a>(&self, document: &'a Value) -> Result<Option<&'a str>> {
        match field(document, self.options.field()) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(_) => Err(Error::UnsupportedFieldType {
                index: self.name.clone(),
                field: self.options.field().to_string(),
                expected: "string",
            }),
        }
    }
}

impl FullTextIndex {
    /// Text to tokenize, `Ok(None)` for a skipped sparse document.
    fn admissible<'a>(&self, document: &'a Value) -> Result<Option<&'a str>> {
        match self.text(document)? {
            Some(text) => Ok(Some(text)),
            None if self.options.sparse => Ok(None),
            None => Err(Error::MissingField {
                index: self.name.clone(),
                field: self.options.field().to_string(),
            }),
        }
    }
}

impl Index for FullTextIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn options(&self) -> &IndexOptions {
        &self.options
    }

    fn check_row(&self, _handle: RowHandle, document: &Value) -> Result<()> {
        self.admissible(document).map(|_| ())
    }

    fn add_row(&self, handle: RowHandle, document: &Value) -> Result<()> {
        let Some(text) = self.admissible(document)? else {
            return Ok(());
        };

        let mut postings = self.postings.write();
        for token in tokenize_unique(text) {
            postings.entry(token).or_default().insert(handle);
        }
        Ok(())
    }

    fn remove_row(&self, handle: RowHandle, document: &Value) -> Result<()> {
        let Ok(Some(text)) = self.text(document) else {
            return Ok(());
        };

        let mut postings = self.postings.write();
        for token in tokenize_unique(text) {
            if let Some(rows) = postings.get_mut(&token) {
                rows.remove(&handle);
                if rows.is_empty() {
                    postings.remove(&token);
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
        let IndexQuery::Match(phrase) = query else {
            return Err(query_mismatch(&self.name, IndexKind::Fulltext, query));
        };

        let tokens = tokenize_unique(phrase);
        if tokens.is_empty() {
            return Ok(());
        }

        let postings = self.postings.read();
        let mut sets = Vec::with_capacity(tokens.len());
        for token in &tokens {
            match postings.get(token) {
                Some(rows) => sets.push(rows),
                // A token nobody has empties the intersection
                None => return Ok(()),
            }
        }
        sets.sort_by_key(|s| s.len());

        let Some((smallest, rest)) = sets.split_first() else {
            return Ok(());
        };
        let mut hits: Vec<RowHandle> = smallest
            .iter()
            .copied()
            .filter(|h| rest.iter().all(|s| s.contains(h)))
            .collect();
        hits.sort_unstable();

        for handle in hits {
            if !visit(handle) {
                break;
            }
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.postings.read().len()
    }
}
