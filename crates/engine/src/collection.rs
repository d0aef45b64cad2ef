//! Collections.
//!
//! A [`Collection`] ties a row container, its secondary indexes, a defaults
//! specification and a command log together. Every mutation runs under the
//! collection's write lock:
//!
//! 1. validate the input (and apply defaults, for inserts)
//! 2. update every index, undoing the ones that succeeded if one fails
//! 3. update the container
//! 4. queue the command on the log
//!
//! Steps 1-3 either all happen or none do. If step 4 fails the in-memory
//! change stays and the caller gets [`Error::Durability`].
//!
//! Reads take the shared lock and see a consistent snapshot of rows and
//! indexes.

use crate::defaults::Defaults;
use crate::recovery;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use stratadoc_core::json::{type_name, validate_encoded_size, validate_limits};
use stratadoc_core::{
    exact_merge_diff, merge_patch, Command, CommandOp, Error, IndexOptions, IndexQuery, PatchChange,
    Result, RowHandle, RowId,
};
use stratadoc_durability::{CommandLog, DurabilityMode, LogConfig, LogStats};
use stratadoc_index::{build_index, Index};
use stratadoc_storage::{ContainerKind, Row, RowContainer, RowRef, SlotAllocator};
use tracing::{debug, info, warn};

/// In-memory content of a collection.
///
/// Methods here change memory only; logging is the caller's business. Live
/// mutations and log replay share them so that both paths build identical
/// state.
pub(crate) struct State {
    container: Box<dyn RowContainer>,
    arena: SlotAllocator<RowRef>,
    indexes: BTreeMap<String, Box<dyn Index>>,
    pub(crate) defaults: Defaults,
    pub(crate) next_row: RowId,
    pub(crate) auto_counter: u64,
}

impl State {
    pub(crate) fn new(kind: ContainerKind) -> Self {
        State {
            container: kind.build(),
            arena: SlotAllocator::new(),
            indexes: BTreeMap::new(),
            defaults: Defaults::default(),
            next_row: RowId(1),
            auto_counter: 0,
        }
    }

    pub(crate) fn row(&self, id: RowId) -> Result<RowRef> {
        self.container.get(id).ok_or(Error::RowNotFound(id))
    }

    /// Store `document` as row `id` and index it.
    pub(crate) fn insert_row(&mut self, id: RowId, document: Value) -> Result<RowRef> {
        if self.container.has(id) {
            return Err(Error::invalid_input(format!("row {} already exists", id)));
        }
        validate_limits(&document)?;
        let payload = serde_json::to_vec(&document)?;
        validate_encoded_size(payload.len())?;

        let document = Arc::new(document);
        let slot = self.arena.alloc_with(|slot| {
            Arc::new(Row::new(id, RowHandle::from(slot), payload, Some(Arc::clone(&document))))
        });
        if u32::try_from(slot).is_err() {
            self.arena.free(slot);
            return Err(Error::invalid_input("row arena is full"));
        }
        let handle = RowHandle::from(slot);

        if let Err(e) = add_to_indexes(&self.indexes, handle, &document) {
            self.arena.free(slot);
            return Err(e);
        }

        let row = match self.arena.get(slot) {
            Some(row) => Arc::clone(row),
            None => return Err(Error::invalid_input("row slot vanished during insert")),
        };
        self.container.replace_or_insert(Arc::clone(&row));
        if id >= self.next_row {
            self.next_row = id.next();
        }
        Ok(row)
    }

    /// Unindex and drop row `id`.
    pub(crate) fn remove_row(&mut self, id: RowId) -> Result<RowRef> {
        let row = self.row(id)?;
        let document = row.document()?;
        remove_from_indexes(&self.indexes, row.handle(), &document)?;
        self.container.delete(id);
        self.arena.free(row.handle().index());
        Ok(row)
    }

    /// Swap the content of `row` for `new`, reindexing.
    pub(crate) fn replace_document(&mut self, row: &Row, old: &Value, new: Value) -> Result<()> {
        validate_limits(&new)?;
        let payload = serde_json::to_vec(&new)?;
        validate_encoded_size(payload.len())?;
        reindex(&self.indexes, row.handle(), old, &new)?;
        row.replace(payload, Some(Arc::new(new)));
        Ok(())
    }

    /// Build index `name` over every current row.
    pub(crate) fn add_index(&mut self, name: &str, options: IndexOptions) -> Result<&dyn Index> {
        if name.is_empty() {
            return Err(Error::invalid_input("index name must not be empty"));
        }
        if self.indexes.contains_key(name) {
            return Err(Error::IndexExists(name.to_string()));
        }
        let index = build_index(name, options)?;

        let mut failure = None;
        self.container.traverse(&mut |row| {
            let outcome = row
                .document()
                .and_then(|doc| index.add_row(row.handle(), &doc));
            match outcome {
                Ok(()) => true,
                Err(e) => {
                    failure = Some(e);
                    false
                }
            }
        });
        if let Some(e) = failure {
            return Err(e);
        }

        let index = self.indexes.entry(name.to_string()).or_insert(index);
        Ok(&**index)
    }

    pub(crate) fn remove_index(&mut self, name: &str) -> Result<()> {
        self.indexes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::IndexNotFound(name.to_string()))
    }

    /// Commands that rebuild this state from an empty collection.
    fn snapshot_commands(&self) -> Result<Vec<Command>> {
        let mut commands = Vec::with_capacity(self.container.len() + self.indexes.len() + 2);
        if !self.defaults.is_empty() {
            commands.push(Command::new(CommandOp::SetDefaults {
                defaults: self.defaults.spec().clone(),
            }));
        }
        for (name, index) in &self.indexes {
            commands.push(Command::new(CommandOp::CreateIndex {
                name: name.clone(),
                options: index.options().clone(),
            }));
        }

        let mut failure = None;
        self.container.traverse(&mut |row| match row.document() {
            Ok(doc) => {
                commands.push(Command::new(CommandOp::Insert {
                    row: row.id(),
                    document: (*doc).clone(),
                }));
                true
            }
            Err(e) => {
                failure = Some(e);
                false
            }
        });
        if let Some(e) = failure {
            return Err(e);
        }

        // Last, so it overrides what replaying the rows observed
        commands.push(Command::new(CommandOp::Counters {
            next_row: self.next_row,
            auto_counter: self.auto_counter,
        }));
        Ok(commands)
    }
}

/// Add `document` to every index or to none.
///
/// Every index is checked before any is touched, so a rejected document
/// never displaces another row's entry.
fn add_to_indexes(
    indexes: &BTreeMap<String, Box<dyn Index>>,
    handle: RowHandle,
    document: &Value,
) -> Result<()> {
    check_indexes(indexes, handle, document)?;
    let mut added: Vec<&dyn Index> = Vec::with_capacity(indexes.len());
    for index in indexes.values() {
        if let Err(e) = index.add_row(handle, document) {
            for done in added.into_iter().rev() {
                undo(done, done.remove_row(handle, document));
            }
            return Err(e);
        }
        added.push(index.as_ref());
    }
    Ok(())
}

/// Remove `document` from every index or from none.
fn remove_from_indexes(
    indexes: &BTreeMap<String, Box<dyn Index>>,
    handle: RowHandle,
    document: &Value,
) -> Result<()> {
    let mut removed: Vec<&dyn Index> = Vec::with_capacity(indexes.len());
    for index in indexes.values() {
        if let Err(e) = index.remove_row(handle, document) {
            for done in removed.into_iter().rev() {
                undo(done, done.add_row(handle, document));
            }
            return Err(e);
        }
        removed.push(index.as_ref());
    }
    Ok(())
}

/// Move a row's index entries from `old` to `new` in every index or in none.
fn reindex(
    indexes: &BTreeMap<String, Box<dyn Index>>,
    handle: RowHandle,
    old: &Value,
    new: &Value,
) -> Result<()> {
    check_indexes(indexes, handle, new)?;
    let mut moved: Vec<&dyn Index> = Vec::with_capacity(indexes.len());
    for index in indexes.values() {
        let index = index.as_ref();
        let step = index.remove_row(handle, old).and_then(|()| {
            index.add_row(handle, new).map_err(|e| {
                undo(index, index.add_row(handle, old));
                e
            })
        });
        if let Err(e) = step {
            for done in moved.into_iter().rev() {
                undo(done, done.remove_row(handle, new));
                undo(done, done.add_row(handle, old));
            }
            return Err(e);
        }
        moved.push(index);
    }
    Ok(())
}

fn check_indexes(
    indexes: &BTreeMap<String, Box<dyn Index>>,
    handle: RowHandle,
    document: &Value,
) -> Result<()> {
    indexes
        .values()
        .try_for_each(|index| index.check_row(handle, document))
}

/// Rollback steps restore entries the index held a moment ago, so they are
/// expected to succeed.
fn undo(index: &dyn Index, outcome: Result<()>) {
    if let Err(e) = outcome {
        warn!(target: "stratadoc::collection", index = index.name(), error = %e,
            "Index rollback step failed");
    }
}

/// A named set of JSON documents with secondary indexes and a command log.
pub struct Collection {
    name: String,
    container: ContainerKind,
    state: RwLock<State>,
    log: CommandLog,
}

impl Collection {
    /// Open the collection logged at `path`, replaying its log.
    ///
    /// A missing file opens an empty collection. In Cache mode nothing is
    /// read or written.
    ///
    /// # Errors
    ///
    /// [`Error::Corruption`] if the log is damaged anywhere but its tail.
    pub fn open(
        name: impl Into<String>,
        path: &Path,
        config: LogConfig,
        container: ContainerKind,
    ) -> Result<Self> {
        let name = name.into();
        if !container.has_stable_identity() {
            return Err(Error::invalid_input(format!(
                "collection '{}' needs a container with stable row identities",
                name
            )));
        }

        let mut state = State::new(container);
        let tail = if config.mode.requires_log() {
            let summary = recovery::replay_into(&mut state, path, &config)?;
            info!(target: "stratadoc::collection", collection = %name,
                records = summary.records, rows = state.container.len(),
                indexes = state.indexes.len(), torn_bytes = summary.torn_bytes,
                "Collection recovered");
            summary.tail
        } else {
            Default::default()
        };

        let log = CommandLog::open(path, config, tail)?;
        Ok(Collection {
            name,
            container,
            state: RwLock::new(state),
            log,
        })
    }

    /// In-memory collection with no log file.
    pub fn in_memory(name: impl Into<String>) -> Result<Self> {
        let config = LogConfig::new().with_mode(DurabilityMode::Cache);
        Self::open(name, Path::new(""), config, ContainerKind::default())
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Container strategy.
    pub fn container_kind(&self) -> ContainerKind {
        self.container
    }

    /// Durability mode of the log.
    pub fn durability(&self) -> DurabilityMode {
        self.log.mode()
    }

    /// Log file location.
    pub fn log_path(&self) -> &Path {
        self.log.path()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.log.is_closed() {
            return Err(Error::Closed);
        }
        Ok(())
    }

    fn persist(&self, op: CommandOp) -> Result<()> {
        self.log.persist(Command::new(op)).map_err(|e| match e {
            Error::Durability(_) | Error::Closed => e,
            other => Error::Durability(other.to_string()),
        })
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Insert a document, returning the stored row.
    ///
    /// The document must be a JSON object. Defaults fill the fields it lacks.
    pub fn insert(&self, document: Value) -> Result<RowRef> {
        let Value::Object(mut fields) = document else {
            return Err(Error::invalid_input(format!(
                "document must be an object, got {}",
                type_name(&document)
            )));
        };
        self.ensure_open()?;

        let mut guard = self.state.write();
        let st = &mut *guard;
        let mut auto = st.auto_counter;
        st.defaults.apply(&mut fields, &mut auto);
        let document = Value::Object(fields);

        let id = st.next_row;
        let row = st.insert_row(id, document.clone())?;
        st.auto_counter = auto;

        self.persist(CommandOp::Insert { row: id, document })?;
        Ok(row)
    }

    /// Remove row `id`.
    pub fn remove(&self, id: RowId) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.state.write();
        state.remove_row(id)?;
        self.persist(CommandOp::Remove { row: id })
    }

    /// Apply an RFC 7396 merge patch to row `id`.
    ///
    /// Returns `false` without reindexing or logging when the patch leaves
    /// the document unchanged.
    pub fn patch(&self, id: RowId, patch: &Value) -> Result<bool> {
        self.ensure_open()?;
        let mut guard = self.state.write();
        let st = &mut *guard;

        let row = st.row(id)?;
        let old = row.document()?;
        let mut new = (*old).clone();
        merge_patch(&mut new, patch);
        if !new.is_object() {
            return Err(Error::invalid_input(format!(
                "patch would turn row {} into {}, documents must stay objects",
                id,
                type_name(&new)
            )));
        }
        if new == *old {
            return Ok(false);
        }

        let change = match exact_merge_diff(&old, &new) {
            Some(diff) => PatchChange::Diff(diff),
            None => PatchChange::Replace(new.clone()),
        };
        st.replace_document(&row, &old, new)?;

        self.persist(CommandOp::Patch { row: id, change })?;
        Ok(true)
    }

    /// Create an index and fill it from the current rows.
    ///
    /// If any row is rejected (missing field on a non-sparse index, wrong
    /// type, duplicate key on a unique index) the index is discarded.
    pub fn create_index(&self, name: &str, options: IndexOptions) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.state.write();
        let index = state.add_index(name, options)?;
        let options = index.options().clone();
        debug!(target: "stratadoc::collection", collection = %self.name, index = name,
            kind = %options.kind, entries = index.len(), "Index created");

        self.persist(CommandOp::CreateIndex {
            name: name.to_string(),
            options,
        })
    }

    /// Drop an index.
    pub fn drop_index(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.state.write();
        state.remove_index(name)?;
        debug!(target: "stratadoc::collection", collection = %self.name, index = name,
            "Index dropped");
        self.persist(CommandOp::DropIndex {
            name: name.to_string(),
        })
    }

    /// Replace the defaults specification.
    ///
    /// `defaults` must be an object mapping field names to a literal or to
    /// one of the generator tokens `"uuid()"`, `"unixnano()"`, `"auto()"`.
    /// It is held to the same size limits as a document.
    pub fn set_defaults(&self, defaults: Value) -> Result<()> {
        validate_limits(&defaults)?;
        validate_encoded_size(serde_json::to_vec(&defaults)?.len())?;
        let Value::Object(defaults) = defaults else {
            return Err(Error::invalid_input(format!(
                "defaults must be an object, got {}",
                type_name(&defaults)
            )));
        };
        self.ensure_open()?;
        let mut state = self.state.write();
        state.defaults = Defaults::new(defaults.clone());
        self.persist(CommandOp::SetDefaults { defaults })
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Row `id`, if present.
    pub fn get(&self, id: RowId) -> Option<RowRef> {
        self.state.read().container.get(id)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.state.read().container.len()
    }

    /// True if the collection holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visit every row in container order until `visit` returns `false`.
    pub fn traverse<F>(&self, mut visit: F)
    where
        F: FnMut(&RowRef) -> bool,
    {
        self.state.read().container.traverse(&mut visit);
    }

    /// Visit the rows `query` selects on index `index`, in index order,
    /// until `visit` returns `false`.
    pub fn query<F>(&self, index: &str, query: &IndexQuery, mut visit: F) -> Result<()>
    where
        F: FnMut(&RowRef) -> bool,
    {
        let state = self.state.read();
        let idx = state
            .indexes
            .get(index)
            .ok_or_else(|| Error::IndexNotFound(index.to_string()))?;
        idx.traverse(query, &mut |handle| match state.arena.get(handle.index()) {
            Some(row) => visit(row),
            None => true,
        })
    }

    /// Every row `query` selects, in index order.
    pub fn find(&self, index: &str, query: &IndexQuery) -> Result<Vec<RowRef>> {
        let mut rows = Vec::new();
        self.query(index, query, |row| {
            rows.push(Arc::clone(row));
            true
        })?;
        Ok(rows)
    }

    /// Index names, sorted.
    pub fn index_names(&self) -> Vec<String> {
        self.state.read().indexes.keys().cloned().collect()
    }

    /// Options of index `name`.
    pub fn index_options(&self, name: &str) -> Option<IndexOptions> {
        self.state
            .read()
            .indexes
            .get(name)
            .map(|index| index.options().clone())
    }

    /// Current defaults specification.
    pub fn defaults(&self) -> Map<String, Value> {
        self.state.read().defaults.spec().clone()
    }

    /// Log counters since open.
    pub fn stats(&self) -> LogStats {
        self.log.stats()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Rewrite the log as the shortest command sequence reproducing the
    /// current state. Row ids and counters are preserved. Returns the number
    /// of records in the new log.
    pub fn compact(&self) -> Result<u64> {
        self.ensure_open()?;
        let state = self.state.write();
        let commands = state.snapshot_commands()?;
        let written = self.log.compact(commands)?;
        info!(target: "stratadoc::collection", collection = %self.name,
            rows = state.container.len(), records = written, "Collection compacted");
        Ok(written)
    }

    /// Block until every mutation so far is on stable storage.
    pub fn sync(&self) -> Result<()> {
        self.log.sync()
    }

    /// Drain and close the log. Later mutations fail with [`Error::Closed`];
    /// reads keep working.
    pub fn close(&self) -> Result<()> {
        let _state = self.state.write();
        if self.log.is_closed() {
            return Ok(());
        }
        let outcome = self.log.close();
        info!(target: "stratadoc::collection", collection = %self.name,
            records = self.log.stats().records_written, "Collection closed");
        outcome
    }

    /// True once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.log.is_closed()
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("container", &self.container)
            .field("log", &self.log)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stratadoc_core::RangeQuery;

    fn collection() -> Collection {
        Collection::in_memory("people").unwrap()
    }

    fn ids(rows: &[RowRef]) -> Vec<u64> {
        rows.iter().map(|r| r.id().0).collect()
    }

    #[test]
    fn test_insert_assigns_increasing_ids() {
        let c = collection();
        let a = c.insert(json!({"name": "a"})).unwrap();
        let b = c.insert(json!({"name": "b"})).unwrap();
        assert_eq!(a.id(), RowId(1));
        assert_eq!(b.id(), RowId(2));
        assert_eq!(c.len(), 2);
        assert_eq!(*c.get(RowId(2)).unwrap().document().unwrap(), json!({"name": "b"}));
    }

    #[test]
    fn test_insert_rejects_non_object() {
        let c = collection();
        let err = c.insert(json!([1, 2])).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(c.is_empty());
    }

    #[test]
    fn test_removed_id_is_not_reissued() {
        let c = collection();
        let a = c.insert(json!({})).unwrap();
        c.remove(a.id()).unwrap();
        let b = c.insert(json!({})).unwrap();
        assert_eq!(b.id(), RowId(2));
        assert!(c.get(RowId(1)).is_none());
        assert!(matches!(c.remove(RowId(1)), Err(Error::RowNotFound(RowId(1)))));
    }

    #[test]
    fn test_multi_index_rollback_on_insert() {
        let c = collection();
        c.create_index("a_name", IndexOptions::map("name").unique(true))
            .unwrap();
        c.create_index("b_email", IndexOptions::map("email").unique(true))
            .unwrap();
        c.insert(json!({"name": "ann", "email": "ann@x"})).unwrap();

        // First index would admit "bob", second rejects the duplicate email
        let err = c.insert(json!({"name": "bob", "email": "ann@x"})).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(c.len(), 1);

        // "bob" must not linger in the first index
        let found = c.find("a_name", &IndexQuery::value("bob")).unwrap();
        assert!(found.is_empty());
        c.insert(json!({"name": "bob", "email": "bob@x"})).unwrap();
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn test_rejected_insert_keeps_shared_key_owner() {
        let c = collection();
        c.create_index("a_tag", IndexOptions::map("tag")).unwrap();
        c.create_index("b_email", IndexOptions::map("email").unique(true))
            .unwrap();
        c.insert(json!({"tag": "t", "email": "x"})).unwrap();

        let err = c.insert(json!({"tag": "t", "email": "x"})).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(ids(&c.find("a_tag", &IndexQuery::value("t")).unwrap()), vec![1]);
    }

    #[test]
    fn test_rejected_patch_keeps_shared_key_owner() {
        let c = collection();
        c.create_index("a_tag", IndexOptions::map("tag")).unwrap();
        c.create_index("b_email", IndexOptions::map("email").unique(true))
            .unwrap();
        c.insert(json!({"tag": "t", "email": "x"})).unwrap();
        c.insert(json!({"tag": "t", "email": "y"})).unwrap();

        let err = c
            .patch(RowId(1), &json!({"tag": "u", "email": "y"}))
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(ids(&c.find("a_tag", &IndexQuery::value("t")).unwrap()), vec![2]);
        assert!(c.find("a_tag", &IndexQuery::value("u")).unwrap().is_empty());

        // The displaced owner takes the key back once the newer row leaves
        c.remove(RowId(2)).unwrap();
        assert_eq!(ids(&c.find("a_tag", &IndexQuery::value("t")).unwrap()), vec![1]);
    }

    #[test]
    fn test_failed_insert_consumes_no_id() {
        let c = collection();
        c.create_index("by_age", IndexOptions::btree(["age"])).unwrap();
        assert!(c.insert(json!({"name": "no age"})).is_err());
        let row = c.insert(json!({"age": 3})).unwrap();
        assert_eq!(row.id(), RowId(1));
    }

    #[test]
    fn test_patch_reindexes() {
        let c = collection();
        c.create_index("by_name", IndexOptions::map("name")).unwrap();
        let row = c.insert(json!({"name": "ann", "age": 30})).unwrap();

        assert!(c.patch(row.id(), &json!({"name": "anne", "age": null})).unwrap());
        assert_eq!(*row.document().unwrap(), json!({"name": "anne"}));
        assert!(c.find("by_name", &IndexQuery::value("ann")).unwrap().is_empty());
        assert_eq!(ids(&c.find("by_name", &IndexQuery::value("anne")).unwrap()), vec![1]);
    }

    #[test]
    fn test_noop_patch_returns_false() {
        let c = collection();
        let row = c.insert(json!({"a": 1})).unwrap();
        assert!(!c.patch(row.id(), &json!({"a": 1, "b": null})).unwrap());
    }

    #[test]
    fn test_patch_rollback_restores_indexes() {
        let c = collection();
        c.create_index("by_name", IndexOptions::map("name").unique(true))
            .unwrap();
        c.create_index("then_age", IndexOptions::btree(["age"])).unwrap();
        let row = c.insert(json!({"name": "ann", "age": 30})).unwrap();

        // by_name would move to "anna", then_age rejects the array
        let err = c
            .patch(row.id(), &json!({"name": "anna", "age": [1]}))
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFieldType { .. }));

        assert_eq!(*row.document().unwrap(), json!({"name": "ann", "age": 30}));
        assert_eq!(ids(&c.find("by_name", &IndexQuery::value("ann")).unwrap()), vec![1]);
        assert!(c.find("by_name", &IndexQuery::value("anna")).unwrap().is_empty());
        let by_age = c.find("then_age", &RangeQuery::new().into()).unwrap();
        assert_eq!(ids(&by_age), vec![1]);
    }

    #[test]
    fn test_patch_must_keep_object() {
        let c = collection();
        let row = c.insert(json!({"a": 1})).unwrap();
        assert!(c.patch(row.id(), &json!("text")).is_err());
        assert!(matches!(
            c.patch(RowId(9), &json!({})),
            Err(Error::RowNotFound(RowId(9)))
        ));
    }

    #[test]
    fn test_remove_unindexes() {
        let c = collection();
        c.create_index("words", IndexOptions::fulltext("text")).unwrap();
        let row = c.insert(json!({"text": "hello world"})).unwrap();
        c.insert(json!({"text": "hello there"})).unwrap();
        c.remove(row.id()).unwrap();
        let hits = c.find("words", &IndexQuery::matching("hello")).unwrap();
        assert_eq!(ids(&hits), vec![2]);
    }

    #[test]
    fn test_create_index_backfills_and_discards_on_failure() {
        let c = collection();
        c.insert(json!({"age": 40})).unwrap();
        c.insert(json!({"age": 20})).unwrap();
        c.create_index("by_age", IndexOptions::btree(["age"])).unwrap();
        let rows = c.find("by_age", &RangeQuery::new().into()).unwrap();
        assert_eq!(ids(&rows), vec![2, 1]);

        assert!(c.create_index("strict", IndexOptions::map("name")).is_err());
        assert_eq!(c.index_names(), vec!["by_age".to_string()]);

        assert!(matches!(
            c.create_index("by_age", IndexOptions::map("x")),
            Err(Error::IndexExists(_))
        ));
    }

    #[test]
    fn test_drop_index() {
        let c = collection();
        c.create_index("m", IndexOptions::map("k")).unwrap();
        c.drop_index("m").unwrap();
        assert!(c.index_options("m").is_none());
        assert!(matches!(c.drop_index("m"), Err(Error::IndexNotFound(_))));
        assert!(matches!(
            c.find("m", &IndexQuery::value("x")),
            Err(Error::IndexNotFound(_))
        ));
    }

    #[test]
    fn test_defaults_applied_on_insert() {
        let c = collection();
        c.set_defaults(json!({"n": "auto()", "state": "new"})).unwrap();
        let a = c.insert(json!({})).unwrap();
        let b = c.insert(json!({"state": "old"})).unwrap();
        assert_eq!(*a.document().unwrap(), json!({"n": 1, "state": "new"}));
        assert_eq!(*b.document().unwrap(), json!({"n": 2, "state": "old"}));
        assert!(c.set_defaults(json!(3)).is_err());
        assert_eq!(c.defaults().len(), 2);
    }

    #[test]
    fn test_oversized_defaults_rejected() {
        let c = collection();
        c.set_defaults(json!({"kind": "small"})).unwrap();
        let huge = "x".repeat(stratadoc_core::json::MAX_DOCUMENT_SIZE);
        let err = c.set_defaults(json!({ "blob": huge })).unwrap_err();
        assert!(matches!(err, Error::Limit(_)));
        assert_eq!(c.defaults(), *json!({"kind": "small"}).as_object().unwrap());
    }

    #[test]
    fn test_failed_insert_does_not_consume_auto() {
        let c = collection();
        c.set_defaults(json!({"n": "auto()"})).unwrap();
        c.create_index("u", IndexOptions::map("k").unique(true)).unwrap();
        c.insert(json!({"k": "x"})).unwrap();
        assert!(c.insert(json!({"k": "x"})).is_err());
        let row = c.insert(json!({"k": "y"})).unwrap();
        assert_eq!(row.document().unwrap()["n"], 2);
    }

    #[test]
    fn test_traverse_stops_early() {
        let c = collection();
        for i in 0..5 {
            c.insert(json!({"i": i})).unwrap();
        }
        let mut seen = Vec::new();
        c.traverse(|row| {
            seen.push(row.id().0);
            seen.len() < 3
        });
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn test_closed_collection_rejects_mutations() {
        let c = collection();
        c.insert(json!({"a": 1})).unwrap();
        c.close().unwrap();
        c.close().unwrap();
        assert!(matches!(c.insert(json!({})), Err(Error::Closed)));
        assert!(matches!(c.remove(RowId(1)), Err(Error::Closed)));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn test_dense_container_refused() {
        let config = LogConfig::new().with_mode(DurabilityMode::Cache);
        let err = Collection::open("d", Path::new(""), config, ContainerKind::Dense).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_keyed_container_collection() {
        let config = LogConfig::new().with_mode(DurabilityMode::Cache);
        let c = Collection::open("k", Path::new(""), config, ContainerKind::Keyed).unwrap();
        c.insert(json!({"a": 1})).unwrap();
        c.insert(json!({"a": 2})).unwrap();
        assert_eq!(c.container_kind(), ContainerKind::Keyed);
        assert_eq!(c.len(), 2);
    }
}
