//! Database: a directory of collections.
//!
//! Each collection is logged to `<name>.log` in the data directory, next to
//! the `stratadoc.toml` configuration. Opening a database recovers every log
//! it finds. Collections are independent: each has its own lock and log, and
//! nothing spans two of them.

use crate::collection::Collection;
use crate::config::{StoreConfig, CONFIG_FILE_NAME};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use stratadoc_core::{Error, Result};
use stratadoc_durability::LogConfig;
use stratadoc_storage::ContainerKind;
use tracing::{error, info, warn};

/// Log file extension.
pub const LOG_EXTENSION: &str = "log";

/// Longest accepted collection name.
pub const MAX_COLLECTION_NAME: usize = 64;

/// Check a collection name: 1 to 64 ASCII letters, digits, `_` or `-`.
pub fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_COLLECTION_NAME {
        return Err(Error::invalid_input(format!(
            "collection name must be 1 to {} characters",
            MAX_COLLECTION_NAME
        )));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(Error::invalid_input(format!(
            "collection name '{}' contains '{}'; use letters, digits, '_' or '-'",
            name, c
        )));
    }
    Ok(())
}

/// A set of named collections sharing one configuration.
pub struct Database {
    data_dir: PathBuf,
    config: StoreConfig,
    log_config: LogConfig,
    container: ContainerKind,
    collections: DashMap<String, Arc<Collection>>,
    closed: AtomicBool,
}

impl Database {
    /// Open or create the database in `path`.
    ///
    /// Settings come from `stratadoc.toml` in that directory, which is
    /// written with defaults on first open.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Arc<Self>> {
        let data_dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        let config_path = data_dir.join(CONFIG_FILE_NAME);
        StoreConfig::write_default_if_missing(&config_path)?;
        let config = StoreConfig::from_file(&config_path)?;

        Self::open_with_config(data_dir, config)
    }

    /// Open the database in `path` with an explicit configuration.
    ///
    /// The config is written to `stratadoc.toml` so later [`Database::open`]
    /// calls use the same settings. In Cache mode nothing is written and no
    /// log is read.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: StoreConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let log_config = config.log_config()?;
        let container = config.container_kind()?;
        let data_dir = path.as_ref().to_path_buf();

        let db = Database {
            data_dir,
            config,
            log_config,
            container,
            collections: DashMap::new(),
            closed: AtomicBool::new(false),
        };

        if db.log_config.mode.requires_log() {
            std::fs::create_dir_all(&db.data_dir)?;
            db.config.write_to_file(&db.data_dir.join(CONFIG_FILE_NAME))?;
            for name in db.discover()? {
                let collection = db.open_collection(&name)?;
                db.collections.insert(name, Arc::new(collection));
            }
        }

        info!(target: "stratadoc::db", path = %db.data_dir.display(),
            durability = db.log_config.mode.description(), collections = db.collections.len(),
            "Database opened");
        Ok(Arc::new(db))
    }

    /// In-memory database with no files.
    pub fn cache() -> Result<Arc<Self>> {
        Self::open_with_config(PathBuf::new(), StoreConfig::cache())
    }

    /// Names of the collection logs in the data directory.
    fn discover(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.data_dir)? {
            let path = entry?.path();
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if ext == "compact" {
                // Leftover of a compaction interrupted before its rename
                warn!(target: "stratadoc::db", path = %path.display(),
                    "Removing unfinished compaction output");
                std::fs::remove_file(&path)?;
                continue;
            }
            if ext != LOG_EXTENSION {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if validate_collection_name(stem).is_err() {
                warn!(target: "stratadoc::db", path = %path.display(),
                    "Ignoring log file with an invalid collection name");
                continue;
            }
            names.push(stem.to_string());
        }
        names.sort();
        Ok(names)
    }

    fn log_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{}.{}", name, LOG_EXTENSION))
    }

    fn open_collection(&self, name: &str) -> Result<Collection> {
        Collection::open(name, &self.log_path(name), self.log_config.clone(), self.container)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        Ok(())
    }

    /// Data directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Configuration in effect.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// True for a database without files.
    pub fn is_cache(&self) -> bool {
        !self.log_config.mode.requires_log()
    }

    /// Create an empty collection.
    pub fn create_collection(&self, name: &str) -> Result<Arc<Collection>> {
        self.ensure_open()?;
        validate_collection_name(name)?;
        match self.collections.entry(name.to_string()) {
            Entry::Occupied(_) => Err(Error::CollectionExists(name.to_string())),
            Entry::Vacant(slot) => {
                let collection = Arc::new(self.open_collection(name)?);
                slot.insert(Arc::clone(&collection));
                info!(target: "stratadoc::db", collection = name, "Collection created");
                Ok(collection)
            }
        }
    }

    /// Collection `name`.
    pub fn collection(&self, name: &str) -> Result<Arc<Collection>> {
        self.collections
            .get(name)
            .map(|c| Arc::clone(c.value()))
            .ok_or_else(|| Error::CollectionNotFound(name.to_string()))
    }

    /// Collection `name`, created if missing.
    pub fn collection_or_create(&self, name: &str) -> Result<Arc<Collection>> {
        match self.collection(name) {
            Err(Error::CollectionNotFound(_)) => match self.create_collection(name) {
                Err(Error::CollectionExists(_)) => self.collection(name),
                other => other,
            },
            other => other,
        }
    }

    /// Close collection `name` and delete its log.
    pub fn drop_collection(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        let (_, collection) = self
            .collections
            .remove(name)
            .ok_or_else(|| Error::CollectionNotFound(name.to_string()))?;
        collection.close()?;
        if !self.is_cache() {
            match std::fs::remove_file(self.log_path(name)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        info!(target: "stratadoc::db", collection = name, "Collection dropped");
        Ok(())
    }

    /// Collection names, sorted.
    pub fn list_collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.iter().map(|c| c.key().clone()).collect();
        names.sort();
        names
    }

    /// Flush every collection to stable storage.
    pub fn sync(&self) -> Result<()> {
        for collection in self.collections.iter() {
            collection.sync()?;
        }
        Ok(())
    }

    /// Close every collection. Returns the first failure after attempting
    /// all of them. Safe to call more than once.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut first_error = None;
        for collection in self.collections.iter() {
            if let Err(e) = collection.close() {
                error!(target: "stratadoc::db", collection = collection.key().as_str(),
                    error = %e, "Collection close failed");
                first_error.get_or_insert(e);
            }
        }
        info!(target: "stratadoc::db", path = %self.data_dir.display(), "Database closed");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// True until `close` is called.
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(target: "stratadoc::db", error = %e, "Database close failed on drop");
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("data_dir", &self.data_dir)
            .field("durability", &self.log_config.mode)
            .field("collections", &self.collections.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_collection_names() {
        assert!(validate_collection_name("users").is_ok());
        assert!(validate_collection_name("a_b-9").is_ok());
        assert!(validate_collection_name("").is_err());
        assert!(validate_collection_name("../etc").is_err());
        assert!(validate_collection_name("a.log").is_err());
        assert!(validate_collection_name(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_open_writes_default_config() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path()).unwrap();
        assert!(dir.path().join(CONFIG_FILE_NAME).exists());
        assert_eq!(db.config(), &StoreConfig::default());
        assert!(!db.is_cache());
    }

    #[test]
    fn test_create_get_list_drop() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path()).unwrap();
        db.create_collection("b").unwrap();
        db.create_collection("a").unwrap();
        assert!(matches!(
            db.create_collection("a"),
            Err(Error::CollectionExists(_))
        ));
        assert_eq!(db.list_collections(), vec!["a", "b"]);

        let a = db.collection("a").unwrap();
        a.insert(json!({"x": 1})).unwrap();
        a.sync().unwrap();
        assert!(dir.path().join("a.log").exists());

        db.drop_collection("a").unwrap();
        assert!(!dir.path().join("a.log").exists());
        assert!(db.collection("a").unwrap_err().is_not_found());
        assert!(db.drop_collection("a").unwrap_err().is_not_found());
        assert!(a.insert(json!({})).is_err());
    }

    #[test]
    fn test_reopen_discovers_collections() {
        let dir = TempDir::new().unwrap();
        {
            let db = Database::open(dir.path()).unwrap();
            db.create_collection("users").unwrap().insert(json!({"n": 1})).unwrap();
            db.create_collection("empty").unwrap();
            db.close().unwrap();
        }
        let db = Database::open(dir.path()).unwrap();
        assert_eq!(db.list_collections(), vec!["empty", "users"]);
        assert_eq!(db.collection("users").unwrap().len(), 1);
    }

    #[test]
    fn test_cache_database_touches_no_files() {
        let db = Database::cache().unwrap();
        assert!(db.is_cache());
        let c = db.create_collection("tmp").unwrap();
        c.insert(json!({"a": 1})).unwrap();
        db.drop_collection("tmp").unwrap();
        assert!(db.list_collections().is_empty());
    }

    #[test]
    fn test_closed_database_rejects_create() {
        let db = Database::cache().unwrap();
        db.close().unwrap();
        db.close().unwrap();
        assert!(!db.is_open());
        assert!(matches!(db.create_collection("x"), Err(Error::Closed)));
    }

    #[test]
    fn test_collection_or_create() {
        let db = Database::cache().unwrap();
        let a = db.collection_or_create("a").unwrap();
        let b = db.collection_or_create("a").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_leftover_compaction_file_removed() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("c.log.compact"), b"partial").unwrap();
        let _db = Database::open(dir.path()).unwrap();
        assert!(!dir.path().join("c.log.compact").exists());
    }
}
