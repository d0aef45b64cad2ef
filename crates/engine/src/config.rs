//! Store configuration via `stratadoc.toml`
//!
//! On first open a commented default `stratadoc.toml` is written into the
//! data directory. To change settings, edit the file and reopen.

use serde::{Deserialize, Serialize};
use std::path::Path;
use stratadoc_core::{Error, Result};
use stratadoc_durability::{DurabilityMode, LogConfig};
use stratadoc_storage::ContainerKind;

/// Config file name placed in the data directory.
pub const CONFIG_FILE_NAME: &str = "stratadoc.toml";

/// Store configuration loaded from `stratadoc.toml`.
///
/// # Example
///
/// ```toml
/// durability = "standard"
/// flush_interval_ms = 100
/// queue_capacity = 1024
/// encoder_threads = 2
/// container = "btree"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Durability mode: `"standard"`, `"always"` or `"cache"`.
    #[serde(default = "default_durability_str")]
    pub durability: String,
    /// Fsync interval of the standard mode, in milliseconds.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Commands buffered ahead of the encoders before `persist` blocks.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Threads encoding commands in parallel.
    #[serde(default = "default_encoder_threads")]
    pub encoder_threads: usize,
    /// Row container strategy for collections.
    #[serde(default)]
    pub container: ContainerKind,
}

fn default_durability_str() -> String {
    "standard".to_string()
}

fn default_flush_interval_ms() -> u64 {
    DurabilityMode::DEFAULT_INTERVAL_MS
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_encoder_threads() -> usize {
    2
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            durability: default_durability_str(),
            flush_interval_ms: default_flush_interval_ms(),
            queue_capacity: default_queue_capacity(),
            encoder_threads: default_encoder_threads(),
            container: ContainerKind::default(),
        }
    }
}

impl StoreConfig {
    /// Configuration that keeps everything in memory.
    pub fn cache() -> Self {
        Self {
            durability: "cache".to_string(),
            ..Self::default()
        }
    }

    /// Parse the durability string into a `DurabilityMode`.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not `"standard"`, `"always"` or
    /// `"cache"`.
    pub fn durability_mode(&self) -> Result<DurabilityMode> {
        match self.durability.as_str() {
            "standard" => Ok(DurabilityMode::Standard {
                interval_ms: self.flush_interval_ms,
            }),
            "always" => Ok(DurabilityMode::Always),
            "cache" => Ok(DurabilityMode::Cache),
            other => Err(Error::invalid_input(format!(
                "Invalid durability mode '{}' in {}. Expected \"standard\", \"always\" or \"cache\".",
                other, CONFIG_FILE_NAME
            ))),
        }
    }

    /// Command log settings derived from this config.
    pub fn log_config(&self) -> Result<LogConfig> {
        let config = LogConfig::new()
            .with_mode(self.durability_mode()?)
            .with_queue_capacity(self.queue_capacity)
            .with_encoder_threads(self.encoder_threads);
        config.validate()?;
        Ok(config)
    }

    /// Container strategy for new collections.
    ///
    /// # Errors
    ///
    /// The dense strategy is refused: it rewrites row identities on delete,
    /// and collections expose identities to clients and record them in the
    /// log.
    pub fn container_kind(&self) -> Result<ContainerKind> {
        if !self.container.has_stable_identity() {
            return Err(Error::invalid_input(format!(
                "container {:?} does not keep row identities stable; use \"btree\" or \"keyed\"",
                self.container
            )));
        }
        Ok(self.container)
    }

    /// Check every setting.
    pub fn validate(&self) -> Result<()> {
        self.log_config()?;
        self.container_kind()?;
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# StrataDoc store configuration
#
# Durability mode: "standard" (default), "always" or "cache"
#   "standard" = periodic fsync, may lose the last interval on crash
#   "always"   = fsync every record
#   "cache"    = no log files, everything is lost on exit
durability = "standard"

# Fsync interval of the standard mode, in milliseconds
flush_interval_ms = 100

# Commands buffered ahead of the encoders before writes block
queue_capacity = 1024

# Threads encoding log records in parallel
encoder_threads = 2

# Row container: "btree" (ordered by row id) or "keyed" (hash map)
container = "btree"
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: StoreConfig = toml::from_str(&content).map_err(|e| {
            Error::invalid_input(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
