//! Durability mode configuration
//!
//! Controls when the command log reaches stable storage (Cache, Standard, Always).

use std::time::Duration;

/// Durability mode for the command log
///
/// | Mode | fsync | Data Loss Window |
/// |------|-------|-----------------|
/// | Cache | Never (no file) | Everything |
/// | Always | After every record | Zero once written |
/// | Standard | Periodic | Up to `interval_ms` |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityMode {
    /// No log file at all. Commands are accepted and discarded.
    ///
    /// Use case: tests, caches, ephemeral collections.
    Cache,

    /// Flush and fsync after every record the writer appends.
    Always,

    /// Flush and fsync on a timer (the default).
    Standard {
        /// Maximum time between fsyncs in milliseconds
        interval_ms: u64,
    },
}

impl DurabilityMode {
    /// Default fsync interval of [`DurabilityMode::Standard`].
    pub const DEFAULT_INTERVAL_MS: u64 = 100;

    /// False only for Cache mode.
    pub fn requires_log(&self) -> bool {
        !matches!(self, DurabilityMode::Cache)
    }

    /// True only for Always mode.
    pub fn requires_immediate_fsync(&self) -> bool {
        matches!(self, DurabilityMode::Always)
    }

    /// How long the writer may sit idle before checking for a periodic sync.
    pub fn tick(&self) -> Duration {
        match self {
            DurabilityMode::Standard { interval_ms } => Duration::from_millis(*interval_ms),
            _ => Duration::from_millis(Self::DEFAULT_INTERVAL_MS),
        }
    }

    /// Human-readable description of the mode
    pub fn description(&self) -> &'static str {
        match self {
            DurabilityMode::Cache => "Cache (no log file, all data lost on exit)",
            DurabilityMode::Always => "Always sync (safest, slowest)",
            DurabilityMode::Standard { .. } => "Standard (periodic fsync)",
        }
    }
}

impl Default for DurabilityMode {
    fn default() -> Self {
        DurabilityMode::Standard {
            interval_ms: Self::DEFAULT_INTERVAL_MS,
        }
    }
}
