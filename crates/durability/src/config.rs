//! Command log configuration.

use crate::mode::DurabilityMode;

/// Command log configuration parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// When records reach stable storage.
    pub mode: DurabilityMode,

    /// Commands that may wait for encoding before `persist` blocks
    /// (default: 1024).
    pub queue_capacity: usize,

    /// Threads serializing commands in parallel (default: 2).
    pub encoder_threads: usize,

    /// Records decoded together during replay (default: 256).
    pub replay_batch: usize,

    /// Encode buffers kept for reuse (default: 64).
    pub buffer_pool_size: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            mode: DurabilityMode::default(),
            queue_capacity: 1024,
            encoder_threads: 2,
            replay_batch: 256,
            buffer_pool_size: 64,
        }
    }
}

impl LogConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the durability mode (builder pattern).
    pub fn with_mode(mut self, mode: DurabilityMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the queue capacity (builder pattern).
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the number of encoder threads (builder pattern).
    pub fn with_encoder_threads(mut self, threads: usize) -> Self {
        self.encoder_threads = threads;
        self
    }

    /// Set the replay batch size (builder pattern).
    pub fn with_replay_batch(mut self, batch: usize) -> Self {
        self.replay_batch = batch;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), LogConfigError> {
        if self.queue_capacity == 0 {
            return Err(LogConfigError::ZeroQueueCapacity);
        }
        if self.encoder_threads == 0 {
            return Err(LogConfigError::NoEncoderThreads);
        }
        if self.replay_batch == 0 {
            return Err(LogConfigError::ZeroReplayBatch);
        }
        if let DurabilityMode::Standard { interval_ms: 0 } = self.mode {
            return Err(LogConfigError::ZeroInterval);
        }
        Ok(())
    }

    /// Small queue and a single encoder, for tests that exercise back-pressure.
    pub fn for_testing() -> Self {
        LogConfig {
            mode: DurabilityMode::Standard { interval_ms: 10 },
            queue_capacity: 8,
            encoder_threads: 1,
            replay_batch: 4,
            buffer_pool_size: 4,
        }
    }
}

/// Command log configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogConfigError {
    /// Queue capacity is zero.
    #[error("Queue capacity must be at least 1")]
    ZeroQueueCapacity,

    /// No encoder threads requested.
    #[error("At least one encoder thread is required")]
    NoEncoderThreads,

    /// Replay batch size is zero.
    #[error("Replay batch size must be at least 1")]
    ZeroReplayBatch,

    /// Standard mode with a zero interval.
    #[error("Standard durability interval must be at least 1ms")]
    ZeroInterval,
}

impl From<LogConfigError> for stratadoc_core::Error {
    fn from(e: LogConfigError) -> Self {
        stratadoc_core::Error::invalid_input(e.to_string())
    }
}
