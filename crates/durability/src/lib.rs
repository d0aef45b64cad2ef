//! Durability layer for StrataDoc
//!
//! This crate handles everything that touches disk:
//!
//! - Command log: one append-only file per collection, one framed record per
//!   command
//! - Write-behind persistence: bounded queue, parallel encode, sequential write
//! - Durability modes: Always, Standard (default), Cache
//! - Replay: ordered command stream with torn-tail tolerance
//! - Compaction: atomic rewrite of a log from a minimal command sequence

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod config;
pub mod format;
pub mod mode;
pub mod reader;
pub mod writer;

pub use config::{LogConfig, LogConfigError};
pub use format::RecordError;
pub use mode::DurabilityMode;
pub use reader::{replay, LogTail, Replay, ReplaySummary};
pub use writer::{write_log_file, CommandLog, LogStats};
