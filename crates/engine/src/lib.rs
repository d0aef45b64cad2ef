//! Collection engine for StrataDoc
//!
//! This crate ties the lower layers together:
//! - Collection: rows + indexes + defaults + command log, with atomic
//!   multi-index mutations and rollback
//! - Recovery: replaying a collection's log into memory on open
//! - Defaults: generators applied to inserted documents
//! - Database: a directory of collections configured by `stratadoc.toml`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod collection;
pub mod config;
pub mod database;
pub mod defaults;
mod recovery;

pub use collection::Collection;
pub use config::{StoreConfig, CONFIG_FILE_NAME};
pub use database::{validate_collection_name, Database};
pub use defaults::Defaults;
