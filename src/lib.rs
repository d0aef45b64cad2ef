//! StrataDoc - embedded JSON document store
//!
//! StrataDoc keeps collections of JSON documents in memory, makes them
//! durable through an append-only command log per collection, and answers
//! queries through three kinds of secondary index: exact match, ordered range
//! and full-text.
//!
//! # Quick Start
//!
//! ```no_run
//! use stratadoc::{json, Database, IndexOptions, IndexQuery, RangeQuery};
//!
//! # fn main() -> stratadoc::Result<()> {
//! let db = Database::open("./data")?;
//! let people = db.collection_or_create("people")?;
//!
//! people.create_index("by_age", IndexOptions::btree(["age"]))?;
//! people.create_index("by_email", IndexOptions::map("email").unique(true))?;
//! people.insert(json!({"name": "Ann", "age": 30, "email": "ann@example.com"}))?;
//!
//! let adults = RangeQuery::new().from(json!({"age": 18}));
//! for row in people.find("by_age", &adults.into())? {
//!     println!("{} {}", row.id(), row.document()?);
//! }
//! let ann = people.find("by_email", &IndexQuery::value("ann@example.com"))?;
//! assert_eq!(ann.len(), 1);
//!
//! db.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! | Crate | Role |
//! |-------|------|
//! | `stratadoc-core` | ids, index options, commands, errors, merge patch |
//! | `stratadoc-storage` | slot allocator, rows, row containers |
//! | `stratadoc-index` | map, B-tree and full-text indexes |
//! | `stratadoc-durability` | command log, framing, replay |
//! | `stratadoc-engine` | collections, recovery, databases, config |

pub use serde_json::{json, Value};
pub use stratadoc_core::{
    Command, CommandOp, Error, ErrorKind, IndexKind, IndexOptions, IndexQuery, PatchChange,
    RangeQuery, Result, RowId, SortField,
};
pub use stratadoc_durability::{DurabilityMode, LogStats};
pub use stratadoc_engine::{Collection, Database, StoreConfig, CONFIG_FILE_NAME};
pub use stratadoc_storage::{ContainerKind, Row, RowRef};
