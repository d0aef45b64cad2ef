//! Logged commands.
//!
//! A [`Command`] is the durable form of one collection mutation. Commands are
//! the only thing written to the log; replaying them in order from an empty
//! collection reproduces its rows, indexes and defaults.

use crate::index_types::IndexOptions;
use crate::types::{now_micros, RowId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// How a patched row's new content is recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PatchChange {
    /// Minimal merge patch that turns the previous document into the new one
    Diff(Value),
    /// Full new document, used when a merge patch cannot express the change
    Replace(Value),
}

/// Operation-specific payload of a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandOp {
    /// A new row with its full document (defaults already applied)
    Insert {
        /// Identity assigned to the row
        row: RowId,
        /// Stored document
        document: Value,
    },
    /// Row deletion
    Remove {
        /// Removed row
        row: RowId,
    },
    /// In-place update of a row
    Patch {
        /// Patched row
        row: RowId,
        /// Recorded change
        change: PatchChange,
    },
    /// Index creation
    CreateIndex {
        /// Index name
        name: String,
        /// Index definition
        options: IndexOptions,
    },
    /// Index removal
    DropIndex {
        /// Index name
        name: String,
    },
    /// Wholesale replacement of the defaults specification
    SetDefaults {
        /// Field name to literal value or generator token
        defaults: Map<String, Value>,
    },
    /// Counter watermarks, written at the end of a compacted log so that
    /// identities of rows removed before compaction are never reissued and
    /// the auto-increment counter comes back exactly
    Counters {
        /// Identity the next inserted row receives
        next_row: RowId,
        /// Last value handed out by the auto-increment generator
        auto_counter: u64,
    },
}

/// A durably-logged intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Unique command identifier
    pub id: Uuid,
    /// Creation time, microseconds since the Unix epoch
    pub timestamp: u64,
    /// What the command does
    pub op: CommandOp,
}

impl Command {
    /// Wrap an operation with a fresh id and the current time.
    pub fn new(op: CommandOp) -> Self {
        Command {
            id: Uuid::new_v4(),
            timestamp: now_micros(),
            op,
        }
    }

    /// Short operation name, as used in logs.
    pub fn name(&self) -> &'static str {
        match &self.op {
            CommandOp::Insert { .. } => "insert",
            CommandOp::Remove { .. } => "remove",
            CommandOp::Patch { .. } => "patch",
            CommandOp::CreateIndex { .. } => "create_index",
            CommandOp::DropIndex { .. } => "drop_index",
            CommandOp::SetDefaults { .. } => "set_defaults",
            CommandOp::Counters { .. } => "counters",
        }
    }

    /// Row the command targets, if any.
    pub fn row(&self) -> Option<RowId> {
        match &self.op {
            CommandOp::Insert { row, .. }
            | CommandOp::Remove { row }
            | CommandOp::Patch { row, .. } => Some(*row),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_command_has_unique_id() {
        let a = Command::new(CommandOp::Remove { row: RowId(1) });
        let b = Command::new(CommandOp::Remove { row: RowId(1) });
        assert_ne!(a.id, b.id);
        assert!(a.timestamp > 0);
    }

    #[test]
    fn test_command_name_and_row() {
        let insert = Command::new(CommandOp::Insert {
            row: RowId(4),
            document: json!({"a": 1}),
        });
        assert_eq!(insert.name(), "insert");
        assert_eq!(insert.row(), Some(RowId(4)));

        let drop = Command::new(CommandOp::DropIndex { name: "x".into() });
        assert_eq!(drop.name(), "drop_index");
        assert_eq!(drop.row(), None);
    }
}
