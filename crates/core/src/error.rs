//! Error types for StrataDoc
//!
//! Every fallible operation in the workspace returns [`Result<T>`]. Errors are
//! grouped into a small taxonomy ([`ErrorKind`]) so callers can decide how to
//! react without matching on every variant:
//!
//! | Kind | Meaning | State change |
//! |------|---------|--------------|
//! | Validation | malformed input, unsupported field type, missing field | none |
//! | Conflict | uniqueness violation, duplicate index name | none |
//! | NotFound | unknown row or index | none |
//! | Durability | log write/flush failed after the in-memory change | applied, not confirmed durable |
//! | Corruption | log replay found a damaged record | recovery stopped |
//! | Closed | the store is shutting down | none |

use crate::json::LimitError;
use crate::types::RowId;
use std::io;
use thiserror::Error;

/// Result type alias for StrataDoc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Input rejected before any state changed
    Validation,
    /// A uniqueness constraint or name collision
    Conflict,
    /// The target row or index does not exist
    NotFound,
    /// Persisting an already-applied mutation failed
    Durability,
    /// The command log is damaged
    Corruption,
    /// The store or log has been closed
    Closed,
}

/// Error types for the document store
#[derive(Debug, Error)]
pub enum Error {
    /// Input failed validation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A mandatory indexed field is absent from the document
    #[error("Missing field '{field}' required by index '{index}'")]
    MissingField {
        /// Index that requires the field
        index: String,
        /// Field name
        field: String,
    },

    /// The field holds a value the index cannot order or hash
    #[error("Unsupported type for field '{field}' in index '{index}': expected {expected}")]
    UnsupportedFieldType {
        /// Index name
        index: String,
        /// Field name
        field: String,
        /// Human-readable list of accepted types
        expected: &'static str,
    },

    /// Document exceeded a size limit
    #[error("Document limit exceeded: {0}")]
    Limit(#[from] LimitError),

    /// Uniqueness violation
    #[error("Unique constraint violated on index '{index}': {key}")]
    UniqueViolation {
        /// Index name
        index: String,
        /// Conflicting field/value pairs, rendered
        key: String,
    },

    /// An index with this name already exists
    #[error("Index '{0}' already exists")]
    IndexExists(String),

    /// Row not found
    #[error("Row not found: {0}")]
    RowNotFound(RowId),

    /// Index not found
    #[error("Index not found: '{0}'")]
    IndexNotFound(String),

    /// Collection not found
    #[error("Collection not found: '{0}'")]
    CollectionNotFound(String),

    /// A collection with this name already exists
    #[error("Collection '{0}' already exists")]
    CollectionExists(String),

    /// The command was applied in memory but could not be made durable
    #[error("Durability error: {0}")]
    Durability(String),

    /// I/O error (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Damaged command log
    #[error("Log corruption at record {record} (offset {offset}): {reason}")]
    Corruption {
        /// Zero-based index of the offending record
        record: u64,
        /// Byte offset of the record within the log file
        offset: u64,
        /// What was wrong with it
        reason: String,
    },

    /// Operation attempted on a closed log or store
    #[error("Store is closed")]
    Closed,
}

impl Error {
    /// Shorthand for [`Error::InvalidInput`].
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_)
            | Error::MissingField { .. }
            | Error::UnsupportedFieldType { .. }
            | Error::Limit(_)
            | Error::Serialization(_) => ErrorKind::Validation,
            Error::UniqueViolation { .. } | Error::IndexExists(_) | Error::CollectionExists(_) => {
                ErrorKind::Conflict
            }
            Error::RowNotFound(_) | Error::IndexNotFound(_) | Error::CollectionNotFound(_) => {
                ErrorKind::NotFound
            }
            Error::Durability(_) | Error::Io(_) => ErrorKind::Durability,
            Error::Corruption { .. } => ErrorKind::Corruption,
            Error::Closed => ErrorKind::Closed,
        }
    }

    /// True for uniqueness violations and name collisions.
    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    /// True for unknown rows, indexes and collections.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
