//! Index definitions and query options.
//!
//! [`IndexOptions`] are fixed when an index is created and recorded verbatim in
//! the command log. [`IndexQuery`] is the per-kind query passed to an index
//! traversal.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix marking an ordered-index field as descending (`"-age"`).
pub const DESCENDING_PREFIX: char = '-';

/// The three index implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Exact-match hash index over a string (or array of strings) field
    Map,
    /// Ordered index over a composite key of string/number fields
    Btree,
    /// Inverted full-text index over a string field
    Fulltext,
}

impl IndexKind {
    /// Lowercase name as it appears in configuration and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Map => "map",
            IndexKind::Btree => "btree",
            IndexKind::Fulltext => "fulltext",
        }
    }
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One component of an ordered index key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    /// Document field name (marker stripped)
    pub name: String,
    /// Whether this component sorts in reverse
    pub descending: bool,
}

impl SortField {
    /// Parse a declared field, honouring the descending marker.
    pub fn parse(declared: &str) -> Self {
        match declared.strip_prefix(DESCENDING_PREFIX) {
            Some(name) => SortField {
                name: name.to_string(),
                descending: true,
            },
            None => SortField {
                name: declared.to_string(),
                descending: false,
            },
        }
    }
}

/// Immutable index configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexOptions {
    /// Index implementation
    pub kind: IndexKind,
    /// Indexed field names, in key order
    pub fields: Vec<String>,
    /// Skip documents missing the field instead of rejecting them
    #[serde(default)]
    pub sparse: bool,
    /// Reject a second document with the same key
    #[serde(default)]
    pub unique: bool,
}

impl IndexOptions {
    /// Exact-match index over `field`.
    pub fn map(field: impl Into<String>) -> Self {
        Self::new(IndexKind::Map, vec![field.into()])
    }

    /// Ordered index over `fields` (prefix a field with `-` for descending).
    pub fn btree<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(IndexKind::Btree, fields.into_iter().map(Into::into).collect())
    }

    /// Full-text index over `field`.
    pub fn fulltext(field: impl Into<String>) -> Self {
        Self::new(IndexKind::Fulltext, vec![field.into()])
    }

    fn new(kind: IndexKind, fields: Vec<String>) -> Self {
        IndexOptions {
            kind,
            fields,
            sparse: false,
            unique: false,
        }
    }

    /// Set the sparse flag (builder pattern).
    pub fn sparse(mut self, sparse: bool) -> Self {
        self.sparse = sparse;
        self
    }

    /// Set the unique flag (builder pattern).
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// The single field of a map or full-text index.
    pub fn field(&self) -> &str {
        self.fields.first().map(String::as_str).unwrap_or_default()
    }

    /// Parsed key components of an ordered index.
    pub fn sort_fields(&self) -> Vec<SortField> {
        self.fields.iter().map(|f| SortField::parse(f)).collect()
    }

    /// Check the options are coherent for their kind.
    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(Error::invalid_input("index requires at least one field"));
        }

        match self.kind {
            IndexKind::Map | IndexKind::Fulltext => {
                if self.fields.len() != 1 {
                    return Err(Error::invalid_input(format!(
                        "{} index takes exactly one field, got {}",
                        self.kind,
                        self.fields.len()
                    )));
                }
                if self.fields[0].is_empty() {
                    return Err(Error::invalid_input("field name cannot be empty"));
                }
                if self.kind == IndexKind::Fulltext && self.unique {
                    return Err(Error::invalid_input("fulltext index cannot be unique"));
                }
            }
            IndexKind::Btree => {
                let parsed = self.sort_fields();
                for (i, field) in parsed.iter().enumerate() {
                    if field.name.is_empty() {
                        return Err(Error::invalid_input("field name cannot be empty"));
                    }
                    if parsed[..i].iter().any(|f| f.name == field.name) {
                        return Err(Error::invalid_input(format!(
                            "field '{}' appears twice in index key",
                            field.name
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

/// Range bounds for an ordered index.
///
/// `from` is inclusive and `to` exclusive. Each bound is a JSON object holding a
/// prefix of the key fields; fields left out of a bound sort before every value
/// in that position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeQuery {
    /// Inclusive lower bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Value>,
    /// Exclusive upper bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Value>,
    /// Visit in descending key order
    #[serde(default)]
    pub reverse: bool,
}

impl RangeQuery {
    /// Unbounded ascending range.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the inclusive lower bound.
    pub fn from(mut self, bound: Value) -> Self {
        self.from = Some(bound);
        self
    }

    /// Set the exclusive upper bound.
    pub fn to(mut self, bound: Value) -> Self {
        self.to = Some(bound);
        self
    }

    /// Set the reverse flag.
    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }
}

/// Query passed to an index traversal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexQuery {
    /// Exact value lookup (map index)
    Value(String),
    /// Ordered range scan (btree index)
    Range(RangeQuery),
    /// Phrase whose tokens must all be present (fulltext index)
    Match(String),
}

impl IndexQuery {
    /// Exact-match query.
    pub fn value(value: impl Into<String>) -> Self {
        IndexQuery::Value(value.into())
    }

    /// Full-text query.
    pub fn matching(text: impl Into<String>) -> Self {
        IndexQuery::Match(text.into())
    }

    /// Index kind able to answer this query.
    pub fn kind(&self) -> IndexKind {
        match self {
            IndexQuery::Value(_) => IndexKind::Map,
            IndexQuery::Range(_) => IndexKind::Btree,
            IndexQuery::Match(_) => IndexKind::Fulltext,
        }
    }
}

impl From<RangeQuery> for IndexQuery {
    fn from(range: RangeQuery) -> Self {
        IndexQuery::Range(range)
    }
}
