//! Composite keys for the ordered index.

use serde_json::Value;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;
use stratadoc_core::RowHandle;

/// A comparable field value. Numbers sort before strings.
#[derive(Debug, Clone)]
pub enum KeyValue {
    /// Any JSON number, compared as f64
    Number(f64),
    /// A JSON string, compared bytewise
    String(String),
}

impl KeyValue {
    /// Convert a JSON value, or `None` if its type cannot be ordered.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(KeyValue::Number),
            Value::String(s) => Some(KeyValue::String(s.clone())),
            _ => None,
        }
    }
}

impl Ord for KeyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyValue::Number(a), KeyValue::Number(b)) => a.total_cmp(b),
            (KeyValue::String(a), KeyValue::String(b)) => a.cmp(b),
            (KeyValue::Number(_), KeyValue::String(_)) => Ordering::Less,
            (KeyValue::String(_), KeyValue::Number(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for KeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for KeyValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyValue {}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Number(n) => write!(f, "{}", n),
            KeyValue::String(s) => write!(f, "{:?}", s),
        }
    }
}

/// One position of a composite key.
///
/// `Low` stands in for a field left out of a range bound and sorts before
/// every value regardless of direction.
#[derive(Debug, Clone)]
pub(crate) struct Component {
    value: Option<KeyValue>,
    descending: bool,
}

impl Component {
    pub(crate) fn value(value: KeyValue, descending: bool) -> Self {
        Component {
            value: Some(value),
            descending,
        }
    }

    pub(crate) fn low() -> Self {
        Component {
            value: None,
            descending: false,
        }
    }
}

impl Ord for Component {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.value, &other.value) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) if self.descending => b.cmp(a),
            (Some(a), Some(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Component {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Component {}

pub(crate) type Key = SmallVec<[Component; 2]>;

/// Stored entry: composite key, then handle as tie-breaker so equal keys
/// from different rows coexist.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Entry {
    pub(crate) key: Key,
    pub(crate) handle: RowHandle,
}

impl Entry {
    pub(crate) fn new(key: Key, handle: RowHandle) -> Self {
        Entry { key, handle }
    }

    /// Smallest entry with this key.
    pub(crate) fn first(key: Key) -> Self {
        Entry::new(key, RowHandle(0))
    }

    /// Largest entry with this key.
    pub(crate) fn last(key: Key) -> Self {
        Entry::new(key, RowHandle(u32::MAX))
    }
}
