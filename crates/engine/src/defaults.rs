//! Defaults applied to inserted documents.
//!
//! A defaults specification maps field names to either a literal value or a
//! generator token:
//!
//! | Token | Value |
//! |-------|-------|
//! | `"uuid()"` | random UUID v4 string |
//! | `"unixnano()"` | nanoseconds since the Unix epoch |
//! | `"auto()"` | per-collection counter, 1 for the first insert that uses it |
//!
//! Anything else is copied verbatim. Defaults only fill fields the document
//! does not have. A document that brings its own integer for an `auto()`
//! field raises the counter to that value, on insert and on replay alike.

use serde_json::{Map, Value};
use stratadoc_core::now_nanos;
use uuid::Uuid;

/// Generator token for a random UUID.
pub const UUID_TOKEN: &str = "uuid()";
/// Generator token for the current time in nanoseconds.
pub const UNIXNANO_TOKEN: &str = "unixnano()";
/// Generator token for the auto-increment counter.
pub const AUTO_TOKEN: &str = "auto()";

#[derive(Debug, Clone, PartialEq)]
enum Generator {
    Uuid,
    UnixNano,
    Auto,
    Literal(Value),
}

impl Generator {
    fn parse(value: &Value) -> Self {
        match value.as_str() {
            Some(UUID_TOKEN) => Generator::Uuid,
            Some(UNIXNANO_TOKEN) => Generator::UnixNano,
            Some(AUTO_TOKEN) => Generator::Auto,
            _ => Generator::Literal(value.clone()),
        }
    }
}

/// Parsed defaults specification.
#[derive(Debug, Clone, Default)]
pub struct Defaults {
    spec: Map<String, Value>,
    fields: Vec<(String, Generator)>,
}

impl Defaults {
    /// Parse a specification.
    pub fn new(spec: Map<String, Value>) -> Self {
        let fields = spec
            .iter()
            .map(|(name, value)| (name.clone(), Generator::parse(value)))
            .collect();
        Defaults { spec, fields }
    }

    /// The specification as given.
    pub fn spec(&self) -> &Map<String, Value> {
        &self.spec
    }

    /// True if no defaults are configured.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fill the fields `document` lacks.
    ///
    /// `auto` is the last auto-increment value handed out; it advances at
    /// most once per document, shared by every `auto()` field the document
    /// receives, then rises to cover any value the document supplied.
    pub fn apply(&self, document: &mut Map<String, Value>, auto: &mut u64) {
        let mut next_auto = None;
        for (name, generator) in &self.fields {
            if document.contains_key(name) {
                continue;
            }
            let value = match generator {
                Generator::Uuid => Value::String(Uuid::new_v4().to_string()),
                Generator::UnixNano => Value::from(now_nanos()),
                Generator::Auto => Value::from(*next_auto.get_or_insert_with(|| {
                    *auto += 1;
                    *auto
                })),
                Generator::Literal(value) => value.clone(),
            };
            document.insert(name.clone(), value);
        }
        self.observe_fields(document, auto);
    }

    /// Raise `auto` to cover the auto-increment values in a replayed
    /// document.
    pub fn observe(&self, document: &Value, auto: &mut u64) {
        if let Some(fields) = document.as_object() {
            self.observe_fields(fields, auto);
        }
    }

    fn observe_fields(&self, document: &Map<String, Value>, auto: &mut u64) {
        for (name, generator) in &self.fields {
            if *generator != Generator::Auto {
                continue;
            }
            if let Some(n) = document.get(name).and_then(Value::as_u64) {
                *auto = (*auto).max(n);
            }
        }
    }
}
