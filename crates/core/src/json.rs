//! JSON document helpers
//!
//! - Document limits (size, nesting depth, array length)
//! - RFC 7396 merge patch ([`merge_patch`])
//! - Minimal diff between two documents expressed as a merge patch
//!   ([`merge_diff`], [`exact_merge_diff`])
//!
//! # Document Size Limits
//!
//! | Limit | Value | Constant |
//! |-------|-------|----------|
//! | Max encoded document size | 16 MB | [`MAX_DOCUMENT_SIZE`] |
//! | Max nesting depth | 100 levels | [`MAX_NESTING_DEPTH`] |
//! | Max array size | 1M elements | [`MAX_ARRAY_SIZE`] |

use serde_json::{Map, Value};
use thiserror::Error;

/// Maximum encoded document size in bytes (16 MB)
pub const MAX_DOCUMENT_SIZE: usize = 16 * 1024 * 1024;

/// Maximum nesting depth in a JSON document (100 levels)
///
/// Bounds the recursion of merge patch and diff.
pub const MAX_NESTING_DEPTH: usize = 100;

/// Maximum array size in elements (1 million elements)
pub const MAX_ARRAY_SIZE: usize = 1_000_000;

/// Error type for document limit violations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LimitError {
    /// Document exceeds maximum size
    #[error("document size {size} exceeds maximum of {max} bytes")]
    DocumentTooLarge {
        /// Actual document size
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// Document nesting exceeds maximum depth
    #[error("document nesting depth {depth} exceeds maximum of {max} levels")]
    NestingTooDeep {
        /// Actual nesting depth
        depth: usize,
        /// Maximum allowed depth
        max: usize,
    },

    /// Array exceeds maximum size
    #[error("array size {size} exceeds maximum of {max} elements")]
    ArrayTooLarge {
        /// Actual array size
        size: usize,
        /// Maximum allowed size
        max: usize,
    },
}

/// Nesting depth of a value. Scalars are depth 0.
pub fn nesting_depth(value: &Value) -> usize {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => 0,
        Value::Array(arr) => 1 + arr.iter().map(nesting_depth).max().unwrap_or(0),
        Value::Object(obj) => 1 + obj.values().map(nesting_depth).max().unwrap_or(0),
    }
}

/// Largest array anywhere inside the value.
pub fn max_array_size(value: &Value) -> usize {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => 0,
        Value::Array(arr) => {
            let nested_max = arr.iter().map(max_array_size).max().unwrap_or(0);
            arr.len().max(nested_max)
        }
        Value::Object(obj) => obj.values().map(max_array_size).max().unwrap_or(0),
    }
}

/// Validate depth and array limits of a decoded document.
pub fn validate_limits(value: &Value) -> Result<(), LimitError> {
    let depth = nesting_depth(value);
    if depth > MAX_NESTING_DEPTH {
        return Err(LimitError::NestingTooDeep {
            depth,
            max: MAX_NESTING_DEPTH,
        });
    }
    let size = max_array_size(value);
    if size > MAX_ARRAY_SIZE {
        return Err(LimitError::ArrayTooLarge {
            size,
            max: MAX_ARRAY_SIZE,
        });
    }
    Ok(())
}

/// Validate the encoded size of a document.
pub fn validate_encoded_size(size: usize) -> Result<(), LimitError> {
    if size > MAX_DOCUMENT_SIZE {
        Err(LimitError::DocumentTooLarge {
            size,
            max: MAX_DOCUMENT_SIZE,
        })
    } else {
        Ok(())
    }
}

/// Apply an RFC 7396 merge patch to `target` in place.
///
/// - object patch: keys merge recursively; a `null` value deletes the key
/// - any other patch value (arrays included) replaces the target wholesale
/// - a non-object target patched with an object is first reset to `{}`
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_obj) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_obj) = target {
        for (key, value) in patch_obj {
            if value.is_null() {
                target_obj.remove(key);
            } else {
                merge_patch(target_obj.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

/// Compute a merge patch that turns `old` into `new`.
///
/// Only changed or removed keys appear in the result; unchanged subtrees are
/// omitted. Removed keys map to `null`. If `old` and `new` are equal objects the
/// result is `{}`.
///
/// Merge patch cannot express "set this key to null", so a `new` that gains a
/// null-valued key yields a diff that is not exact. Use [`exact_merge_diff`]
/// when the caller needs a guarantee.
pub fn merge_diff(old: &Value, new: &Value) -> Value {
    match (old, new) {
        (Value::Object(old_obj), Value::Object(new_obj)) => {
            let mut diff = Map::new();
            for key in old_obj.keys() {
                if !new_obj.contains_key(key) {
                    diff.insert(key.clone(), Value::Null);
                }
            }
            for (key, new_value) in new_obj {
                match old_obj.get(key) {
                    Some(old_value) if old_value == new_value => {}
                    Some(old_value) if old_value.is_object() && new_value.is_object() => {
                        diff.insert(key.clone(), merge_diff(old_value, new_value));
                    }
                    _ => {
                        diff.insert(key.clone(), new_value.clone());
                    }
                }
            }
            Value::Object(diff)
        }
        _ => new.clone(),
    }
}

/// Like [`merge_diff`] but returns `None` when the diff would not reproduce
/// `new` exactly when merged into `old`.
pub fn exact_merge_diff(old: &Value, new: &Value) -> Option<Value> {
    let diff = merge_diff(old, new);
    let mut replayed = old.clone();
    merge_patch(&mut replayed, &diff);
    (replayed == *new).then_some(diff)
}

/// Human-readable JSON type name, used in error messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
