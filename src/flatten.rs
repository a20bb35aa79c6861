//! Flattening of nested JSON records into single-level `key → text` rows.
//!
//! Rules:
//! - objects recurse, child keys joined to the parent with the separator;
//! - arrays (of anything) become one cell holding their compact JSON text;
//! - strings longer than [`LONG_TEXT_THRESHOLD`] characters are stored as
//!   standard base64 of their UTF-8 bytes. The column name is unchanged unless
//!   [`FlattenOptions::long_text_suffix`] is set, so readers must know which
//!   columns can carry encoded text ([`decode_long_text`] reverses it);
//! - other scalars use their JSON literal (`42`, `1.5`, `true`, `null`).
//!
//! Traversal uses an explicit stack. Objects nested deeper than
//! [`FlattenOptions::max_depth`] are kept whole as JSON text.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{map, Value};
use std::collections::BTreeMap;

/// Strings with more characters than this are base64-encoded.
pub const LONG_TEXT_THRESHOLD: usize = 32_000;

/// Default nesting limit for object recursion.
pub const MAX_FLATTEN_DEPTH: usize = 64;

/// One flattened record. Keys are unique; iteration order is lexicographic.
pub type FlatRow = BTreeMap<String, String>;

#[derive(Clone, Debug)]
pub struct FlattenOptions {
    pub separator: String,
    pub long_text_threshold: usize,
    /// Appended to the column name of base64-encoded long text, e.g. `"_b64"`.
    pub long_text_suffix: Option<String>,
    pub max_depth: usize,
}

impl Default for FlattenOptions {
    fn default() -> Self {
        Self {
            separator: "_".to_string(),
            long_text_threshold: LONG_TEXT_THRESHOLD,
            long_text_suffix: None,
            max_depth: MAX_FLATTEN_DEPTH,
        }
    }
}

/// Flatten `value` with default options and the given separator.
pub fn flatten(value: &Value, parent_key: &str, separator: &str) -> FlatRow {
    let opts = FlattenOptions { separator: separator.to_string(), ..FlattenOptions::default() };
    flatten_with(value, parent_key, &opts)
}

/// Flatten `value` under `parent_key` (empty for a top-level record).
///
/// Colliding keys (`{"a_b": 1, "a": {"b": 2}}` with `_`) keep the value
/// that comes later in the record (`2` here).
pub fn flatten_with(value: &Value, parent_key: &str, opts: &FlattenOptions) -> FlatRow {
    let mut row = FlatRow::new();
    let root = match value {
        Value::Object(obj) => obj,
        other => {
            insert_leaf(&mut row, parent_key.to_string(), other, opts);
            return row;
        }
    };

    // Each frame: key prefix of the object and the remaining entries to visit.
    let mut stack: Vec<(String, map::Iter<'_>)> = vec![(parent_key.to_string(), root.iter())];
    loop {
        let next = match stack.last_mut() {
            Some((prefix, entries)) => entries.next().map(|(k, v)| (join_key(prefix, k, &opts.separator), v)),
            None => break,
        };
        match next {
            None => {
                stack.pop();
            }
            Some((key, Value::Object(child))) if stack.len() < opts.max_depth => {
                stack.push((key, child.iter()));
            }
            Some((key, leaf)) => insert_leaf(&mut row, key, leaf, opts),
        }
    }
    row
}

/// Reverse the long-text encoding of a cell.
pub fn decode_long_text(cell: &str) -> Result<String> {
    let bytes = STANDARD.decode(cell).context("long-text cell is not valid base64")?;
    String::from_utf8(bytes).context("long-text cell does not decode to UTF-8")
}

fn join_key(prefix: &str, key: &str, sep: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        let mut k = String::with_capacity(prefix.len() + sep.len() + key.len());
        k.push_str(prefix);
        k.push_str(sep);
        k.push_str(key);
        k
    }
}

fn insert_leaf(row: &mut FlatRow, key: String, value: &Value, opts: &FlattenOptions) {
    match value {
        Value::String(s) if is_long_text(s, opts.long_text_threshold) => {
            let key = match &opts.long_text_suffix {
                Some(suffix) => key + suffix,
                None => key,
            };
            row.insert(key, STANDARD.encode(s.as_bytes()));
        }
        Value::String(s) => {
            row.insert(key, s.clone());
        }
        // Arrays, depth-capped objects and the remaining scalars all use JSON text.
        other => {
            row.insert(key, other.to_string());
        }
    }
}

fn is_long_text(s: &str, threshold: usize) -> bool {
    // Byte length bounds the character count from above.
    s.len() > threshold && s.chars().count() > threshold
}
