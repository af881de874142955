//! De-duplicating shared resource tables for export

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::HandlerResult;

/// Value-keyed registry assigning array indices to shared sub-resources
///
/// Equality is structural: two values that serialize to the same JSON (object
/// key order ignored) share one index.
#[derive(Debug, Clone, Default)]
pub struct SharedResourceTable {
    values: Vec<Value>,
    index: HashMap<String, usize>,
}

impl SharedResourceTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of an equal value already registered, or a freshly assigned one
    pub fn get_or_register<T: Serialize + ?Sized>(&mut self, value: &T) -> HandlerResult<usize> {
        let value = serde_json::to_value(value)?;
        let key = canonical_key(&value);

        if let Some(&index) = self.index.get(&key) {
            return Ok(index);
        }

        let index = self.values.len();
        self.values.push(value);
        self.index.insert(key, index);
        Ok(index)
    }

    /// Registered value at `index`
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Registered values in index order
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// The index-addressed array a document-level payload emits
    pub fn to_array(&self) -> Value {
        Value::Array(self.values.clone())
    }

    /// Get the number of distinct values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Compact JSON with object keys sorted at every level
fn canonical_key(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(v) = map.get(key) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
