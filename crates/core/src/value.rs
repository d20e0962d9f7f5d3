//! Typed values exchanged with the query-processing collaborator

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single typed value
///
/// Rows of relational entities are vectors of values; documents and graph
/// elements are `Document` values keyed by field name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL / absent field
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Ordered map of named fields
    Document(BTreeMap<String, Value>),
    /// Ordered list
    List(Vec<Value>),
}

impl Value {
    /// Integer content, if any
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Whether this is `Null`
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether the value is a placeholder for a not-yet-assigned identity
    /// or version (`Null` or the `0` sentinel)
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Value::Null | Value::Int(0))
    }

    /// Field lookup on document values
    pub fn get(&self, field: &str) -> Option<&Value> {
        match self {
            Value::Document(fields) => fields.get(field),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Document(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// A batch of typed rows returned by an executed statement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowBatch {
    /// Column names
    pub columns: Vec<String>,
    /// Row values, one vector per row in column order
    pub rows: Vec<Vec<Value>>,
}

impl RowBatch {
    /// Create a batch
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        RowBatch { columns, rows }
    }

    /// A batch with no rows
    pub fn empty() -> Self {
        RowBatch::default()
    }

    /// A one-row, one-column batch
    pub fn scalar(column: impl Into<String>, value: Value) -> Self {
        RowBatch {
            columns: vec![column.into()],
            rows: vec![vec![value]],
        }
    }

    /// First column of the first row
    pub fn first_value(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.first())
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the batch has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
