//! Tagged cell values and the row mapping returned by queries.
//!
//! Tables carry a dynamic schema, so rows leave the engine as an ordered mapping
//! from column name to [`Value`]. Missing values are always [`Value::Null`], which
//! serializes as JSON `null`; floating-point NaN is folded into `Null` as well.

use polars::prelude::AnyValue;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl From<&AnyValue<'_>> for Value {
    fn from(av: &AnyValue<'_>) -> Self {
        match av {
            AnyValue::Null => Value::Null,
            AnyValue::Boolean(b) => Value::Bool(*b),
            AnyValue::String(s) => Value::Str((*s).to_string()),
            AnyValue::StringOwned(s) => Value::Str(s.to_string()),
            AnyValue::Int8(v) => Value::Int(*v as i64),
            AnyValue::Int16(v) => Value::Int(*v as i64),
            AnyValue::Int32(v) => Value::Int(*v as i64),
            AnyValue::Int64(v) => Value::Int(*v),
            AnyValue::UInt8(v) => Value::Int(*v as i64),
            AnyValue::UInt16(v) => Value::Int(*v as i64),
            AnyValue::UInt32(v) => Value::Int(*v as i64),
            AnyValue::UInt64(v) => match i64::try_from(*v) {
                Ok(i) => Value::Int(i),
                Err(_) => Value::Float(*v as f64),
            },
            AnyValue::Float32(v) => float_or_null(*v as f64),
            AnyValue::Float64(v) => float_or_null(*v),
            other => Value::Str(other.to_string()),
        }
    }
}

fn float_or_null(v: f64) -> Value {
    if v.is_nan() {
        Value::Null
    } else {
        Value::Float(v)
    }
}

/// One table row: column names in schema order, each with its value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    fields: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            fields: Vec::with_capacity(n),
        }
    }

    pub fn push(&mut self, column: impl Into<String>, value: Value) {
        self.fields.push((column.into(), value));
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
