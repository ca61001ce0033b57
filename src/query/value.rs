//! Typed constant values
//!
//! A `Value` is the only way a constant crosses into a compiled query: the
//! compiler converts it to the resolved comparison type and hands it to the
//! parameter binder. It never appears in fragment text.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::errors::{QueryError, QueryResult};
use super::types::ScalarType;

/// A typed scalar constant
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Decimal(Decimal),
    Text(String),
    Timestamp(DateTime<Utc>),
    Guid(Uuid),
}

impl Value {
    /// Declared scalar type of this constant; `None` for null
    pub fn scalar_type(&self) -> Option<ScalarType<'static>> {
        Some(match self {
            Value::Null => return None,
            Value::Bool(_) => ScalarType::Bool,
            Value::Int16(_) => ScalarType::Int16,
            Value::Int32(_) => ScalarType::Int32,
            Value::Int64(_) => ScalarType::Int64,
            Value::Float32(_) => ScalarType::Float32,
            Value::Float64(_) => ScalarType::Float64,
            Value::Decimal(_) => ScalarType::Decimal,
            Value::Text(_) => ScalarType::Text,
            Value::Timestamp(_) => ScalarType::Timestamp,
            Value::Guid(_) => ScalarType::Guid,
        })
    }

    /// Type name for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int16(_) => "int16",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Float32(_) => "float32",
            Value::Float64(_) => "float64",
            Value::Decimal(_) => "decimal",
            Value::Text(_) => "string",
            Value::Timestamp(_) => "timestamp",
            Value::Guid(_) => "guid",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer view of the integer family
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int16(v) => Some(i64::from(*v)),
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Plain decimal text of a numeric constant. Floats use their shortest
    /// round-trip form, which never has an exponent; non-finite floats and
    /// non-numbers have none.
    pub fn numeric_text(&self) -> Option<String> {
        match self {
            Value::Int16(v) => Some(v.to_string()),
            Value::Int32(v) => Some(v.to_string()),
            Value::Int64(v) => Some(v.to_string()),
            Value::Float32(v) if v.is_finite() => Some(v.to_string()),
            Value::Float64(v) if v.is_finite() => Some(v.to_string()),
            Value::Decimal(d) => Some(d.to_string()),
            _ => None,
        }
    }

    /// Convert an untyped JSON scalar into a constant.
    ///
    /// Integers become `Int32` when they fit, otherwise `Int64`; other numbers
    /// become `Float64`. Arrays and objects are rejected.
    pub fn from_json(json: &serde_json::Value) -> QueryResult<Value> {
        match json {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_json::Value::String(s) => Ok(Value::Text(s.clone())),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(i32::try_from(i).map(Value::Int32).unwrap_or(Value::Int64(i)))
                } else if let Some(f) = n.as_f64() {
                    Ok(Value::Float64(f))
                } else {
                    Err(QueryError::unsupported(
                        format!("constant {}", n),
                        "number is outside the int64 and float64 ranges",
                    ))
                }
            }
            other => Err(QueryError::unsupported(
                "composite constant",
                format!("only scalar constants can be bound, got {}", other),
            )),
        }
    }

    /// JSON rendering used by diagnostics and the CLI
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int16(v) => serde_json::json!(v),
            Value::Int32(v) => serde_json::json!(v),
            Value::Int64(v) => serde_json::json!(v),
            Value::Float32(v) => serde_json::json!(v),
            Value::Float64(v) => serde_json::json!(v),
            Value::Decimal(d) => serde_json::Value::String(d.to_string()),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Timestamp(t) => serde_json::Value::String(t.to_rfc3339()),
            Value::Guid(g) => serde_json::Value::String(g.to_string()),
        }
    }

    /// Ordering between two values of the same variant.
    ///
    /// Text compares byte-wise. Mismatched variants, null and NaN are
    /// incomparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int16(a), Value::Int16(b)) => Some(a.cmp(b)),
            (Value::Int32(a), Value::Int32(b)) => Some(a.cmp(b)),
            (Value::Int64(a), Value::Int64(b)) => Some(a.cmp(b)),
            (Value::Float32(a), Value::Float32(b)) => a.partial_cmp(b),
            (Value::Float64(a), Value::Float64(b)) => a.partial_cmp(b),
            (Value::Decimal(a), Value::Decimal(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::Guid(a), Value::Guid(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{:?}", s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    Decimal => Decimal,
    String => Text,
    DateTime<Utc> => Timestamp,
    Uuid => Guid,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
