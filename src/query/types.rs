//! Type Mapper
//!
//! Static mapping from declared field types to PostgreSQL scalar types, the
//! numeric widening table, and the conversions that bring constants and
//! extracted JSON text to a resolved comparison type.

use std::cmp::Ordering;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::ast::CompareOp;
use super::errors::{QueryError, QueryResult};
use super::value::Value;
use crate::schema::{EnumVariant, FieldType};

/// Backing-store scalar types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    SmallInt,
    Integer,
    BigInt,
    Real,
    DoublePrecision,
    Numeric,
    Boolean,
    Text,
    TimestampTz,
    Uuid,
}

impl SqlType {
    /// Type name as used in casts
    pub fn name(&self) -> &'static str {
        match self {
            SqlType::SmallInt => "smallint",
            SqlType::Integer => "integer",
            SqlType::BigInt => "bigint",
            SqlType::Real => "real",
            SqlType::DoublePrecision => "double precision",
            SqlType::Numeric => "numeric",
            SqlType::Boolean => "boolean",
            SqlType::Text => "text",
            SqlType::TimestampTz => "timestamptz",
            SqlType::Uuid => "uuid",
        }
    }
}

/// Scalar type of a leaf field or a constant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType<'s> {
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Decimal,
    Bool,
    Text,
    Timestamp,
    Guid,
    Enum(&'s [EnumVariant]),
}

impl<'s> ScalarType<'s> {
    pub fn name(&self) -> &'static str {
        match self {
            ScalarType::Int16 => "int16",
            ScalarType::Int32 => "int32",
            ScalarType::Int64 => "int64",
            ScalarType::Float32 => "float32",
            ScalarType::Float64 => "float64",
            ScalarType::Decimal => "decimal",
            ScalarType::Bool => "bool",
            ScalarType::Text => "string",
            ScalarType::Timestamp => "timestamp",
            ScalarType::Guid => "guid",
            ScalarType::Enum(_) => "enum",
        }
    }

    fn numeric_rank(&self) -> Option<usize> {
        match self {
            ScalarType::Int16 => Some(0),
            ScalarType::Int32 => Some(1),
            ScalarType::Int64 => Some(2),
            ScalarType::Float32 => Some(3),
            ScalarType::Float64 => Some(4),
            ScalarType::Decimal => Some(5),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.numeric_rank().is_some()
    }
}

/// How the two sides of a comparison are brought to a common type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparand<'s> {
    /// Both sides cast to one backing-store type
    Typed(SqlType),
    /// Enum compared by canonical label (text)
    EnumLabel(&'s [EnumVariant]),
    /// Enum compared by declared code (bigint)
    EnumCode(&'s [EnumVariant]),
}

impl Comparand<'_> {
    /// Type of bound parameters under this comparand
    pub fn sql_type(&self) -> SqlType {
        match self {
            Comparand::Typed(t) => *t,
            Comparand::EnumLabel(_) => SqlType::Text,
            Comparand::EnumCode(_) => SqlType::BigInt,
        }
    }
}

use SqlType::*;

/// Widening table indexed by numeric rank
/// (int16, int32, int64, float32, float64, decimal)
const WIDENING: [[SqlType; 6]; 6] = [
    [SmallInt, Integer, BigInt, Real, DoublePrecision, Numeric],
    [Integer, Integer, BigInt, DoublePrecision, DoublePrecision, Numeric],
    [BigInt, BigInt, BigInt, Numeric, Numeric, Numeric],
    [Real, DoublePrecision, Numeric, Real, DoublePrecision, Numeric],
    [DoublePrecision, DoublePrecision, Numeric, DoublePrecision, DoublePrecision, Numeric],
    [Numeric, Numeric, Numeric, Numeric, Numeric, Numeric],
];

/// Static type mapping
pub struct TypeMapper;

impl TypeMapper {
    /// Scalar type of a declared leaf type; `None` for objects and arrays
    pub fn scalar(field_type: &FieldType) -> Option<ScalarType<'_>> {
        Some(match field_type {
            FieldType::Int16 => ScalarType::Int16,
            FieldType::Int32 => ScalarType::Int32,
            FieldType::Int64 => ScalarType::Int64,
            FieldType::Float32 => ScalarType::Float32,
            FieldType::Float64 => ScalarType::Float64,
            FieldType::Decimal => ScalarType::Decimal,
            FieldType::Bool => ScalarType::Bool,
            FieldType::String => ScalarType::Text,
            FieldType::Timestamp => ScalarType::Timestamp,
            FieldType::Guid => ScalarType::Guid,
            FieldType::Enum { variants, .. } => ScalarType::Enum(variants),
            FieldType::Object { .. } | FieldType::Array { .. } => return None,
        })
    }

    /// Backing-store type of a scalar on its own. Enums are text at rest.
    pub fn sql_type(scalar: ScalarType<'_>) -> SqlType {
        match scalar {
            ScalarType::Int16 => SmallInt,
            ScalarType::Int32 => Integer,
            ScalarType::Int64 => BigInt,
            ScalarType::Float32 => Real,
            ScalarType::Float64 => DoublePrecision,
            ScalarType::Decimal => Numeric,
            ScalarType::Bool => Boolean,
            ScalarType::Text | ScalarType::Enum(_) => Text,
            ScalarType::Timestamp => TimestampTz,
            ScalarType::Guid => SqlType::Uuid,
        }
    }

    /// Smallest backing type that holds both numeric scalars losslessly
    pub fn widen(a: ScalarType<'_>, b: ScalarType<'_>) -> Option<SqlType> {
        Some(WIDENING[a.numeric_rank()?][b.numeric_rank()?])
    }

    /// Decide how two operand types are compared under `op`
    pub fn comparand<'s>(
        op: CompareOp,
        left: ScalarType<'s>,
        right: ScalarType<'s>,
    ) -> QueryResult<Comparand<'s>> {
        use ScalarType as S;

        let enum_mode = |variants: &'s [EnumVariant]| {
            if op.is_equality() {
                Comparand::EnumLabel(variants)
            } else {
                Comparand::EnumCode(variants)
            }
        };

        let resolved = match (left, right) {
            (S::Enum(v), S::Enum(_) | S::Text | S::Int16 | S::Int32 | S::Int64) => {
                Some(enum_mode(v))
            }
            (S::Text | S::Int16 | S::Int32 | S::Int64, S::Enum(v)) => Some(enum_mode(v)),
            (l, r) if l.is_numeric() && r.is_numeric() => Self::widen(l, r).map(Comparand::Typed),
            (S::Text, S::Text) => Some(Comparand::Typed(Text)),
            (S::Bool, S::Bool) if op.is_equality() => Some(Comparand::Typed(Boolean)),
            (S::Timestamp, S::Timestamp | S::Text) | (S::Text, S::Timestamp) => {
                Some(Comparand::Typed(TimestampTz))
            }
            (S::Guid, S::Guid | S::Text) | (S::Text, S::Guid) => Some(Comparand::Typed(SqlType::Uuid)),
            _ => None,
        };

        resolved.ok_or_else(|| {
            QueryError::unsupported(
                format!("comparison '{}'", op.token()),
                format!("cannot compare {} with {}", left.name(), right.name()),
            )
        })
    }

    /// Convert a constant to the canonical value of `target`.
    ///
    /// Only widening conversions succeed; text is parsed for timestamp and
    /// uuid targets.
    pub fn coerce(value: &Value, target: SqlType) -> QueryResult<Value> {
        let converted = match (value, target) {
            (Value::Int16(v), SmallInt) => Some(Value::Int16(*v)),
            (Value::Int16(_) | Value::Int32(_), Integer) => {
                value.as_i64().and_then(|v| i32::try_from(v).ok()).map(Value::Int32)
            }
            (Value::Int16(_) | Value::Int32(_) | Value::Int64(_), BigInt) => value.as_i64().map(Value::Int64),
            (Value::Int16(v), Real) => Some(Value::Float32(f32::from(*v))),
            (Value::Int16(_) | Value::Int32(_), DoublePrecision) => value
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(|v| Value::Float64(f64::from(v))),
            (Value::Int16(_) | Value::Int32(_) | Value::Int64(_), Numeric) => {
                value.as_i64().map(|v| Value::Decimal(Decimal::from(v)))
            }
            (Value::Float32(v), Real) => Some(Value::Float32(*v)),
            (Value::Float32(v), DoublePrecision) => widen_f32(*v).map(Value::Float64),
            (Value::Float64(v), DoublePrecision) => Some(Value::Float64(*v)),
            // floats keep their type; the numeric value is their shortest decimal form
            (Value::Float32(v), Numeric) if v.is_finite() => Some(Value::Float32(*v)),
            (Value::Float64(v), Numeric) if v.is_finite() => Some(Value::Float64(*v)),
            (Value::Decimal(d), Numeric) => Some(Value::Decimal(*d)),
            (Value::Bool(b), Boolean) => Some(Value::Bool(*b)),
            (Value::Text(s), Text) => Some(Value::Text(s.clone())),
            (Value::Timestamp(t), TimestampTz) => Some(Value::Timestamp(*t)),
            (Value::Text(s), TimestampTz) => parse_timestamp(s).map(Value::Timestamp),
            (Value::Guid(g), SqlType::Uuid) => Some(Value::Guid(*g)),
            (Value::Text(s), SqlType::Uuid) => Uuid::parse_str(s).ok().map(Value::Guid),
            _ => None,
        };

        converted.ok_or_else(|| {
            QueryError::unsupported(
                format!("constant {}", value),
                format!("cannot be represented as {}", target.name()),
            )
        })
    }

    /// Label of a declared enum variant named by a text label or integer code
    pub fn enum_label(value: &Value, variants: &[EnumVariant]) -> QueryResult<String> {
        let found = match value {
            Value::Text(label) => variants.iter().find(|v| &v.label == label),
            other => other
                .as_i64()
                .and_then(|code| variants.iter().find(|v| v.code == code)),
        };
        found
            .map(|v| v.label.clone())
            .ok_or_else(|| undeclared_variant(value))
    }

    /// Code of a declared enum variant named by a text label or integer code
    pub fn enum_code(value: &Value, variants: &[EnumVariant]) -> QueryResult<i64> {
        let found = match value {
            Value::Text(label) => variants.iter().find(|v| &v.label == label),
            other => other
                .as_i64()
                .and_then(|code| variants.iter().find(|v| v.code == code)),
        };
        found.map(|v| v.code).ok_or_else(|| undeclared_variant(value))
    }

    /// Constant converted for a comparison under `comparand`
    pub fn bind_value(value: &Value, comparand: Comparand<'_>) -> QueryResult<Value> {
        match comparand {
            Comparand::Typed(t) => Self::coerce(value, t),
            Comparand::EnumLabel(variants) => Self::enum_label(value, variants).map(Value::Text),
            Comparand::EnumCode(variants) => Self::enum_code(value, variants).map(Value::Int64),
        }
    }

    // ==================
    // In-memory casts
    // ==================

    /// `CAST(text AS target)` with NULL for text the target cannot parse
    pub fn cast_text(text: &str, target: SqlType) -> Option<Value> {
        match target {
            SmallInt => text.parse().ok().map(Value::Int16),
            Integer => text.parse().ok().map(Value::Int32),
            BigInt => text.parse().ok().map(Value::Int64),
            Real => text.parse().ok().map(Value::Float32),
            DoublePrecision => text.parse().ok().map(Value::Float64),
            Numeric => Decimal::from_str(text)
                .or_else(|_| Decimal::from_scientific(text))
                .ok()
                .map(Value::Decimal),
            Boolean => match text {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            Text => Some(Value::Text(text.to_string())),
            TimestampTz => parse_timestamp(text).map(Value::Timestamp),
            SqlType::Uuid => Uuid::parse_str(text).ok().map(Value::Guid),
        }
    }

    /// Label projection of stored enum text: codes map to labels, anything
    /// else passes through
    pub fn label_of_text(text: &str, variants: &[EnumVariant]) -> String {
        variants
            .iter()
            .find(|v| v.code.to_string() == text)
            .map(|v| v.label.clone())
            .unwrap_or_else(|| text.to_string())
    }

    /// Code projection of stored enum text: labels first, then codes
    pub fn code_of_text(text: &str, variants: &[EnumVariant]) -> Option<i64> {
        variants
            .iter()
            .find(|v| v.label == text)
            .or_else(|| variants.iter().find(|v| v.code.to_string() == text))
            .map(|v| v.code)
    }
}

fn undeclared_variant(value: &Value) -> QueryError {
    QueryError::unsupported(
        format!("enum constant {}", value),
        "not a declared label or code",
    )
}

/// f32 to f64 through the shortest decimal form, so `0.1f32` becomes `0.1`
fn widen_f32(v: f32) -> Option<f64> {
    if v.is_finite() {
        v.to_string().parse().ok()
    } else {
        Some(f64::from(v))
    }
}

/// Arbitrary-precision decimal, compared the way PostgreSQL compares `numeric`.
///
/// Held as `0.d1d2.. * 10^exponent` with no leading or trailing zero digit;
/// zero has no digits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExactNumeric {
    negative: bool,
    digits: Vec<u8>,
    exponent: i64,
}

impl ExactNumeric {
    /// Parse `numeric` input text: optional sign, digits with an optional
    /// fraction, optional exponent. `None` for anything else.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (negative, body) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };
        let (mantissa, shift) = match body.find(|c| c == 'e' || c == 'E') {
            Some(at) => (&body[..at], body[at + 1..].parse::<i64>().ok()?),
            None => (body, 0),
        };
        let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }

        let mut digits: Vec<u8> = int_part.bytes().chain(frac_part.bytes()).map(|b| b - b'0').collect();
        let leading = digits.iter().take_while(|d| **d == 0).count();
        digits.drain(..leading);
        while digits.last() == Some(&0) {
            digits.pop();
        }
        if digits.is_empty() {
            return Some(Self::zero());
        }

        let exponent = shift
            .checked_add(i64::try_from(int_part.len()).ok()?)?
            .checked_sub(i64::try_from(leading).ok()?)?;
        Some(Self {
            negative,
            digits,
            exponent,
        })
    }

    /// Exact value of a numeric constant; floats read as their shortest
    /// round-trip decimal
    pub fn from_value(value: &Value) -> Option<Self> {
        Self::parse(&value.numeric_text()?)
    }

    fn zero() -> Self {
        Self {
            negative: false,
            digits: Vec::new(),
            exponent: 0,
        }
    }

    fn signum(&self) -> i8 {
        match (self.digits.is_empty(), self.negative) {
            (true, _) => 0,
            (false, true) => -1,
            (false, false) => 1,
        }
    }
}

impl Ord for ExactNumeric {
    fn cmp(&self, other: &Self) -> Ordering {
        let sign = self.signum();
        match sign.cmp(&other.signum()) {
            Ordering::Equal if sign == 0 => Ordering::Equal,
            Ordering::Equal => {
                let magnitude = self
                    .exponent
                    .cmp(&other.exponent)
                    .then_with(|| self.digits.cmp(&other.digits));
                if sign < 0 {
                    magnitude.reverse()
                } else {
                    magnitude
                }
            }
            unequal => unequal,
        }
    }
}

impl PartialOrd for ExactNumeric {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
