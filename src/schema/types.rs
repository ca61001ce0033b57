//! Document schema definitions
//!
//! Supported field types:
//! - int16 / int32 / int64: signed integers
//! - float32 / float64: IEEE floating point
//! - decimal: arbitrary precision decimal
//! - bool: Boolean
//! - string: UTF-8 string
//! - timestamp: RFC 3339 instant
//! - guid: hyphenated UUID
//! - enum: closed set of labelled variants, stored as the label
//! - object: nested object with field schema
//! - array: homogeneous array with element type

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::query::{FieldPath, QueryError, QueryResult};

/// A declared enum variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumVariant {
    /// Canonical text label (the at-rest encoding)
    pub label: String,
    /// Numeric code
    pub code: i64,
}

impl EnumVariant {
    pub fn new(label: impl Into<String>, code: i64) -> Self {
        Self {
            label: label.into(),
            code,
        }
    }
}

/// Supported field types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldType {
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Decimal,
    Bool,
    String,
    Timestamp,
    Guid,
    /// Enum with declared variants
    Enum {
        name: String,
        variants: Vec<EnumVariant>,
    },
    /// Nested object with its own field schema
    Object {
        fields: BTreeMap<String, FieldDef>,
    },
    /// Homogeneous array with single element type
    Array {
        #[serde(rename = "element_type")]
        element_type: Box<FieldType>,
    },
}

impl FieldType {
    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::Int16 => "int16",
            FieldType::Int32 => "int32",
            FieldType::Int64 => "int64",
            FieldType::Float32 => "float32",
            FieldType::Float64 => "float64",
            FieldType::Decimal => "decimal",
            FieldType::Bool => "bool",
            FieldType::String => "string",
            FieldType::Timestamp => "timestamp",
            FieldType::Guid => "guid",
            FieldType::Enum { .. } => "enum",
            FieldType::Object { .. } => "object",
            FieldType::Array { .. } => "array",
        }
    }

    /// Build an enum type from `(label, code)` pairs
    pub fn enumeration<I, S>(name: impl Into<String>, variants: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        FieldType::Enum {
            name: name.into(),
            variants: variants
                .into_iter()
                .map(|(label, code)| EnumVariant::new(label, code))
                .collect(),
        }
    }

    /// Build an array type
    pub fn array_of(element_type: FieldType) -> Self {
        FieldType::Array {
            element_type: Box::new(element_type),
        }
    }

    /// Returns true for leaf types that can be extracted and cast
    pub fn is_scalar(&self) -> bool {
        !matches!(self, FieldType::Object { .. } | FieldType::Array { .. })
    }
}

/// Field definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field data type
    #[serde(flatten)]
    pub field_type: FieldType,
    /// Whether the field may be absent or null
    #[serde(default)]
    pub nullable: bool,
}

impl FieldDef {
    /// A non-nullable field of the given type
    pub fn required(field_type: FieldType) -> Self {
        Self {
            field_type,
            nullable: false,
        }
    }

    /// A nullable field of the given type
    pub fn optional(field_type: FieldType) -> Self {
        Self {
            field_type,
            nullable: true,
        }
    }

    pub fn required_string() -> Self {
        Self::required(FieldType::String)
    }

    pub fn optional_string() -> Self {
        Self::optional(FieldType::String)
    }

    pub fn required_int() -> Self {
        Self::required(FieldType::Int32)
    }

    pub fn optional_int() -> Self {
        Self::optional(FieldType::Int32)
    }

    pub fn required_bool() -> Self {
        Self::required(FieldType::Bool)
    }

    pub fn required_float() -> Self {
        Self::required(FieldType::Float64)
    }

    /// Create a required object field
    pub fn required_object(fields: BTreeMap<String, FieldDef>) -> Self {
        Self::required(FieldType::Object { fields })
    }

    /// Create an optional object field
    pub fn optional_object(fields: BTreeMap<String, FieldDef>) -> Self {
        Self::optional(FieldType::Object { fields })
    }

    /// Create a required array field
    pub fn required_array(element_type: FieldType) -> Self {
        Self::required(FieldType::array_of(element_type))
    }
}

/// Declared field structure of a document type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSchema {
    /// Document type name, used in diagnostics
    pub name: String,
    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Top-level field definitions
    pub fields: BTreeMap<String, FieldDef>,
}

impl DocumentSchema {
    /// Create a new schema
    pub fn new(name: impl Into<String>, fields: BTreeMap<String, FieldDef>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields,
        }
    }

    /// Start an empty schema and add fields with [`DocumentSchema::field`]
    pub fn builder(name: impl Into<String>) -> Self {
        Self::new(name, BTreeMap::new())
    }

    /// Add a top-level field
    pub fn field(mut self, name: impl Into<String>, def: FieldDef) -> Self {
        self.fields.insert(name.into(), def);
        self
    }

    /// Resolve a path through nested objects to its field definition.
    ///
    /// Every segment but the last must name an object field.
    pub fn resolve(&self, path: &FieldPath) -> QueryResult<&FieldDef> {
        let mut fields = &self.fields;
        let mut resolved: Option<&FieldDef> = None;

        for (depth, segment) in path.segments().iter().enumerate() {
            if let Some(parent) = resolved {
                match &parent.field_type {
                    FieldType::Object { fields: nested } => fields = nested,
                    other => {
                        return Err(QueryError::unsupported(
                            format!("member '{}'", path),
                            format!(
                                "'{}' is a {} and has no members",
                                path.prefix(depth),
                                other.type_name()
                            ),
                        ))
                    }
                }
            }

            resolved = Some(fields.get(segment).ok_or_else(|| {
                QueryError::unsupported(
                    format!("member '{}'", path),
                    format!("'{}' does not declare '{}'", self.scope_name(path, depth), segment),
                )
            })?);
        }

        resolved.ok_or_else(|| QueryError::unsupported("empty field path", "a field path needs at least one segment"))
    }

    fn scope_name(&self, path: &FieldPath, depth: usize) -> String {
        if depth == 0 {
            self.name.clone()
        } else {
            path.prefix(depth)
        }
    }
}

/// A document type that can be stored and queried.
///
/// The schema describes the serialized JSON shape of `Self`; field names must
/// match the serde representation.
pub trait Document: Serialize + DeserializeOwned {
    fn schema() -> DocumentSchema;
}
