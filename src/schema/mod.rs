//! Document schemas
//!
//! A schema declares the field structure of a stored document type. The
//! predicate compiler resolves every field path against it and derives the
//! scalar type used for casts and parameter encodings.

mod types;

pub use types::{Document, DocumentSchema, EnumVariant, FieldDef, FieldType};
