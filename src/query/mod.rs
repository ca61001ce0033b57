//! # Predicate compiler
//!
//! Translates a typed boolean predicate over a document's fields into a
//! parameterized PostgreSQL fragment against the `value` jsonb column.
//!
//! Pipeline:
//! 1. a [`Predicate`] is built with the builder API or parsed from text
//! 2. lowering resolves field paths against a [`DocumentSchema`], picks
//!    comparison types with the [`TypeMapper`] and converts constants
//! 3. the compiler renders SQL, binding every constant through the
//!    [`ParameterBinder`]
//!
//! The same lowered form drives the in-memory [`Evaluator`].
//!
//! [`DocumentSchema`]: crate::schema::DocumentSchema

mod ast;
mod check;
mod compiler;
mod errors;
pub mod eval;
mod params;
mod parser;
mod types;
mod value;

pub use ast::{
    captured, field, Captures, CompareOp, Constant, FieldPath, Filter, LogicalOp, Operand, Predicate,
    StringOpKind,
};
pub use compiler::{compile, compile_from, CompiledQuery, DOCUMENT_COLUMN};
pub use errors::{QueryError, QueryResult};
pub use eval::Evaluator;
pub use params::{BoundParameter, ParameterBinder};
pub use parser::parse;
pub use types::{Comparand, ExactNumeric, ScalarType, SqlType, TypeMapper};
pub use value::Value;
