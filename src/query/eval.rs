//! Reference evaluator
//!
//! Evaluates a predicate against a JSON document in process, with the same
//! three-valued logic PostgreSQL applies to the compiled fragment: a missing
//! field or JSON null is NULL, comparisons with NULL are NULL, AND/OR/NOT are
//! Kleene, and a document matches only when the result is TRUE.

use std::cmp::Ordering;

use serde_json::Value as Json;

use super::ast::{CompareOp, FieldPath, Filter};
use super::check::{self, Check, Pattern, Term};
use super::errors::QueryResult;
use super::types::{Comparand, ExactNumeric, ScalarType, SqlType, TypeMapper};
use super::value::Value;
use crate::schema::DocumentSchema;

/// A filter lowered once and evaluated against many documents
#[derive(Debug)]
pub struct Evaluator<'a> {
    check: Check<'a>,
}

impl<'a> Evaluator<'a> {
    /// Lower the filter; fails exactly when compilation would fail
    pub fn new(filter: &'a Filter, schema: &'a DocumentSchema) -> QueryResult<Self> {
        Ok(Self {
            check: check::lower(filter, schema)?,
        })
    }

    /// True iff the predicate evaluates to TRUE
    pub fn matches(&self, document: &Json) -> bool {
        self.evaluate(document) == Some(true)
    }

    /// Three-valued result; `None` is SQL NULL
    pub fn evaluate(&self, document: &Json) -> Option<bool> {
        eval(&self.check, document)
    }
}

/// One-shot evaluation
pub fn matches(filter: &Filter, schema: &DocumentSchema, document: &Json) -> QueryResult<bool> {
    Ok(Evaluator::new(filter, schema)?.matches(document))
}

fn eval(check: &Check<'_>, doc: &Json) -> Option<bool> {
    match check {
        Check::Compare {
            op,
            comparand,
            left,
            right,
        } => {
            let ordering = match comparand {
                Comparand::Typed(SqlType::Numeric) => numeric(left, doc)?.cmp(&numeric(right, doc)?),
                _ => term(left, *comparand, doc)?.compare(&term(right, *comparand, doc)?)?,
            };
            Some(match op {
                CompareOp::Eq => ordering == Ordering::Equal,
                CompareOp::Ne => ordering != Ordering::Equal,
                CompareOp::Lt => ordering == Ordering::Less,
                CompareOp::Le => ordering != Ordering::Greater,
                CompareOp::Gt => ordering == Ordering::Greater,
                CompareOp::Ge => ordering != Ordering::Less,
            })
        }
        Check::IsNull { term, negated } => {
            let is_null = match term {
                Term::Constant(v) => v.is_null(),
                other => text(other, doc).is_none(),
            };
            Some(is_null != *negated)
        }
        Check::Pattern {
            pattern,
            receiver,
            arg,
        } => {
            let recv = text(receiver, doc)?;
            let arg = text(arg, doc)?;
            Some(match pattern {
                Pattern::Prefix => recv.starts_with(&arg),
                Pattern::Suffix => recv.ends_with(&arg),
                Pattern::Substring => recv.contains(&arg),
                Pattern::SubstringIgnoreCase => recv.to_lowercase().contains(&arg.to_lowercase()),
            })
        }
        Check::Blank(term) => Some(text(term, doc).map_or(true, |s| s.chars().all(char::is_whitespace))),
        Check::Member {
            path,
            element,
            comparand,
            value,
        } => member(path, *element, *comparand, value, doc),
        Check::HasValue(path) => Some(extract(path, doc).is_some()),
        Check::BoolField(path) => match TypeMapper::cast_text(&extract(path, doc)?, SqlType::Boolean)? {
            Value::Bool(b) => Some(b),
            _ => None,
        },
        Check::Literal(b) => Some(*b),
        Check::All(operands) => {
            let mut result = Some(true);
            for c in operands {
                match eval(c, doc) {
                    Some(false) => return Some(false),
                    None => result = None,
                    Some(true) => {}
                }
            }
            result
        }
        Check::Any(operands) => {
            let mut result = Some(false);
            for c in operands {
                match eval(c, doc) {
                    Some(true) => return Some(true),
                    None => result = None,
                    Some(false) => {}
                }
            }
            result
        }
        Check::Not(inner) => eval(inner, doc).map(|b| !b),
    }
}

/// `CAST(.. AS numeric)`, exact at any magnitude
fn numeric(term: &Term<'_>, doc: &Json) -> Option<ExactNumeric> {
    match term {
        Term::Constant(v) => ExactNumeric::from_value(v),
        other => ExactNumeric::parse(&text(other, doc)?),
    }
}

fn term(term: &Term<'_>, comparand: Comparand<'_>, doc: &Json) -> Option<Value> {
    match (term, comparand) {
        (Term::Constant(v), _) => (!v.is_null()).then(|| v.clone()),
        (
            Term::Field {
                path,
                scalar: ScalarType::Enum(own),
            },
            Comparand::EnumLabel(_),
        ) => extract(path, doc).map(|t| Value::Text(TypeMapper::label_of_text(&t, own))),
        (
            Term::Field {
                path,
                scalar: ScalarType::Enum(own),
            },
            Comparand::EnumCode(_),
        ) => TypeMapper::code_of_text(&extract(path, doc)?, own).map(Value::Int64),
        (other, Comparand::Typed(t)) => TypeMapper::cast_text(&text(other, doc)?, t),
        (other, Comparand::EnumLabel(_)) => text(other, doc).map(Value::Text),
        (other, Comparand::EnumCode(variants)) => {
            TypeMapper::code_of_text(&text(other, doc)?, variants).map(Value::Int64)
        }
    }
}

fn text(term: &Term<'_>, doc: &Json) -> Option<String> {
    match term {
        Term::Field { path, .. } | Term::Node(path) => extract(path, doc),
        Term::Label { path, variants } => {
            extract(path, doc).map(|t| TypeMapper::label_of_text(&t, variants))
        }
        Term::Fold { upper, inner } => {
            let inner = text(inner, doc)?;
            Some(if *upper {
                inner.to_uppercase()
            } else {
                inner.to_lowercase()
            })
        }
        Term::Constant(Value::Null) => None,
        Term::Constant(Value::Text(s)) => Some(s.clone()),
        Term::Constant(other) => Some(other.to_json().to_string()),
    }
}

fn member(
    path: &FieldPath,
    element: ScalarType<'_>,
    comparand: Comparand<'_>,
    value: &Value,
    doc: &Json,
) -> Option<bool> {
    let scan = Check::member_needs_scan(element);
    let items = match node(path, doc) {
        None if scan => return Some(false),
        None => return None,
        Some(Json::Array(items)) => items,
        Some(_) => return Some(false),
    };

    let sql_type = comparand.sql_type();
    Some(items.iter().any(|item| {
        if scan {
            return json_text(item).map_or(false, |t| equals_text(&t, sql_type, value));
        }
        // jsonb containment: strings match strings, numbers compare numerically
        match (item, sql_type) {
            (Json::String(s), SqlType::Text | SqlType::Uuid) => equals_text(s, sql_type, value),
            (Json::Bool(b), SqlType::Boolean) => *value == Value::Bool(*b),
            (Json::Number(n), t) if t != SqlType::Text && t != SqlType::Boolean && t != SqlType::Uuid => {
                equals_text(&n.to_string(), SqlType::Numeric, value)
            }
            _ => false,
        }
    }))
}

/// `CAST(text AS sql_type) = value`; unparsable text is not equal
fn equals_text(text: &str, sql_type: SqlType, value: &Value) -> bool {
    if sql_type == SqlType::Numeric {
        return match (ExactNumeric::parse(text), ExactNumeric::from_value(value)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        };
    }
    TypeMapper::cast_text(text, sql_type).map_or(false, |v| v.compare(value) == Some(Ordering::Equal))
}

/// `->` navigation; `None` when any step is missing or not an object
fn node<'d>(path: &FieldPath, doc: &'d Json) -> Option<&'d Json> {
    path.segments()
        .iter()
        .try_fold(doc, |current, segment| current.as_object()?.get(segment))
}

/// `->>` extraction of the leaf as text
fn extract(path: &FieldPath, doc: &Json) -> Option<String> {
    node(path, doc).and_then(json_text)
}

fn json_text(json: &Json) -> Option<String> {
    match json {
        Json::Null => None,
        Json::String(s) => Some(s.clone()),
        Json::Bool(b) => Some(b.to_string()),
        Json::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}
