//! Predicate Compiler
//!
//! Renders a lowered predicate as a PostgreSQL boolean expression over the
//! `value` jsonb column. Field names come from the schema and are embedded as
//! quoted literals; every constant goes through the [`ParameterBinder`].
//!
//! Shapes:
//! - field: `CAST((value ->> 'age') AS integer)`, nested paths navigate with
//!   `->` and extract the leaf with `->>`
//! - bool field: `(CASE (value ->> 'active') WHEN 'true' THEN TRUE WHEN 'false' THEN FALSE END)`
//! - comparison: `(<left> <op> <right>)`
//! - AND / OR: `((<a>) AND (<b>))`, NOT: `(NOT (<a>))`
//! - patterns: `LIKE` / `ILIKE` against an escaped, engine-side concatenation

use super::ast::{FieldPath, Filter};
use super::check::{self, Check, Pattern, Term};
use super::errors::QueryResult;
use super::params::{BoundParameter, ParameterBinder};
use super::types::{Comparand, ScalarType, SqlType, TypeMapper};
use super::value::Value;
use crate::schema::{DocumentSchema, EnumVariant};

/// Name of the jsonb document column
pub const DOCUMENT_COLUMN: &str = "value";

/// Unicode `White_Space`, spelled out so the match does not depend on the
/// database locale
const BLANK_PATTERN: &str = r"^[\t\n\v\f\r \u0085\u00a0\u1680\u2000-\u200a\u2028\u2029\u202f\u205f\u3000]*$";

/// A filter fragment and its parameters
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    /// Boolean SQL expression with `$n::type` placeholders
    pub fragment: String,
    /// Parameters in placeholder order
    pub parameters: Vec<BoundParameter>,
}

impl CompiledQuery {
    /// Index following the last placeholder
    pub fn next_index(&self, first: usize) -> usize {
        self.parameters.last().map(|p| p.index + 1).unwrap_or(first)
    }
}

/// Compile with placeholders numbered from `$1`
pub fn compile(filter: &Filter, schema: &DocumentSchema) -> QueryResult<CompiledQuery> {
    compile_from(filter, schema, 1)
}

/// Compile with placeholders numbered from `$first`
pub fn compile_from(filter: &Filter, schema: &DocumentSchema, first: usize) -> QueryResult<CompiledQuery> {
    let lowered = check::lower(filter, schema)?;
    let mut renderer = Renderer {
        binder: ParameterBinder::new(first),
    };
    let fragment = renderer.check(&lowered);
    Ok(CompiledQuery {
        fragment,
        parameters: renderer.binder.finish(),
    })
}

impl Filter {
    /// See [`compile`]
    pub fn compile(&self, schema: &DocumentSchema) -> QueryResult<CompiledQuery> {
        compile(self, schema)
    }
}

struct Renderer {
    binder: ParameterBinder,
}

impl Renderer {
    fn check(&mut self, check: &Check<'_>) -> String {
        match check {
            Check::Compare {
                op,
                comparand,
                left,
                right,
            } => {
                let l = self.term(left, *comparand);
                let r = self.term(right, *comparand);
                if *comparand == Comparand::Typed(SqlType::Text) && !op.is_equality() {
                    format!("({} {} {} COLLATE \"C\")", l, op.token(), r)
                } else {
                    format!("({} {} {})", l, op.token(), r)
                }
            }
            Check::IsNull { term, negated } => {
                let expr = self.natural(term);
                if *negated {
                    format!("({} IS NOT NULL)", expr)
                } else {
                    format!("({} IS NULL)", expr)
                }
            }
            Check::Pattern {
                pattern,
                receiver,
                arg,
            } => {
                let recv = self.text(receiver);
                let escaped = escape_like(&self.text(arg));
                match pattern {
                    Pattern::Prefix => format!("({} LIKE ({} || '%'))", recv, escaped),
                    Pattern::Suffix => format!("({} LIKE ('%' || {}))", recv, escaped),
                    Pattern::Substring => format!("({} LIKE ('%' || {} || '%'))", recv, escaped),
                    Pattern::SubstringIgnoreCase => format!("({} ILIKE ('%' || {} || '%'))", recv, escaped),
                }
            }
            Check::Blank(term) => format!("(COALESCE({}, '') ~ '{}')", self.text(term), BLANK_PATTERN),
            Check::Member {
                path,
                element,
                comparand,
                value,
            } => {
                let node = json_node(path);
                let param = self.binder.bind(value.clone(), comparand.sql_type());
                if Check::member_needs_scan(*element) {
                    format!(
                        "(CASE WHEN jsonb_typeof({node}) = 'array' THEN EXISTS (SELECT 1 FROM jsonb_array_elements_text({node}) AS item(elem) WHERE {elem} = {param}) ELSE FALSE END)",
                        node = node,
                        elem = cast("item.elem".to_string(), comparand.sql_type()),
                        param = param,
                    )
                } else {
                    format!("({} @> jsonb_build_array({}))", node, param)
                }
            }
            Check::HasValue(path) => format!("({} IS NOT NULL)", json_extract(path)),
            Check::BoolField(path) => cast(json_extract(path), SqlType::Boolean),
            Check::Literal(b) => self.binder.bind(Value::Bool(*b), SqlType::Boolean),
            Check::All(operands) => self.junction(operands, " AND ", "TRUE"),
            Check::Any(operands) => self.junction(operands, " OR ", "FALSE"),
            Check::Not(inner) => format!("(NOT ({}))", self.check(inner)),
        }
    }

    fn junction(&mut self, operands: &[Check<'_>], joiner: &str, empty: &str) -> String {
        if operands.is_empty() {
            return empty.to_string();
        }
        let parts: Vec<String> = operands
            .iter()
            .map(|c| format!("({})", self.check(c)))
            .collect();
        format!("({})", parts.join(joiner))
    }

    /// Operand brought to the comparison type
    fn term(&mut self, term: &Term<'_>, comparand: Comparand<'_>) -> String {
        match (term, comparand) {
            (Term::Constant(v), c) => self.binder.bind(v.clone(), c.sql_type()),
            (
                Term::Field {
                    path,
                    scalar: ScalarType::Enum(own),
                },
                Comparand::EnumLabel(_),
            ) => label_case(json_extract(path), own),
            (
                Term::Field {
                    path,
                    scalar: ScalarType::Enum(own),
                },
                Comparand::EnumCode(_),
            ) => code_case(json_extract(path), own),
            (term, Comparand::Typed(t)) => {
                let text = self.text(term);
                cast(text, t)
            }
            (term, Comparand::EnumLabel(_)) => self.text(term),
            (term, Comparand::EnumCode(variants)) => {
                let text = self.text(term);
                code_case(text, variants)
            }
        }
    }

    /// Text-valued rendering of an operand
    fn text(&mut self, term: &Term<'_>) -> String {
        match term {
            Term::Field { path, .. } | Term::Node(path) => json_extract(path),
            Term::Label { path, variants } => label_case(json_extract(path), variants),
            Term::Fold { upper, inner } => {
                let inner = self.text(inner);
                if *upper {
                    format!("UPPER({})", inner)
                } else {
                    format!("LOWER({})", inner)
                }
            }
            Term::Constant(v) => self.binder.bind(v.clone(), SqlType::Text),
        }
    }

    /// Operand in its own type, for null tests
    fn natural(&mut self, term: &Term<'_>) -> String {
        match term {
            Term::Constant(v) => {
                let sql_type = v.scalar_type().map(TypeMapper::sql_type).unwrap_or(SqlType::Text);
                self.binder.bind(v.clone(), sql_type)
            }
            other => self.text(other),
        }
    }
}

/// SQL string literal with doubled quotes
fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Leaf extraction as text: `(((value -> 'a') -> 'b') ->> 'c')`
pub(crate) fn json_extract(path: &FieldPath) -> String {
    let segments = path.segments();
    let (last, parents) = match segments.split_last() {
        Some(split) => split,
        None => return format!("({} #>> '{{}}')", DOCUMENT_COLUMN),
    };
    let node = parents.iter().fold(DOCUMENT_COLUMN.to_string(), |expr, segment| {
        format!("({} -> {})", expr, quote(segment))
    });
    format!("({} ->> {})", node, quote(last))
}

/// Navigation to a jsonb node: `((value -> 'a') -> 'b')`
pub(crate) fn json_node(path: &FieldPath) -> String {
    path.segments()
        .iter()
        .fold(DOCUMENT_COLUMN.to_string(), |expr, segment| {
            format!("({} -> {})", expr, quote(segment))
        })
}

fn cast(expr: String, sql_type: SqlType) -> String {
    match sql_type {
        SqlType::Text => expr,
        SqlType::Boolean => format!(
            "(CASE {} WHEN 'true' THEN TRUE WHEN 'false' THEN FALSE END)",
            expr
        ),
        other => format!("CAST({} AS {})", expr, other.name()),
    }
}

/// Codes (as text) map to labels, any other text passes through
fn label_case(expr: String, variants: &[EnumVariant]) -> String {
    if variants.is_empty() {
        return expr;
    }
    let arms: Vec<String> = variants
        .iter()
        .map(|v| format!("WHEN {} THEN {}", quote(&v.code.to_string()), quote(&v.label)))
        .collect();
    format!("(CASE {} {} ELSE {} END)", expr, arms.join(" "), expr)
}

/// Labels, then codes as text, map to codes; anything else is NULL
fn code_case(expr: String, variants: &[EnumVariant]) -> String {
    let arms: Vec<String> = variants
        .iter()
        .map(|v| format!("WHEN {} THEN CAST({} AS bigint)", quote(&v.label), v.code))
        .chain(
            variants
                .iter()
                .map(|v| format!("WHEN {} THEN CAST({} AS bigint)", quote(&v.code.to_string()), v.code)),
        )
        .collect();
    if arms.is_empty() {
        return "CAST(NULL AS bigint)".to_string();
    }
    format!("(CASE {} {} END)", expr, arms.join(" "))
}

/// Escape LIKE metacharacters inside the engine
fn escape_like(expr: &str) -> String {
    format!(
        "replace(replace(replace({}, '\\', '\\\\'), '%', '\\%'), '_', '\\_')",
        expr
    )
}
