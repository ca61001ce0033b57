//! Typed lowering
//!
//! Resolves every field path against the schema, types every operand, picks
//! the comparison type and converts constants to it. The result is a `Check`
//! tree that the SQL renderer and the in-memory evaluator both consume, so the
//! two can only disagree on execution, never on what a predicate means.
//!
//! All validation happens here. Rendering and evaluation are total.

use super::ast::{CompareOp, Constant, FieldPath, Filter, LogicalOp, Operand, Predicate, StringOpKind};
use super::errors::{QueryError, QueryResult};
use super::types::{Comparand, ScalarType, SqlType, TypeMapper};
use super::value::Value;
use crate::schema::{DocumentSchema, EnumVariant, FieldDef, FieldType};

/// A typed operand
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Term<'a> {
    /// Scalar leaf field
    Field {
        path: &'a FieldPath,
        scalar: ScalarType<'a>,
    },
    /// Any field, uncast (null tests)
    Node(&'a FieldPath),
    /// Enum field projected to its label
    Label {
        path: &'a FieldPath,
        variants: &'a [EnumVariant],
    },
    /// Case-folded text
    Fold { upper: bool, inner: Box<Term<'a>> },
    /// Constant already converted to its comparison type
    Constant(Value),
}

impl<'a> Term<'a> {
    fn scalar(&self) -> Option<ScalarType<'a>> {
        match self {
            Term::Field { scalar, .. } => Some(*scalar),
            Term::Label { .. } | Term::Fold { .. } => Some(ScalarType::Text),
            Term::Node(_) => None,
            Term::Constant(v) => v.scalar_type(),
        }
    }

    fn is_text(&self) -> bool {
        self.scalar() == Some(ScalarType::Text)
    }
}

/// LIKE pattern shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pattern {
    Prefix,
    Suffix,
    Substring,
    SubstringIgnoreCase,
}

/// Lowered predicate
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Check<'a> {
    Compare {
        op: CompareOp,
        comparand: Comparand<'a>,
        left: Term<'a>,
        right: Term<'a>,
    },
    IsNull {
        term: Term<'a>,
        negated: bool,
    },
    Pattern {
        pattern: Pattern,
        receiver: Term<'a>,
        arg: Term<'a>,
    },
    Blank(Term<'a>),
    Member {
        path: &'a FieldPath,
        element: ScalarType<'a>,
        comparand: Comparand<'a>,
        value: Value,
    },
    HasValue(&'a FieldPath),
    BoolField(&'a FieldPath),
    Literal(bool),
    All(Vec<Check<'a>>),
    Any(Vec<Check<'a>>),
    Not(Box<Check<'a>>),
}

impl Check<'_> {
    /// Whether membership renders as an element scan instead of `@>`
    pub(crate) fn member_needs_scan(element: ScalarType<'_>) -> bool {
        matches!(element, ScalarType::Decimal | ScalarType::Timestamp)
    }
}

/// Lower a filter against a document schema
pub(crate) fn lower<'a>(filter: &'a Filter, schema: &'a DocumentSchema) -> QueryResult<Check<'a>> {
    Lowering { filter, schema }.predicate(&filter.predicate)
}

struct Lowering<'a> {
    filter: &'a Filter,
    schema: &'a DocumentSchema,
}

impl<'a> Lowering<'a> {
    fn predicate(&self, predicate: &'a Predicate) -> QueryResult<Check<'a>> {
        match predicate {
            Predicate::Comparison { op, left, right } => self.comparison(*op, left, right),
            Predicate::Logical { op, operands } => self.logical(*op, operands),
            Predicate::StringOp {
                kind,
                receiver,
                args,
            } => self.string_op(*kind, receiver, args),
            Predicate::CollectionContains { field, value } => {
                let value = self.constant(value)?;
                self.member(field, value)
            }
            Predicate::HasValue(path) => {
                let def = self.field(path)?;
                if !def.nullable {
                    return Err(QueryError::unsupported(
                        format!("{}.HasValue", path),
                        "HasValue requires a nullable field",
                    ));
                }
                Ok(Check::HasValue(path))
            }
            Predicate::Field(path) => match self.field(path)?.field_type {
                FieldType::Bool => Ok(Check::BoolField(path)),
                ref other => Err(QueryError::unsupported(
                    format!("member '{}'", path),
                    format!("a {} field is not a predicate", other.type_name()),
                )),
            },
            Predicate::Constant(constant) => match self.constant(constant)? {
                Value::Bool(b) => Ok(Check::Literal(b)),
                other => Err(QueryError::unsupported(
                    format!("constant {}", other),
                    "only a bool constant is a predicate",
                )),
            },
        }
    }

    fn logical(&self, op: LogicalOp, operands: &'a [Predicate]) -> QueryResult<Check<'a>> {
        let lowered = operands
            .iter()
            .map(|p| self.predicate(p))
            .collect::<QueryResult<Vec<_>>>()?;

        match op {
            LogicalOp::And => Ok(Check::All(lowered)),
            LogicalOp::Or => Ok(Check::Any(lowered)),
            LogicalOp::Not => {
                let count = lowered.len();
                let mut iter = lowered.into_iter();
                match (iter.next(), count) {
                    (Some(inner), 1) => Ok(Check::Not(Box::new(inner))),
                    _ => Err(QueryError::unsupported(
                        "NOT",
                        format!("NOT takes exactly one operand, got {}", count),
                    )),
                }
            }
        }
    }

    fn comparison(&self, op: CompareOp, left: &'a Operand, right: &'a Operand) -> QueryResult<Check<'a>> {
        let l = self.term(left)?;
        let r = self.term(right)?;

        match (&l, &r) {
            (Term::Constant(Value::Null), Term::Constant(Value::Null)) => {
                return Err(QueryError::unsupported(
                    format!("comparison '{}'", op.token()),
                    "both operands are null",
                ))
            }
            (Term::Constant(Value::Null), _) | (_, Term::Constant(Value::Null)) => {
                if !op.is_equality() {
                    return Err(QueryError::unsupported(
                        format!("comparison '{}'", op.token()),
                        "null can only be compared with == or !=",
                    ));
                }
                let other = if matches!(l, Term::Constant(Value::Null)) { right } else { left };
                return Ok(Check::IsNull {
                    term: self.null_term(other)?,
                    negated: op == CompareOp::Ne,
                });
            }
            _ => {}
        }

        let (ls, rs) = match (l.scalar(), r.scalar()) {
            (Some(ls), Some(rs)) => (ls, rs),
            _ => {
                return Err(QueryError::unsupported(
                    format!("comparison '{}'", op.token()),
                    "operands must be scalar",
                ))
            }
        };
        let comparand = TypeMapper::comparand(op, ls, rs)?;

        Ok(Check::Compare {
            op,
            comparand,
            left: self.fit(l, comparand, op)?,
            right: self.fit(r, comparand, op)?,
        })
    }

    /// Bring a term to the comparison type
    fn fit(&self, term: Term<'a>, comparand: Comparand<'a>, op: CompareOp) -> QueryResult<Term<'a>> {
        match (term, comparand) {
            (Term::Constant(v), c) => TypeMapper::bind_value(&v, c).map(Term::Constant),
            (term, Comparand::Typed(_)) => Ok(term),
            (term @ Term::Field { scalar: ScalarType::Enum(_), .. }, _) => Ok(term),
            (term, Comparand::EnumLabel(_) | Comparand::EnumCode(_)) if term.is_text() => Ok(term),
            (term, _) => Err(QueryError::unsupported(
                format!("comparison '{}'", op.token()),
                format!(
                    "a {} operand cannot be compared with an enum",
                    term.scalar().map(|s| s.name()).unwrap_or("non-scalar")
                ),
            )),
        }
    }

    fn string_op(&self, kind: StringOpKind, receiver: &'a Operand, args: &'a [Operand]) -> QueryResult<Check<'a>> {
        if args.len() != kind.arity() {
            return Err(QueryError::unsupported(
                kind.name(),
                format!("expects {} argument(s), got {}", kind.arity(), args.len()),
            ));
        }

        // Contains on an array field is a membership test
        if let (StringOpKind::Contains, Operand::Field(path)) = (kind, receiver) {
            if let FieldType::Array { .. } = self.field(path)?.field_type {
                return match &args[0] {
                    Operand::Constant(c) => {
                        let value = self.constant(c)?;
                        self.member(path, value)
                    }
                    _ => Err(QueryError::unsupported(
                        format!("{}.Contains", path),
                        "array membership takes a constant",
                    )),
                };
            }
        }

        let receiver = self.text_term(receiver, kind)?;
        match kind {
            StringOpKind::IsNullOrWhiteSpace => Ok(Check::Blank(receiver)),
            StringOpKind::Equals => Ok(Check::Compare {
                op: CompareOp::Eq,
                comparand: Comparand::Typed(SqlType::Text),
                left: receiver,
                right: self.text_term(&args[0], kind)?,
            }),
            StringOpKind::StartsWith
            | StringOpKind::EndsWith
            | StringOpKind::Contains
            | StringOpKind::ContainsIgnoreCase => {
                let pattern = match kind {
                    StringOpKind::StartsWith => Pattern::Prefix,
                    StringOpKind::EndsWith => Pattern::Suffix,
                    StringOpKind::ContainsIgnoreCase => Pattern::SubstringIgnoreCase,
                    _ => Pattern::Substring,
                };
                Ok(Check::Pattern {
                    pattern,
                    receiver,
                    arg: self.text_term(&args[0], kind)?,
                })
            }
        }
    }

    fn member(&self, path: &'a FieldPath, value: Value) -> QueryResult<Check<'a>> {
        let def = self.field(path)?;
        let element = match &def.field_type {
            FieldType::Array { element_type } => TypeMapper::scalar(element_type),
            other => {
                return Err(QueryError::unsupported(
                    format!("{}.Contains", path),
                    format!("membership needs an array field, '{}' is {}", path, other.type_name()),
                ))
            }
        };
        let element = element.ok_or_else(|| {
            QueryError::unsupported(
                format!("{}.Contains", path),
                "membership is only supported on arrays of scalars",
            )
        })?;
        let value_type = value.scalar_type().ok_or_else(|| {
            QueryError::unsupported(format!("{}.Contains", path), "membership value is null")
        })?;

        let comparand = TypeMapper::comparand(CompareOp::Eq, element, value_type)?;
        Ok(Check::Member {
            path,
            element,
            comparand,
            value: TypeMapper::bind_value(&value, comparand)?,
        })
    }

    // ==================
    // Operands
    // ==================

    fn term(&self, operand: &'a Operand) -> QueryResult<Term<'a>> {
        match operand {
            Operand::Field(path) => {
                let def = self.field(path)?;
                let scalar = TypeMapper::scalar(&def.field_type).ok_or_else(|| {
                    QueryError::unsupported(
                        format!("member '{}'", path),
                        format!("a {} field cannot be compared", def.field_type.type_name()),
                    )
                })?;
                Ok(Term::Field { path, scalar })
            }
            Operand::Constant(c) => self.constant(c).map(Term::Constant),
            Operand::EnumAsString(path) => match &self.field(path)?.field_type {
                FieldType::Enum { variants, .. } => Ok(Term::Label { path, variants }),
                other => Err(QueryError::unsupported(
                    format!("{}.ToString", path),
                    format!("ToString is only supported on enum fields, '{}' is {}", path, other.type_name()),
                )),
            },
            Operand::ToLower(inner) => Ok(Term::Fold {
                upper: false,
                inner: Box::new(self.text_operand(inner, "ToLower")?),
            }),
            Operand::ToUpper(inner) => Ok(Term::Fold {
                upper: true,
                inner: Box::new(self.text_operand(inner, "ToUpper")?),
            }),
        }
    }

    fn text_term(&self, operand: &'a Operand, kind: StringOpKind) -> QueryResult<Term<'a>> {
        self.text_operand(operand, kind.name())
    }

    fn text_operand(&self, operand: &'a Operand, method: &str) -> QueryResult<Term<'a>> {
        let term = self.term(operand)?;
        if term.is_text() {
            Ok(term)
        } else {
            let kind = match &term {
                Term::Constant(v) => v.kind(),
                other => other.scalar().map(|s| s.name()).unwrap_or("non-scalar"),
            };
            Err(QueryError::unsupported(
                method.to_string(),
                format!("expects string operands, got {}", kind),
            ))
        }
    }

    fn null_term(&self, operand: &'a Operand) -> QueryResult<Term<'a>> {
        match operand {
            Operand::Field(path) => {
                self.field(path)?;
                Ok(Term::Node(path))
            }
            other => self.term(other),
        }
    }

    fn field(&self, path: &FieldPath) -> QueryResult<&'a FieldDef> {
        self.schema.resolve(path)
    }

    fn constant(&self, constant: &Constant) -> QueryResult<Value> {
        match constant {
            Constant::Literal(v) => Ok(v.clone()),
            Constant::Captured(name) => self
                .filter
                .captures
                .get(name)
                .cloned()
                .ok_or_else(|| QueryError::UnboundCapture(name.clone())),
        }
    }
}
