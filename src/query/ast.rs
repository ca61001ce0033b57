//! Predicate AST
//!
//! A closed set of node kinds. Every kind is handled by an exhaustive match in
//! the compiler and the evaluator, so there is no "unknown node" path: what
//! cannot be expressed here cannot reach the backing store.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Not;

use super::value::Value;

/// Dotted path from the document root to a field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Split a dotted path (`address.geo.lat`)
    pub fn parse(path: &str) -> Self {
        Self::new(path.split('.'))
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The first `depth` segments joined with dots
    pub fn prefix(&self, depth: usize) -> String {
        self.segments[..depth.min(self.segments.len())].join(".")
    }

    /// Extend the path by one segment
    pub fn child(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    // ==================
    // Builder helpers
    // ==================

    /// True iff the field is present and not null
    pub fn has_value(self) -> Predicate {
        Predicate::HasValue(self)
    }

    /// Array membership test
    pub fn contains_item(self, value: impl Into<Constant>) -> Predicate {
        Predicate::CollectionContains {
            field: self,
            value: value.into(),
        }
    }

    /// A boolean field used directly as a predicate
    pub fn is_true(self) -> Predicate {
        Predicate::Field(self)
    }

    /// Enum field compared by its canonical label
    pub fn as_label(self) -> Operand {
        Operand::EnumAsString(self)
    }

    pub fn eq(self, rhs: impl Into<Operand>) -> Predicate {
        Operand::Field(self).eq(rhs)
    }

    pub fn ne(self, rhs: impl Into<Operand>) -> Predicate {
        Operand::Field(self).ne(rhs)
    }

    pub fn lt(self, rhs: impl Into<Operand>) -> Predicate {
        Operand::Field(self).lt(rhs)
    }

    pub fn le(self, rhs: impl Into<Operand>) -> Predicate {
        Operand::Field(self).le(rhs)
    }

    pub fn gt(self, rhs: impl Into<Operand>) -> Predicate {
        Operand::Field(self).gt(rhs)
    }

    pub fn ge(self, rhs: impl Into<Operand>) -> Predicate {
        Operand::Field(self).ge(rhs)
    }

    pub fn starts_with(self, arg: impl Into<Operand>) -> Predicate {
        Operand::Field(self).starts_with(arg)
    }

    pub fn ends_with(self, arg: impl Into<Operand>) -> Predicate {
        Operand::Field(self).ends_with(arg)
    }

    pub fn contains(self, arg: impl Into<Operand>) -> Predicate {
        Operand::Field(self).contains(arg)
    }

    pub fn contains_ignore_case(self, arg: impl Into<Operand>) -> Predicate {
        Operand::Field(self).contains_ignore_case(arg)
    }

    pub fn is_null_or_white_space(self) -> Predicate {
        Operand::Field(self).is_null_or_white_space()
    }

    pub fn to_lower(self) -> Operand {
        Operand::Field(self).to_lower()
    }

    pub fn to_upper(self) -> Operand {
        Operand::Field(self).to_upper()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

/// Start a predicate on a field path
pub fn field(path: &str) -> FieldPath {
    FieldPath::parse(path)
}

/// Reference a value supplied through [`Filter::bind`]
pub fn captured(name: &str) -> Operand {
    Operand::Constant(Constant::Captured(name.to_string()))
}

/// A literal or a captured value
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Literal(Value),
    /// Resolved from [`Captures`] at compile time
    Captured(String),
}

impl<T: Into<Value>> From<T> for Constant {
    fn from(v: T) -> Self {
        Constant::Literal(v.into())
    }
}

/// One side of a comparison or a string operation
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Field(FieldPath),
    Constant(Constant),
    /// Enum field projected to its canonical label
    EnumAsString(FieldPath),
    ToLower(Box<Operand>),
    ToUpper(Box<Operand>),
}

impl Operand {
    fn compare(self, op: CompareOp, rhs: impl Into<Operand>) -> Predicate {
        Predicate::Comparison {
            op,
            left: self,
            right: rhs.into(),
        }
    }

    fn string_op(self, kind: StringOpKind, args: Vec<Operand>) -> Predicate {
        Predicate::StringOp {
            kind,
            receiver: self,
            args,
        }
    }

    pub fn eq(self, rhs: impl Into<Operand>) -> Predicate {
        self.compare(CompareOp::Eq, rhs)
    }

    pub fn ne(self, rhs: impl Into<Operand>) -> Predicate {
        self.compare(CompareOp::Ne, rhs)
    }

    pub fn lt(self, rhs: impl Into<Operand>) -> Predicate {
        self.compare(CompareOp::Lt, rhs)
    }

    pub fn le(self, rhs: impl Into<Operand>) -> Predicate {
        self.compare(CompareOp::Le, rhs)
    }

    pub fn gt(self, rhs: impl Into<Operand>) -> Predicate {
        self.compare(CompareOp::Gt, rhs)
    }

    pub fn ge(self, rhs: impl Into<Operand>) -> Predicate {
        self.compare(CompareOp::Ge, rhs)
    }

    pub fn starts_with(self, arg: impl Into<Operand>) -> Predicate {
        self.string_op(StringOpKind::StartsWith, vec![arg.into()])
    }

    pub fn ends_with(self, arg: impl Into<Operand>) -> Predicate {
        self.string_op(StringOpKind::EndsWith, vec![arg.into()])
    }

    pub fn contains(self, arg: impl Into<Operand>) -> Predicate {
        self.string_op(StringOpKind::Contains, vec![arg.into()])
    }

    pub fn contains_ignore_case(self, arg: impl Into<Operand>) -> Predicate {
        self.string_op(StringOpKind::ContainsIgnoreCase, vec![arg.into()])
    }

    pub fn equals(self, arg: impl Into<Operand>) -> Predicate {
        self.string_op(StringOpKind::Equals, vec![arg.into()])
    }

    pub fn is_null_or_white_space(self) -> Predicate {
        self.string_op(StringOpKind::IsNullOrWhiteSpace, Vec::new())
    }

    pub fn to_lower(self) -> Operand {
        Operand::ToLower(Box::new(self))
    }

    pub fn to_upper(self) -> Operand {
        Operand::ToUpper(Box::new(self))
    }
}

impl From<FieldPath> for Operand {
    fn from(path: FieldPath) -> Self {
        Operand::Field(path)
    }
}

impl From<Constant> for Operand {
    fn from(c: Constant) -> Self {
        Operand::Constant(c)
    }
}

macro_rules! operand_from_literal {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Operand {
                fn from(v: $ty) -> Self {
                    Operand::Constant(Constant::Literal(v.into()))
                }
            }
        )*
    };
}

operand_from_literal!(
    Value,
    bool,
    i16,
    i32,
    i64,
    f32,
    f64,
    rust_decimal::Decimal,
    String,
    &str,
    chrono::DateTime<chrono::Utc>,
    uuid::Uuid,
);

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// SQL operator token
    pub fn token(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    pub fn is_equality(&self) -> bool {
        matches!(self, CompareOp::Eq | CompareOp::Ne)
    }
}

/// Boolean connectives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

/// String operation kinds
///
/// Case folding is expressed as [`Operand::ToLower`] / [`Operand::ToUpper`]
/// so it can feed any comparison or string operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringOpKind {
    StartsWith,
    EndsWith,
    Contains,
    ContainsIgnoreCase,
    Equals,
    IsNullOrWhiteSpace,
}

impl StringOpKind {
    pub fn name(&self) -> &'static str {
        match self {
            StringOpKind::StartsWith => "StartsWith",
            StringOpKind::EndsWith => "EndsWith",
            StringOpKind::Contains => "Contains",
            StringOpKind::ContainsIgnoreCase => "ContainsIgnoreCase",
            StringOpKind::Equals => "Equals",
            StringOpKind::IsNullOrWhiteSpace => "IsNullOrWhiteSpace",
        }
    }

    /// Number of arguments besides the receiver
    pub fn arity(&self) -> usize {
        match self {
            StringOpKind::IsNullOrWhiteSpace => 0,
            _ => 1,
        }
    }
}

/// Boolean predicate over a document
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Comparison {
        op: CompareOp,
        left: Operand,
        right: Operand,
    },
    Logical {
        op: LogicalOp,
        operands: Vec<Predicate>,
    },
    StringOp {
        kind: StringOpKind,
        receiver: Operand,
        args: Vec<Operand>,
    },
    CollectionContains {
        field: FieldPath,
        value: Constant,
    },
    HasValue(FieldPath),
    /// Boolean field used as a predicate
    Field(FieldPath),
    /// Boolean constant used as a predicate
    Constant(Constant),
}

impl Predicate {
    /// Conjunction of all predicates; empty is TRUE
    pub fn all(operands: Vec<Predicate>) -> Self {
        Predicate::Logical {
            op: LogicalOp::And,
            operands,
        }
    }

    /// Disjunction of all predicates; empty is FALSE
    pub fn any(operands: Vec<Predicate>) -> Self {
        Predicate::Logical {
            op: LogicalOp::Or,
            operands,
        }
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::Logical {
                op: LogicalOp::And,
                mut operands,
            } => {
                operands.push(other);
                Predicate::all(operands)
            }
            first => Predicate::all(vec![first, other]),
        }
    }

    pub fn or(self, other: Predicate) -> Self {
        match self {
            Predicate::Logical {
                op: LogicalOp::Or,
                mut operands,
            } => {
                operands.push(other);
                Predicate::any(operands)
            }
            first => Predicate::any(vec![first, other]),
        }
    }

    /// Names of every `@capture` referenced by this predicate
    pub fn capture_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_captures(&mut names);
        names
    }

    fn collect_captures<'a>(&'a self, names: &mut Vec<&'a str>) {
        fn operand<'a>(op: &'a Operand, names: &mut Vec<&'a str>) {
            match op {
                Operand::Constant(Constant::Captured(name)) => names.push(name),
                Operand::ToLower(inner) | Operand::ToUpper(inner) => operand(inner, names),
                _ => {}
            }
        }

        match self {
            Predicate::Comparison { left, right, .. } => {
                operand(left, names);
                operand(right, names);
            }
            Predicate::Logical { operands, .. } => {
                for p in operands {
                    p.collect_captures(names);
                }
            }
            Predicate::StringOp { receiver, args, .. } => {
                operand(receiver, names);
                for a in args {
                    operand(a, names);
                }
            }
            Predicate::CollectionContains {
                value: Constant::Captured(name),
                ..
            }
            | Predicate::Constant(Constant::Captured(name)) => names.push(name),
            Predicate::CollectionContains { .. }
            | Predicate::HasValue(_)
            | Predicate::Field(_)
            | Predicate::Constant(_) => {}
        }
    }
}

impl Not for Predicate {
    type Output = Predicate;

    fn not(self) -> Predicate {
        Predicate::Logical {
            op: LogicalOp::Not,
            operands: vec![self],
        }
    }
}

/// Values supplied for `@name` captures
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Captures(BTreeMap<String, Value>);

impl Captures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A predicate together with its captured values
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub predicate: Predicate,
    pub captures: Captures,
}

impl Filter {
    pub fn new(predicate: Predicate) -> Self {
        Self {
            predicate,
            captures: Captures::new(),
        }
    }

    /// Bind a value for `@name`
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.captures.insert(name, value);
        self
    }
}

impl From<Predicate> for Filter {
    fn from(predicate: Predicate) -> Self {
        Filter::new(predicate)
    }
}
