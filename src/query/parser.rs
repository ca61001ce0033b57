//! Predicate text parser
//!
//! Accepts lambda-body expressions such as
//! `x => x.age > 28 && x.status == "Active"` or, without the parameter,
//! `age > 28 && status == "Active"`. Captured values are written `@name` and
//! supplied with [`Filter::bind`].
//!
//! Parsing is purely syntactic. Member names are checked against the schema
//! at compile time.

use std::str::FromStr;

use rust_decimal::Decimal;

use super::ast::{CompareOp, Constant, FieldPath, Filter, Operand, Predicate, StringOpKind};
use super::errors::{QueryError, QueryResult};
use super::value::Value;

impl Filter {
    /// Parse predicate text into a filter with no captures bound
    pub fn parse(text: &str) -> QueryResult<Filter> {
        parse(text).map(Filter::new)
    }
}

/// Parse predicate text
pub fn parse(text: &str) -> QueryResult<Predicate> {
    let tokens = Lexer::new(text).tokenize()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        param: None,
        end: text.len(),
    };
    let expr = parser.parse_lambda()?;
    lower_predicate(expr)
}

// ==================
// Lexer
// ==================

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Number(Value),
    Str(String),
    At,
    Arrow,
    OrOr,
    AndAnd,
    Bang,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Dot,
    Comma,
    LParen,
    RParen,
    Minus,
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    offset: usize,
}

struct Lexer<'t> {
    text: &'t str,
    bytes: &'t [u8],
    pos: usize,
}

impl<'t> Lexer<'t> {
    fn new(text: &'t str) -> Self {
        Self {
            text,
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn tokenize(mut self) -> QueryResult<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(&b) = self.bytes.get(self.pos) {
            let start = self.pos;
            if b.is_ascii_whitespace() {
                self.pos += 1;
                continue;
            }

            let tok = match b {
                b'(' => self.single(Tok::LParen),
                b')' => self.single(Tok::RParen),
                b',' => self.single(Tok::Comma),
                b'.' => self.single(Tok::Dot),
                b'@' => self.single(Tok::At),
                b'-' => self.single(Tok::Minus),
                b'"' => self.string()?,
                b'=' => match self.peek(1) {
                    Some(b'=') => self.double(Tok::EqEq),
                    Some(b'>') => self.double(Tok::Arrow),
                    _ => return Err(QueryError::parse(start, "expected '==' or '=>'")),
                },
                b'!' => match self.peek(1) {
                    Some(b'=') => self.double(Tok::NotEq),
                    _ => self.single(Tok::Bang),
                },
                b'<' => match self.peek(1) {
                    Some(b'=') => self.double(Tok::Le),
                    _ => self.single(Tok::Lt),
                },
                b'>' => match self.peek(1) {
                    Some(b'=') => self.double(Tok::Ge),
                    _ => self.single(Tok::Gt),
                },
                b'&' if self.peek(1) == Some(b'&') => self.double(Tok::AndAnd),
                b'|' if self.peek(1) == Some(b'|') => self.double(Tok::OrOr),
                b if b.is_ascii_digit() => self.number()?,
                b if b.is_ascii_alphabetic() || b == b'_' => self.ident(),
                _ => {
                    let ch = self.text[start..].chars().next().unwrap_or('?');
                    return Err(QueryError::parse(start, format!("unexpected character '{}'", ch)));
                }
            };
            tokens.push(Token { tok, offset: start });
        }
        Ok(tokens)
    }

    fn peek(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    fn single(&mut self, tok: Tok) -> Tok {
        self.pos += 1;
        tok
    }

    fn double(&mut self, tok: Tok) -> Tok {
        self.pos += 2;
        tok
    }

    fn ident(&mut self) -> Tok {
        let start = self.pos;
        while matches!(self.peek(0), Some(b) if b.is_ascii_alphanumeric() || b == b'_') {
            self.pos += 1;
        }
        Tok::Ident(self.text[start..self.pos].to_string())
    }

    fn number(&mut self) -> QueryResult<Tok> {
        let start = self.pos;
        let mut real = false;
        while matches!(self.peek(0), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek(0) == Some(b'.') && matches!(self.peek(1), Some(b) if b.is_ascii_digit()) {
            real = true;
            self.pos += 1;
            while matches!(self.peek(0), Some(b) if b.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(0), Some(b'e' | b'E')) {
            let sign = usize::from(matches!(self.peek(1), Some(b'+' | b'-')));
            if matches!(self.peek(1 + sign), Some(b) if b.is_ascii_digit()) {
                real = true;
                self.pos += 1 + sign;
                while matches!(self.peek(0), Some(b) if b.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }

        let digits = &self.text[start..self.pos];
        let suffix = self.peek(0).filter(|b| b.is_ascii_alphabetic());
        if suffix.is_some() {
            self.pos += 1;
        }
        let bad = |what: &str| QueryError::parse(start, format!("invalid {} literal '{}'", what, digits));

        let value = match suffix.map(|b| b.to_ascii_lowercase()) {
            Some(b'l') if !real => Value::Int64(digits.parse().map_err(|_| bad("int64"))?),
            Some(b'f') => Value::Float32(digits.parse().map_err(|_| bad("float32"))?),
            Some(b'd') => Value::Float64(digits.parse().map_err(|_| bad("float64"))?),
            Some(b'm') => Value::Decimal(
                Decimal::from_str(digits)
                    .or_else(|_| Decimal::from_scientific(digits))
                    .map_err(|_| bad("decimal"))?,
            ),
            Some(other) => {
                return Err(QueryError::parse(
                    self.pos - 1,
                    format!("unknown numeric suffix '{}'", char::from(other)),
                ))
            }
            None if real => Value::Float64(digits.parse().map_err(|_| bad("float64"))?),
            None => {
                let wide: i64 = digits.parse().map_err(|_| bad("integer"))?;
                i32::try_from(wide).map(Value::Int32).unwrap_or(Value::Int64(wide))
            }
        };
        Ok(Tok::Number(value))
    }

    fn string(&mut self) -> QueryResult<Tok> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();
        loop {
            let rest = &self.text[self.pos..];
            let mut chars = rest.chars();
            match chars.next() {
                None => return Err(QueryError::parse(start, "unterminated string literal")),
                Some('"') => {
                    self.pos += 1;
                    return Ok(Tok::Str(out));
                }
                Some('\\') => {
                    let escaped = match chars.next() {
                        Some('"') => '"',
                        Some('\\') => '\\',
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some(other) => {
                            return Err(QueryError::parse(
                                self.pos,
                                format!("unknown escape '\\{}'", other),
                            ))
                        }
                        None => return Err(QueryError::parse(start, "unterminated string literal")),
                    };
                    out.push(escaped);
                    self.pos += 2;
                }
                Some(c) => {
                    out.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }
    }
}

// ==================
// Parser
// ==================

/// Syntax tree before lowering to the predicate AST
#[derive(Debug, Clone)]
enum Expr {
    Path(Vec<String>, usize),
    Literal(Value),
    Capture(String),
    Call {
        receiver: Box<Expr>,
        method: String,
        args: Vec<Expr>,
        offset: usize,
    },
    StaticCall {
        method: String,
        args: Vec<Expr>,
        offset: usize,
    },
    HasValue(Box<Expr>, usize),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    param: Option<String>,
    end: usize,
}

impl Parser {
    fn parse_lambda(&mut self) -> QueryResult<Expr> {
        if let (Some(Tok::Ident(name)), Some(Tok::Arrow)) = (self.peek_tok(0), self.peek_tok(1)) {
            self.param = Some(name.clone());
            self.pos += 2;
        }
        let expr = self.parse_or()?;
        match self.tokens.get(self.pos) {
            None => Ok(expr),
            Some(t) => Err(QueryError::parse(t.offset, "unexpected trailing input")),
        }
    }

    fn parse_or(&mut self) -> QueryResult<Expr> {
        let mut items = vec![self.parse_and()?];
        while self.eat(&Tok::OrOr) {
            items.push(self.parse_and()?);
        }
        Ok(if items.len() == 1 { items.remove(0) } else { Expr::Or(items) })
    }

    fn parse_and(&mut self) -> QueryResult<Expr> {
        let mut items = vec![self.parse_unary()?];
        while self.eat(&Tok::AndAnd) {
            items.push(self.parse_unary()?);
        }
        Ok(if items.len() == 1 { items.remove(0) } else { Expr::And(items) })
    }

    fn parse_unary(&mut self) -> QueryResult<Expr> {
        if self.eat(&Tok::Bang) {
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> QueryResult<Expr> {
        let left = self.parse_postfix()?;
        let op = match self.peek_tok(0) {
            Some(Tok::EqEq) => CompareOp::Eq,
            Some(Tok::NotEq) => CompareOp::Ne,
            Some(Tok::Lt) => CompareOp::Lt,
            Some(Tok::Le) => CompareOp::Le,
            Some(Tok::Gt) => CompareOp::Gt,
            Some(Tok::Ge) => CompareOp::Ge,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.parse_postfix()?;
        Ok(Expr::Compare(op, Box::new(left), Box::new(right)))
    }

    fn parse_postfix(&mut self) -> QueryResult<Expr> {
        let mut expr = self.parse_primary()?;
        while self.eat(&Tok::Dot) {
            let (name, offset) = self.expect_ident()?;
            if self.eat(&Tok::LParen) {
                let args = self.parse_args()?;
                expr = Expr::Call {
                    receiver: Box::new(expr),
                    method: name,
                    args,
                    offset,
                };
            } else if name == "HasValue" {
                expr = Expr::HasValue(Box::new(expr), offset);
            } else {
                expr = match expr {
                    Expr::Path(mut segments, start) => {
                        segments.push(name);
                        Expr::Path(segments, start)
                    }
                    _ => {
                        return Err(QueryError::unsupported(
                            format!("member '{}'", name),
                            "members can only be read from document fields",
                        ))
                    }
                };
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> QueryResult<Expr> {
        let token = match self.tokens.get(self.pos) {
            Some(t) => t.clone(),
            None => return Err(QueryError::parse(self.end, "unexpected end of input")),
        };
        self.pos += 1;

        match token.tok {
            Tok::Number(v) => Ok(Expr::Literal(v)),
            Tok::Str(s) => Ok(Expr::Literal(Value::Text(s))),
            Tok::Minus => match self.tokens.get(self.pos).map(|t| t.tok.clone()) {
                Some(Tok::Number(v)) => {
                    self.pos += 1;
                    negate(v)
                        .map(Expr::Literal)
                        .ok_or_else(|| QueryError::parse(token.offset, "numeric literal out of range"))
                }
                _ => Err(QueryError::parse(token.offset, "'-' must precede a numeric literal")),
            },
            Tok::At => {
                let (name, _) = self.expect_ident()?;
                Ok(Expr::Capture(name))
            }
            Tok::LParen => {
                let inner = self.parse_or()?;
                self.expect(&Tok::RParen, "expected ')'")?;
                Ok(inner)
            }
            Tok::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                "string" if self.peek_tok(0) == Some(&Tok::Dot) => {
                    self.pos += 1;
                    let (method, offset) = self.expect_ident()?;
                    self.expect(&Tok::LParen, "expected '(' after static method")?;
                    let args = self.parse_args()?;
                    Ok(Expr::StaticCall { method, args, offset })
                }
                _ => match &self.param {
                    Some(param) if *param == name => Ok(Expr::Path(Vec::new(), token.offset)),
                    Some(param) => Err(QueryError::unsupported(
                        format!("identifier '{}'", name),
                        format!("only the lambda parameter '{}' and @captures may be referenced", param),
                    )),
                    None => Ok(Expr::Path(vec![name], token.offset)),
                },
            },
            _ => Err(QueryError::parse(token.offset, "expected an expression")),
        }
    }

    fn parse_args(&mut self) -> QueryResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.eat(&Tok::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_or()?);
            if self.eat(&Tok::RParen) {
                return Ok(args);
            }
            self.expect(&Tok::Comma, "expected ',' or ')'")?;
        }
    }

    fn peek_tok(&self, ahead: usize) -> Option<&Tok> {
        self.tokens.get(self.pos + ahead).map(|t| &t.tok)
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek_tok(0) == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Tok, message: &str) -> QueryResult<()> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(QueryError::parse(self.offset(), message))
        }
    }

    fn expect_ident(&mut self) -> QueryResult<(String, usize)> {
        match self.tokens.get(self.pos) {
            Some(Token {
                tok: Tok::Ident(name),
                offset,
            }) => {
                let found = (name.clone(), *offset);
                self.pos += 1;
                Ok(found)
            }
            _ => Err(QueryError::parse(self.offset(), "expected an identifier")),
        }
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|t| t.offset).unwrap_or(self.end)
    }
}

fn negate(v: Value) -> Option<Value> {
    match v {
        Value::Int32(i) => Some(Value::Int32(-i)),
        // i32::MIN is lexed as int64 because its magnitude overflows int32
        Value::Int64(i) => {
            let n = i.checked_neg()?;
            Some(i32::try_from(n).map(Value::Int32).unwrap_or(Value::Int64(n)))
        }
        Value::Float32(f) => Some(Value::Float32(-f)),
        Value::Float64(f) => Some(Value::Float64(-f)),
        Value::Decimal(d) => Some(Value::Decimal(-d)),
        _ => None,
    }
}

// ==================
// Lowering
// ==================

fn lower_predicate(expr: Expr) -> QueryResult<Predicate> {
    match expr {
        Expr::And(items) => Ok(Predicate::all(
            items.into_iter().map(lower_predicate).collect::<QueryResult<_>>()?,
        )),
        Expr::Or(items) => Ok(Predicate::any(
            items.into_iter().map(lower_predicate).collect::<QueryResult<_>>()?,
        )),
        Expr::Not(inner) => Ok(!lower_predicate(*inner)?),
        Expr::Compare(op, left, right) => Ok(Predicate::Comparison {
            op,
            left: lower_operand(*left)?,
            right: lower_operand(*right)?,
        }),
        Expr::Call {
            receiver,
            method,
            args,
            offset,
        } => {
            let kind = match method.as_str() {
                "StartsWith" => StringOpKind::StartsWith,
                "EndsWith" => StringOpKind::EndsWith,
                "Contains" => StringOpKind::Contains,
                "ContainsIgnoreCase" => StringOpKind::ContainsIgnoreCase,
                "Equals" => StringOpKind::Equals,
                "ToLower" | "ToUpper" | "ToString" => {
                    return Err(QueryError::unsupported(
                        format!("method '{}'", method),
                        "returns a value, not a predicate",
                    ))
                }
                _ => return Err(unsupported_method(&method, offset)),
            };
            Ok(Predicate::StringOp {
                kind,
                receiver: lower_operand(*receiver)?,
                args: args.into_iter().map(lower_operand).collect::<QueryResult<_>>()?,
            })
        }
        Expr::StaticCall {
            method,
            args,
            offset,
        } => {
            let kind = match method.as_str() {
                "IsNullOrWhiteSpace" => StringOpKind::IsNullOrWhiteSpace,
                "Equals" => StringOpKind::Equals,
                _ => return Err(unsupported_method(&format!("string.{}", method), offset)),
            };
            let mut operands = args
                .into_iter()
                .map(lower_operand)
                .collect::<QueryResult<Vec<_>>>()?;
            if operands.len() != kind.arity() + 1 {
                return Err(QueryError::unsupported(
                    format!("string.{}", method),
                    format!("expects {} argument(s), got {}", kind.arity() + 1, operands.len()),
                ));
            }
            let receiver = operands.remove(0);
            Ok(Predicate::StringOp {
                kind,
                receiver,
                args: operands,
            })
        }
        Expr::HasValue(receiver, offset) => match *receiver {
            Expr::Path(segments, _) if !segments.is_empty() => Ok(Predicate::HasValue(FieldPath::new(segments))),
            _ => Err(QueryError::unsupported(
                "HasValue",
                format!("HasValue at offset {} must follow a document field", offset),
            )),
        },
        Expr::Path(segments, offset) => Ok(Predicate::Field(path(segments, offset)?)),
        Expr::Literal(v) => Ok(Predicate::Constant(Constant::Literal(v))),
        Expr::Capture(name) => Ok(Predicate::Constant(Constant::Captured(name))),
    }
}

fn lower_operand(expr: Expr) -> QueryResult<Operand> {
    match expr {
        Expr::Path(segments, offset) => Ok(Operand::Field(path(segments, offset)?)),
        Expr::Literal(v) => Ok(Operand::Constant(Constant::Literal(v))),
        Expr::Capture(name) => Ok(Operand::Constant(Constant::Captured(name))),
        Expr::Call {
            receiver,
            method,
            args,
            offset,
        } if args.is_empty() => match method.as_str() {
            "ToLower" => Ok(lower_operand(*receiver)?.to_lower()),
            "ToUpper" => Ok(lower_operand(*receiver)?.to_upper()),
            "ToString" => match *receiver {
                Expr::Path(segments, at) => Ok(Operand::EnumAsString(path(segments, at)?)),
                _ => Err(QueryError::unsupported(
                    "method 'ToString'",
                    "ToString is only supported on enum fields",
                )),
            },
            _ => Err(unsupported_method(&method, offset)),
        },
        Expr::Call { method, offset, .. } => Err(unsupported_method(&method, offset)),
        Expr::StaticCall { method, .. } => Err(QueryError::unsupported(
            format!("string.{}", method),
            "returns a predicate, not a value",
        )),
        Expr::HasValue(..) => Err(QueryError::unsupported("HasValue", "returns a predicate, not a value")),
        Expr::Compare(..) | Expr::And(_) | Expr::Or(_) | Expr::Not(_) => Err(QueryError::unsupported(
            "nested boolean operand",
            "comparisons take fields and constants, not predicates",
        )),
    }
}

fn path(segments: Vec<String>, offset: usize) -> QueryResult<FieldPath> {
    if segments.is_empty() {
        return Err(QueryError::unsupported(
            "lambda parameter",
            format!("the parameter at offset {} must be followed by a member", offset),
        ));
    }
    Ok(FieldPath::new(segments))
}

fn unsupported_method(method: &str, offset: usize) -> QueryError {
    QueryError::unsupported(
        format!("method '{}'", method),
        format!("not in the predicate vocabulary (offset {})", offset),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ast::{captured, field};

    #[test]
    fn test_lambda_and_bare_forms_agree() {
        let a = parse("x => x.age > 28 && x.status == \"Active\"").unwrap();
        let b = parse("age > 28 && status == \"Active\"").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, field("age").gt(28).and(field("status").eq("Active")));
    }

    #[test]
    fn test_nested_path() {
        let p = parse("p => p.address.geo.lat >= 1.5").unwrap();
        assert_eq!(p, field("address.geo.lat").ge(1.5));
    }

    #[test]
    fn test_literal_suffixes() {
        assert_eq!(parse("n == 5L").unwrap(), field("n").eq(5i64));
        assert_eq!(parse("n == 2.5f").unwrap(), field("n").eq(2.5f32));
        assert_eq!(parse("n == 3000000000").unwrap(), field("n").eq(3_000_000_000i64));
        assert_eq!(parse("n > -4").unwrap(), field("n").gt(-4));
        assert_eq!(
            parse("n == 1.25m").unwrap(),
            field("n").eq(Decimal::from_str("1.25").unwrap())
        );
    }

    #[test]
    fn test_string_methods() {
        assert_eq!(
            parse("x => x.name.ToLower().StartsWith(\"al\")").unwrap(),
            field("name").to_lower().starts_with("al")
        );
        assert_eq!(
            parse("x => string.IsNullOrWhiteSpace(x.displayName)").unwrap(),
            field("displayName").is_null_or_white_space()
        );
        assert_eq!(
            parse("x => string.Equals(x.name, \"bob\")").unwrap(),
            parse("x => x.name.Equals(\"bob\")").unwrap()
        );
    }

    #[test]
    fn test_not_and_has_value() {
        assert_eq!(
            parse("x => !x.nickname.HasValue").unwrap(),
            !field("nickname").has_value()
        );
        assert_eq!(parse("x => !x.active").unwrap(), !field("active").is_true());
    }

    #[test]
    fn test_enum_to_string() {
        assert_eq!(
            parse("x => x.status.ToString() == \"Active\"").unwrap(),
            field("status").as_label().eq("Active")
        );
    }

    #[test]
    fn test_captures() {
        let filter = Filter::parse("x => x.age >= @min").unwrap().bind("min", 21);
        assert_eq!(filter.predicate, field("age").ge(captured("min")));
        assert_eq!(filter.captures.get("min"), Some(&Value::Int32(21)));
    }

    #[test]
    fn test_string_escapes() {
        let p = parse(r#"name == "a \"quoted\" \\ value""#).unwrap();
        assert_eq!(p, field("name").eq("a \"quoted\" \\ value"));
    }

    #[test]
    fn test_unsupported_method_names_member() {
        let err = parse("x => x.name.Trim() == \"a\"").unwrap_err();
        assert_eq!(err.construct(), Some("method 'Trim'"));
    }

    #[test]
    fn test_foreign_identifier_rejected() {
        let err = parse("x => y.age > 1").unwrap_err();
        assert_eq!(err.construct(), Some("identifier 'y'"));
    }

    #[test]
    fn test_parse_error_offsets() {
        match parse("age > ").unwrap_err() {
            QueryError::Parse { offset, .. } => assert_eq!(offset, 6),
            other => panic!("unexpected {:?}", other),
        }
        match parse("age > 1 )").unwrap_err() {
            QueryError::Parse { offset, .. } => assert_eq!(offset, 8),
            other => panic!("unexpected {:?}", other),
        }
        match parse("name == \"open").unwrap_err() {
            QueryError::Parse { offset, .. } => assert_eq!(offset, 8),
            other => panic!("unexpected {:?}", other),
        }
    }
}
