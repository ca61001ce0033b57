//! Predicate Compiler Tests
//!
//! Properties of compiled fragments:
//! - Determinism: same AST, same fragment and parameter order
//! - Injection safety: constants never reach the fragment text
//! - Placeholder numbering follows the caller's first index
//! - Evaluator negation is three-valued

mod common;

use std::cmp::Ordering;

use pgkv::query::eval::Evaluator;
use pgkv::query::{compile, compile_from, field, ExactNumeric, Filter, Predicate, QueryError, SqlType, Value};
use pgkv::schema::{Document, DocumentSchema, FieldDef, FieldType};
use pgkv::store::sql::Arg;
use proptest::prelude::*;
use rust_decimal::Decimal;
use serde_json::json;

use common::{people, Person};

// =============================================================================
// Helper Functions
// =============================================================================

fn schema() -> DocumentSchema {
    Person::schema()
}

fn leaf() -> impl Strategy<Value = Predicate> {
    prop_oneof![
        any::<i32>().prop_map(|n| field("age").gt(n)),
        any::<i32>().prop_map(|n| field("age").le(n)),
        ".{0,8}".prop_map(|s| field("name").eq(s)),
        ".{0,8}".prop_map(|s| field("name").starts_with(s)),
        ".{0,8}".prop_map(|s| field("displayName").contains_ignore_case(s)),
        ".{0,8}".prop_map(|s| field("tags").contains_item(s)),
        any::<bool>().prop_map(|b| field("active").eq(b)),
        (0i64..3).prop_map(|code| field("status").ge(code)),
        Just(field("displayName").has_value()),
        Just(field("displayName").is_null_or_white_space()),
        (-1.0e6f64..1.0e6).prop_map(|f| field("score").lt(f)),
        "[A-Z]{2}".prop_map(|c| field("address.location.country").ne(c)),
    ]
}

fn predicate() -> impl Strategy<Value = Predicate> {
    leaf().prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Predicate::all),
            prop::collection::vec(inner.clone(), 0..4).prop_map(Predicate::any),
            inner.prop_map(|p| !p),
        ]
    })
}

/// Text with every metacharacter the fragment could be vulnerable to
fn hostile_text() -> impl Strategy<Value = String> {
    prop_oneof![r#"[a%_'\\;"*/-]{0,12}"#, ".{0,12}"]
}

fn document(name: &str) -> serde_json::Value {
    let mut doc = serde_json::to_value(&people()[0].1).unwrap();
    doc["name"] = json!(name);
    doc
}

fn ledger_schema() -> DocumentSchema {
    DocumentSchema::builder("Ledger")
        .field("big", FieldDef::required(FieldType::Int64))
        .field("amount", FieldDef::required(FieldType::Decimal))
}

/// Floats at every magnitude a numeric comparison has to carry exactly
fn float_constant() -> impl Strategy<Value = f64> {
    prop_oneof![
        -1.0e6f64..1.0e6,
        (-1000i64..1000).prop_map(|n| n as f64),
        (-1.0e6f64..1.0e6).prop_map(|f| f * 1e-30),
        (-1.0e6f64..1.0e6).prop_map(|f| f * 1e29),
        prop::num::f64::NORMAL,
        prop::num::f64::SUBNORMAL,
    ]
}

/// Every comparison operator with the ordering it accepts
fn comparisons(path: &str, f: f64) -> [(Predicate, fn(Ordering) -> bool); 6] {
    [
        (field(path).lt(f), Ordering::is_lt),
        (field(path).le(f), Ordering::is_le),
        (field(path).eq(f), Ordering::is_eq),
        (field(path).ne(f), Ordering::is_ne),
        (field(path).gt(f), Ordering::is_gt),
        (field(path).ge(f), Ordering::is_ge),
    ]
}

/// The float's parameter is typed numeric and bound as text naming exactly
/// that float
fn assert_bound_exactly(predicate: &Predicate, f: f64) -> Result<(), TestCaseError> {
    let q = compile(&Filter::new(predicate.clone()), &ledger_schema()).unwrap();
    let param = &q.parameters[0];
    prop_assert_eq!(param.sql_type, SqlType::Numeric);
    prop_assert_eq!(&param.value, &Value::Float64(f));
    match Arg::bound(param) {
        Arg::Text(text) => {
            prop_assert_eq!(text.parse::<f64>().ok(), Some(f));
            prop_assert_eq!(ExactNumeric::parse(&text), ExactNumeric::from_value(&Value::Float64(f)));
        }
        other => prop_assert!(false, "bound as {:?}", other),
    }
    Ok(())
}

/// `n` as a float when every integer up to it is representable
fn small_integer(x: f64) -> Option<i64> {
    (x.abs() <= (1u64 << 53) as f64).then(|| x as i64)
}

/// Exact ordering of a decimal with at most 10 fractional digits against a float
fn decimal_vs_float(d: Decimal, f: f64) -> Ordering {
    let sign_of_float = if f > 0.0 { Ordering::Less } else { Ordering::Greater };
    match Decimal::from_str_exact(&f.to_string()) {
        Ok(exact) => d.cmp(&exact),
        // beyond the decimal range
        Err(_) if f.abs() >= 1.0 => sign_of_float,
        // below the decimal's last digit
        Err(_) if d.is_zero() => sign_of_float,
        Err(_) => d.cmp(&Decimal::ZERO),
    }
}

// =============================================================================
// Determinism Tests
// =============================================================================

proptest! {
    /// Compiling the same AST twice yields identical output.
    #[test]
    fn prop_compile_is_deterministic(p in predicate(), first in 1usize..5) {
        let filter = Filter::new(p.clone());
        let a = compile_from(&filter, &schema(), first).unwrap();
        let b = compile_from(&Filter::new(p), &schema(), first).unwrap();
        prop_assert_eq!(a, b);
    }

    /// Placeholders are numbered contiguously from the first index.
    #[test]
    fn prop_placeholders_are_contiguous(p in predicate(), first in 1usize..5) {
        let q = compile_from(&Filter::new(p), &schema(), first).unwrap();
        for (i, param) in q.parameters.iter().enumerate() {
            prop_assert_eq!(param.index, first + i);
            let placeholder = param.placeholder();
            prop_assert!(q.fragment.contains(&placeholder));
        }
        prop_assert_eq!(q.next_index(first), first + q.parameters.len());
    }

    /// `!p` is unknown exactly when `p` is, and false when `p` is true.
    #[test]
    fn prop_negation_is_three_valued(p in predicate()) {
        let schema = schema();
        let positive = Filter::new(p.clone());
        let negative = Filter::new(!p);
        let pos = Evaluator::new(&positive, &schema).unwrap();
        let neg = Evaluator::new(&negative, &schema).unwrap();

        for (_, person) in people() {
            let doc = serde_json::to_value(&person).unwrap();
            prop_assert_eq!(neg.evaluate(&doc), pos.evaluate(&doc).map(|b| !b));
        }
    }
}

// =============================================================================
// Injection Safety Tests
// =============================================================================

proptest! {
    /// The fragment does not depend on a constant's text.
    #[test]
    fn prop_constants_never_inline(s in hostile_text()) {
        let baseline = compile(&Filter::new(field("name").eq("x")), &schema()).unwrap();
        let hostile = compile(&Filter::new(field("name").eq(s.clone())), &schema()).unwrap();
        prop_assert_eq!(&hostile.fragment, &baseline.fragment);
        prop_assert_eq!(&hostile.parameters[0].value, &Value::Text(s.clone()));

        let baseline = compile(&Filter::new(field("name").contains("x")), &schema()).unwrap();
        let hostile = compile(&Filter::new(field("name").contains(s.clone())), &schema()).unwrap();
        prop_assert_eq!(hostile.fragment, baseline.fragment);
    }

    /// A hostile constant matches only the document holding that exact text.
    #[test]
    fn prop_hostile_constants_match_literally(s in hostile_text()) {
        let schema = schema();
        let equals = Filter::new(field("name").eq(s.clone()));
        let prefix = Filter::new(field("name").starts_with(s.clone()));
        let contains = Filter::new(field("name").contains(s.clone()));

        let exact = document(&s);
        let longer = document(&format!("{}tail", s));
        let unrelated = document("plain");

        prop_assert!(pgkv::query::eval::matches(&equals, &schema, &exact).unwrap());
        prop_assert!(!pgkv::query::eval::matches(&equals, &schema, &longer).unwrap());
        prop_assert!(pgkv::query::eval::matches(&prefix, &schema, &longer).unwrap());
        prop_assert!(pgkv::query::eval::matches(&contains, &schema, &longer).unwrap());
        prop_assert_eq!(
            pgkv::query::eval::matches(&contains, &schema, &unrelated).unwrap(),
            s.is_empty() || "plain".contains(s.as_str())
        );
    }
}

// =============================================================================
// Numeric Exactness Tests
// =============================================================================

proptest! {
    /// Float constants against an int64 field compare exactly at any magnitude.
    #[test]
    fn prop_float_against_int64_is_exact(f in float_constant(), n in -(1i64 << 53)..=(1i64 << 53)) {
        let schema = ledger_schema();
        let values: Vec<i64> = [Some(n), small_integer(f.floor()), small_integer(f.ceil())]
            .into_iter()
            .flatten()
            .collect();

        for (predicate, accepts) in comparisons("big", f) {
            assert_bound_exactly(&predicate, f)?;
            let filter = Filter::new(predicate);
            let evaluator = Evaluator::new(&filter, &schema).unwrap();
            for &m in &values {
                let expected = (m as f64).partial_cmp(&f).map(accepts);
                let doc = json!({"big": m, "amount": "0"});
                prop_assert_eq!(evaluator.evaluate(&doc), expected, "{} vs {}", m, f);
            }
        }
    }

    /// Float constants against a decimal field compare exactly at any magnitude.
    #[test]
    fn prop_float_against_decimal_is_exact(
        f in float_constant(),
        m in -1_000_000_000_000i64..1_000_000_000_000,
        scale in 0u32..=10,
    ) {
        let schema = ledger_schema();
        let values: Vec<Decimal> = [Some(Decimal::new(m, scale)), Decimal::from_str_exact(&f.to_string()).ok()]
            .into_iter()
            .flatten()
            .collect();

        for (predicate, accepts) in comparisons("amount", f) {
            assert_bound_exactly(&predicate, f)?;
            let filter = Filter::new(predicate);
            let evaluator = Evaluator::new(&filter, &schema).unwrap();
            for &d in &values {
                let doc = json!({"big": 0, "amount": d.to_string()});
                prop_assert_eq!(evaluator.evaluate(&doc), Some(accepts(decimal_vs_float(d, f))), "{} vs {}", d, f);
            }
        }
    }
}

/// Tiny and huge floats are neither rounded nor rejected.
#[test]
fn test_float_edges_against_int64() {
    let schema = ledger_schema();
    let doc = |n: i64| json!({"big": n, "amount": "0"});
    let holds = |p: Predicate, n: i64| pgkv::query::eval::matches(&Filter::new(p), &schema, &doc(n)).unwrap();

    assert!(!holds(field("big").ge(1e-30), 0));
    assert!(holds(field("big").lt(1e-30), 0));
    assert!(holds(field("big").lt(1e29), i64::MAX));
    assert!(!holds(field("big").gt(1e300), i64::MAX));
    assert!(holds(field("big").gt(-1e300), i64::MIN));

    for f in [1e-30, 1e29, 1e300, -1e300] {
        let q = compile(&Filter::new(field("big").gt(f)), &schema).unwrap();
        assert_eq!(q.fragment, "(CAST((value ->> 'big') AS numeric) > $1::numeric)");
    }
}

/// Wildcard characters in a pattern constant are escaped by the engine.
#[test]
fn test_wildcards_match_literally() {
    let schema = schema();
    let filter = Filter::new(field("name").starts_with("%"));
    assert!(!pgkv::query::eval::matches(&filter, &schema, &document("Alice")).unwrap());
    assert!(pgkv::query::eval::matches(&filter, &schema, &document("%Alice")).unwrap());

    let filter = Filter::new(field("name").ends_with("_"));
    assert!(!pgkv::query::eval::matches(&filter, &schema, &document("ab")).unwrap());
    assert!(pgkv::query::eval::matches(&filter, &schema, &document("a_")).unwrap());
}

// =============================================================================
// Shape Tests
// =============================================================================

/// Facade compilation starts after the partition placeholder.
#[test]
fn test_facade_numbering() {
    let filter = Filter::parse("x => x.age > 28 && x.status == \"Active\"").unwrap();
    let q = compile_from(&filter, &schema(), 2).unwrap();
    assert_eq!(
        q.fragment,
        "(((CAST((value ->> 'age') AS integer) > $2::integer)) AND \
         (((CASE (value ->> 'status') WHEN '0' THEN 'Active' WHEN '1' THEN 'Pending' WHEN '2' THEN 'Suspended' \
         ELSE (value ->> 'status') END) = $3::text)))"
    );
    assert_eq!(q.parameters[1].value, Value::from("Active"));
}

/// Double negation compiles to nested NOT over the boolean fragment.
#[test]
fn test_double_negation_is_structural() {
    let q = compile(&Filter::parse("x => !(x.active == false)").unwrap(), &schema()).unwrap();
    assert_eq!(
        q.fragment,
        "(NOT (((CASE (value ->> 'active') WHEN 'true' THEN TRUE WHEN 'false' THEN FALSE END) = $1::boolean)))"
    );
    assert_eq!(q.parameters[0].value, Value::Bool(false));
}

/// Numeric constants widen to the field's family and beyond when needed.
#[test]
fn test_numeric_widening() {
    let q = compile(&Filter::new(field("age").gt(5_000_000_000i64)), &schema()).unwrap();
    assert_eq!(q.fragment, "(CAST((value ->> 'age') AS bigint) > $1::bigint)");
    assert_eq!(q.parameters[0].sql_type, SqlType::BigInt);

    let q = compile(&Filter::new(field("age").lt(2.5)), &schema()).unwrap();
    assert_eq!(q.parameters[0].sql_type, SqlType::DoublePrecision);

    let q = compile(&Filter::new(field("score").ge(70)), &schema()).unwrap();
    assert_eq!(q.parameters[0].sql_type, SqlType::DoublePrecision);
    assert_eq!(q.parameters[0].value, Value::Float64(70.0));
}

/// Membership binds the element with the array's element type.
#[test]
fn test_membership_binds_element_type() {
    let q = compile(&Filter::parse("x => x.tags.Contains(\"vip\")").unwrap(), &schema()).unwrap();
    assert_eq!(q.fragment, "((value -> 'tags') @> jsonb_build_array($1::text))");
}

// =============================================================================
// Rejection Tests
// =============================================================================

/// Each unsupported construct is named in the error.
#[test]
fn test_rejections_name_the_construct() {
    let cases = [
        ("x => x.name.Trim() == \"a\"", "Trim"),
        ("x => x.nickname == \"a\"", "nickname"),
        ("x => x.address == \"Oslo\"", "address"),
        ("x => x.age.HasValue", "age.HasValue"),
        ("x => x.name.ToString() == \"a\"", "name.ToString"),
        ("x => x.status == 7", "enum constant 7"),
        ("x => x.status == \"Unknown\"", "enum constant"),
        ("x => x.age > null", "comparison '>'"),
        ("x => x.name.StartsWith(x.age)", "StartsWith"),
    ];

    for (text, construct) in cases {
        let err = Filter::parse(text)
            .and_then(|f| compile(&f, &schema()))
            .unwrap_err();
        match &err {
            QueryError::UnsupportedExpression { construct: c, reason } => {
                assert!(
                    c.contains(construct) || reason.contains(construct),
                    "{} -> {}",
                    text,
                    err
                );
            }
            other => panic!("{} -> unexpected {:?}", text, other),
        }
    }
}

/// A capture must be bound before compilation.
#[test]
fn test_unbound_capture() {
    let err = compile(&Filter::parse("x => x.age > @min").unwrap(), &schema()).unwrap_err();
    assert_eq!(err, QueryError::UnboundCapture("min".into()));
}
