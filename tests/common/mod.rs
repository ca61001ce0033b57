//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::collections::BTreeMap;

use pgkv::schema::{Document, DocumentSchema, FieldDef, FieldType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Status {
    Active,
    Pending,
    Suspended,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub city: String,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub name: String,
    pub display_name: Option<String>,
    pub age: i32,
    pub status: Status,
    pub active: bool,
    pub score: f64,
    pub tags: Vec<String>,
    pub address: Address,
}

impl Document for Person {
    fn schema() -> DocumentSchema {
        let mut location = BTreeMap::new();
        location.insert("country".to_string(), FieldDef::required_string());
        let mut address = BTreeMap::new();
        address.insert("city".to_string(), FieldDef::required_string());
        address.insert("location".to_string(), FieldDef::required_object(location));

        DocumentSchema::builder("Person")
            .field("name", FieldDef::required_string())
            .field("displayName", FieldDef::optional_string())
            .field("age", FieldDef::required_int())
            .field(
                "status",
                FieldDef::required(FieldType::enumeration(
                    "Status",
                    [("Active", 0), ("Pending", 1), ("Suspended", 2)],
                )),
            )
            .field("active", FieldDef::required_bool())
            .field("score", FieldDef::required_float())
            .field("tags", FieldDef::required_array(FieldType::String))
            .field("address", FieldDef::required_object(address))
    }
}

#[allow(clippy::too_many_arguments)]
pub fn person(
    name: &str,
    display_name: Option<&str>,
    age: i32,
    status: Status,
    active: bool,
    score: f64,
    tags: &[&str],
    city: &str,
    country: &str,
) -> Person {
    Person {
        name: name.to_string(),
        display_name: display_name.map(str::to_string),
        age,
        status,
        active,
        score,
        tags: tags.iter().map(|t| t.to_string()).collect(),
        address: Address {
            city: city.to_string(),
            location: Location {
                country: country.to_string(),
            },
        },
    }
}

/// Fixture population covering every operator's edge cases
pub fn people() -> Vec<(&'static str, Person)> {
    vec![
        (
            "p01",
            person("Alice", Some("Ally"), 30, Status::Active, true, 88.5, &["vip", "beta"], "Oslo", "NO"),
        ),
        (
            "p02",
            person("bob", None, 25, Status::Pending, false, 61.0, &["reg"], "Bergen", "NO"),
        ),
        (
            "p03",
            person("Carol", Some("   "), 41, Status::Suspended, true, 92.25, &[], "Lyon", "FR"),
        ),
        (
            "p04",
            person("dave_o'neil", Some(""), 19, Status::Active, false, 45.75, &["vip"], "Paris", "FR"),
        ),
        (
            "p05",
            person("Eve 50%", Some("Evie"), 28, Status::Pending, true, 70.0, &["reg", "beta"], "Oslo", "NO"),
        ),
        (
            "p06",
            person("ALINA", Some("al"), 35, Status::Active, true, 99.9, &["VIP"], "Kyiv", "UA"),
        ),
    ]
}

/// Predicate text paired with the expected outcome per document.
///
/// Oracles follow SQL three-valued logic: a comparison on a null field is
/// unknown, and so is its negation.
pub fn filter_cases() -> Vec<(&'static str, fn(&Person) -> bool)> {
    vec![
        ("x => x.age > 28", |p| p.age > 28),
        ("x => x.age <= 28", |p| p.age <= 28),
        ("x => x.name == \"bob\"", |p| p.name == "bob"),
        ("x => x.name != \"bob\"", |p| p.name != "bob"),
        ("x => x.name >= \"a\"", |p| p.name.as_str() >= "a"),
        ("x => x.status == \"Active\"", |p| p.status == Status::Active),
        ("x => x.status != \"Active\"", |p| p.status != Status::Active),
        ("x => x.status > \"Pending\"", |p| p.status > Status::Pending),
        ("x => x.status <= 1", |p| p.status <= Status::Pending),
        ("x => x.status.ToString() == \"Pending\"", |p| p.status == Status::Pending),
        ("x => x.active", |p| p.active),
        ("x => !x.active", |p| !p.active),
        ("x => x.active == false", |p| !p.active),
        ("x => !(x.active == false)", |p| p.active),
        ("x => x.score >= 70.0", |p| p.score >= 70.0),
        ("x => x.score < 62", |p| p.score < 62.0),
        ("x => x.name.StartsWith(\"Al\")", |p| p.name.starts_with("Al")),
        ("x => x.name.EndsWith(\"50%\")", |p| p.name.ends_with("50%")),
        ("x => x.name.Contains(\"_o'\")", |p| p.name.contains("_o'")),
        ("x => x.name.Contains(\"%\")", |p| p.name.contains('%')),
        ("x => x.name.Contains(\"_\")", |p| p.name.contains('_')),
        ("x => x.name.ContainsIgnoreCase(\"AL\")", |p| {
            p.name.to_lowercase().contains("al")
        }),
        ("x => x.name.ToLower() == \"alina\"", |p| p.name.to_lowercase() == "alina"),
        ("x => x.name.ToUpper().StartsWith(\"BO\")", |p| {
            p.name.to_uppercase().starts_with("BO")
        }),
        ("x => x.name.Equals(\"Carol\")", |p| p.name == "Carol"),
        ("x => string.Equals(x.name, \"Carol\")", |p| p.name == "Carol"),
        ("x => string.IsNullOrWhiteSpace(x.displayName)", |p| {
            p.display_name.as_deref().map_or(true, |d| d.trim().is_empty())
        }),
        ("x => !string.IsNullOrWhiteSpace(x.displayName)", |p| {
            p.display_name.as_deref().map_or(false, |d| !d.trim().is_empty())
        }),
        ("x => x.displayName.HasValue", |p| p.display_name.is_some()),
        ("x => x.displayName == null", |p| p.display_name.is_none()),
        ("x => x.displayName.StartsWith(\"A\")", |p| {
            p.display_name.as_deref().map_or(false, |d| d.starts_with('A'))
        }),
        ("x => !x.displayName.StartsWith(\"A\")", |p| {
            p.display_name.as_deref().map_or(false, |d| !d.starts_with('A'))
        }),
        ("x => x.tags.Contains(\"vip\")", |p| p.tags.iter().any(|t| t == "vip")),
        ("x => !x.tags.Contains(\"reg\")", |p| !p.tags.iter().any(|t| t == "reg")),
        ("x => x.address.location.country == \"NO\"", |p| p.address.location.country == "NO"),
        ("x => x.address.city == \"Oslo\" && x.age > 29 || x.status == \"Suspended\"", |p| {
            (p.address.city == "Oslo" && p.age > 29) || p.status == Status::Suspended
        }),
        ("x => x.address.city == \"Oslo\" && (x.age > 29 || x.status == \"Pending\")", |p| {
            p.address.city == "Oslo" && (p.age > 29 || p.status == Status::Pending)
        }),
        ("x => !(x.age > 20 && x.active)", |p| !(p.age > 20 && p.active)),
    ]
}
