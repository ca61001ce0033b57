//! Statement shapes for the PostgreSQL backend
//!
//! Every statement is fully parameterized. `$1` is always the partition id;
//! compiled filter fragments are numbered from `$2` (or after the id for
//! single-key statements) and page bounds follow the filter parameters.

use chrono::{DateTime, Utc};

use super::backend::Page;
use super::config::{validate_identifier, StoreConfig};
use super::errors::StoreResult;
use super::record::{DocumentKey, MAX_KEY_CHARS};
use crate::query::{BoundParameter, CompiledQuery, SqlType, Value, DOCUMENT_COLUMN};

/// First placeholder index available to a compiled filter
pub const FILTER_FIRST_INDEX: usize = 2;

/// Visibility condition for live records
pub const NOT_EXPIRED: &str = "(expires IS NULL OR now() < expires)";

/// Condition for records a sweep removes
pub const EXPIRED: &str = "(expires IS NOT NULL AND now() >= expires)";

/// A statement argument, in placeholder order
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Text(String),
    Json(serde_json::Value),
    Expires(Option<DateTime<Utc>>),
    BigInt(i64),
    /// Compiled filter parameter
    Bound(Value),
}

impl Arg {
    /// A compiled filter parameter. A float under a `numeric` cast travels as
    /// its decimal text so the server-side cast is exact.
    pub fn bound(param: &BoundParameter) -> Arg {
        match (&param.value, param.sql_type) {
            (Value::Float32(_) | Value::Float64(_), SqlType::Numeric) => param
                .value
                .numeric_text()
                .map_or_else(|| Arg::Bound(param.value.clone()), Arg::Text),
            (value, _) => Arg::Bound(value.clone()),
        }
    }
}

/// SQL text and its arguments
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<Arg>,
}

/// Validated, quoted collection table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    schema: String,
    name: String,
}

impl Table {
    pub fn new(schema: &str, name: &str) -> StoreResult<Self> {
        validate_identifier("schema_name", schema)?;
        validate_identifier("table name", name)?;
        Ok(Self {
            schema: schema.to_string(),
            name: name.to_string(),
        })
    }

    pub fn from_config(config: &StoreConfig) -> StoreResult<Self> {
        Self::new(&config.schema_name, &config.qualified_table_name())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `"schema"."table"`
    pub fn qualified(&self) -> String {
        format!("\"{}\".\"{}\"", self.schema, self.name)
    }

    /// Schema, table and index DDL, idempotent
    pub fn bootstrap(&self) -> Vec<String> {
        let table = self.qualified();
        vec![
            format!("CREATE SCHEMA IF NOT EXISTS \"{}\"", self.schema),
            format!(
                "CREATE TABLE IF NOT EXISTS {table} (\
                 partition_id text NOT NULL CHECK (char_length(partition_id) BETWEEN 1 AND {max}), \
                 id text NOT NULL CHECK (char_length(id) BETWEEN 1 AND {max}), \
                 {doc} jsonb NOT NULL, \
                 created timestamptz NOT NULL DEFAULT now(), \
                 updated timestamptz NULL, \
                 expires timestamptz NULL, \
                 PRIMARY KEY (partition_id, id))",
                table = table,
                max = MAX_KEY_CHARS,
                doc = DOCUMENT_COLUMN,
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS \"{}_created_idx\" ON {} (created)",
                self.name, table
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS \"{}_updated_idx\" ON {} (updated) WHERE updated IS NOT NULL",
                self.name, table
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS \"{}_expires_idx\" ON {} (expires) WHERE expires IS NOT NULL",
                self.name, table
            ),
        ]
    }

    // ==================
    // Writes
    // ==================

    /// Insert; an expired record under the same key is replaced
    pub fn create(&self, key: &DocumentKey, value: serde_json::Value, expires: Option<DateTime<Utc>>) -> Statement {
        Statement {
            sql: format!(
                "INSERT INTO {t} AS t (partition_id, id, {doc}, created, expires) VALUES ($1, $2, $3, now(), $4) \
                 ON CONFLICT (partition_id, id) DO UPDATE SET {doc} = EXCLUDED.{doc}, created = now(), \
                 updated = NULL, expires = EXCLUDED.expires \
                 WHERE t.expires IS NOT NULL AND now() >= t.expires",
                t = self.qualified(),
                doc = DOCUMENT_COLUMN,
            ),
            args: write_args(key, value, expires),
        }
    }

    /// Replace a live record
    pub fn update(&self, key: &DocumentKey, value: serde_json::Value, expires: Option<DateTime<Utc>>) -> Statement {
        Statement {
            sql: format!(
                "UPDATE {t} SET {doc} = $3, updated = now(), expires = $4 \
                 WHERE partition_id = $1 AND id = $2 AND {live}",
                t = self.qualified(),
                doc = DOCUMENT_COLUMN,
                live = NOT_EXPIRED,
            ),
            args: write_args(key, value, expires),
        }
    }

    /// Insert or replace, keeping `created`
    pub fn upsert(&self, key: &DocumentKey, value: serde_json::Value, expires: Option<DateTime<Utc>>) -> Statement {
        Statement {
            sql: format!(
                "INSERT INTO {t} (partition_id, id, {doc}, created, expires) VALUES ($1, $2, $3, now(), $4) \
                 ON CONFLICT (partition_id, id) DO UPDATE SET {doc} = EXCLUDED.{doc}, updated = now(), \
                 expires = EXCLUDED.expires",
                t = self.qualified(),
                doc = DOCUMENT_COLUMN,
            ),
            args: write_args(key, value, expires),
        }
    }

    pub fn delete(&self, key: &DocumentKey) -> Statement {
        Statement {
            sql: format!(
                "DELETE FROM {} WHERE partition_id = $1 AND id = $2",
                self.qualified()
            ),
            args: key_args(key),
        }
    }

    /// Delete every record in the partition matching the filter, expired or not
    pub fn delete_matching(&self, partition: &str, filter: Option<&CompiledQuery>) -> Statement {
        let mut sql = format!("DELETE FROM {} WHERE partition_id = $1", self.qualified());
        let mut args = vec![Arg::Text(partition.to_string())];
        push_filter(&mut sql, &mut args, filter);
        Statement { sql, args }
    }

    pub fn delete_expired(&self, partition: &str) -> Statement {
        Statement {
            sql: format!(
                "DELETE FROM {} WHERE partition_id = $1 AND {}",
                self.qualified(),
                EXPIRED
            ),
            args: vec![Arg::Text(partition.to_string())],
        }
    }

    // ==================
    // Reads
    // ==================

    pub fn get(&self, key: &DocumentKey) -> Statement {
        Statement {
            sql: format!(
                "SELECT {} FROM {} WHERE partition_id = $1 AND id = $2 AND {}",
                DOCUMENT_COLUMN,
                self.qualified(),
                NOT_EXPIRED
            ),
            args: key_args(key),
        }
    }

    pub fn exists(&self, key: &DocumentKey) -> Statement {
        Statement {
            sql: format!(
                "SELECT EXISTS (SELECT 1 FROM {} WHERE partition_id = $1 AND id = $2 AND {})",
                self.qualified(),
                NOT_EXPIRED
            ),
            args: key_args(key),
        }
    }

    pub fn count(&self, partition: &str, filter: Option<&CompiledQuery>) -> Statement {
        let mut sql = format!(
            "SELECT count(*) FROM {} WHERE partition_id = $1 AND {}",
            self.qualified(),
            NOT_EXPIRED
        );
        let mut args = vec![Arg::Text(partition.to_string())];
        push_filter(&mut sql, &mut args, filter);
        Statement { sql, args }
    }

    /// Live records in id order, optionally paged
    pub fn list(&self, partition: &str, filter: Option<&CompiledQuery>, page: Page) -> Statement {
        let mut sql = format!(
            "SELECT {} FROM {} WHERE partition_id = $1 AND {}",
            DOCUMENT_COLUMN,
            self.qualified(),
            NOT_EXPIRED
        );
        let mut args = vec![Arg::Text(partition.to_string())];
        push_filter(&mut sql, &mut args, filter);
        sql.push_str(" ORDER BY id");

        if let Some(limit) = page.limit {
            args.push(Arg::BigInt(clamp_i64(limit)));
            sql.push_str(&format!(" LIMIT ${}", args.len()));
        }
        if let Some(offset) = page.offset {
            args.push(Arg::BigInt(clamp_i64(offset)));
            sql.push_str(&format!(" OFFSET ${}", args.len()));
        }
        Statement { sql, args }
    }
}

fn key_args(key: &DocumentKey) -> Vec<Arg> {
    vec![Arg::Text(key.partition.clone()), Arg::Text(key.id.clone())]
}

fn write_args(key: &DocumentKey, value: serde_json::Value, expires: Option<DateTime<Utc>>) -> Vec<Arg> {
    let mut args = key_args(key);
    args.push(Arg::Json(value));
    args.push(Arg::Expires(expires));
    args
}

/// Append `AND (<fragment>)` and its parameters; the fragment must have been
/// compiled from [`FILTER_FIRST_INDEX`]
fn push_filter(sql: &mut String, args: &mut Vec<Arg>, filter: Option<&CompiledQuery>) {
    if let Some(compiled) = filter {
        sql.push_str(&format!(" AND ({})", compiled.fragment));
        args.extend(compiled.parameters.iter().map(Arg::bound));
    }
}

fn clamp_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}
