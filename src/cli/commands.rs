//! CLI command implementations
//!
//! Each invocation loads the configuration, opens a blocking store, runs one
//! command and writes one JSON envelope. `compile` needs no database.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::info;

use crate::observability::Event;
use crate::query::{self, compile_from, Filter};
use crate::schema::DocumentSchema;
use crate::store::{Backend, BlockingDocumentStore, Page, StoreConfig, StoreResult, WriteMode};

use super::args::{Cli, Command, QueryArgs};
use super::errors::{CliError, CliResult};
use super::io::{read_document, write_error, write_response};

/// Parse arguments, run, and report failures as an error envelope
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    if let Err(e) = run_command(cli) {
        write_error(e.code_str(), e.message())?;
        return Err(e);
    }
    Ok(())
}

/// Run the appropriate command based on CLI args
pub fn run_command(cli: Cli) -> CliResult<()> {
    let Cli { config, command } = cli;

    if let Command::Compile { query, first } = &command {
        return write_response(compile(query, *first)?);
    }

    let mut config = load_config(config.as_deref())?;
    if matches!(command, Command::Init) {
        config.bootstrap_schema = true;
    }
    let store = BlockingDocumentStore::connect(&config)?;
    write_response(execute(&store, &config, command)?)
}

/// Load from `path`, or from the environment when no file is given
pub fn load_config(path: Option<&Path>) -> CliResult<StoreConfig> {
    let config = match path {
        Some(path) => StoreConfig::load(path)?,
        None => StoreConfig::from_env()?,
    };
    info!(
        event = Event::ConfigLoaded.as_str(),
        schema = %config.schema_name,
        table = %config.qualified_table_name()
    );
    Ok(config)
}

/// Run one command against an open store
pub fn execute<B: Backend>(store: &BlockingDocumentStore<B>, config: &StoreConfig, command: Command) -> CliResult<Value> {
    let partition = |p: Option<String>| p.unwrap_or_else(|| config.default_partition.clone());

    match command {
        Command::Init => Ok(json!({
            "schema": config.schema_name,
            "table": config.qualified_table_name(),
        })),

        Command::Compile { query, first } => compile(&query, first),

        Command::Get { id, partition: p } => Ok(store.get_raw(&partition(p), &id)?.unwrap_or(Value::Null)),

        Command::Put {
            id,
            value,
            mode,
            expires,
            partition: p,
        } => {
            let value = match value {
                Some(text) => serde_json::from_str(&text)?,
                None => read_document()?,
            };
            let expires = expires.as_deref().map(parse_expires).transpose()?;
            let p = partition(p);
            let written = match WriteMode::from(mode) {
                WriteMode::Create => store.create(&p, &id, &value, expires)?,
                WriteMode::Update => store.update(&p, &id, &value, expires)?,
                WriteMode::Upsert => store.upsert(&p, &id, &value, expires)?,
            };
            Ok(json!({ "written": written }))
        }

        Command::Remove { id, partition: p } => Ok(json!({ "removed": store.remove(&partition(p), &id)? })),

        Command::List {
            query,
            limit,
            offset,
            partition: p,
        } => {
            let (schema, filter) = query_parts(&query)?;
            let documents = store
                .list_raw(&partition(p), &schema, filter.as_ref(), Page::new(limit, offset))?
                .collect::<StoreResult<Vec<_>>>()?;
            Ok(Value::Array(documents))
        }

        Command::Count { query, partition: p } => {
            let (schema, filter) = query_parts(&query)?;
            Ok(json!({ "count": store.count_raw(&partition(p), &schema, filter.as_ref())? }))
        }

        Command::Purge { query, partition: p } => {
            let (schema, filter) = query_parts(&query)?;
            Ok(json!({ "removed": store.remove_all_raw(&partition(p), &schema, filter.as_ref())? }))
        }

        Command::Sweep { partition: p } => Ok(json!({ "removed": store.remove_all_expired(&partition(p))? })),
    }
}

/// Compile a predicate without touching the database
pub fn compile(query: &QueryArgs, first: usize) -> CliResult<Value> {
    let (schema, filter) = query_parts(query)?;
    let filter = filter.ok_or_else(|| CliError::invalid_argument("compile requires --filter"))?;
    let compiled = compile_from(&filter, &schema, first)?;

    let parameters: Vec<Value> = compiled
        .parameters
        .iter()
        .map(|p| {
            json!({
                "placeholder": p.placeholder(),
                "type": p.sql_type.name(),
                "value": p.value.to_json(),
            })
        })
        .collect();
    Ok(json!({ "fragment": compiled.fragment, "parameters": parameters }))
}

fn query_parts(query: &QueryArgs) -> CliResult<(DocumentSchema, Option<Filter>)> {
    let schema = match &query.schema {
        Some(path) => load_schema(path)?,
        None if query.filter.is_some() => {
            return Err(CliError::invalid_argument("--filter requires --schema"));
        }
        None => DocumentSchema::builder("document"),
    };

    let filter = match &query.filter {
        Some(text) => {
            let mut filter = Filter::parse(text)?;
            for bind in &query.binds {
                let (name, value) = parse_bind(bind)?;
                filter = filter.bind(name, value);
            }
            Some(filter)
        }
        None => None,
    };
    Ok((schema, filter))
}

fn load_schema(path: &Path) -> CliResult<DocumentSchema> {
    let content = fs::read_to_string(path)
        .map_err(|e| CliError::io_error(format!("Failed to read schema {}: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| CliError::invalid_argument(format!("Invalid schema JSON: {}", e)))
}

/// `name=<json>`, falling back to text when the value is not JSON
fn parse_bind(bind: &str) -> CliResult<(&str, query::Value)> {
    let (name, raw) = bind
        .split_once('=')
        .ok_or_else(|| CliError::invalid_argument(format!("Invalid --bind '{}': expected NAME=VALUE", bind)))?;
    let name = name.trim_start_matches('@');
    let value = match serde_json::from_str::<Value>(raw) {
        Ok(json) => query::Value::from_json(&json)?,
        Err(_) => query::Value::Text(raw.to_string()),
    };
    Ok((name, value))
}

fn parse_expires(text: &str) -> CliResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CliError::invalid_argument(format!("Invalid --expires '{}': {}", text, e)))
}
