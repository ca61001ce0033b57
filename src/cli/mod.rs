//! CLI module for pgkv
//!
//! Provides command-line access to a document collection:
//! - init: Create schema, table and indexes
//! - compile: Show the SQL a predicate compiles to
//! - get / put / remove: Single-document operations
//! - list / count / purge: Partition operations with an optional predicate
//! - sweep: Remove expired documents

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command, ModeArg, QueryArgs};
pub use commands::{compile, execute, load_config, run, run_command};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_document, write_error, write_response};
