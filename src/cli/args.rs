//! CLI argument definitions using clap
//!
//! Commands:
//! - pgkv init
//! - pgkv compile --schema <path> --filter <text>
//! - pgkv get|put|remove <id>
//! - pgkv list|count|purge [--schema <path> --filter <text>]
//! - pgkv sweep

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::store::WriteMode;

/// pgkv - partitioned JSON documents in PostgreSQL
#[derive(Parser, Debug)]
#[command(name = "pgkv")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file; the environment is used when omitted
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the schema, table and indexes
    Init,

    /// Compile a predicate and print the fragment and parameters
    Compile {
        #[command(flatten)]
        query: QueryArgs,

        /// First placeholder index
        #[arg(long, default_value_t = 1)]
        first: usize,
    },

    /// Print one document
    Get {
        id: String,
        #[arg(long)]
        partition: Option<String>,
    },

    /// Write one document
    Put {
        id: String,
        /// Document JSON; read from stdin when omitted
        #[arg(long)]
        value: Option<String>,
        #[arg(long, value_enum, default_value_t = ModeArg::Upsert)]
        mode: ModeArg,
        /// Expiry as an RFC 3339 timestamp
        #[arg(long)]
        expires: Option<String>,
        #[arg(long)]
        partition: Option<String>,
    },

    /// Remove one document
    Remove {
        id: String,
        #[arg(long)]
        partition: Option<String>,
    },

    /// List live documents in id order
    List {
        #[command(flatten)]
        query: QueryArgs,
        #[arg(long)]
        limit: Option<u64>,
        #[arg(long)]
        offset: Option<u64>,
        #[arg(long)]
        partition: Option<String>,
    },

    /// Count live documents
    Count {
        #[command(flatten)]
        query: QueryArgs,
        #[arg(long)]
        partition: Option<String>,
    },

    /// Remove every matching document, expired or not
    Purge {
        #[command(flatten)]
        query: QueryArgs,
        #[arg(long)]
        partition: Option<String>,
    },

    /// Remove expired documents
    Sweep {
        #[arg(long)]
        partition: Option<String>,
    },
}

/// Predicate options shared by filtering commands
#[derive(Args, Debug, Clone, Default)]
pub struct QueryArgs {
    /// Document schema JSON file
    #[arg(long)]
    pub schema: Option<PathBuf>,

    /// Predicate text, e.g. `x => x.age > 28`
    #[arg(long)]
    pub filter: Option<String>,

    /// Capture binding `name=<json>`; bare text is taken as a string
    #[arg(long = "bind", value_name = "NAME=VALUE")]
    pub binds: Vec<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    Create,
    Update,
    Upsert,
}

impl From<ModeArg> for WriteMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Create => WriteMode::Create,
            ModeArg::Update => WriteMode::Update,
            ModeArg::Upsert => WriteMode::Upsert,
        }
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
