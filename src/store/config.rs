//! Store configuration
//!
//! Loaded from a JSON file or the environment. Unset fields take the defaults
//! below.

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::errors::{StoreError, StoreResult};
use super::record::DEFAULT_PARTITION;

/// Environment variable holding the connection string
pub const DATABASE_URL_ENV: &str = "PGKV_DATABASE_URL";

/// Fallback environment variable
pub const FALLBACK_DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Document store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// PostgreSQL connection string (required for the PostgreSQL backend)
    #[serde(default)]
    pub connection_string: String,

    /// Schema holding the collection table
    #[serde(default = "default_schema_name")]
    pub schema_name: String,

    /// Collection table name
    #[serde(default = "default_table_name")]
    pub table_name: String,

    /// Suffix for independent collections in one schema
    #[serde(default)]
    pub service_key: Option<String>,

    /// Partition used by the CLI when none is given
    #[serde(default = "default_partition")]
    pub default_partition: String,

    /// Pool size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Run the bootstrap DDL on connect
    #[serde(default = "default_bootstrap_schema")]
    pub bootstrap_schema: bool,
}

fn default_schema_name() -> String {
    "pgkeyvaluedb".to_string()
}

fn default_table_name() -> String {
    "pgkeyvaluedb".to_string()
}

fn default_partition() -> String {
    DEFAULT_PARTITION.to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_bootstrap_schema() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            connection_string: String::new(),
            schema_name: default_schema_name(),
            table_name: default_table_name(),
            service_key: None,
            default_partition: default_partition(),
            max_connections: default_max_connections(),
            bootstrap_schema: default_bootstrap_schema(),
        }
    }
}

impl StoreConfig {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            ..Self::default()
        }
    }

    /// Load from a JSON file and validate
    pub fn load(path: &Path) -> StoreResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| StoreError::config(format!("Failed to read config {}: {}", path.display(), e)))?;

        let mut config: StoreConfig = serde_json::from_str(&content)
            .map_err(|e| StoreError::config(format!("Invalid config JSON: {}", e)))?;

        if config.connection_string.is_empty() {
            if let Some(url) = env_database_url() {
                config.connection_string = url;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Defaults with the connection string from `PGKV_DATABASE_URL` or
    /// `DATABASE_URL`
    pub fn from_env() -> StoreResult<Self> {
        let url = env_database_url().ok_or_else(|| {
            StoreError::config(format!(
                "{} (or {}) is not set",
                DATABASE_URL_ENV, FALLBACK_DATABASE_URL_ENV
            ))
        })?;
        let config = Self::new(url);
        config.validate()?;
        Ok(config)
    }

    pub fn with_service_key(mut self, key: impl Into<String>) -> Self {
        self.service_key = Some(key.into());
        self
    }

    pub fn with_table(mut self, schema_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        self.schema_name = schema_name.into();
        self.table_name = table_name.into();
        self
    }

    /// Effective table name: `{table_name}` or `{table_name}_{service_key}`
    pub fn qualified_table_name(&self) -> String {
        match &self.service_key {
            Some(key) => format!("{}_{}", self.table_name, key),
            None => self.table_name.clone(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> StoreResult<()> {
        if self.connection_string.trim().is_empty() {
            return Err(StoreError::config("connection_string is required"));
        }
        self.validate_identifiers()?;
        if self.max_connections == 0 {
            return Err(StoreError::config("max_connections must be > 0"));
        }
        super::record::validate_partition(&self.default_partition)
            .map_err(|e| StoreError::config(format!("default_partition: {}", e)))?;
        Ok(())
    }

    /// Validate schema and table identifiers only
    pub fn validate_identifiers(&self) -> StoreResult<()> {
        validate_identifier("schema_name", &self.schema_name)?;
        validate_identifier("table name", &self.qualified_table_name())
    }
}

fn env_database_url() -> Option<String> {
    [DATABASE_URL_ENV, FALLBACK_DATABASE_URL_ENV]
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|v| !v.trim().is_empty())
}

fn identifier_pattern() -> StoreResult<&'static Regex> {
    static IDENTIFIER: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    IDENTIFIER
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$"))
        .as_ref()
        .map_err(|e| StoreError::config(format!("identifier pattern: {}", e)))
}

/// Unquoted PostgreSQL identifier, at most 63 bytes
pub fn validate_identifier(what: &str, ident: &str) -> StoreResult<()> {
    if identifier_pattern()?.is_match(ident) {
        Ok(())
    } else {
        Err(StoreError::config(format!(
            "Invalid {}: '{}'. Use letters, digits and '_' (max 63, not starting with a digit).",
            what, ident
        )))
    }
}
