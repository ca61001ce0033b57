//! # Backing Store Trait
//!
//! The facade validates keys and compiles filters, then issues exactly one
//! call on a backend per operation.

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;

use super::errors::StoreResult;
use super::record::DocumentKey;
use crate::query::{CompiledQuery, Filter};
use crate::schema::DocumentSchema;

/// How a write treats an existing key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fails on a live record
    Create,
    /// Fails when no live record exists
    Update,
    /// Always succeeds
    Upsert,
}

impl WriteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::Create => "create",
            WriteMode::Update => "update",
            WriteMode::Upsert => "upsert",
        }
    }
}

/// `LIMIT` / `OFFSET` bounds for listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Page {
    pub fn new(limit: Option<u64>, offset: Option<u64>) -> Self {
        Self { limit, offset }
    }
}

/// A filter already compiled for the SQL backend, with its source kept for
/// in-process evaluation
#[derive(Debug, Clone, Copy)]
pub struct PreparedFilter<'a> {
    pub schema: &'a DocumentSchema,
    pub filter: &'a Filter,
    /// Compiled from `$2`; `$1` is the partition
    pub compiled: &'a CompiledQuery,
}

/// Lazy sequence of documents
pub type DocumentStream<'a> = BoxStream<'a, StoreResult<serde_json::Value>>;

/// Backing store for the document facade
#[async_trait]
pub trait Backend: Send + Sync + Debug {
    /// Write under `mode`; false on key conflict (Create) or missing key (Update)
    async fn write(
        &self,
        key: &DocumentKey,
        value: serde_json::Value,
        expires: Option<DateTime<Utc>>,
        mode: WriteMode,
    ) -> StoreResult<bool>;

    /// Delete one record; false if absent
    async fn delete(&self, key: &DocumentKey) -> StoreResult<bool>;

    /// Delete every record in the partition matching the filter, ignoring expiry
    async fn delete_matching(&self, partition: &str, filter: Option<PreparedFilter<'_>>) -> StoreResult<u64>;

    /// Delete expired records in the partition
    async fn delete_expired(&self, partition: &str) -> StoreResult<u64>;

    /// Live record value
    async fn fetch(&self, key: &DocumentKey) -> StoreResult<Option<serde_json::Value>>;

    async fn exists(&self, key: &DocumentKey) -> StoreResult<bool>;

    /// Live records in the partition matching the filter
    async fn count(&self, partition: &str, filter: Option<PreparedFilter<'_>>) -> StoreResult<u64>;

    /// Live records in id order
    fn scan<'a>(&'a self, partition: &str, filter: Option<PreparedFilter<'_>>, page: Page) -> DocumentStream<'a>;
}
