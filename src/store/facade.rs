//! # Document Store Facade
//!
//! Keyed CRUD, listing and counting over a [`Backend`]. Each operation
//! validates its key, compiles the filter (numbering placeholders from `$2`,
//! `$1` being the partition) and then makes exactly one backend call.
//! Reads never see expired records; `remove_all` deletes regardless of expiry
//! and `remove_all_expired` deletes only expired records.

use chrono::{DateTime, Utc};
use futures_util::stream::{BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::backend::{Backend, DocumentStream, Page, PreparedFilter, WriteMode};
use super::config::StoreConfig;
use super::errors::{StoreError, StoreResult};
use super::memory::MemoryBackend;
use super::postgres::PgBackend;
use super::record::{validate_partition, DocumentKey};
use super::sql::FILTER_FIRST_INDEX;
use crate::observability::{Event, MetricsRegistry, MetricsSnapshot};
use crate::query::{compile_from, CompiledQuery, Filter};
use crate::schema::{Document, DocumentSchema};

/// Asynchronous document store
#[derive(Debug)]
pub struct DocumentStore<B: Backend> {
    backend: B,
    metrics: MetricsRegistry,
}

impl DocumentStore<PgBackend> {
    /// Connect to PostgreSQL using `config`
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        Ok(Self::new(PgBackend::connect(config).await?))
    }
}

impl DocumentStore<MemoryBackend> {
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }
}

impl<B: Backend> DocumentStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            metrics: MetricsRegistry::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    // ==================
    // Writes
    // ==================

    /// Insert; false if a live record already holds the key
    pub async fn create<T: Serialize + ?Sized>(
        &self,
        partition: &str,
        id: &str,
        value: &T,
        expires: Option<DateTime<Utc>>,
    ) -> StoreResult<bool> {
        self.write(partition, id, value, expires, WriteMode::Create).await
    }

    /// Replace a live record; false if there is none
    pub async fn update<T: Serialize + ?Sized>(
        &self,
        partition: &str,
        id: &str,
        value: &T,
        expires: Option<DateTime<Utc>>,
    ) -> StoreResult<bool> {
        self.write(partition, id, value, expires, WriteMode::Update).await
    }

    /// Insert or replace, keeping the original `created`
    pub async fn upsert<T: Serialize + ?Sized>(
        &self,
        partition: &str,
        id: &str,
        value: &T,
        expires: Option<DateTime<Utc>>,
    ) -> StoreResult<bool> {
        self.write(partition, id, value, expires, WriteMode::Upsert).await
    }

    async fn write<T: Serialize + ?Sized>(
        &self,
        partition: &str,
        id: &str,
        value: &T,
        expires: Option<DateTime<Utc>>,
        mode: WriteMode,
    ) -> StoreResult<bool> {
        let key = DocumentKey::new(partition, id)?;
        let value = serde_json::to_value(value)?;
        let written = self.backend.write(&key, value, expires, mode).await?;

        if written {
            self.metrics.increment_documents_written();
            info!(event = Event::DocumentWritten.as_str(), mode = mode.as_str(), key = %key);
        } else {
            self.metrics.increment_write_conflicts();
            info!(event = Event::WriteConflict.as_str(), mode = mode.as_str(), key = %key);
        }
        Ok(written)
    }

    // ==================
    // Deletes
    // ==================

    /// Remove one record, expired or not; false if absent
    pub async fn remove(&self, partition: &str, id: &str) -> StoreResult<bool> {
        let key = DocumentKey::new(partition, id)?;
        let removed = self.backend.delete(&key).await?;
        if removed {
            self.metrics.add_documents_removed(1);
            info!(event = Event::DocumentRemoved.as_str(), key = %key);
        }
        Ok(removed)
    }

    /// Remove every record of the partition matching `filter`
    pub async fn remove_all<T: Document>(&self, partition: &str, filter: Option<&Filter>) -> StoreResult<u64> {
        self.remove_all_raw(partition, &T::schema(), filter).await
    }

    pub async fn remove_all_raw(
        &self,
        partition: &str,
        schema: &DocumentSchema,
        filter: Option<&Filter>,
    ) -> StoreResult<u64> {
        validate_partition(partition)?;
        let compiled = self.prepare(schema, filter)?;
        let removed = self
            .backend
            .delete_matching(partition, prepared(schema, filter, compiled.as_ref()))
            .await?;

        self.metrics.add_documents_removed(removed);
        info!(event = Event::PartitionCleared.as_str(), partition, removed);
        Ok(removed)
    }

    /// Remove expired records of the partition
    pub async fn remove_all_expired(&self, partition: &str) -> StoreResult<u64> {
        validate_partition(partition)?;
        let removed = self.backend.delete_expired(partition).await?;
        self.metrics.add_expired_removed(removed);
        info!(event = Event::ExpiredSwept.as_str(), partition, removed);
        Ok(removed)
    }

    // ==================
    // Reads
    // ==================

    pub async fn get<T: DeserializeOwned>(&self, partition: &str, id: &str) -> StoreResult<Option<T>> {
        self.get_raw(partition, id)
            .await?
            .map(|v| serde_json::from_value(v).map_err(StoreError::from))
            .transpose()
    }

    pub async fn get_raw(&self, partition: &str, id: &str) -> StoreResult<Option<serde_json::Value>> {
        let key = DocumentKey::new(partition, id)?;
        self.metrics.increment_reads();
        let value = self.backend.fetch(&key).await?;
        debug!(event = Event::DocumentRead.as_str(), key = %key, found = value.is_some());
        Ok(value)
    }

    pub async fn exists(&self, partition: &str, id: &str) -> StoreResult<bool> {
        let key = DocumentKey::new(partition, id)?;
        self.metrics.increment_reads();
        self.backend.exists(&key).await
    }

    /// Live records of the partition matching `filter`
    pub async fn count<T: Document>(&self, partition: &str, filter: Option<&Filter>) -> StoreResult<u64> {
        self.count_raw(partition, &T::schema(), filter).await
    }

    pub async fn count_raw(
        &self,
        partition: &str,
        schema: &DocumentSchema,
        filter: Option<&Filter>,
    ) -> StoreResult<u64> {
        validate_partition(partition)?;
        let compiled = self.prepare(schema, filter)?;
        self.metrics.increment_reads();
        let count = self
            .backend
            .count(partition, prepared(schema, filter, compiled.as_ref()))
            .await?;
        debug!(event = Event::PartitionScanned.as_str(), partition, count);
        Ok(count)
    }

    /// Lazy sequence of live records in id order
    ///
    /// Compile errors are returned here, before the stream is created.
    /// No query runs until the stream is first polled, so it may be built
    /// outside a runtime and driven by one later.
    pub fn list<'a, T>(
        &'a self,
        partition: &str,
        filter: Option<&Filter>,
        page: Page,
    ) -> StoreResult<BoxStream<'a, StoreResult<T>>>
    where
        T: Document + Send + 'a,
    {
        let stream = self.list_raw(partition, &T::schema(), filter, page)?;
        Ok(stream
            .map(|item| item.and_then(|v| serde_json::from_value(v).map_err(StoreError::from)))
            .boxed())
    }

    pub fn list_raw<'a>(
        &'a self,
        partition: &str,
        schema: &DocumentSchema,
        filter: Option<&Filter>,
        page: Page,
    ) -> StoreResult<DocumentStream<'a>> {
        validate_partition(partition)?;
        let compiled = self.prepare(schema, filter)?;
        self.metrics.increment_reads();
        debug!(
            event = Event::PartitionScanned.as_str(),
            partition,
            limit = ?page.limit,
            offset = ?page.offset
        );
        Ok(self
            .backend
            .scan(partition, prepared(schema, filter, compiled.as_ref()), page))
    }

    /// Compile `filter` for the backend; no filter means no extra condition
    fn prepare(&self, schema: &DocumentSchema, filter: Option<&Filter>) -> StoreResult<Option<CompiledQuery>> {
        let Some(filter) = filter else {
            return Ok(None);
        };

        match compile_from(filter, schema, FILTER_FIRST_INDEX) {
            Ok(compiled) => {
                self.metrics.increment_predicates_compiled();
                debug!(
                    event = Event::PredicateCompiled.as_str(),
                    document = %schema.name,
                    fragment = %compiled.fragment,
                    parameters = compiled.parameters.len()
                );
                Ok(Some(compiled))
            }
            Err(e) => {
                self.metrics.increment_predicates_rejected();
                warn!(
                    event = Event::PredicateRejected.as_str(),
                    document = %schema.name,
                    construct = e.construct().unwrap_or(""),
                    error = %e
                );
                Err(e.into())
            }
        }
    }
}

fn prepared<'a>(
    schema: &'a DocumentSchema,
    filter: Option<&'a Filter>,
    compiled: Option<&'a CompiledQuery>,
) -> Option<PreparedFilter<'a>> {
    filter
        .zip(compiled)
        .map(|(filter, compiled)| PreparedFilter { schema, filter, compiled })
}
