//! Blocking document store
//!
//! Wraps [`DocumentStore`] with a private current-thread runtime. Methods
//! compile and issue the same statements as the async store; they only
//! differ in how the round trip is awaited. Must not be called from inside
//! another tokio runtime.

use chrono::{DateTime, Utc};
use futures_util::stream::{BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::runtime::{Builder, Runtime};

use super::backend::{Backend, Page};
use super::config::StoreConfig;
use super::errors::StoreResult;
use super::facade::DocumentStore;
use super::memory::MemoryBackend;
use super::postgres::PgBackend;
use crate::observability::MetricsSnapshot;
use crate::query::Filter;
use crate::schema::{Document, DocumentSchema};

pub struct BlockingDocumentStore<B: Backend> {
    inner: DocumentStore<B>,
    runtime: Runtime,
}

fn runtime() -> StoreResult<Runtime> {
    Ok(Builder::new_current_thread().enable_all().build()?)
}

impl BlockingDocumentStore<PgBackend> {
    pub fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let runtime = runtime()?;
        let inner = runtime.block_on(DocumentStore::connect(config))?;
        Ok(Self { inner, runtime })
    }
}

impl BlockingDocumentStore<MemoryBackend> {
    pub fn in_memory() -> StoreResult<Self> {
        Self::new(MemoryBackend::new())
    }
}

impl<B: Backend> BlockingDocumentStore<B> {
    pub fn new(backend: B) -> StoreResult<Self> {
        Ok(Self {
            inner: DocumentStore::new(backend),
            runtime: runtime()?,
        })
    }

    /// The async store this one drives
    pub fn inner(&self) -> &DocumentStore<B> {
        &self.inner
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics()
    }

    pub fn create<T: Serialize + ?Sized>(
        &self,
        partition: &str,
        id: &str,
        value: &T,
        expires: Option<DateTime<Utc>>,
    ) -> StoreResult<bool> {
        self.runtime.block_on(self.inner.create(partition, id, value, expires))
    }

    pub fn update<T: Serialize + ?Sized>(
        &self,
        partition: &str,
        id: &str,
        value: &T,
        expires: Option<DateTime<Utc>>,
    ) -> StoreResult<bool> {
        self.runtime.block_on(self.inner.update(partition, id, value, expires))
    }

    pub fn upsert<T: Serialize + ?Sized>(
        &self,
        partition: &str,
        id: &str,
        value: &T,
        expires: Option<DateTime<Utc>>,
    ) -> StoreResult<bool> {
        self.runtime.block_on(self.inner.upsert(partition, id, value, expires))
    }

    pub fn remove(&self, partition: &str, id: &str) -> StoreResult<bool> {
        self.runtime.block_on(self.inner.remove(partition, id))
    }

    pub fn remove_all<T: Document>(&self, partition: &str, filter: Option<&Filter>) -> StoreResult<u64> {
        self.runtime.block_on(self.inner.remove_all::<T>(partition, filter))
    }

    pub fn remove_all_raw(
        &self,
        partition: &str,
        schema: &DocumentSchema,
        filter: Option<&Filter>,
    ) -> StoreResult<u64> {
        self.runtime
            .block_on(self.inner.remove_all_raw(partition, schema, filter))
    }

    pub fn remove_all_expired(&self, partition: &str) -> StoreResult<u64> {
        self.runtime.block_on(self.inner.remove_all_expired(partition))
    }

    pub fn get<T: DeserializeOwned>(&self, partition: &str, id: &str) -> StoreResult<Option<T>> {
        self.runtime.block_on(self.inner.get(partition, id))
    }

    pub fn get_raw(&self, partition: &str, id: &str) -> StoreResult<Option<serde_json::Value>> {
        self.runtime.block_on(self.inner.get_raw(partition, id))
    }

    pub fn exists(&self, partition: &str, id: &str) -> StoreResult<bool> {
        self.runtime.block_on(self.inner.exists(partition, id))
    }

    pub fn count<T: Document>(&self, partition: &str, filter: Option<&Filter>) -> StoreResult<u64> {
        self.runtime.block_on(self.inner.count::<T>(partition, filter))
    }

    pub fn count_raw(&self, partition: &str, schema: &DocumentSchema, filter: Option<&Filter>) -> StoreResult<u64> {
        self.runtime
            .block_on(self.inner.count_raw(partition, schema, filter))
    }

    pub fn list<'a, T>(&'a self, partition: &str, filter: Option<&Filter>, page: Page) -> StoreResult<BlockingIter<'a, T>>
    where
        T: Document + Send + 'a,
    {
        let stream = self.inner.list::<T>(partition, filter, page)?;
        Ok(BlockingIter::new(&self.runtime, stream))
    }

    pub fn list_raw<'a>(
        &'a self,
        partition: &str,
        schema: &DocumentSchema,
        filter: Option<&Filter>,
        page: Page,
    ) -> StoreResult<BlockingIter<'a, serde_json::Value>> {
        let stream = self.inner.list_raw(partition, schema, filter, page)?;
        Ok(BlockingIter::new(&self.runtime, stream))
    }
}

/// Iterator pulling one item of a document stream per `next`
pub struct BlockingIter<'a, T> {
    runtime: &'a Runtime,
    stream: BoxStream<'a, StoreResult<T>>,
}

impl<'a, T> BlockingIter<'a, T> {
    fn new(runtime: &'a Runtime, stream: BoxStream<'a, StoreResult<T>>) -> Self {
        Self { runtime, stream }
    }
}

impl<T> Iterator for BlockingIter<'_, T> {
    type Item = StoreResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.runtime.block_on(self.stream.next())
    }
}
