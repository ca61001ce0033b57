//! In-memory backend
//!
//! Same observable semantics as the PostgreSQL backend, with filters run by
//! the reference evaluator. Used for tests and embedding.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};

use super::backend::{Backend, DocumentStream, Page, PreparedFilter, WriteMode};
use super::errors::{StoreError, StoreResult};
use super::record::{DocumentKey, DocumentRecord};
use crate::query::Evaluator;

type Records = BTreeMap<DocumentKey, DocumentRecord>;

/// Records keyed by `(partition, id)`, ordered so scans come out in id order
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: RwLock<Records>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full record including timestamps, expired or not
    pub fn record(&self, key: &DocumentKey) -> StoreResult<Option<DocumentRecord>> {
        Ok(self.read()?.get(key).cloned())
    }

    /// Number of stored records in all partitions, expired included
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.read()?.is_empty())
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Records>> {
        self.records
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write_lock(&self) -> StoreResult<RwLockWriteGuard<'_, Records>> {
        self.records
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    /// Live records of one partition matching the filter, in id order
    fn matching(
        &self,
        partition: &str,
        filter: Option<PreparedFilter<'_>>,
    ) -> StoreResult<Vec<(DocumentKey, serde_json::Value)>> {
        let evaluator = filter
            .map(|f| Evaluator::new(f.filter, f.schema))
            .transpose()?;
        let now = Utc::now();
        let records = self.read()?;

        Ok(partition_range(&records, partition)
            .filter(|(_, r)| !r.is_expired(now))
            .filter(|(_, r)| evaluator.as_ref().map_or(true, |e| e.matches(&r.value)))
            .map(|(k, r)| (k.clone(), r.value.clone()))
            .collect())
    }
}

fn partition_range<'r>(
    records: &'r Records,
    partition: &'r str,
) -> impl Iterator<Item = (&'r DocumentKey, &'r DocumentRecord)> + 'r {
    records
        .range(
            DocumentKey {
                partition: partition.to_string(),
                id: String::new(),
            }..,
        )
        .take_while(move |(k, _)| k.partition == partition)
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn write(
        &self,
        key: &DocumentKey,
        value: serde_json::Value,
        expires: Option<DateTime<Utc>>,
        mode: WriteMode,
    ) -> StoreResult<bool> {
        let now = Utc::now();
        let mut records = self.write_lock()?;
        let live = records.get(key).map(|r| !r.is_expired(now));

        match (mode, live) {
            (WriteMode::Create, Some(true)) | (WriteMode::Update, None | Some(false)) => Ok(false),
            (WriteMode::Create, _) => {
                records.insert(key.clone(), DocumentRecord::new(value, now, expires));
                Ok(true)
            }
            (WriteMode::Update, Some(true)) | (WriteMode::Upsert, Some(_)) => {
                if let Some(record) = records.get_mut(key) {
                    record.replace(value, now, expires);
                }
                Ok(true)
            }
            (WriteMode::Upsert, None) => {
                records.insert(key.clone(), DocumentRecord::new(value, now, expires));
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &DocumentKey) -> StoreResult<bool> {
        Ok(self.write_lock()?.remove(key).is_some())
    }

    async fn delete_matching(&self, partition: &str, filter: Option<PreparedFilter<'_>>) -> StoreResult<u64> {
        let evaluator = filter
            .map(|f| Evaluator::new(f.filter, f.schema))
            .transpose()?;
        let mut records = self.write_lock()?;
        let before = records.len();
        records.retain(|k, r| {
            k.partition != partition || evaluator.as_ref().map_or(false, |e| !e.matches(&r.value))
        });
        Ok((before - records.len()) as u64)
    }

    async fn delete_expired(&self, partition: &str) -> StoreResult<u64> {
        let now = Utc::now();
        let mut records = self.write_lock()?;
        let before = records.len();
        records.retain(|k, r| k.partition != partition || !r.is_expired(now));
        Ok((before - records.len()) as u64)
    }

    async fn fetch(&self, key: &DocumentKey) -> StoreResult<Option<serde_json::Value>> {
        let now = Utc::now();
        Ok(self
            .read()?
            .get(key)
            .filter(|r| !r.is_expired(now))
            .map(|r| r.value.clone()))
    }

    async fn exists(&self, key: &DocumentKey) -> StoreResult<bool> {
        let now = Utc::now();
        Ok(self.read()?.get(key).map_or(false, |r| !r.is_expired(now)))
    }

    async fn count(&self, partition: &str, filter: Option<PreparedFilter<'_>>) -> StoreResult<u64> {
        Ok(self.matching(partition, filter)?.len() as u64)
    }

    fn scan<'a>(&'a self, partition: &str, filter: Option<PreparedFilter<'_>>, page: Page) -> DocumentStream<'a> {
        let values: StoreResult<Vec<serde_json::Value>> = self.matching(partition, filter).map(|rows| {
            let offset = page.offset.map_or(0, |o| usize::try_from(o).unwrap_or(usize::MAX));
            let limit = page.limit.map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
            rows.into_iter()
                .skip(offset)
                .take(limit)
                .map(|(_, v)| v)
                .collect()
        });

        match values {
            Ok(values) => stream::iter(values.into_iter().map(Ok)).boxed(),
            Err(e) => stream::once(async move { Err(e) }).boxed(),
        }
    }
}
