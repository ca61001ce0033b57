//! # Document Store
//!
//! Documents keyed by `(partition, id)` with optional expiry, stored as jsonb
//! in one PostgreSQL table or in memory. Filters are compiled by
//! [`crate::query`] and conjoined with the partition and expiry conditions.

mod backend;
mod blocking;
mod config;
mod errors;
mod facade;
mod memory;
mod postgres;
mod record;
pub mod sql;

pub use backend::{Backend, DocumentStream, Page, PreparedFilter, WriteMode};
pub use blocking::{BlockingDocumentStore, BlockingIter};
pub use config::{validate_identifier, StoreConfig, DATABASE_URL_ENV, FALLBACK_DATABASE_URL_ENV};
pub use errors::{StoreError, StoreResult};
pub use facade::DocumentStore;
pub use memory::MemoryBackend;
pub use postgres::PgBackend;
pub use record::{validate_partition, DocumentKey, DocumentRecord, DEFAULT_PARTITION, MAX_KEY_CHARS};
