//! pgkv - partitioned JSON documents in PostgreSQL
//!
//! Documents are stored under `(partition, id)` keys with optional expiry and
//! filtered with typed predicates that compile to parameterized SQL.
//!
//! ```ignore
//! use pgkv::query::{field, Filter};
//! use pgkv::store::{DocumentStore, Page, StoreConfig};
//!
//! let store = DocumentStore::connect(&StoreConfig::from_env()?).await?;
//! store.create("tenant-1", "p1", &person, None).await?;
//!
//! let adults = Filter::new(field("age").ge(18));
//! let n = store.count::<Person>("tenant-1", Some(&adults)).await?;
//! ```

pub mod cli;
pub mod observability;
pub mod query;
pub mod schema;
pub mod store;
