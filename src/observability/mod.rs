//! Observability for the document store
//!
//! Logging goes through `tracing`; the binary installs the subscriber.
//! This module holds the stable event names and the per-store counters.

mod events;
mod metrics;

pub use events::Event;
pub use metrics::{MetricsRegistry, MetricsSnapshot};
