//! Store events
//!
//! Every `tracing` event emitted at the facade boundary carries one of these
//! as its `event` field so log consumers can match on a stable name.

use std::fmt;

/// Observable events in pgkv
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// Configuration loaded
    ConfigLoaded,
    /// Bootstrap DDL applied
    SchemaBootstrapped,

    // Predicates
    /// Predicate compiled to a fragment
    PredicateCompiled,
    /// Predicate rejected before any round trip
    PredicateRejected,

    // Writes
    /// Document created, updated or upserted
    DocumentWritten,
    /// Create hit a live key, or update missed one
    WriteConflict,

    // Deletes
    /// Single document removed
    DocumentRemoved,
    /// Matching documents removed from a partition
    PartitionCleared,
    /// Expired documents removed from a partition
    ExpiredSwept,

    // Reads
    /// Document fetched by key
    DocumentRead,
    /// Partition listed or counted
    PartitionScanned,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::SchemaBootstrapped => "SCHEMA_BOOTSTRAPPED",

            Event::PredicateCompiled => "PREDICATE_COMPILED",
            Event::PredicateRejected => "PREDICATE_REJECTED",

            Event::DocumentWritten => "DOCUMENT_WRITTEN",
            Event::WriteConflict => "WRITE_CONFLICT",

            Event::DocumentRemoved => "DOCUMENT_REMOVED",
            Event::PartitionCleared => "PARTITION_CLEARED",
            Event::ExpiredSwept => "EXPIRED_SWEPT",

            Event::DocumentRead => "DOCUMENT_READ",
            Event::PartitionScanned => "PARTITION_SCANNED",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
