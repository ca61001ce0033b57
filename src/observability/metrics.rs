//! Metrics registry
//!
//! Counters only, monotonic, reset when the owning store is dropped.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters of one document store
///
/// All counters use `Relaxed` ordering; a snapshot is not a consistent cut.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    predicates_compiled: AtomicU64,
    predicates_rejected: AtomicU64,
    documents_written: AtomicU64,
    write_conflicts: AtomicU64,
    documents_removed: AtomicU64,
    expired_removed: AtomicU64,
    reads: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_predicates_compiled(&self) {
        self.predicates_compiled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_predicates_rejected(&self) {
        self.predicates_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_documents_written(&self) {
        self.documents_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_write_conflicts(&self) {
        self.write_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    /// Add removed documents (single removes and partition clears)
    pub fn add_documents_removed(&self, count: u64) {
        self.documents_removed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_expired_removed(&self, count: u64) {
        self.expired_removed.fetch_add(count, Ordering::Relaxed);
    }

    /// Get, exists, count and list calls
    pub fn increment_reads(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            predicates_compiled: self.predicates_compiled.load(Ordering::Relaxed),
            predicates_rejected: self.predicates_rejected.load(Ordering::Relaxed),
            documents_written: self.documents_written.load(Ordering::Relaxed),
            write_conflicts: self.write_conflicts.load(Ordering::Relaxed),
            documents_removed: self.documents_removed.load(Ordering::Relaxed),
            expired_removed: self.expired_removed.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub predicates_compiled: u64,
    pub predicates_rejected: u64,
    pub documents_written: u64,
    pub write_conflicts: u64,
    pub documents_removed: u64,
    pub expired_removed: u64,
    pub reads: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_has_zero_values() {
        assert_eq!(MetricsRegistry::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_increment_counters() {
        let registry = MetricsRegistry::new();

        registry.increment_predicates_compiled();
        registry.increment_predicates_compiled();
        registry.increment_predicates_rejected();
        registry.increment_documents_written();
        registry.increment_write_conflicts();
        registry.add_documents_removed(3);
        registry.add_expired_removed(2);
        registry.increment_reads();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.predicates_compiled, 2);
        assert_eq!(snapshot.predicates_rejected, 1);
        assert_eq!(snapshot.documents_written, 1);
        assert_eq!(snapshot.write_conflicts, 1);
        assert_eq!(snapshot.documents_removed, 3);
        assert_eq!(snapshot.expired_removed, 2);
        assert_eq!(snapshot.reads, 1);
    }

    #[test]
    fn test_snapshot_serializes() {
        let registry = MetricsRegistry::new();
        registry.add_expired_removed(7);

        let json = serde_json::to_value(registry.snapshot()).unwrap();
        assert_eq!(json["expired_removed"], 7);
        assert_eq!(json["reads"], 0);
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(MetricsRegistry::new());
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let reg = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..100 {
                        reg.increment_reads();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.snapshot().reads, 1000);
    }
}
