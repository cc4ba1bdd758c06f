//! Typed versioned store
//!
//! Keyed record access with an explicit optimistic-concurrency token.
//! Every persisted record carries a `revision`; mutations are conditional
//! writes on that revision and a failed condition surfaces as a retryable
//! `CONFLICT`, never as a silent lost update.

use crate::error::{CbamError, Result};
use std::collections::HashMap;
use std::sync::Mutex;

/// A record that can live in a [`Repository`].
pub trait VersionedRecord: Clone + Send + Sync + 'static {
    /// Entity type tag used in errors and audit entries.
    const ENTITY: &'static str;

    fn id(&self) -> &str;
    fn revision(&self) -> u64;
    fn set_revision(&mut self, revision: u64);
}

/// Keyed CRUD over one entity type with compare-and-swap updates.
pub trait Repository<T: VersionedRecord>: Send + Sync {
    /// Direct keyed read. `NOTFOUND` if absent.
    fn get(&self, id: &str) -> Result<T>;

    fn try_get(&self, id: &str) -> Option<T>;

    fn list(&self) -> Vec<T>;

    /// Insert a new record at revision 1. Fails if the id is taken.
    fn insert(&self, record: T) -> Result<T>;

    /// Conditional write: succeeds only while the stored revision still
    /// equals `expected_revision`, then bumps it.
    fn update(&self, expected_revision: u64, record: T) -> Result<T>;

    /// Conditional delete on the same revision token.
    fn delete(&self, id: &str, expected_revision: u64) -> Result<()>;
}

/// In-memory ledger backend. Stands in for the durable keyed store in
/// tests and single-process deployments.
pub struct MemoryLedger<T> {
    rows: Mutex<HashMap<String, T>>,
}

impl<T> MemoryLedger<T> {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> Default for MemoryLedger<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: VersionedRecord> Repository<T> for MemoryLedger<T> {
    fn get(&self, id: &str) -> Result<T> {
        self.try_get(id)
            .ok_or_else(|| CbamError::not_found(T::ENTITY, id))
    }

    fn try_get(&self, id: &str) -> Option<T> {
        self.rows.lock().unwrap().get(id).cloned()
    }

    fn list(&self) -> Vec<T> {
        self.rows.lock().unwrap().values().cloned().collect()
    }

    fn insert(&self, mut record: T) -> Result<T> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(existing) = rows.get(record.id()) {
            return Err(CbamError::Conflict {
                entity: T::ENTITY,
                id: record.id().to_string(),
                expected: 0,
                found: existing.revision(),
            });
        }
        record.set_revision(1);
        rows.insert(record.id().to_string(), record.clone());
        Ok(record)
    }

    fn update(&self, expected_revision: u64, mut record: T) -> Result<T> {
        let mut rows = self.rows.lock().unwrap();
        let current = rows
            .get(record.id())
            .ok_or_else(|| CbamError::not_found(T::ENTITY, record.id()))?;
        if current.revision() != expected_revision {
            return Err(CbamError::Conflict {
                entity: T::ENTITY,
                id: record.id().to_string(),
                expected: expected_revision,
                found: current.revision(),
            });
        }
        record.set_revision(expected_revision + 1);
        rows.insert(record.id().to_string(), record.clone());
        Ok(record)
    }

    fn delete(&self, id: &str, expected_revision: u64) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let current = rows
            .get(id)
            .ok_or_else(|| CbamError::not_found(T::ENTITY, id))?;
        if current.revision() != expected_revision {
            return Err(CbamError::Conflict {
                entity: T::ENTITY,
                id: id.to_string(),
                expected: expected_revision,
                found: current.revision(),
            });
        }
        rows.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: String,
        value: u32,
        revision: u64,
    }

    impl VersionedRecord for Row {
        const ENTITY: &'static str = "row";

        fn id(&self) -> &str {
            &self.id
        }
        fn revision(&self) -> u64 {
            self.revision
        }
        fn set_revision(&mut self, revision: u64) {
            self.revision = revision;
        }
    }

    fn row(id: &str, value: u32) -> Row {
        Row {
            id: id.to_string(),
            value,
            revision: 0,
        }
    }

    #[test]
    fn test_insert_sets_revision_one() {
        let store = MemoryLedger::new();
        let stored = store.insert(row("a", 1)).unwrap();
        assert_eq!(stored.revision, 1);
    }

    #[test]
    fn test_double_insert_conflicts() {
        let store = MemoryLedger::new();
        store.insert(row("a", 1)).unwrap();
        let err = store.insert(row("a", 2)).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_cas_update() {
        let store = MemoryLedger::new();
        let mut stored = store.insert(row("a", 1)).unwrap();
        stored.value = 2;
        let updated = store.update(1, stored.clone()).unwrap();
        assert_eq!(updated.revision, 2);

        // Stale token loses.
        stored.value = 3;
        let err = store.update(1, stored).unwrap_err();
        match err {
            CbamError::Conflict {
                expected, found, ..
            } => {
                assert_eq!(expected, 1);
                assert_eq!(found, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_get_missing() {
        let store: MemoryLedger<Row> = MemoryLedger::new();
        assert!(matches!(
            store.get("nope"),
            Err(CbamError::NotFound { .. })
        ));
    }

    #[test]
    fn test_delete_requires_current_revision() {
        let store = MemoryLedger::new();
        store.insert(row("a", 1)).unwrap();
        assert!(store.delete("a", 99).is_err());
        store.delete("a", 1).unwrap();
        assert!(store.try_get("a").is_none());
    }
}
