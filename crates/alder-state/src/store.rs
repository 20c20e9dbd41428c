//! The state store implementation

use crate::{diff_snapshots, StateDiff, StateError, StateResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;
use tracing::debug;

/// A single versioned entry.
///
/// Versions start at 1 on creation and increment by exactly one per
/// successful update.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub version: u64,
}

/// An immutable point-in-time copy of every entry in the store.
///
/// Keys are held in a `BTreeMap` so serialization is deterministic —
/// two snapshots of identical state serialize byte-for-byte equal.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub entries: BTreeMap<String, StateEntry>,
}

impl StateSnapshot {
    pub fn entry(&self, key: &str) -> Option<&StateEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Versioned key/value store with optimistic locking.
pub struct StateStore {
    entries: RwLock<BTreeMap<String, StateEntry>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Create a new entry at version 1.
    pub fn create(&self, key: impl Into<String>, value: serde_json::Value) -> StateResult<StateEntry> {
        let key = key.into();
        let mut entries = self.entries.write().map_err(|_| StateError::LockPoisoned)?;
        if entries.contains_key(&key) {
            return Err(StateError::AlreadyExists(key));
        }
        let entry = StateEntry {
            key: key.clone(),
            value,
            version: 1,
        };
        entries.insert(key, entry.clone());
        Ok(entry)
    }

    /// Read an entry with its current version.
    pub fn read(&self, key: &str) -> StateResult<StateEntry> {
        let entries = self.entries.read().map_err(|_| StateError::LockPoisoned)?;
        entries
            .get(key)
            .cloned()
            .ok_or_else(|| StateError::NotFound(key.to_string()))
    }

    /// Update an entry, presenting the version that was read.
    ///
    /// Single-writer-wins-or-conflicts: a stale `expected_version` fails
    /// with `Conflict` and leaves the stored value untouched. The caller
    /// must reload and retry the logical operation, never blindly
    /// overwrite.
    pub fn update(
        &self,
        key: &str,
        value: serde_json::Value,
        expected_version: u64,
    ) -> StateResult<StateEntry> {
        let mut entries = self.entries.write().map_err(|_| StateError::LockPoisoned)?;
        let entry = entries
            .get_mut(key)
            .ok_or_else(|| StateError::NotFound(key.to_string()))?;
        if entry.version != expected_version {
            return Err(StateError::Conflict {
                key: key.to_string(),
                expected: expected_version,
                actual: entry.version,
            });
        }
        entry.value = value;
        entry.version += 1;
        Ok(entry.clone())
    }

    /// Point-in-time copy of all entries.
    pub fn snapshot(&self) -> StateResult<StateSnapshot> {
        let entries = self.entries.read().map_err(|_| StateError::LockPoisoned)?;
        Ok(StateSnapshot {
            entries: entries.clone(),
        })
    }

    /// Structured per-key differences between two snapshots.
    pub fn diff(before: &StateSnapshot, after: &StateSnapshot) -> StateDiff {
        diff_snapshots(before, after)
    }

    /// Atomically reconcile the store back to a snapshot.
    ///
    /// Keys created after the snapshot are deleted, divergent keys are
    /// reset to the recorded value *and version*, matching keys are left
    /// untouched. Reinstating versions keeps a post-restore `snapshot()`
    /// byte-identical to the original; any in-flight reader holding a
    /// newer version will conflict on its next update, which is the
    /// intended outcome of a rollback.
    ///
    /// Reserved for the rollback subsystem — ordinary mutation must go
    /// through `update`.
    pub fn restore(&self, target: &StateSnapshot) -> StateResult<StateDiff> {
        let mut entries = self.entries.write().map_err(|_| StateError::LockPoisoned)?;
        let before = StateSnapshot {
            entries: entries.clone(),
        };
        *entries = target.entries.clone();
        let diff = diff_snapshots(&before, target);
        debug!(
            created = diff.created.len(),
            updated = diff.updated.len(),
            deleted = diff.deleted.len(),
            "state store restored to snapshot"
        );
        Ok(diff)
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn create_then_read() {
        let store = StateStore::new();
        let entry = store.create("k", json!({"a": 1})).unwrap();
        assert_eq!(entry.version, 1);
        assert_eq!(store.read("k").unwrap().value, json!({"a": 1}));
    }

    #[test]
    fn create_existing_key_fails() {
        let store = StateStore::new();
        store.create("k", json!(1)).unwrap();
        assert!(matches!(
            store.create("k", json!(2)),
            Err(StateError::AlreadyExists(_))
        ));
    }

    #[test]
    fn read_missing_key_fails() {
        let store = StateStore::new();
        assert!(matches!(store.read("nope"), Err(StateError::NotFound(_))));
    }

    #[test]
    fn update_increments_version() {
        let store = StateStore::new();
        store.create("k", json!(1)).unwrap();
        let updated = store.update("k", json!(2), 1).unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(store.read("k").unwrap().value, json!(2));
    }

    #[test]
    fn stale_update_conflicts_and_does_not_mutate() {
        let store = StateStore::new();
        store.create("k", json!("original")).unwrap();
        store.update("k", json!("second"), 1).unwrap();

        let err = store.update("k", json!("stale write"), 1).unwrap_err();
        assert_eq!(
            err,
            StateError::Conflict {
                key: "k".to_string(),
                expected: 1,
                actual: 2,
            }
        );
        assert_eq!(store.read("k").unwrap().value, json!("second"));
        assert_eq!(store.read("k").unwrap().version, 2);
    }

    #[test]
    fn restore_reinstates_values_and_versions() {
        let store = StateStore::new();
        store.create("keep", json!("v1")).unwrap();
        let before = store.snapshot().unwrap();

        store.update("keep", json!("v2"), 1).unwrap();
        store.create("new-key", json!("created later")).unwrap();

        store.restore(&before).unwrap();
        let after = store.snapshot().unwrap();
        assert_eq!(before, after);
        assert!(matches!(store.read("new-key"), Err(StateError::NotFound(_))));
        assert_eq!(store.read("keep").unwrap().version, 1);
    }

    #[test]
    fn snapshot_is_immutable_copy() {
        let store = StateStore::new();
        store.create("k", json!(1)).unwrap();
        let snap = store.snapshot().unwrap();
        store.update("k", json!(2), 1).unwrap();
        assert_eq!(snap.entry("k").unwrap().value, json!(1));
    }

    proptest! {
        /// A stale version always conflicts and never mutates the value.
        #[test]
        fn stale_versions_never_mutate(
            updates in 1u64..20,
            stale in 0u64..19,
        ) {
            prop_assume!(stale != updates);
            let store = StateStore::new();
            store.create("k", json!(0)).unwrap();
            for i in 1..updates {
                store.update("k", json!(i), i).unwrap();
            }
            let current = store.read("k").unwrap();
            let result = store.update("k", json!("clobber"), stale);
            let is_conflict = matches!(result, Err(StateError::Conflict { .. }));
            prop_assert!(is_conflict);
            prop_assert_eq!(store.read("k").unwrap(), current);
        }
    }
}
