//! Snapshot records and canonical content hashing

use alder_state::StateSnapshot;
use alder_types::{RiskTier, TaskId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Unique identifier for a snapshot
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotId(pub String);

impl SnapshotId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An immutable checkpoint of world state at a step boundary.
///
/// `verified` is set at creation time only — it is the caller's
/// attestation that execution up to this point passed validation, and
/// verified snapshots are the only valid rollback targets.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub workflow_id: WorkflowId,
    pub task_id: TaskId,
    /// Step label within the task, e.g. "init" or "post-commit"
    pub step_id: String,
    /// Point-in-time copy of all state entries
    pub world_state: StateSnapshot,
    /// Opaque references into an external memory store
    pub memory_pointers: Vec<String>,
    /// SHA-256 over the canonicalized state + pointer list
    pub content_hash: String,
    /// Same value as `content_hash`: a single-level hash stands in for
    /// a tree at this scope
    pub merkle_root: String,
    pub verified: bool,
    /// Default risk tier for rollback requests targeting this snapshot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_tier: Option<RiskTier>,
    pub created_at: DateTime<Utc>,
}

/// Compute the deterministic content hash of a snapshot's payload.
///
/// State entries serialize in key order (the snapshot is backed by a
/// `BTreeMap`) and memory pointers are sorted first, so the hash is
/// independent of insertion order.
pub fn content_hash(world_state: &StateSnapshot, memory_pointers: &[String]) -> String {
    let mut pointers: Vec<&String> = memory_pointers.iter().collect();
    pointers.sort();

    let state_json = serde_json::to_string(&world_state.entries).unwrap_or_default();
    let pointers_json = serde_json::to_string(&pointers).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(state_json.as_bytes());
    hasher.update(pointers_json.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alder_state::StateStore;
    use serde_json::json;

    #[test]
    fn hash_is_order_independent_for_pointers() {
        let store = StateStore::new();
        store.create("k", json!(1)).unwrap();
        let snap = store.snapshot().unwrap();

        let a = content_hash(&snap, &["mem-1".to_string(), "mem-2".to_string()]);
        let b = content_hash(&snap, &["mem-2".to_string(), "mem-1".to_string()]);
        assert_eq!(a, b);
    }

    #[test]
    fn hash_changes_with_state() {
        let store = StateStore::new();
        store.create("k", json!(1)).unwrap();
        let before = store.snapshot().unwrap();
        store.update("k", json!(2), 1).unwrap();
        let after = store.snapshot().unwrap();

        assert_ne!(content_hash(&before, &[]), content_hash(&after, &[]));
    }
}
