//! The snapshot manager

use crate::{content_hash, Snapshot, SnapshotError, SnapshotId, SnapshotResult};
use alder_state::StateSnapshot;
use alder_types::{RiskTier, TaskId, WorkflowId};
use chrono::Utc;
use std::sync::RwLock;
use tracing::debug;

/// Stores snapshots in creation order. Snapshots are immutable once
/// created; the manager only ever appends and reads.
pub struct SnapshotManager {
    snapshots: RwLock<Vec<Snapshot>>,
}

impl SnapshotManager {
    pub fn new() -> Self {
        Self {
            snapshots: RwLock::new(Vec::new()),
        }
    }

    /// Create and store a snapshot of current world state.
    ///
    /// The content hash is computed here, deterministically, over the
    /// canonicalized state and sorted pointer list; it doubles as the
    /// merkle root (single-level hash, no tree).
    #[allow(clippy::too_many_arguments)]
    pub fn create_snapshot(
        &self,
        workflow_id: WorkflowId,
        task_id: TaskId,
        step_id: impl Into<String>,
        world_state: StateSnapshot,
        memory_pointers: Vec<String>,
        verified: bool,
        risk_tier: Option<RiskTier>,
    ) -> SnapshotResult<Snapshot> {
        let hash = content_hash(&world_state, &memory_pointers);
        let snapshot = Snapshot {
            id: SnapshotId::generate(),
            workflow_id,
            task_id,
            step_id: step_id.into(),
            world_state,
            memory_pointers,
            content_hash: hash.clone(),
            merkle_root: hash,
            verified,
            risk_tier,
            created_at: Utc::now(),
        };

        let mut snapshots = self
            .snapshots
            .write()
            .map_err(|_| SnapshotError::LockPoisoned)?;
        snapshots.push(snapshot.clone());
        debug!(
            snapshot_id = %snapshot.id,
            workflow_id = %snapshot.workflow_id,
            verified = snapshot.verified,
            "snapshot created"
        );
        Ok(snapshot)
    }

    pub fn get(&self, id: &SnapshotId) -> SnapshotResult<Snapshot> {
        let snapshots = self
            .snapshots
            .read()
            .map_err(|_| SnapshotError::LockPoisoned)?;
        snapshots
            .iter()
            .find(|s| &s.id == id)
            .cloned()
            .ok_or_else(|| SnapshotError::NotFound(id.to_string()))
    }

    /// Recompute the content hash and compare against the stored value.
    pub fn verify_snapshot(&self, id: &SnapshotId) -> SnapshotResult<bool> {
        let snapshot = self.get(id)?;
        let computed = content_hash(&snapshot.world_state, &snapshot.memory_pointers);
        Ok(computed == snapshot.content_hash)
    }

    /// All snapshots for a workflow, in creation order.
    pub fn list_for_workflow(&self, workflow_id: &WorkflowId) -> SnapshotResult<Vec<Snapshot>> {
        let snapshots = self
            .snapshots
            .read()
            .map_err(|_| SnapshotError::LockPoisoned)?;
        Ok(snapshots
            .iter()
            .filter(|s| &s.workflow_id == workflow_id)
            .cloned()
            .collect())
    }

    /// Newest snapshot with `verified == true` for the workflow.
    pub fn last_verified(&self, workflow_id: &WorkflowId) -> SnapshotResult<Snapshot> {
        let snapshots = self
            .snapshots
            .read()
            .map_err(|_| SnapshotError::LockPoisoned)?;
        snapshots
            .iter()
            .rev()
            .find(|s| &s.workflow_id == workflow_id && s.verified)
            .cloned()
            .ok_or_else(|| SnapshotError::NoVerifiedSnapshot(workflow_id.to_string()))
    }
}

impl Default for SnapshotManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alder_state::StateStore;
    use serde_json::json;

    fn snap_state(value: serde_json::Value) -> StateSnapshot {
        let store = StateStore::new();
        store.create("k", value).unwrap();
        store.snapshot().unwrap()
    }

    #[test]
    fn verify_immediately_after_create() {
        let manager = SnapshotManager::new();
        let snapshot = manager
            .create_snapshot(
                WorkflowId::new("wf"),
                TaskId::new("t1"),
                "init",
                snap_state(json!(1)),
                vec!["mem-1".to_string()],
                true,
                None,
            )
            .unwrap();
        assert!(manager.verify_snapshot(&snapshot.id).unwrap());
        assert_eq!(snapshot.content_hash, snapshot.merkle_root);
    }

    #[test]
    fn last_verified_picks_newest_verified() {
        let manager = SnapshotManager::new();
        let wf = WorkflowId::new("wf");
        let first = manager
            .create_snapshot(
                wf.clone(),
                TaskId::new("t1"),
                "init",
                snap_state(json!(1)),
                vec![],
                true,
                None,
            )
            .unwrap();
        let _unverified = manager
            .create_snapshot(
                wf.clone(),
                TaskId::new("t2"),
                "mid",
                snap_state(json!(2)),
                vec![],
                false,
                None,
            )
            .unwrap();

        let picked = manager.last_verified(&wf).unwrap();
        assert_eq!(picked.id, first.id);
    }

    #[test]
    fn no_verified_snapshot_errors() {
        let manager = SnapshotManager::new();
        assert!(matches!(
            manager.last_verified(&WorkflowId::new("empty")),
            Err(SnapshotError::NoVerifiedSnapshot(_))
        ));
    }

    #[test]
    fn missing_snapshot_errors() {
        let manager = SnapshotManager::new();
        assert!(matches!(
            manager.get(&SnapshotId::new("ghost")),
            Err(SnapshotError::NotFound(_))
        ));
    }
}
