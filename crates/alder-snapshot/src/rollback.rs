//! Policy-gated rollback to verified snapshots

use crate::{Snapshot, SnapshotError, SnapshotId, SnapshotManager, SnapshotResult};
use alder_guard::GoalGuard;
use alder_ledger::{Event, EventLog, EventType};
use alder_state::StateStore;
use alder_types::{Action, Permission, Principal, RiskTier, WorkflowId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// A request to restore world state to a specific snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RollbackRequest {
    pub snapshot_id: SnapshotId,
    /// Who asked for the restore (for the audit trail)
    pub requested_by: String,
    /// Risk tier of the restore; defaults to the snapshot's own tier,
    /// and fails closed to High when neither is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_tier: Option<RiskTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RollbackRequest {
    pub fn new(snapshot_id: SnapshotId, requested_by: impl Into<String>) -> Self {
        Self {
            snapshot_id,
            requested_by: requested_by.into(),
            risk_tier: None,
            reason: None,
        }
    }

    pub fn with_risk_tier(mut self, tier: RiskTier) -> Self {
        self.risk_tier = Some(tier);
        self
    }
}

/// Restores world state to verified snapshots, subject to policy.
///
/// Owns the current memory-pointer set; a successful rollback replaces
/// it wholesale with the snapshot's recorded pointers. Snapshots
/// themselves are never deleted or mutated by a rollback.
pub struct RollbackOrchestrator {
    snapshots: Arc<SnapshotManager>,
    store: Arc<StateStore>,
    event_log: Arc<dyn EventLog>,
    guard: Arc<GoalGuard>,
    memory_pointers: RwLock<Vec<String>>,
}

impl RollbackOrchestrator {
    pub fn new(
        snapshots: Arc<SnapshotManager>,
        store: Arc<StateStore>,
        event_log: Arc<dyn EventLog>,
        guard: Arc<GoalGuard>,
    ) -> Self {
        Self {
            snapshots,
            store,
            event_log,
            guard,
            memory_pointers: RwLock::new(Vec::new()),
        }
    }

    /// The memory pointers currently considered live.
    pub fn memory_pointers(&self) -> Vec<String> {
        self.memory_pointers
            .read()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    /// Replace the live memory-pointer set (normal forward execution).
    pub fn set_memory_pointers(&self, pointers: Vec<String>) {
        if let Ok(mut current) = self.memory_pointers.write() {
            *current = pointers;
        }
    }

    /// Restore to the newest verified snapshot of a workflow.
    pub fn rollback_to_last_verified(
        &self,
        workflow_id: &WorkflowId,
        requested_by: &str,
        principal: &Principal,
    ) -> SnapshotResult<Snapshot> {
        let target = self.snapshots.last_verified(workflow_id)?;
        let request = RollbackRequest::new(target.id.clone(), requested_by);
        self.rollback(request, principal)
    }

    /// Restore to an explicitly named snapshot, subject to policy.
    ///
    /// Low/Medium restores proceed immediately once permissions check
    /// out. High/Critical restores require a *human* principal; any
    /// other principal is denied with `RollbackDenied`, nothing is
    /// mutated, and a single `ROLLBACK_POLICY_DECISION` event with
    /// `approved: false` is recorded.
    pub fn rollback(
        &self,
        request: RollbackRequest,
        principal: &Principal,
    ) -> SnapshotResult<Snapshot> {
        let snapshot = self.snapshots.get(&request.snapshot_id)?;

        // integrity check before anything is applied
        let computed = crate::content_hash(&snapshot.world_state, &snapshot.memory_pointers);
        if computed != snapshot.content_hash {
            return Err(SnapshotError::HashMismatch {
                id: snapshot.id.to_string(),
                expected: snapshot.content_hash.clone(),
                computed,
            });
        }

        let risk_tier = request
            .risk_tier
            .or(snapshot.risk_tier)
            .unwrap_or(RiskTier::High);

        let action = Action::new(
            format!("rollback:{}", snapshot.id),
            format!("restore workflow {} to snapshot", snapshot.workflow_id),
            risk_tier,
        )
        .with_required_permission(Permission::new("rollback", "world-state"));

        let decision = self.guard.evaluate(principal, &action, None)?;

        let human_gate_ok = !risk_tier.requires_human_approval() || principal.is_human();
        let approved = (decision.allowed || decision.requires_human_approval) && human_gate_ok;

        self.event_log.append(
            Event::new(EventType::RollbackPolicyDecision, snapshot.workflow_id.clone())
                .with_task(snapshot.task_id.clone())
                .with_metadata(json!({
                    "snapshot_id": snapshot.id.to_string(),
                    "requested_by": request.requested_by,
                    "principal": principal.id,
                    "risk_tier": risk_tier,
                    "approved": approved,
                    "reason": decision.reason,
                })),
        )?;

        if !approved {
            warn!(
                snapshot_id = %snapshot.id,
                principal = %principal.id,
                risk_tier = %risk_tier,
                "rollback denied by policy"
            );
            return Err(SnapshotError::RollbackDenied {
                principal: principal.id.clone(),
                risk_tier,
                reason: if human_gate_ok {
                    decision.reason
                } else {
                    format!(
                        "{} risk rollback requires a human principal, got {:?}",
                        risk_tier, principal.kind
                    )
                },
            });
        }

        // A pending-human decision is satisfied by the human's own
        // explicit request: consume the minted token on their behalf.
        if decision.requires_human_approval {
            if let Some(token) = &decision.approval_token {
                self.guard.approve_human_action(&action.id, token, principal)?;
            }
        }

        self.event_log.append(
            Event::new(EventType::RollbackInitiated, snapshot.workflow_id.clone())
                .with_task(snapshot.task_id.clone())
                .with_metadata(json!({
                    "snapshot_id": snapshot.id.to_string(),
                    "step_id": snapshot.step_id,
                })),
        )?;

        let diff = self.store.restore(&snapshot.world_state)?;
        self.set_memory_pointers(snapshot.memory_pointers.clone());

        self.event_log.append(
            Event::new(EventType::RollbackCompleted, snapshot.workflow_id.clone())
                .with_task(snapshot.task_id.clone())
                .with_metadata(json!({
                    "snapshot_id": snapshot.id.to_string(),
                    "entries_reverted": diff.updated.len(),
                    "entries_deleted": diff.deleted.len(),
                    "entries_recreated": diff.created.len(),
                })),
        )?;

        info!(
            snapshot_id = %snapshot.id,
            workflow_id = %snapshot.workflow_id,
            "rollback completed"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alder_ledger::MemoryEventLog;
    use alder_types::{PrincipalKind, TaskId};

    fn fixture() -> (
        Arc<SnapshotManager>,
        Arc<StateStore>,
        Arc<MemoryEventLog>,
        RollbackOrchestrator,
    ) {
        let snapshots = Arc::new(SnapshotManager::new());
        let store = Arc::new(StateStore::new());
        let log = Arc::new(MemoryEventLog::new());
        let guard = Arc::new(GoalGuard::new());
        let orchestrator = RollbackOrchestrator::new(
            snapshots.clone(),
            store.clone(),
            log.clone(),
            guard,
        );
        (snapshots, store, log, orchestrator)
    }

    fn rollback_principal(kind: PrincipalKind) -> Principal {
        Principal::new("p-1", kind).with_permission(Permission::new("rollback", "world-state"))
    }

    #[test]
    fn restores_last_verified_byte_for_byte() {
        let (snapshots, store, _log, orchestrator) = fixture();
        let wf = WorkflowId::new("wf");

        store.create("balance", json!(100)).unwrap();
        let pre_mutation = store.snapshot().unwrap();
        snapshots
            .create_snapshot(
                wf.clone(),
                TaskId::new("init"),
                "init",
                pre_mutation.clone(),
                vec!["mem-init".to_string()],
                true,
                Some(RiskTier::Low),
            )
            .unwrap();

        store.update("balance", json!(50), 1).unwrap();
        store.update("balance", json!(0), 2).unwrap();
        store.create("debt", json!(25)).unwrap();

        orchestrator
            .rollback_to_last_verified(&wf, "ops", &rollback_principal(PrincipalKind::Human))
            .unwrap();

        let restored = store.snapshot().unwrap();
        assert_eq!(restored, pre_mutation);
        assert_eq!(
            serde_json::to_vec(&restored).unwrap(),
            serde_json::to_vec(&pre_mutation).unwrap()
        );
        assert_eq!(orchestrator.memory_pointers(), vec!["mem-init".to_string()]);
    }

    #[test]
    fn critical_rollback_by_agent_is_denied_without_mutation() {
        let (snapshots, store, log, orchestrator) = fixture();
        let wf = WorkflowId::new("wf");

        store.create("k", json!("original")).unwrap();
        let snap = snapshots
            .create_snapshot(
                wf.clone(),
                TaskId::new("t"),
                "step",
                store.snapshot().unwrap(),
                vec![],
                true,
                Some(RiskTier::Critical),
            )
            .unwrap();
        store.update("k", json!("mutated"), 1).unwrap();
        let before = store.snapshot().unwrap();

        let request = RollbackRequest::new(snap.id, "agent-run");
        let err = orchestrator
            .rollback(request, &rollback_principal(PrincipalKind::Agent))
            .unwrap_err();
        assert!(matches!(err, SnapshotError::RollbackDenied { .. }));

        // nothing mutated
        assert_eq!(store.snapshot().unwrap(), before);

        // exactly one policy decision event, approved=false, no rollback events
        let events = log.read(&wf).unwrap();
        let decisions: Vec<_> = events
            .iter()
            .filter(|e| e.event_type == EventType::RollbackPolicyDecision)
            .collect();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].metadata["approved"], json!(false));
        assert!(!events
            .iter()
            .any(|e| e.event_type == EventType::RollbackInitiated));
    }

    #[test]
    fn high_risk_rollback_by_human_proceeds() {
        let (snapshots, store, log, orchestrator) = fixture();
        let wf = WorkflowId::new("wf");

        store.create("k", json!(1)).unwrap();
        let snap = snapshots
            .create_snapshot(
                wf.clone(),
                TaskId::new("t"),
                "step",
                store.snapshot().unwrap(),
                vec![],
                true,
                Some(RiskTier::High),
            )
            .unwrap();
        store.update("k", json!(2), 1).unwrap();

        orchestrator
            .rollback(
                RollbackRequest::new(snap.id, "ops"),
                &rollback_principal(PrincipalKind::Human),
            )
            .unwrap();

        assert_eq!(store.read("k").unwrap().value, json!(1));
        let events = log.read(&wf).unwrap();
        assert!(events
            .iter()
            .any(|e| e.event_type == EventType::RollbackCompleted));
    }

    #[test]
    fn missing_permission_denies_even_low_risk() {
        let (snapshots, store, _log, orchestrator) = fixture();
        let wf = WorkflowId::new("wf");
        store.create("k", json!(1)).unwrap();
        let snap = snapshots
            .create_snapshot(
                wf,
                TaskId::new("t"),
                "step",
                store.snapshot().unwrap(),
                vec![],
                true,
                Some(RiskTier::Low),
            )
            .unwrap();

        let no_perms = Principal::new("p-2", PrincipalKind::Human);
        let err = orchestrator
            .rollback(RollbackRequest::new(snap.id, "ops"), &no_perms)
            .unwrap_err();
        assert!(matches!(err, SnapshotError::RollbackDenied { .. }));
    }

    #[test]
    fn verify_still_passes_after_restore() {
        let (snapshots, store, _log, orchestrator) = fixture();
        let wf = WorkflowId::new("wf");

        store.create("k", json!("v1")).unwrap();
        let snap = snapshots
            .create_snapshot(
                wf.clone(),
                TaskId::new("t"),
                "init",
                store.snapshot().unwrap(),
                vec![],
                true,
                Some(RiskTier::Low),
            )
            .unwrap();
        store.update("k", json!("v2"), 1).unwrap();

        orchestrator
            .rollback(
                RollbackRequest::new(snap.id.clone(), "ops"),
                &rollback_principal(PrincipalKind::Human),
            )
            .unwrap();

        assert!(snapshots.verify_snapshot(&snap.id).unwrap());
        // recomputing over the restored store matches the stored hash too
        let recomputed =
            crate::content_hash(&store.snapshot().unwrap(), &snap.memory_pointers);
        assert_eq!(recomputed, snap.content_hash);
    }
}
