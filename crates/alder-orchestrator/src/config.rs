//! Orchestrator configuration
//!
//! Collaborators beyond the state store, event log, and executor are
//! independently optional — absence means "component not present", and
//! the orchestrator checks for presence instead of assuming wiring.

use crate::{CompensationExecutor, FeasibilityChecker};
use alder_gate::CommitGate;
use alder_guard::GoalGuard;
use alder_snapshot::SnapshotManager;
use alder_types::{Principal, PrincipalKind};
use std::sync::Arc;

/// Configuration and optional collaborators for an orchestrator.
pub struct OrchestratorConfig {
    /// Maximum tasks executing concurrently (default 4)
    pub max_concurrency: usize,
    /// Principal the workflow executes as, evaluated by the guard
    pub principal: Principal,
    /// Policy guard; absent means no policy gating
    pub guard: Option<Arc<GoalGuard>>,
    /// Commit validation gate; absent means results commit unvalidated
    pub gate: Option<Arc<CommitGate>>,
    /// Snapshot manager; absent means no checkpoints are cut
    pub snapshots: Option<Arc<SnapshotManager>>,
    /// Feasibility checker consulted before the guard
    pub feasibility: Option<Arc<dyn FeasibilityChecker>>,
    /// Compensation executor for permanently failed tasks
    pub compensation: Option<Arc<dyn CompensationExecutor>>,
}

impl OrchestratorConfig {
    pub fn new(principal: Principal) -> Self {
        Self {
            max_concurrency: 4,
            principal,
            guard: None,
            gate: None,
            snapshots: None,
            feasibility: None,
            compensation: None,
        }
    }

    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit.max(1);
        self
    }

    pub fn with_guard(mut self, guard: Arc<GoalGuard>) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn with_gate(mut self, gate: Arc<CommitGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_snapshots(mut self, snapshots: Arc<SnapshotManager>) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    pub fn with_feasibility(mut self, checker: Arc<dyn FeasibilityChecker>) -> Self {
        self.feasibility = Some(checker);
        self
    }

    pub fn with_compensation(mut self, executor: Arc<dyn CompensationExecutor>) -> Self {
        self.compensation = Some(executor);
        self
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::new(Principal::new("orchestrator", PrincipalKind::Agent))
    }
}
