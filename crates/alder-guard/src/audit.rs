//! Internal guard audit trail

use crate::{GuardDecision, GuardState};
use alder_types::{Action, Principal};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The state transition an evaluation caused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: GuardState,
    pub to: GuardState,
}

/// One audit record per evaluation or human decision.
///
/// The guard's audit log is append-only and survives `reset()`; it is
/// independent of (and in addition to) the global event log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GuardAuditEntry {
    pub timestamp: DateTime<Utc>,
    pub principal: Principal,
    pub action: Action,
    pub decision: GuardDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_transition: Option<StateTransition>,
}
