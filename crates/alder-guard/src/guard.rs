//! The goal-guard FSM implementation

use crate::{GuardAuditEntry, GuardError, GuardResult, StateTransition};
use alder_types::{Action, Principal, RiskTier};
use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, info, warn};

/// FSM states of the guard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardState {
    Init,
    Evaluating,
    Approved,
    Rejected,
    PendingHuman,
}

/// Decision returned by an evaluation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GuardDecision {
    pub allowed: bool,
    pub reason: String,
    pub requires_human_approval: bool,
    /// One-time token the human approver must present, when pending
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_token: Option<String>,
}

impl GuardDecision {
    fn approved(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
            requires_human_approval: false,
            approval_token: None,
        }
    }

    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            requires_human_approval: false,
            approval_token: None,
        }
    }

    fn pending(reason: impl Into<String>, token: String) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            requires_human_approval: true,
            approval_token: Some(token),
        }
    }
}

/// A pending human approval awaiting its token.
#[derive(Clone, Debug)]
struct PendingApproval {
    token: String,
    consumed: bool,
    /// The action being held, kept so the human decision can be audited
    action: Action,
}

struct GuardInner {
    state: GuardState,
    pending: HashMap<String, PendingApproval>,
    audit_log: Vec<GuardAuditEntry>,
}

/// The goal-guard.
///
/// One instance per orchestrator; interior locking makes it shareable
/// across worker tasks.
pub struct GoalGuard {
    inner: RwLock<GuardInner>,
}

impl GoalGuard {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(GuardInner {
                state: GuardState::Init,
                pending: HashMap::new(),
                audit_log: Vec::new(),
            }),
        }
    }

    /// Current FSM state.
    pub fn state(&self) -> GuardResult<GuardState> {
        Ok(self.inner.read().map_err(|_| GuardError::LockPoisoned)?.state)
    }

    /// Evaluate an action attempted by a principal.
    ///
    /// Fails closed on missing permissions, disallowed tools, and
    /// data-zone mismatches. Low/Medium tiers approve immediately;
    /// High/Critical park in `PendingHuman` with a one-time token.
    pub fn evaluate(
        &self,
        principal: &Principal,
        action: &Action,
        tool_name: Option<&str>,
    ) -> GuardResult<GuardDecision> {
        let mut inner = self.inner.write().map_err(|_| GuardError::LockPoisoned)?;
        let from = inner.state;
        inner.state = GuardState::Evaluating;

        let decision = Self::decide(&mut inner, principal, action, tool_name);

        let to = match (&decision.allowed, &decision.requires_human_approval) {
            (true, _) => GuardState::Approved,
            (false, true) => GuardState::PendingHuman,
            (false, false) => GuardState::Rejected,
        };
        inner.state = to;

        info!(
            action = %action.id,
            principal = %principal.id,
            allowed = decision.allowed,
            pending = decision.requires_human_approval,
            reason = %decision.reason,
            "policy evaluation"
        );

        inner.audit_log.push(GuardAuditEntry {
            timestamp: Utc::now(),
            principal: principal.clone(),
            action: action.clone(),
            decision: GuardDecision {
                // never persist the raw token in the audit trail
                approval_token: None,
                ..decision.clone()
            },
            state_transition: Some(StateTransition { from, to }),
        });

        // Terminal states reset to Init for the next evaluation cycle;
        // PendingHuman holds until an explicit decision arrives.
        if to != GuardState::PendingHuman {
            inner.state = GuardState::Init;
        }

        Ok(decision)
    }

    fn decide(
        inner: &mut GuardInner,
        principal: &Principal,
        action: &Action,
        tool_name: Option<&str>,
    ) -> GuardDecision {
        for required in &action.required_permissions {
            if !principal.holds(required) {
                return GuardDecision::rejected(format!(
                    "principal {} lacks permission {}:{}",
                    principal.id, required.action, required.resource
                ));
            }
        }

        if let Some(allowed_tools) = &action.allowed_tools {
            match tool_name {
                Some(tool) if allowed_tools.iter().any(|t| t == tool) => {}
                Some(tool) => {
                    return GuardDecision::rejected(format!(
                        "tool {} is outside the action's allowlist",
                        tool
                    ));
                }
                None => {
                    return GuardDecision::rejected(
                        "action declares a tool allowlist but no tool was named",
                    );
                }
            }
        }

        if let Some(zone) = action.data_zone {
            let zone_ok = action.required_permissions.is_empty()
                || action.required_permissions.iter().all(|required| {
                    principal
                        .permissions
                        .iter()
                        .any(|p| p.satisfies(required) && p.data_zone.map_or(true, |z| z == zone))
                });
            if !zone_ok {
                return GuardDecision::rejected(format!(
                    "principal permissions do not cover data zone {:?}",
                    zone
                ));
            }
        }

        if action.risk_tier.requires_human_approval() {
            let token = mint_token();
            inner.pending.insert(
                action.id.clone(),
                PendingApproval {
                    token: token.clone(),
                    consumed: false,
                    action: action.clone(),
                },
            );
            return GuardDecision::pending(
                format!("{} risk action requires human approval", action.risk_tier),
                token,
            );
        }

        GuardDecision::approved(format!(
            "{} risk action auto-approved for {}",
            action.risk_tier, principal.id
        ))
    }

    /// Consume a one-time token, approving the pending action.
    ///
    /// Only a human principal may approve. Returns `true` only when the
    /// token matches exactly and has not been consumed before; the
    /// decision lands in the audit log with its `PendingHuman ->
    /// Approved` transition. A wrong or reused token leaves the FSM in
    /// `PendingHuman`.
    pub fn approve_human_action(
        &self,
        action_id: &str,
        token: &str,
        approver: &Principal,
    ) -> GuardResult<bool> {
        let mut inner = self.inner.write().map_err(|_| GuardError::LockPoisoned)?;
        if !approver.is_human() {
            warn!(action = %action_id, approver = %approver.id, "non-human approver refused");
            return Ok(false);
        }
        let action = {
            let Some(pending) = inner.pending.get_mut(action_id) else {
                warn!(action = %action_id, "approval attempted for unknown action");
                return Ok(false);
            };
            if pending.consumed || pending.token != token {
                warn!(action = %action_id, "approval attempted with invalid or reused token");
                return Ok(false);
            }
            pending.consumed = true;
            pending.action.clone()
        };
        inner.state = GuardState::Approved;
        inner.audit_log.push(GuardAuditEntry {
            timestamp: Utc::now(),
            principal: approver.clone(),
            action,
            decision: GuardDecision::approved(format!("approved by {}", approver.id)),
            state_transition: Some(StateTransition {
                from: GuardState::PendingHuman,
                to: GuardState::Approved,
            }),
        });
        inner.state = GuardState::Init;
        debug!(action = %action_id, approver = %approver.id, "human approval accepted");
        Ok(true)
    }

    /// Explicitly reject a pending action.
    ///
    /// Only a human principal may reject; the decision lands in the
    /// audit log with its `PendingHuman -> Rejected` transition.
    pub fn reject_human_action(&self, action_id: &str, approver: &Principal) -> GuardResult<bool> {
        let mut inner = self.inner.write().map_err(|_| GuardError::LockPoisoned)?;
        if !approver.is_human() {
            warn!(action = %action_id, approver = %approver.id, "non-human approver refused");
            return Ok(false);
        }
        let Some(pending) = inner.pending.remove(action_id) else {
            return Ok(false);
        };
        inner.state = GuardState::Rejected;
        inner.audit_log.push(GuardAuditEntry {
            timestamp: Utc::now(),
            principal: approver.clone(),
            action: pending.action,
            decision: GuardDecision::rejected(format!("rejected by {}", approver.id)),
            state_transition: Some(StateTransition {
                from: GuardState::PendingHuman,
                to: GuardState::Rejected,
            }),
        });
        inner.state = GuardState::Init;
        info!(action = %action_id, approver = %approver.id, "human rejection recorded");
        Ok(true)
    }

    /// Whether an action has been approved by a human.
    pub fn is_approved(&self, action_id: &str) -> GuardResult<bool> {
        let inner = self.inner.read().map_err(|_| GuardError::LockPoisoned)?;
        Ok(inner
            .pending
            .get(action_id)
            .map(|p| p.consumed)
            .unwrap_or(false))
    }

    /// The guard's append-only audit trail.
    pub fn audit_log(&self) -> GuardResult<Vec<GuardAuditEntry>> {
        let inner = self.inner.read().map_err(|_| GuardError::LockPoisoned)?;
        Ok(inner.audit_log.clone())
    }

    /// Clear per-evaluation state. The audit log is never cleared.
    pub fn reset(&self) -> GuardResult<()> {
        let mut inner = self.inner.write().map_err(|_| GuardError::LockPoisoned)?;
        inner.state = GuardState::Init;
        inner.pending.clear();
        Ok(())
    }
}

impl Default for GoalGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Mint an unguessable single-use token: 32 random bytes, hex encoded.
fn mint_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
