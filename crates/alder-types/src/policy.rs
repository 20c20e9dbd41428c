//! Policy vocabulary: risk tiers, permissions, principals, and actions
//!
//! These are supplied per-evaluation by the caller and consumed by the
//! goal-guard. Nothing here is persisted by the kernel itself.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Risk tier classifying an action's potential impact.
///
/// Ordered so that "at or above High" is expressible with a comparison.
/// High and Critical actions never auto-execute: they always require an
/// explicit human approval, regardless of any other signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskTier {
    /// Whether this tier requires an explicit human approval.
    pub fn requires_human_approval(&self) -> bool {
        *self >= RiskTier::High
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskTier::Low => "LOW",
            RiskTier::Medium => "MEDIUM",
            RiskTier::High => "HIGH",
            RiskTier::Critical => "CRITICAL",
        };
        write!(f, "{}", s)
    }
}

/// Declared intent of an action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Read,
    Write,
    Delete,
    Execute,
    Admin,
}

/// Data zone a resource lives in, used for isolation checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataZone {
    Public,
    Internal,
    Confidential,
    Restricted,
}

/// A permission couples an action with a resource, optionally narrowed
/// by intent and data zone.
///
/// A principal's permission satisfies a required permission when the
/// action and resource match and every restriction declared on the
/// requirement is also carried by the grant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Action identifier, e.g. "tool:invoke"
    pub action: String,
    /// Resource identifier, e.g. "payments"
    pub resource: String,
    /// Optional intent restriction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    /// Optional data zone restriction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_zone: Option<DataZone>,
}

impl Permission {
    pub fn new(action: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            resource: resource.into(),
            intent: None,
            data_zone: None,
        }
    }

    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.intent = Some(intent);
        self
    }

    pub fn with_data_zone(mut self, zone: DataZone) -> Self {
        self.data_zone = Some(zone);
        self
    }

    /// Check whether this grant satisfies a required permission.
    pub fn satisfies(&self, required: &Permission) -> bool {
        if self.action != required.action || self.resource != required.resource {
            return false;
        }
        if let Some(required_intent) = required.intent {
            if self.intent != Some(required_intent) {
                return false;
            }
        }
        if let Some(required_zone) = required.data_zone {
            if self.data_zone != Some(required_zone) {
                return false;
            }
        }
        true
    }
}

/// Kind of actor attempting an action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    Human,
    Agent,
    Service,
}

/// An actor (human, agent, or service) carrying a permission set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub kind: PrincipalKind,
    pub permissions: Vec<Permission>,
}

impl Principal {
    pub fn new(id: impl Into<String>, kind: PrincipalKind) -> Self {
        Self {
            id: id.into(),
            kind,
            permissions: Vec::new(),
        }
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permissions.push(permission);
        self
    }

    pub fn is_human(&self) -> bool {
        self.kind == PrincipalKind::Human
    }

    /// Whether this principal holds a grant satisfying the requirement.
    pub fn holds(&self, required: &Permission) -> bool {
        self.permissions.iter().any(|p| p.satisfies(required))
    }
}

/// An action to be authorized: what permissions it needs, how risky it
/// is, and optionally which tools it may use.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub name: String,
    pub risk_tier: RiskTier,
    pub required_permissions: Vec<Permission>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_zone: Option<DataZone>,
    /// When present, only these tools may be invoked by the action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Action {
    pub fn new(id: impl Into<String>, name: impl Into<String>, risk_tier: RiskTier) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            risk_tier,
            required_permissions: Vec::new(),
            intent: None,
            data_zone: None,
            allowed_tools: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_required_permission(mut self, permission: Permission) -> Self {
        self.required_permissions.push(permission);
        self
    }

    pub fn with_allowed_tools(mut self, tools: Vec<String>) -> Self {
        self.allowed_tools = Some(tools);
        self
    }

    pub fn with_data_zone(mut self, zone: DataZone) -> Self {
        self.data_zone = Some(zone);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_tier_ordering() {
        assert!(RiskTier::Low < RiskTier::Medium);
        assert!(RiskTier::High < RiskTier::Critical);
        assert!(!RiskTier::Medium.requires_human_approval());
        assert!(RiskTier::High.requires_human_approval());
        assert!(RiskTier::Critical.requires_human_approval());
    }

    #[test]
    fn permission_satisfaction_respects_restrictions() {
        let required = Permission::new("tool:invoke", "payments").with_intent(Intent::Write);
        let broad = Permission::new("tool:invoke", "payments");
        let exact = Permission::new("tool:invoke", "payments").with_intent(Intent::Write);

        // A grant without the required intent restriction does not satisfy it.
        assert!(!broad.satisfies(&required));
        assert!(exact.satisfies(&required));
    }

    #[test]
    fn principal_holds_checks_all_grants() {
        let principal = Principal::new("agent-1", PrincipalKind::Agent)
            .with_permission(Permission::new("tool:invoke", "files"))
            .with_permission(Permission::new("tool:invoke", "http"));

        assert!(principal.holds(&Permission::new("tool:invoke", "http")));
        assert!(!principal.holds(&Permission::new("tool:invoke", "payments")));
    }

    #[test]
    fn risk_tier_serializes_screaming_snake() {
        let json = serde_json::to_string(&RiskTier::Critical).unwrap();
        assert_eq!(json, "\"CRITICAL\"");
    }
}
