//! The commit gate itself

use crate::{Commit, FailureTaxonomy, Validator};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Configuration for the commit gate.
#[derive(Clone, Debug)]
pub struct GateConfig {
    /// Whether any validator failure blocks the commit (default: true)
    pub block_on_failure: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            block_on_failure: true,
        }
    }
}

/// A single validator failure within a gate report.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GateFailure {
    /// Name of the validator that failed
    pub validator: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_code: Option<FailureTaxonomy>,
}

/// Outcome of validating one commit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GateReport {
    pub commit_id: String,
    /// When true the caller must not persist the associated state change
    pub blocked_commit: bool,
    pub failures: Vec<GateFailure>,
}

impl GateReport {
    pub fn passed(&self) -> bool {
        !self.blocked_commit
    }
}

/// Runs an ordered list of pure validators over proposed commits.
pub struct CommitGate {
    validators: Vec<Validator>,
    config: GateConfig,
}

impl CommitGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            validators: Vec::new(),
            config,
        }
    }

    /// A gate with the default configuration and a `NotNull` baseline.
    pub fn with_defaults() -> Self {
        let mut gate = Self::new(GateConfig::default());
        gate.add_validator(Validator::NotNull);
        gate
    }

    /// Append a validator. Validators run in insertion order.
    pub fn add_validator(&mut self, validator: Validator) {
        self.validators.push(validator);
    }

    pub fn validator_count(&self) -> usize {
        self.validators.len()
    }

    /// Validate a commit against every configured validator.
    ///
    /// All validators run even after a failure, so the report carries
    /// the complete failure list.
    pub fn validate(&self, commit: &Commit) -> GateReport {
        let mut failures = Vec::new();

        for validator in &self.validators {
            let result = validator.run(&commit.data);
            if !result.valid {
                failures.push(GateFailure {
                    validator: validator.name(),
                    reason: result
                        .reason
                        .unwrap_or_else(|| "validation failed".to_string()),
                    failure_code: result.failure_code,
                });
            }
        }

        let blocked_commit = self.config.block_on_failure && !failures.is_empty();
        if blocked_commit {
            warn!(
                commit_id = %commit.id,
                failures = failures.len(),
                "commit blocked by validation gate"
            );
        } else {
            debug!(commit_id = %commit.id, "commit passed validation gate");
        }

        GateReport {
            commit_id: commit.id.clone(),
            blocked_commit,
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FieldType;
    use serde_json::json;

    #[test]
    fn passing_commit_is_not_blocked() {
        let mut gate = CommitGate::new(GateConfig::default());
        gate.add_validator(Validator::NotNull);
        let report = gate.validate(&Commit::new("c1", json!({"ok": true})));
        assert!(report.passed());
        assert!(report.failures.is_empty());
    }

    #[test]
    fn failing_validator_blocks_commit() {
        let mut gate = CommitGate::new(GateConfig::default());
        gate.add_validator(Validator::schema(vec![(
            "status".to_string(),
            FieldType::String,
        )]));
        let report = gate.validate(&Commit::new("c2", json!({})));
        assert!(report.blocked_commit);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].validator, "schema_match");
    }

    #[test]
    fn block_on_failure_false_reports_without_blocking() {
        let mut gate = CommitGate::new(GateConfig {
            block_on_failure: false,
        });
        gate.add_validator(Validator::NotNull);
        let report = gate.validate(&Commit::new("c3", json!(null)));
        assert!(!report.blocked_commit);
        assert_eq!(report.failures.len(), 1);
    }

    #[test]
    fn all_validators_run_and_all_failures_reported() {
        let mut gate = CommitGate::new(GateConfig::default());
        gate.add_validator(Validator::NotNull);
        gate.add_validator(Validator::schema(vec![(
            "id".to_string(),
            FieldType::String,
        )]));
        let report = gate.validate(&Commit::new("c4", json!(null)));
        assert_eq!(report.failures.len(), 2);
    }

    #[test]
    fn gate_is_deterministic_across_reruns() {
        let mut gate = CommitGate::new(GateConfig::default());
        gate.add_validator(Validator::schema(vec![(
            "total".to_string(),
            FieldType::Number,
        )]));
        let commit = Commit::new("c5", json!({"total": "not a number"}));
        let first = gate.validate(&commit);
        let second = gate.validate(&commit);
        assert_eq!(first.blocked_commit, second.blocked_commit);
        assert_eq!(first.failures.len(), second.failures.len());
    }
}
