//! Workflow specifications: the immutable blueprint for execution
//!
//! A WorkflowSpec is a static DAG: an ordered list of tasks plus a
//! dependency map. Specs are validated at ingestion — duplicate task ids,
//! dependencies on unknown tasks, and cycles are all rejected before the
//! orchestrator will touch the workflow.

use crate::{DataZone, Intent, Permission, RiskTier, SpecError, SpecResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

// ── Identifiers ──────────────────────────────────────────────────────

/// Unique identifier for a workflow
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub String);

impl WorkflowId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a task within a workflow
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Task specification ───────────────────────────────────────────────

/// Kind of task in the workflow graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Action,
    Decision,
    Parallel,
}

/// Retry policy for transient task failures.
///
/// Backoff for attempt `n` (zero-based) is `base_backoff_ms *
/// multiplier^n`, optionally jittered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum execution attempts, including the first (>= 1).
    /// The budget is durable: attempts persisted by a previous process
    /// keep counting against it when the workflow resumes.
    pub max_attempts: u32,
    /// Initial backoff in milliseconds
    pub base_backoff_ms: u64,
    /// Multiplier applied per attempt (default 2.0)
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Whether to jitter the computed delay
    #[serde(default)]
    pub jitter: bool,
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_backoff_ms: 100,
            multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before the given zero-based retry attempt, without jitter.
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let factor = self.multiplier.powi(attempt as i32);
        (self.base_backoff_ms as f64 * factor) as u64
    }
}

/// Compensation to run when a task permanently fails.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompensationSpec {
    /// Tool to invoke for the compensation
    pub tool: String,
    /// Arguments passed to the compensation tool
    #[serde(default)]
    pub args: serde_json::Value,
}

/// A single task within a workflow.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Unique within the owning workflow
    pub id: TaskId,
    /// Human-readable name
    #[serde(default)]
    pub name: String,
    /// Task kind
    #[serde(rename = "type")]
    pub kind: TaskKind,
    /// Tool the executor should invoke, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Arbitrary inputs handed to the executor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inputs: Option<serde_json::Value>,
    /// Risk tier driving policy gating (default Low)
    #[serde(default = "default_risk_tier")]
    pub risk_tier: RiskTier,
    /// Stable key making retried/replayed side effects at-most-once
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    /// Retry policy for transient failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
    /// Per-attempt execution deadline in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Compensation to run on permanent failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compensation: Option<CompensationSpec>,
    /// Permissions the guard requires of the executing principal
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_permissions: Vec<Permission>,
    /// When present, only these tools may be invoked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<Vec<String>>,
    /// Declared intent, forwarded to the guard action
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    /// Data zone the task operates in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_zone: Option<DataZone>,
}

fn default_risk_tier() -> RiskTier {
    RiskTier::Low
}

impl TaskSpec {
    pub fn new(id: impl Into<String>, kind: TaskKind) -> Self {
        let id = TaskId::new(id);
        Self {
            name: id.0.clone(),
            id,
            kind,
            tool_name: None,
            inputs: None,
            risk_tier: RiskTier::Low,
            idempotency_key: None,
            retry: None,
            timeout_ms: None,
            compensation: None,
            required_permissions: Vec::new(),
            allowed_tools: None,
            intent: None,
            data_zone: None,
        }
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool_name = Some(tool.into());
        self
    }

    pub fn with_risk_tier(mut self, tier: RiskTier) -> Self {
        self.risk_tier = tier;
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_compensation(mut self, compensation: CompensationSpec) -> Self {
        self.compensation = Some(compensation);
        self
    }

    pub fn with_inputs(mut self, inputs: serde_json::Value) -> Self {
        self.inputs = Some(inputs);
        self
    }
}

// ── Workflow specification ───────────────────────────────────────────

/// A complete workflow definition: tasks plus a dependency map.
///
/// Immutable once execution starts. The dependency map goes from task id
/// to the set of prerequisite task ids that must complete first.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowSpec {
    pub id: WorkflowId,
    #[serde(default)]
    pub name: String,
    /// What the workflow is trying to accomplish
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    pub tasks: Vec<TaskSpec>,
    /// task id -> prerequisite task ids
    #[serde(default)]
    pub dependencies: HashMap<TaskId, Vec<TaskId>>,
}

impl WorkflowSpec {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: WorkflowId::new(id),
            name: name.into(),
            goal: None,
            tasks: Vec::new(),
            dependencies: HashMap::new(),
        }
    }

    pub fn with_task(mut self, task: TaskSpec) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn with_dependency(mut self, task: impl Into<String>, on: impl Into<String>) -> Self {
        self.dependencies
            .entry(TaskId::new(task))
            .or_default()
            .push(TaskId::new(on));
        self
    }

    pub fn task(&self, id: &TaskId) -> Option<&TaskSpec> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    /// Prerequisites of a task (empty when none are declared).
    pub fn prerequisites(&self, id: &TaskId) -> &[TaskId] {
        self.dependencies.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Task ids that transitively depend on the given task.
    pub fn downstream_of(&self, id: &TaskId) -> HashSet<TaskId> {
        let mut downstream = HashSet::new();
        let mut frontier = vec![id.clone()];
        while let Some(current) = frontier.pop() {
            for task in &self.tasks {
                if self.prerequisites(&task.id).contains(&current)
                    && downstream.insert(task.id.clone())
                {
                    frontier.push(task.id.clone());
                }
            }
        }
        downstream
    }

    /// Parse a declarative JSON workflow definition and validate it.
    pub fn from_json_str(json: &str) -> SpecResult<Self> {
        let spec: WorkflowSpec =
            serde_json::from_str(json).map_err(|e| SpecError::Parse(e.to_string()))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Load a declarative JSON workflow definition from a file.
    pub fn load_from_file(path: impl AsRef<Path>) -> SpecResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| SpecError::Io(e.to_string()))?;
        Self::from_json_str(&json)
    }

    /// Structural validation: unique ids, known dependencies, no cycles.
    pub fn validate(&self) -> SpecResult<()> {
        if self.tasks.is_empty() {
            return Err(SpecError::Empty);
        }

        let mut ids = HashSet::new();
        for task in &self.tasks {
            if !ids.insert(task.id.clone()) {
                return Err(SpecError::DuplicateTask(task.id.clone()));
            }
        }

        for (task, prereqs) in &self.dependencies {
            if !ids.contains(task) {
                return Err(SpecError::UnknownTask(task.clone()));
            }
            for prereq in prereqs {
                if !ids.contains(prereq) {
                    return Err(SpecError::UnknownDependency {
                        task: task.clone(),
                        dependency: prereq.clone(),
                    });
                }
            }
        }

        self.check_acyclic()?;
        Ok(())
    }

    /// Kahn's algorithm over the dependency map.
    fn check_acyclic(&self) -> SpecResult<()> {
        let mut in_degree: HashMap<&TaskId, usize> = self
            .tasks
            .iter()
            .map(|t| (&t.id, self.prerequisites(&t.id).len()))
            .collect();

        let mut queue: Vec<&TaskId> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut visited = 0usize;
        while let Some(current) = queue.pop() {
            visited += 1;
            for task in &self.tasks {
                if self.prerequisites(&task.id).contains(current) {
                    let degree = in_degree.get_mut(&task.id).ok_or_else(|| {
                        SpecError::UnknownTask(task.id.clone())
                    })?;
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push(&task.id);
                    }
                }
            }
        }

        if visited != self.tasks.len() {
            return Err(SpecError::CycleDetected);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_task_spec() -> WorkflowSpec {
        WorkflowSpec::new("wf-1", "two tasks")
            .with_task(TaskSpec::new("task1", TaskKind::Action))
            .with_task(TaskSpec::new("task2", TaskKind::Action))
            .with_dependency("task2", "task1")
    }

    #[test]
    fn valid_spec_passes_validation() {
        assert!(two_task_spec().validate().is_ok());
    }

    #[test]
    fn duplicate_task_ids_rejected() {
        let spec = WorkflowSpec::new("wf-dup", "dup")
            .with_task(TaskSpec::new("a", TaskKind::Action))
            .with_task(TaskSpec::new("a", TaskKind::Action));
        assert!(matches!(spec.validate(), Err(SpecError::DuplicateTask(_))));
    }

    #[test]
    fn unknown_dependency_rejected() {
        let spec = WorkflowSpec::new("wf-unk", "unknown")
            .with_task(TaskSpec::new("a", TaskKind::Action))
            .with_dependency("a", "ghost");
        assert!(matches!(
            spec.validate(),
            Err(SpecError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn cycle_rejected() {
        let spec = WorkflowSpec::new("wf-cycle", "cycle")
            .with_task(TaskSpec::new("a", TaskKind::Action))
            .with_task(TaskSpec::new("b", TaskKind::Action))
            .with_dependency("a", "b")
            .with_dependency("b", "a");
        assert!(matches!(spec.validate(), Err(SpecError::CycleDetected)));
    }

    #[test]
    fn downstream_is_transitive() {
        let spec = WorkflowSpec::new("wf-chain", "chain")
            .with_task(TaskSpec::new("a", TaskKind::Action))
            .with_task(TaskSpec::new("b", TaskKind::Action))
            .with_task(TaskSpec::new("c", TaskKind::Action))
            .with_dependency("b", "a")
            .with_dependency("c", "b");
        let downstream = spec.downstream_of(&TaskId::new("a"));
        assert!(downstream.contains(&TaskId::new("b")));
        assert!(downstream.contains(&TaskId::new("c")));
        assert!(!downstream.contains(&TaskId::new("a")));
    }

    #[test]
    fn backoff_grows_by_multiplier() {
        let retry = RetryPolicy {
            max_attempts: 3,
            base_backoff_ms: 100,
            multiplier: 2.0,
            jitter: false,
        };
        assert_eq!(retry.backoff_ms(0), 100);
        assert_eq!(retry.backoff_ms(1), 200);
        assert_eq!(retry.backoff_ms(2), 400);
    }

    #[test]
    fn json_ingestion_round_trips() {
        let json = r#"{
            "id": "wf-json",
            "name": "from json",
            "tasks": [
                {"id": "fetch", "type": "action", "tool_name": "http_get",
                 "risk_tier": "LOW",
                 "retry": {"max_attempts": 3, "base_backoff_ms": 50}},
                {"id": "store", "type": "action", "tool_name": "write_file"}
            ],
            "dependencies": {"store": ["fetch"]}
        }"#;
        let spec = WorkflowSpec::from_json_str(json).unwrap();
        assert_eq!(spec.tasks.len(), 2);
        let fetch = spec.task(&TaskId::new("fetch")).unwrap();
        assert_eq!(fetch.retry.as_ref().unwrap().max_attempts, 3);
        // multiplier default applies when omitted
        assert_eq!(fetch.retry.as_ref().unwrap().multiplier, 2.0);
        assert_eq!(spec.prerequisites(&TaskId::new("store")), &[TaskId::new("fetch")]);
    }
}
