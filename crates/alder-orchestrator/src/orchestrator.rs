//! The DAG scheduling engine

use crate::{FailureContext, OrchestratorConfig, OrchestratorResult, TaskExecutor};
use alder_gate::Commit;
use alder_ledger::{Event, EventLog, EventType};
use alder_snapshot::RollbackOrchestrator;
use alder_state::{StateError, StateStore};
use alder_types::{
    Action, TaskExecutionResult, TaskId, TaskSpec, TaskStatus, WorkflowExecutionResult,
    WorkflowId, WorkflowSpec, WorkflowState, WorkflowStatus,
};
use futures::stream::{FuturesUnordered, StreamExt};
use rand::Rng;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Source of the live memory-pointer set recorded into snapshots.
///
/// The kernel consumes pointers, it never interprets them. The rollback
/// orchestrator is the usual provider.
pub trait MemoryPointers: Send + Sync {
    fn current(&self) -> Vec<String>;
}

impl MemoryPointers for RollbackOrchestrator {
    fn current(&self) -> Vec<String> {
        self.memory_pointers()
    }
}

/// Bounded retry budget for best-effort compensation.
const COMPENSATION_ATTEMPTS: u32 = 3;

/// Outcome of a single task attempt, returned by the worker to the
/// scheduling loop which owns all state mutation.
struct TaskOutcome {
    task_id: TaskId,
    attempts: u32,
    duration_ms: u64,
    verdict: TaskVerdict,
}

enum TaskVerdict {
    Completed(serde_json::Value),
    AwaitingApproval,
    Failed { error: String },
    Retry { error: String, delay_ms: u64 },
    Cancelled,
}

/// Failure of a single executor attempt, before retry classification.
enum AttemptError {
    Timeout,
    Cancelled,
    Executor(crate::ExecutorError),
}

/// Scheduler directive to re-dispatch a task after its backoff delay.
struct RetryDispatch {
    task: TaskSpec,
    attempt: u32,
    delay_ms: u64,
}

/// The workflow state together with the store version it was read at.
///
/// Every persist presents that version, so a concurrent writer on the
/// same workflow surfaces as a `Conflict` instead of a lost update.
struct WorkflowDoc {
    state: WorkflowState,
    version: u64,
}

/// The workflow orchestrator.
///
/// Composes the state store, event log, and optional collaborators
/// (guard, gate, snapshots, feasibility, compensation) around a
/// caller-supplied task executor.
pub struct Orchestrator {
    store: Arc<StateStore>,
    event_log: Arc<dyn EventLog>,
    executor: Arc<dyn TaskExecutor>,
    memory: Option<Arc<dyn MemoryPointers>>,
    config: OrchestratorConfig,
    cancel_tx: watch::Sender<bool>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<StateStore>,
        event_log: Arc<dyn EventLog>,
        executor: Arc<dyn TaskExecutor>,
        config: OrchestratorConfig,
    ) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            store,
            event_log,
            executor,
            memory: None,
            config,
            cancel_tx,
        }
    }

    /// Wire a memory-pointer source recorded into snapshots.
    pub fn with_memory_pointers(mut self, memory: Arc<dyn MemoryPointers>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Request cancellation: propagates to in-flight executor calls.
    ///
    /// The flag is retained even when no worker is subscribed yet, so a
    /// request made before execution starts still aborts the run.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    fn cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    fn workflow_key(workflow_id: &WorkflowId) -> String {
        format!("workflow/{}", workflow_id)
    }

    fn result_key(workflow_id: &WorkflowId, task_id: &TaskId) -> String {
        format!("task-result/{}/{}", workflow_id, task_id)
    }

    fn idempotency_record_key(key: &str) -> String {
        format!("idempotency/{}", key)
    }

    /// Store key an approval console reads a pending approval from.
    pub fn approval_key(action_id: &str) -> String {
        format!("approval/{}", action_id)
    }

    /// Guard action id for a task within a workflow.
    pub fn action_id(workflow_id: &WorkflowId, task_id: &TaskId) -> String {
        format!("{}:{}", workflow_id, task_id)
    }

    /// Execute (or resume) a workflow.
    ///
    /// Safe to call again after a crash or a human-approval pause:
    /// state is reloaded from the store, completed tasks are never
    /// re-run, attempt counts already persisted keep counting against
    /// the retry budget, and idempotency keys keep side effects
    /// at-most-once.
    pub async fn execute_workflow(
        &self,
        spec: &WorkflowSpec,
    ) -> OrchestratorResult<WorkflowExecutionResult> {
        spec.validate()?;
        let started = Instant::now();
        let mut doc = self.load_or_init_state(spec)?;

        if doc.state.status == WorkflowStatus::Created {
            doc.state.status = WorkflowStatus::Running;
            self.persist_state(&mut doc)?;
            self.event_log.append(
                Event::new(EventType::WorkflowStarted, spec.id.clone())
                    .with_metadata(json!({ "name": spec.name, "tasks": spec.tasks.len() })),
            )?;
        }

        info!(workflow_id = %spec.id, "executing workflow");

        let mut in_flight = FuturesUnordered::new();
        loop {
            self.skip_unreachable(spec, &mut doc)?;

            let mut reused = false;
            if !self.cancelled() {
                let promoted = Self::ready_set(spec, &doc.state);
                if !promoted.is_empty() {
                    for task_id in &promoted {
                        if let Some(ts) = doc.state.task_mut(task_id) {
                            ts.transition(TaskStatus::Ready);
                        }
                    }
                    self.persist_state(&mut doc)?;
                }
                for task_id in Self::dispatchable(spec, &doc.state) {
                    if in_flight.len() >= self.config.max_concurrency {
                        break;
                    }
                    let task = match spec.task(&task_id) {
                        Some(task) => task.clone(),
                        None => continue,
                    };
                    if self.try_reuse_idempotent(spec, &mut doc, &task)? {
                        reused = true;
                        continue;
                    }
                    let attempt = doc
                        .state
                        .task(&task_id)
                        .map(|t| t.attempts)
                        .unwrap_or_default()
                        + 1;
                    if let Some(ts) = doc.state.task_mut(&task_id) {
                        ts.transition(TaskStatus::Running);
                    }
                    self.persist_state(&mut doc)?;
                    in_flight.push(self.run_task(spec.id.clone(), task, attempt, 0));
                }
            }
            // a reuse may have unblocked dependents; rescan before parking
            if reused {
                continue;
            }

            match in_flight.next().await {
                Some(outcome) => {
                    if let Some(retry) = self.apply_outcome(spec, &mut doc, outcome?).await? {
                        if let Some(ts) = doc.state.task_mut(&retry.task.id) {
                            ts.transition(TaskStatus::Running);
                        }
                        self.persist_state(&mut doc)?;
                        in_flight.push(self.run_task(
                            spec.id.clone(),
                            retry.task,
                            retry.attempt,
                            retry.delay_ms,
                        ));
                    }
                }
                None => break,
            }
        }

        self.finalize(spec, &mut doc)?;
        self.build_result(spec, &doc.state, started)
    }

    // ── Scheduling ───────────────────────────────────────────────────

    /// Pending tasks whose prerequisites have all completed, due for
    /// promotion to `Ready`.
    fn ready_set(spec: &WorkflowSpec, state: &WorkflowState) -> Vec<TaskId> {
        spec.tasks
            .iter()
            .filter(|task| {
                state
                    .task(&task.id)
                    .map(|t| t.status == TaskStatus::Pending)
                    .unwrap_or(false)
            })
            .filter(|task| {
                spec.prerequisites(&task.id).iter().all(|dep| {
                    state
                        .task(dep)
                        .map(|t| t.status == TaskStatus::Completed)
                        .unwrap_or(false)
                })
            })
            .map(|task| task.id.clone())
            .collect()
    }

    /// Ready tasks in declaration order, waiting for a worker slot.
    fn dispatchable(spec: &WorkflowSpec, state: &WorkflowState) -> Vec<TaskId> {
        spec.tasks
            .iter()
            .filter(|task| {
                state
                    .task(&task.id)
                    .map(|t| t.status == TaskStatus::Ready)
                    .unwrap_or(false)
            })
            .map(|task| task.id.clone())
            .collect()
    }

    /// Mark pending tasks downstream of a permanent failure as skipped.
    fn skip_unreachable(&self, spec: &WorkflowSpec, doc: &mut WorkflowDoc) -> OrchestratorResult<()> {
        let failed: Vec<TaskId> = doc
            .state
            .tasks
            .iter()
            .filter(|(_, t)| {
                matches!(
                    t.status,
                    TaskStatus::Failed | TaskStatus::Compensated | TaskStatus::Skipped
                )
            })
            .map(|(id, _)| id.clone())
            .collect();

        for failed_id in failed {
            for downstream_id in spec.downstream_of(&failed_id) {
                let should_skip = doc
                    .state
                    .task(&downstream_id)
                    .map(|t| t.status == TaskStatus::Pending)
                    .unwrap_or(false);
                if should_skip {
                    if let Some(ts) = doc.state.task_mut(&downstream_id) {
                        ts.transition(TaskStatus::Skipped);
                        ts.last_error = Some(format!("upstream task {} failed", failed_id));
                    }
                    self.persist_state(doc)?;
                    self.event_log.append(
                        Event::new(EventType::TaskSkipped, spec.id.clone())
                            .with_task(downstream_id.clone())
                            .with_metadata(json!({
                                "cause": "upstream-failure",
                                "upstream": failed_id.to_string(),
                            })),
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Reuse a prior completion recorded under the task's idempotency
    /// key. Returns true when the task was satisfied without execution.
    fn try_reuse_idempotent(
        &self,
        spec: &WorkflowSpec,
        doc: &mut WorkflowDoc,
        task: &TaskSpec,
    ) -> OrchestratorResult<bool> {
        let Some(key) = &task.idempotency_key else {
            return Ok(false);
        };
        let record = match self.store.read(&Self::idempotency_record_key(key)) {
            Ok(entry) => entry,
            Err(StateError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let result_key = record.value["result_key"].as_str().map(str::to_string);
        if let Some(ts) = doc.state.task_mut(&task.id) {
            ts.transition(TaskStatus::Completed);
            ts.result_key = result_key;
        }
        self.persist_state(doc)?;
        self.event_log.append(
            Event::new(EventType::TaskSkipped, spec.id.clone())
                .with_task(task.id.clone())
                .with_metadata(json!({
                    "cause": "idempotent-reuse",
                    "idempotency_key": key,
                })),
        )?;
        debug!(task_id = %task.id, key, "reused prior completion for idempotency key");
        Ok(true)
    }

    // ── Task execution (worker side) ─────────────────────────────────

    /// Run one attempt of a task, after an optional backoff delay.
    ///
    /// Feasibility and policy checks run only on the first attempt;
    /// later attempts (including those resumed from persisted state)
    /// proceed on the decision already recorded.
    async fn run_task(
        &self,
        workflow_id: WorkflowId,
        task: TaskSpec,
        attempt: u32,
        backoff_ms: u64,
    ) -> OrchestratorResult<TaskOutcome> {
        let started = Instant::now();
        let mut cancel = self.cancel_tx.subscribe();

        let outcome = |attempts: u32, verdict: TaskVerdict| TaskOutcome {
            task_id: task.id.clone(),
            attempts,
            duration_ms: started.elapsed().as_millis() as u64,
            verdict,
        };

        if *cancel.borrow() {
            return Ok(outcome(attempt - 1, TaskVerdict::Cancelled));
        }
        if backoff_ms > 0 {
            tokio::select! {
                _ = cancel.changed() => {
                    return Ok(outcome(attempt - 1, TaskVerdict::Cancelled));
                }
                _ = sleep(Duration::from_millis(backoff_ms)) => {}
            }
        }

        if attempt == 1 {
            if let Some(checker) = &self.config.feasibility {
                let verdict = checker.check(&task);
                if !verdict.feasible {
                    let reason = verdict
                        .reason
                        .unwrap_or_else(|| "task is not feasible".to_string());
                    warn!(task_id = %task.id, %reason, "feasibility check failed");
                    return Ok(outcome(
                        0,
                        TaskVerdict::Failed {
                            error: format!("infeasible: {}", reason),
                        },
                    ));
                }
            }

            if let Some(guard) = &self.config.guard {
                let action_id = Self::action_id(&workflow_id, &task.id);
                if guard.is_approved(&action_id)? {
                    // the parked decision was resolved by a human; the
                    // resolution joins the durable trail before execution
                    self.event_log.append(
                        Event::new(EventType::PolicyDecision, workflow_id.clone())
                            .with_task(task.id.clone())
                            .with_metadata(json!({
                                "action_id": action_id,
                                "allowed": true,
                                "requires_human_approval": false,
                                "resolution": "human-approved",
                                "principal": self.config.principal.id,
                            })),
                    )?;
                } else {
                    let action = Self::action_for(&action_id, &task);
                    let decision = guard.evaluate(
                        &self.config.principal,
                        &action,
                        task.tool_name.as_deref(),
                    )?;
                    self.event_log.append(
                        Event::new(EventType::PolicyDecision, workflow_id.clone())
                            .with_task(task.id.clone())
                            .with_metadata(json!({
                                "action_id": action_id,
                                "allowed": decision.allowed,
                                "requires_human_approval": decision.requires_human_approval,
                                "reason": decision.reason,
                                "principal": self.config.principal.id,
                            })),
                    )?;
                    if decision.requires_human_approval {
                        // surface the pending approval (including its
                        // one-time token) through the store so an approval
                        // console can find it; the audit trail never
                        // carries the raw token
                        if let Some(token) = &decision.approval_token {
                            self.put(
                                &Self::approval_key(&action_id),
                                json!({
                                    "token": token,
                                    "workflow_id": workflow_id.to_string(),
                                    "task_id": task.id.to_string(),
                                    "risk_tier": task.risk_tier,
                                    "reason": decision.reason,
                                }),
                            )?;
                        }
                        return Ok(outcome(0, TaskVerdict::AwaitingApproval));
                    }
                    if !decision.allowed {
                        return Ok(outcome(
                            0,
                            TaskVerdict::Failed {
                                error: format!("policy rejected: {}", decision.reason),
                            },
                        ));
                    }
                }
            }
        }

        self.event_log.append(
            Event::new(EventType::TaskStarted, workflow_id.clone())
                .with_task(task.id.clone())
                .with_metadata(json!({ "attempt": attempt })),
        )?;

        let error = match self.invoke_executor(&task, &mut cancel).await {
            Ok(value) => {
                if let Some(gate) = &self.config.gate {
                    let commit_id = format!("{}:{}:{}", workflow_id, task.id, attempt);
                    let report = gate.validate(&Commit::new(commit_id, value.clone()));
                    self.event_log.append(
                        Event::new(EventType::CrvResult, workflow_id.clone())
                            .with_task(task.id.clone())
                            .with_metadata(json!({
                                "blocked_commit": report.blocked_commit,
                                "failures": report.failures,
                            })),
                    )?;
                    if report.blocked_commit {
                        // a blocked commit is a logical defect, not a
                        // transient fault: fail without retry
                        let reasons: Vec<&str> =
                            report.failures.iter().map(|f| f.reason.as_str()).collect();
                        return Ok(outcome(
                            attempt,
                            TaskVerdict::Failed {
                                error: format!("commit blocked: {}", reasons.join("; ")),
                            },
                        ));
                    }
                }
                return Ok(outcome(attempt, TaskVerdict::Completed(value)));
            }
            Err(AttemptError::Cancelled) => {
                self.event_log.append(
                    Event::new(EventType::TaskTimeout, workflow_id.clone())
                        .with_task(task.id.clone())
                        .with_metadata(json!({ "cause": "cancelled", "attempt": attempt })),
                )?;
                return Ok(outcome(attempt, TaskVerdict::Cancelled));
            }
            Err(AttemptError::Timeout) => {
                self.event_log.append(
                    Event::new(EventType::TaskTimeout, workflow_id.clone())
                        .with_task(task.id.clone())
                        .with_metadata(json!({
                            "timeout_ms": task.timeout_ms,
                            "attempt": attempt,
                        })),
                )?;
                format!("timed out after {}ms", task.timeout_ms.unwrap_or_default())
            }
            Err(AttemptError::Executor(e)) if !e.retryable => {
                return Ok(outcome(attempt, TaskVerdict::Failed { error: e.message }));
            }
            Err(AttemptError::Executor(e)) => e.message,
        };

        let retry = task.retry.clone().unwrap_or_default();
        if attempt >= retry.max_attempts.max(1) {
            return Ok(outcome(attempt, TaskVerdict::Failed { error }));
        }
        let mut delay_ms = retry.backoff_ms(attempt - 1);
        if retry.jitter {
            delay_ms = jittered(delay_ms);
        }
        Ok(outcome(attempt, TaskVerdict::Retry { error, delay_ms }))
    }

    async fn invoke_executor(
        &self,
        task: &TaskSpec,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<serde_json::Value, AttemptError> {
        if *cancel.borrow() {
            return Err(AttemptError::Cancelled);
        }
        let execution = async {
            match task.timeout_ms {
                Some(ms) => timeout(Duration::from_millis(ms), self.executor.execute(task))
                    .await
                    .map_err(|_| AttemptError::Timeout)?
                    .map_err(AttemptError::Executor),
                None => self
                    .executor
                    .execute(task)
                    .await
                    .map_err(AttemptError::Executor),
            }
        };
        tokio::select! {
            _ = cancel.changed() => Err(AttemptError::Cancelled),
            result = execution => result,
        }
    }

    fn action_for(action_id: &str, task: &TaskSpec) -> Action {
        let mut action = Action::new(action_id, task.name.clone(), task.risk_tier);
        action.required_permissions = task.required_permissions.clone();
        action.allowed_tools = task.allowed_tools.clone();
        action.intent = task.intent;
        action.data_zone = task.data_zone;
        action
    }

    // ── Outcome handling (scheduler side) ────────────────────────────

    async fn apply_outcome(
        &self,
        spec: &WorkflowSpec,
        doc: &mut WorkflowDoc,
        outcome: TaskOutcome,
    ) -> OrchestratorResult<Option<RetryDispatch>> {
        let TaskOutcome {
            task_id,
            attempts,
            duration_ms,
            verdict,
        } = outcome;

        match verdict {
            TaskVerdict::Completed(value) => {
                self.commit_completion(spec, doc, &task_id, attempts, duration_ms, value)?;
                Ok(None)
            }
            TaskVerdict::AwaitingApproval => {
                if let Some(ts) = doc.state.task_mut(&task_id) {
                    ts.transition(TaskStatus::AwaitingApproval);
                }
                self.persist_state(doc)?;
                info!(task_id = %task_id, "task parked awaiting human approval");
                Ok(None)
            }
            TaskVerdict::Cancelled => {
                if let Some(ts) = doc.state.task_mut(&task_id) {
                    ts.transition(TaskStatus::Failed);
                    ts.attempts = attempts;
                    ts.last_error = Some("workflow cancelled".to_string());
                }
                self.persist_state(doc)?;
                self.event_log.append(
                    Event::new(EventType::TaskFailed, spec.id.clone())
                        .with_task(task_id)
                        .with_metadata(json!({ "error": "workflow cancelled" })),
                )?;
                Ok(None)
            }
            TaskVerdict::Failed { error } => {
                self.commit_failure(spec, doc, &task_id, attempts, error).await?;
                Ok(None)
            }
            TaskVerdict::Retry { error, delay_ms } => {
                if let Some(ts) = doc.state.task_mut(&task_id) {
                    ts.transition(TaskStatus::Retrying);
                    ts.attempts = attempts;
                    ts.last_error = Some(error.clone());
                }
                self.persist_state(doc)?;
                self.event_log.append(
                    Event::new(EventType::TaskRetry, spec.id.clone())
                        .with_task(task_id.clone())
                        .with_metadata(json!({
                            "next_attempt": attempts + 1,
                            "delay_ms": delay_ms,
                            "error": error,
                        })),
                )?;
                debug!(task_id = %task_id, attempts, delay_ms, "task re-enqueued after backoff");
                Ok(spec.task(&task_id).cloned().map(|task| RetryDispatch {
                    task,
                    attempt: attempts + 1,
                    delay_ms,
                }))
            }
        }
    }

    fn commit_completion(
        &self,
        spec: &WorkflowSpec,
        doc: &mut WorkflowDoc,
        task_id: &TaskId,
        attempts: u32,
        duration_ms: u64,
        value: serde_json::Value,
    ) -> OrchestratorResult<()> {
        let result_key = Self::result_key(&spec.id, task_id);
        self.put(&result_key, value.clone())?;

        if let Some(task) = spec.task(task_id) {
            if let Some(key) = &task.idempotency_key {
                let record = json!({
                    "workflow_id": spec.id.to_string(),
                    "task_id": task_id.to_string(),
                    "result_key": result_key,
                });
                match self.store.create(Self::idempotency_record_key(key), record) {
                    Ok(_) | Err(StateError::AlreadyExists(_)) => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        if let Some(ts) = doc.state.task_mut(task_id) {
            ts.transition(TaskStatus::Completed);
            ts.attempts = attempts;
            ts.result_key = Some(result_key);
            ts.last_error = None;
        }
        self.persist_state(doc)?;

        let snapshot_id = match &self.config.snapshots {
            Some(snapshots) => {
                let pointers = self
                    .memory
                    .as_ref()
                    .map(|m| m.current())
                    .unwrap_or_default();
                let risk_tier = spec.task(task_id).map(|t| t.risk_tier);
                let snapshot = snapshots.create_snapshot(
                    spec.id.clone(),
                    task_id.clone(),
                    "post-commit",
                    self.store.snapshot()?,
                    pointers,
                    true,
                    risk_tier,
                )?;
                Some(snapshot.id.to_string())
            }
            None => None,
        };

        self.event_log.append(
            Event::new(EventType::TaskCompleted, spec.id.clone())
                .with_task(task_id.clone())
                .with_metadata(json!({
                    "attempts": attempts,
                    "duration_ms": duration_ms,
                    "snapshot_id": snapshot_id,
                })),
        )?;
        info!(task_id = %task_id, attempts, "task completed");
        Ok(())
    }

    async fn commit_failure(
        &self,
        spec: &WorkflowSpec,
        doc: &mut WorkflowDoc,
        task_id: &TaskId,
        attempts: u32,
        error: String,
    ) -> OrchestratorResult<()> {
        warn!(task_id = %task_id, attempts, %error, "task permanently failed");
        if let Some(ts) = doc.state.task_mut(task_id) {
            ts.transition(TaskStatus::Failed);
            ts.attempts = attempts;
            ts.last_error = Some(error.clone());
        }
        self.persist_state(doc)?;
        self.event_log.append(
            Event::new(EventType::TaskFailed, spec.id.clone())
                .with_task(task_id.clone())
                .with_metadata(json!({ "error": error, "attempts": attempts })),
        )?;

        let task = spec.task(task_id);
        let has_compensation = task.map(|t| t.compensation.is_some()).unwrap_or(false);
        if let (Some(task), true, true) =
            (task, has_compensation, self.config.compensation.is_some())
        {
            if let Some(ts) = doc.state.task_mut(task_id) {
                ts.transition(TaskStatus::Compensating);
            }
            self.persist_state(doc)?;
            self.event_log.append(
                Event::new(EventType::CompensationTriggered, spec.id.clone())
                    .with_task(task_id.clone())
                    .with_metadata(json!({ "error": error })),
            )?;

            let final_status = if self.run_compensation(task, &error, attempts).await {
                TaskStatus::Compensated
            } else {
                TaskStatus::Failed
            };
            if let Some(ts) = doc.state.task_mut(task_id) {
                ts.transition(final_status);
            }
            self.persist_state(doc)?;
        }
        Ok(())
    }

    /// Best-effort, bounded compensation. Failures are logged and never
    /// escalated.
    async fn run_compensation(&self, task: &TaskSpec, error: &str, attempts: u32) -> bool {
        let Some(executor) = &self.config.compensation else {
            return false;
        };
        let failure = FailureContext {
            error: error.to_string(),
            attempts,
        };
        for attempt in 1..=COMPENSATION_ATTEMPTS {
            match executor.execute(task, &failure).await {
                Ok(()) => {
                    info!(task_id = %task.id, attempt, "compensation succeeded");
                    return true;
                }
                Err(e) => {
                    warn!(task_id = %task.id, attempt, error = %e, "compensation attempt failed");
                }
            }
        }
        false
    }

    // ── Persistence & finalization ───────────────────────────────────

    fn load_or_init_state(&self, spec: &WorkflowSpec) -> OrchestratorResult<WorkflowDoc> {
        let key = Self::workflow_key(&spec.id);
        match self.store.read(&key) {
            Ok(entry) => {
                let version = entry.version;
                let mut state: WorkflowState = serde_json::from_value(entry.value)?;
                // A crash can strand tasks mid-flight, and parked tasks
                // need rescheduling once the human decision has landed.
                // Both re-enter through the normal pipeline: attempt
                // counts stay, so the retry budget keeps counting, and
                // the guard's pending record makes the approval check
                // idempotent.
                let stranded: Vec<TaskId> = state
                    .tasks
                    .iter()
                    .filter(|(_, t)| {
                        matches!(
                            t.status,
                            TaskStatus::Ready
                                | TaskStatus::Running
                                | TaskStatus::Retrying
                                | TaskStatus::Compensating
                                | TaskStatus::AwaitingApproval
                        )
                    })
                    .map(|(id, _)| id.clone())
                    .collect();
                for id in stranded {
                    if let Some(ts) = state.task_mut(&id) {
                        ts.transition(TaskStatus::Pending);
                    }
                }
                debug!(workflow_id = %spec.id, "resuming from persisted workflow state");
                Ok(WorkflowDoc { state, version })
            }
            Err(StateError::NotFound(_)) => {
                let state =
                    WorkflowState::new(spec.id.clone(), spec.tasks.iter().map(|t| t.id.clone()));
                let entry = self.store.create(&key, serde_json::to_value(&state)?)?;
                Ok(WorkflowDoc {
                    state,
                    version: entry.version,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Persist the workflow state under its optimistic lock.
    ///
    /// A `Conflict` here means another invocation (or an external
    /// writer) touched the workflow record; the run aborts instead of
    /// overwriting their update.
    fn persist_state(&self, doc: &mut WorkflowDoc) -> OrchestratorResult<()> {
        let key = Self::workflow_key(&doc.state.workflow_id);
        let entry = self
            .store
            .update(&key, serde_json::to_value(&doc.state)?, doc.version)?;
        doc.version = entry.version;
        Ok(())
    }

    /// Create-or-update under the version check, for keys owned by the
    /// writing task (results, idempotency records, pending approvals).
    fn put(&self, key: &str, value: serde_json::Value) -> OrchestratorResult<()> {
        match self.store.create(key, value.clone()) {
            Ok(_) => Ok(()),
            Err(StateError::AlreadyExists(_)) => {
                let current = self.store.read(key)?;
                self.store.update(key, value, current.version)?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn finalize(&self, spec: &WorkflowSpec, doc: &mut WorkflowDoc) -> OrchestratorResult<()> {
        if doc.state.all_tasks_succeeded() {
            doc.state.status = WorkflowStatus::Completed;
            self.persist_state(doc)?;
            self.event_log
                .append(Event::new(EventType::WorkflowCompleted, spec.id.clone()))?;
            info!(workflow_id = %spec.id, "workflow completed");
        } else if doc.state.any_task_failed() || self.cancelled() {
            doc.state.status = WorkflowStatus::Failed;
            self.persist_state(doc)?;
            let errors: HashMap<String, String> = doc
                .state
                .tasks
                .iter()
                .filter_map(|(id, t)| {
                    t.last_error.as_ref().map(|e| (id.to_string(), e.clone()))
                })
                .collect();
            self.event_log.append(
                Event::new(EventType::WorkflowFailed, spec.id.clone())
                    .with_metadata(json!({ "task_errors": errors })),
            )?;
            warn!(workflow_id = %spec.id, "workflow failed");
        } else if doc.state.any_awaiting_approval() {
            // suspended, not terminal: a later invocation resumes once
            // the human decision lands
            doc.state.status = WorkflowStatus::Running;
            self.persist_state(doc)?;
            info!(workflow_id = %spec.id, "workflow suspended awaiting approval");
        }
        Ok(())
    }

    fn build_result(
        &self,
        spec: &WorkflowSpec,
        state: &WorkflowState,
        started: Instant,
    ) -> OrchestratorResult<WorkflowExecutionResult> {
        let mut task_results = HashMap::new();
        for (task_id, task_state) in &state.tasks {
            let result = task_state
                .result_key
                .as_ref()
                .and_then(|key| self.store.read(key).ok())
                .map(|entry| entry.value);
            task_results.insert(
                task_id.clone(),
                TaskExecutionResult {
                    task_id: task_id.clone(),
                    status: task_state.status,
                    attempts: task_state.attempts,
                    result,
                    error: task_state.last_error.clone(),
                    duration_ms: None,
                },
            );
        }

        let error = match state.status {
            WorkflowStatus::Failed => Some(
                state
                    .tasks
                    .values()
                    .filter_map(|t| t.last_error.clone())
                    .collect::<Vec<_>>()
                    .join("; "),
            ),
            _ => None,
        };

        Ok(WorkflowExecutionResult {
            workflow_id: spec.id.clone(),
            status: state.status,
            task_results,
            error,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Jitter a delay to between 50% and 100% of its nominal value.
fn jittered(delay_ms: u64) -> u64 {
    if delay_ms == 0 {
        return 0;
    }
    let half = delay_ms / 2;
    half + rand::thread_rng().gen_range(0..=delay_ms - half)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alder_types::TaskKind;

    fn state_for(spec: &WorkflowSpec) -> WorkflowState {
        WorkflowState::new(spec.id.clone(), spec.tasks.iter().map(|t| t.id.clone()))
    }

    fn chain_spec() -> WorkflowSpec {
        WorkflowSpec::new("wf", "chain")
            .with_task(TaskSpec::new("a", TaskKind::Action))
            .with_task(TaskSpec::new("b", TaskKind::Action))
            .with_task(TaskSpec::new("c", TaskKind::Action))
            .with_dependency("b", "a")
            .with_dependency("c", "b")
    }

    #[test]
    fn ready_set_respects_dependencies() {
        let spec = chain_spec();
        let mut state = state_for(&spec);

        let ready = Orchestrator::ready_set(&spec, &state);
        assert_eq!(ready, vec![TaskId::new("a")]);

        state
            .task_mut(&TaskId::new("a"))
            .unwrap()
            .transition(TaskStatus::Completed);
        let ready = Orchestrator::ready_set(&spec, &state);
        assert_eq!(ready, vec![TaskId::new("b")]);
    }

    #[test]
    fn ready_set_excludes_running_and_terminal() {
        let spec = chain_spec();
        let mut state = state_for(&spec);
        state
            .task_mut(&TaskId::new("a"))
            .unwrap()
            .transition(TaskStatus::Running);
        assert!(Orchestrator::ready_set(&spec, &state).is_empty());
    }

    #[test]
    fn dispatchable_returns_ready_tasks_only() {
        let spec = chain_spec();
        let mut state = state_for(&spec);
        assert!(Orchestrator::dispatchable(&spec, &state).is_empty());

        state
            .task_mut(&TaskId::new("a"))
            .unwrap()
            .transition(TaskStatus::Ready);
        assert_eq!(
            Orchestrator::dispatchable(&spec, &state),
            vec![TaskId::new("a")]
        );
    }

    #[test]
    fn jitter_stays_within_bounds() {
        for _ in 0..100 {
            let d = jittered(1000);
            assert!((500..=1000).contains(&d));
        }
        assert_eq!(jittered(0), 0);
    }

    #[test]
    fn action_built_from_task_carries_policy_fields() {
        let task = TaskSpec::new("t", TaskKind::Action)
            .with_tool("transfer_funds")
            .with_risk_tier(alder_types::RiskTier::High);
        let action = Orchestrator::action_for("wf:t", &task);
        assert_eq!(action.id, "wf:t");
        assert_eq!(action.risk_tier, alder_types::RiskTier::High);
    }
}
