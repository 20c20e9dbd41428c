//! Event log backends

use crate::{Event, LedgerResult};
use crate::LedgerError;
use alder_types::WorkflowId;
use chrono::{DateTime, Utc};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use tracing::debug;

/// Append-only event log.
///
/// `append` must complete before the triggering state transition is
/// considered committed; there is no update or delete.
pub trait EventLog: Send + Sync {
    /// Durably record an event.
    fn append(&self, event: Event) -> LedgerResult<()>;

    /// All events for a workflow, in append order.
    fn read(&self, workflow_id: &WorkflowId) -> LedgerResult<Vec<Event>>;

    /// All events whose timestamp falls within `[start, end]`, across
    /// workflows, in append order.
    fn read_in_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> LedgerResult<Vec<Event>>;
}

// ── In-memory backend ────────────────────────────────────────────────

/// In-memory event log for tests and embedded use.
pub struct MemoryEventLog {
    events: RwLock<Vec<Event>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
        }
    }

    /// Every recorded event regardless of workflow.
    pub fn all(&self) -> Vec<Event> {
        self.events.read().map(|e| e.clone()).unwrap_or_default()
    }
}

impl Default for MemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog for MemoryEventLog {
    fn append(&self, event: Event) -> LedgerResult<()> {
        let mut events = self.events.write().map_err(|_| LedgerError::LockPoisoned)?;
        events.push(event);
        Ok(())
    }

    fn read(&self, workflow_id: &WorkflowId) -> LedgerResult<Vec<Event>> {
        let events = self.events.read().map_err(|_| LedgerError::LockPoisoned)?;
        Ok(events
            .iter()
            .filter(|e| &e.workflow_id == workflow_id)
            .cloned()
            .collect())
    }

    fn read_in_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> LedgerResult<Vec<Event>> {
        let events = self.events.read().map_err(|_| LedgerError::LockPoisoned)?;
        Ok(events
            .iter()
            .filter(|e| e.timestamp >= start && e.timestamp <= end)
            .cloned()
            .collect())
    }
}

// ── File backend ─────────────────────────────────────────────────────

/// File-backed event log: one JSON record per line under
/// `<root>/<workflow_id>/events.jsonl`, flushed and synced per append.
pub struct FileEventLog {
    root: PathBuf,
    // Serializes appends so concurrent writers cannot interleave lines.
    write_lock: Mutex<()>,
}

impl FileEventLog {
    pub fn new(root: impl Into<PathBuf>) -> LedgerResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn workflow_path(&self, workflow_id: &WorkflowId) -> PathBuf {
        self.root.join(&workflow_id.0).join("events.jsonl")
    }

    fn read_file(path: &Path) -> LedgerResult<Vec<Event>> {
        let contents = fs::read_to_string(path)?;
        let mut events = Vec::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(line)?);
        }
        Ok(events)
    }
}

impl EventLog for FileEventLog {
    fn append(&self, event: Event) -> LedgerResult<()> {
        let _guard = self.write_lock.lock().map_err(|_| LedgerError::LockPoisoned)?;
        let path = self.workflow_path(&event.workflow_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(&event)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        writeln!(file, "{}", line)?;
        file.flush()?;
        file.sync_all()?;
        debug!(workflow_id = %event.workflow_id, event = ?event.event_type, "event appended");
        Ok(())
    }

    fn read(&self, workflow_id: &WorkflowId) -> LedgerResult<Vec<Event>> {
        let path = self.workflow_path(workflow_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        Self::read_file(&path)
    }

    fn read_in_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> LedgerResult<Vec<Event>> {
        let mut events = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path().join("events.jsonl");
            if path.exists() {
                events.extend(Self::read_file(&path)?);
            }
        }
        events.retain(|e| e.timestamp >= start && e.timestamp <= end);
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventType;
    use alder_types::TaskId;
    use chrono::Duration;

    fn sample(workflow: &str, event_type: EventType) -> Event {
        Event::new(event_type, WorkflowId::new(workflow)).with_task(TaskId::new("t1"))
    }

    #[test]
    fn memory_log_preserves_append_order() {
        let log = MemoryEventLog::new();
        log.append(sample("wf", EventType::WorkflowStarted)).unwrap();
        log.append(sample("wf", EventType::TaskStarted)).unwrap();
        log.append(sample("other", EventType::WorkflowStarted)).unwrap();
        log.append(sample("wf", EventType::TaskCompleted)).unwrap();

        let events = log.read(&WorkflowId::new("wf")).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event_type, EventType::WorkflowStarted);
        assert_eq!(events[1].event_type, EventType::TaskStarted);
        assert_eq!(events[2].event_type, EventType::TaskCompleted);
    }

    #[test]
    fn memory_log_time_range_is_inclusive() {
        let log = MemoryEventLog::new();
        let event = sample("wf", EventType::TaskStarted);
        let at = event.timestamp;
        log.append(event).unwrap();

        let hit = log.read_in_time_range(at, at).unwrap();
        assert_eq!(hit.len(), 1);

        let miss = log
            .read_in_time_range(at + Duration::seconds(1), at + Duration::seconds(2))
            .unwrap();
        assert!(miss.is_empty());
    }

    #[test]
    fn file_log_round_trips_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileEventLog::new(dir.path()).unwrap();
        log.append(sample("wf-1", EventType::WorkflowStarted)).unwrap();
        log.append(sample("wf-1", EventType::TaskCompleted)).unwrap();
        log.append(sample("wf-2", EventType::WorkflowStarted)).unwrap();

        let events = log.read(&WorkflowId::new("wf-1")).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_type, EventType::TaskCompleted);

        // one JSON record per line under the workflow's directory
        let raw = std::fs::read_to_string(dir.path().join("wf-1").join("events.jsonl")).unwrap();
        assert_eq!(raw.lines().count(), 2);
        for line in raw.lines() {
            serde_json::from_str::<serde_json::Value>(line).unwrap();
        }
    }

    #[test]
    fn file_log_read_missing_workflow_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileEventLog::new(dir.path()).unwrap();
        assert!(log.read(&WorkflowId::new("ghost")).unwrap().is_empty());
    }
}
