//! Structured diffs between state snapshots

use crate::{StateEntry, StateSnapshot};
use serde::{Deserialize, Serialize};

/// A single per-key difference.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum StateDiffOp {
    Created {
        key: String,
        after: StateEntry,
    },
    Updated {
        key: String,
        before: StateEntry,
        after: StateEntry,
    },
    Deleted {
        key: String,
        before: StateEntry,
    },
}

/// All differences between two snapshots, grouped by operation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDiff {
    pub created: Vec<StateDiffOp>,
    pub updated: Vec<StateDiffOp>,
    pub deleted: Vec<StateDiffOp>,
}

impl StateDiff {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }
}

/// Compute the structured difference from `before` to `after`.
///
/// Entries are compared by value and version; keys come out in sorted
/// order because snapshots are backed by a `BTreeMap`.
pub fn diff_snapshots(before: &StateSnapshot, after: &StateSnapshot) -> StateDiff {
    let mut diff = StateDiff::default();

    for (key, after_entry) in &after.entries {
        match before.entries.get(key) {
            None => diff.created.push(StateDiffOp::Created {
                key: key.clone(),
                after: after_entry.clone(),
            }),
            Some(before_entry) if before_entry != after_entry => {
                diff.updated.push(StateDiffOp::Updated {
                    key: key.clone(),
                    before: before_entry.clone(),
                    after: after_entry.clone(),
                });
            }
            Some(_) => {}
        }
    }

    for (key, before_entry) in &before.entries {
        if !after.entries.contains_key(key) {
            diff.deleted.push(StateDiffOp::Deleted {
                key: key.clone(),
                before: before_entry.clone(),
            });
        }
    }

    diff
}
