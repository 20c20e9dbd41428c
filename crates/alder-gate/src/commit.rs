//! Commits: proposed state changes awaiting validation

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A proposed state change to be validated before it becomes durable.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,
    /// Arbitrary structured payload under validation
    pub data: serde_json::Value,
    /// The state being replaced, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_state: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Commit {
    pub fn new(id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            data,
            previous_state: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_previous_state(mut self, previous: serde_json::Value) -> Self {
        self.previous_state = Some(previous);
        self
    }
}
