//! Validator kinds: a tagged union dispatched exhaustively
//!
//! Loosely-typed validator closures from ad hoc configurations are
//! abstracted into three kinds: `NotNull`, `SchemaMatch`, and `Custom`.
//! All are pure functions of the commit payload.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Stable failure codes for validation failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureTaxonomy {
    MissingData,
    Conflict,
    OutOfScope,
    LowConfidence,
    PolicyViolation,
    ToolError,
    NonDeterminism,
}

/// Expected JSON type of a schema field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl FieldType {
    fn matches(&self, value: &serde_json::Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Object => value.is_object(),
            FieldType::Array => value.is_array(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
            FieldType::Array => "array",
        };
        write!(f, "{}", s)
    }
}

/// Verdict of a single validator run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_code: Option<FailureTaxonomy>,
}

impl ValidationResult {
    pub fn pass() -> Self {
        Self {
            valid: true,
            reason: None,
            failure_code: None,
        }
    }

    pub fn fail(reason: impl Into<String>, code: FailureTaxonomy) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
            failure_code: Some(code),
        }
    }
}

/// Predicate type for custom validators. Must be pure.
pub type ValidatorFn = Arc<dyn Fn(&serde_json::Value) -> ValidationResult + Send + Sync>;

/// A validator in the gate's ordered list.
#[derive(Clone)]
pub enum Validator {
    /// The payload must not be JSON null.
    NotNull,
    /// Each named field must be present with the declared type.
    SchemaMatch { fields: BTreeMap<String, FieldType> },
    /// Caller-supplied pure predicate.
    Custom { name: String, predicate: ValidatorFn },
}

impl Validator {
    pub fn schema(fields: impl IntoIterator<Item = (String, FieldType)>) -> Self {
        Validator::SchemaMatch {
            fields: fields.into_iter().collect(),
        }
    }

    pub fn custom(
        name: impl Into<String>,
        predicate: impl Fn(&serde_json::Value) -> ValidationResult + Send + Sync + 'static,
    ) -> Self {
        Validator::Custom {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Validator::NotNull => "not_null".to_string(),
            Validator::SchemaMatch { .. } => "schema_match".to_string(),
            Validator::Custom { name, .. } => name.clone(),
        }
    }

    /// Run this validator against a payload.
    pub fn run(&self, payload: &serde_json::Value) -> ValidationResult {
        match self {
            Validator::NotNull => {
                if payload.is_null() {
                    ValidationResult::fail("payload is null", FailureTaxonomy::MissingData)
                } else {
                    ValidationResult::pass()
                }
            }
            Validator::SchemaMatch { fields } => {
                let Some(object) = payload.as_object() else {
                    return ValidationResult::fail(
                        "payload is not an object",
                        FailureTaxonomy::MissingData,
                    );
                };
                for (field, expected) in fields {
                    match object.get(field) {
                        None => {
                            return ValidationResult::fail(
                                format!("missing field: {}", field),
                                FailureTaxonomy::MissingData,
                            );
                        }
                        Some(value) if !expected.matches(value) => {
                            return ValidationResult::fail(
                                format!("field {} is not a {}", field, expected),
                                FailureTaxonomy::Conflict,
                            );
                        }
                        Some(_) => {}
                    }
                }
                ValidationResult::pass()
            }
            Validator::Custom { predicate, .. } => predicate(payload),
        }
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validator::NotNull => write!(f, "NotNull"),
            Validator::SchemaMatch { fields } => {
                write!(f, "SchemaMatch({} fields)", fields.len())
            }
            Validator::Custom { name, .. } => write!(f, "Custom({})", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn not_null_rejects_null_only() {
        assert!(!Validator::NotNull.run(&json!(null)).valid);
        assert!(Validator::NotNull.run(&json!(0)).valid);
        assert!(Validator::NotNull.run(&json!({})).valid);
    }

    #[test]
    fn schema_match_checks_presence_and_type() {
        let validator = Validator::schema(vec![
            ("amount".to_string(), FieldType::Number),
            ("currency".to_string(), FieldType::String),
        ]);

        assert!(validator.run(&json!({"amount": 5, "currency": "EUR"})).valid);

        let missing = validator.run(&json!({"amount": 5}));
        assert!(!missing.valid);
        assert_eq!(missing.failure_code, Some(FailureTaxonomy::MissingData));

        let wrong_type = validator.run(&json!({"amount": "five", "currency": "EUR"}));
        assert!(!wrong_type.valid);
        assert_eq!(wrong_type.failure_code, Some(FailureTaxonomy::Conflict));
    }

    #[test]
    fn custom_validator_runs_predicate() {
        let validator = Validator::custom("non_negative", |payload| {
            match payload.get("amount").and_then(|a| a.as_f64()) {
                Some(amount) if amount >= 0.0 => ValidationResult::pass(),
                _ => ValidationResult::fail("amount must be >= 0", FailureTaxonomy::OutOfScope),
            }
        });
        assert!(validator.run(&json!({"amount": 1.0})).valid);
        assert!(!validator.run(&json!({"amount": -1.0})).valid);
    }
}
