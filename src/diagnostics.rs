//! Structured validation diagnostics
//!
//! Schema-mode and fallback-mode validation report through the same record so
//! downstream code can log or persist a rejection without knowing which mode
//! produced it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which validator produced a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Compiled JSON Schema contract
    Schema,
    /// Minimal required-field checks used before a contract exists
    Fallback,
}

/// Outcome of validating one document
pub type ValidationOutcome = (bool, Option<Diagnostic>);

/// A single violation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub message: String,
    /// Dotted path of the failing node; empty for the document root
    pub field_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Failures of the alternatives of a composite (`anyOf`/`oneOf`) node
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_violations: Vec<Violation>,
}

impl Violation {
    pub fn new(message: impl Into<String>, field_path: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field_path: field_path.into(),
            value: None,
            sub_violations: Vec::new(),
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_sub_violations(mut self, sub_violations: Vec<Violation>) -> Self {
        self.sub_violations = sub_violations;
        self
    }
}

/// Loggable description of a rejected document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub mode: ValidationMode,
    /// Human-readable lines, in the order they were found
    pub validation_errors: Vec<String>,
    /// Dotted path of the first failing node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_validation_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
    #[serde(default)]
    pub validation_system_error: bool,
}

impl Diagnostic {
    /// Build a diagnostic from violations; `None` when there are none.
    pub fn from_violations(mode: ValidationMode, violations: Vec<Violation>) -> Option<Self> {
        let first = violations.first()?;

        let field_path = (!first.field_path.is_empty()).then(|| first.field_path.clone());
        let failed_value = first.value.clone();
        let schema_validation_error = match mode {
            ValidationMode::Schema => Some(first.message.clone()),
            ValidationMode::Fallback => None,
        };

        let mut validation_errors = Vec::new();
        for (index, violation) in violations.iter().enumerate() {
            match mode {
                ValidationMode::Schema if index == 0 => {
                    validation_errors.push(format!("Schema validation failed: {}", violation.message));
                    if let Some(path) = &field_path {
                        validation_errors.push(format!("Field path: {}", path));
                    }
                    for sub in &violation.sub_violations {
                        validation_errors.push(format!("Sub error: {}", sub.message));
                    }
                }
                ValidationMode::Schema if !violation.field_path.is_empty() => {
                    validation_errors.push(format!("{} (at {})", violation.message, violation.field_path));
                }
                _ => validation_errors.push(violation.message.clone()),
            }
        }

        Some(Self {
            mode,
            validation_errors,
            field_path,
            schema_validation_error,
            failed_value,
            violations,
            validation_system_error: false,
        })
    }

    /// Diagnostic for a failure inside the validator itself
    pub fn system_error(mode: ValidationMode, reason: impl std::fmt::Display) -> Self {
        Self {
            mode,
            validation_errors: vec![format!("Validation system error: {}", reason)],
            field_path: None,
            schema_validation_error: None,
            failed_value: None,
            violations: Vec::new(),
            validation_system_error: true,
        }
    }

    /// Whether any violation is located at `path`
    pub fn names_field(&self, path: &str) -> bool {
        self.field_path.as_deref() == Some(path) || self.violations.iter().any(|v| v.field_path == path)
    }

    /// Serialize for storage alongside a rejected record
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Collapse a violation list into the `(is_valid, diagnostic)` pair
pub fn outcome(mode: ValidationMode, violations: Vec<Violation>) -> ValidationOutcome {
    match Diagnostic::from_violations(mode, violations) {
        Some(diagnostic) => (false, Some(diagnostic)),
        None => (true, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_no_violations_is_valid() {
        assert_eq!(outcome(ValidationMode::Schema, vec![]), (true, None));
    }

    #[test]
    fn test_schema_diagnostic_layout() {
        let violation = Violation::new("\"x\" is not of type \"integer\"", "a")
            .with_value(json!("x"))
            .with_sub_violations(vec![Violation::new("branch failed", "a")]);
        let (valid, diagnostic) = outcome(ValidationMode::Schema, vec![violation]);
        let diagnostic = diagnostic.unwrap();

        assert!(!valid);
        assert_eq!(diagnostic.field_path.as_deref(), Some("a"));
        assert_eq!(diagnostic.failed_value, Some(json!("x")));
        assert_eq!(
            diagnostic.validation_errors,
            vec![
                "Schema validation failed: \"x\" is not of type \"integer\"".to_string(),
                "Field path: a".to_string(),
                "Sub error: branch failed".to_string(),
            ]
        );
        assert!(!diagnostic.validation_system_error);
    }

    #[test]
    fn test_fallback_diagnostic_names_field() {
        let (_, diagnostic) = outcome(
            ValidationMode::Fallback,
            vec![Violation::new("Missing required field: language", "language")],
        );
        let diagnostic = diagnostic.unwrap();

        assert!(diagnostic.names_field("language"));
        assert!(diagnostic.schema_validation_error.is_none());
        assert_eq!(diagnostic.validation_errors, vec!["Missing required field: language".to_string()]);
    }

    #[test]
    fn test_system_error_flag_serializes() {
        let diagnostic = Diagnostic::system_error(ValidationMode::Schema, "boom");
        let v = diagnostic.to_json();
        assert_eq!(v["validation_system_error"], true);
        assert_eq!(v["validation_errors"][0], "Validation system error: boom");
    }
}
