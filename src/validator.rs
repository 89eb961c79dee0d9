//! Contract compilation and document validation
//!
//! A [`ValidatorEngine`] turns a [`Contract`] into a [`DocumentValidator`]. The
//! registry only talks to these traits, so another validator backend can be
//! swapped in without touching the lifecycle logic. [`Draft7Engine`] is the
//! default backend, built on the `jsonschema` crate.

use jsonschema::error::ValidationErrorKind;
use jsonschema::{Draft, JSONSchema, ValidationError};
use serde_json::Value;
use tracing::debug;

use crate::diagnostics::Violation;
use crate::error::{RegistryError, Result};
use crate::schema::Contract;

/// A compiled contract
pub trait DocumentValidator: Send + Sync {
    /// Validate a document, returning every violation found.
    ///
    /// `Err` means the validator itself failed, not the document.
    fn validate(&self, document: &Value) -> Result<Vec<Violation>>;
}

/// Compiles contracts into validators
pub trait ValidatorEngine: Send + Sync {
    fn compile(&self, contract: &Contract) -> Result<Box<dyn DocumentValidator>>;
}

/// JSON Schema Draft 7 backend
#[derive(Debug, Clone, Copy, Default)]
pub struct Draft7Engine;

impl ValidatorEngine for Draft7Engine {
    fn compile(&self, contract: &Contract) -> Result<Box<dyn DocumentValidator>> {
        let compiled = compile_draft7(contract.as_value())?;
        Ok(Box::new(Draft7Validator {
            compiled,
            contract: contract.as_value().clone(),
        }))
    }
}

fn compile_draft7(schema: &Value) -> Result<JSONSchema> {
    JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(schema)
        .map_err(|e| RegistryError::ValidatorCompile(e.to_string()))
}

struct Draft7Validator {
    compiled: JSONSchema,
    /// Kept to resolve composite keywords when expanding sub-violations
    contract: Value,
}

impl DocumentValidator for Draft7Validator {
    fn validate(&self, document: &Value) -> Result<Vec<Violation>> {
        match self.compiled.validate(document) {
            Ok(()) => Ok(Vec::new()),
            Err(errors) => Ok(errors.map(|error| self.to_violation(&error, "")).collect()),
        }
    }
}

impl Draft7Validator {
    fn to_violation(&self, error: &ValidationError<'_>, base_path: &str) -> Violation {
        let field_path = join_path(base_path, &pointer_to_dotted(&error.instance_path.to_string()));
        let violation = Violation::new(error.to_string(), field_path.clone()).with_value(Value::clone(&error.instance));

        match error.kind {
            ValidationErrorKind::AnyOf | ValidationErrorKind::OneOfNotValid => {
                let sub_violations = self.expand_branches(&error.schema_path.to_string(), &error.instance, &field_path);
                violation.with_sub_violations(sub_violations)
            }
            _ => violation,
        }
    }

    /// Re-validate the failing value against each alternative of a composite
    /// keyword to report why every branch rejected it.
    fn expand_branches(&self, schema_pointer: &str, instance: &Value, field_path: &str) -> Vec<Violation> {
        let Some(branches) = self.contract.pointer(schema_pointer).and_then(Value::as_array) else {
            return Vec::new();
        };

        let mut sub_violations = Vec::new();
        for (index, branch) in branches.iter().enumerate() {
            let compiled = match compile_draft7(branch) {
                Ok(compiled) => compiled,
                Err(e) => {
                    debug!(branch = index, error = %e, "skipping uncompilable branch");
                    continue;
                }
            };
            let result = compiled.validate(instance);
            if let Err(errors) = result {
                for error in errors {
                    let path = join_path(field_path, &pointer_to_dotted(&error.instance_path.to_string()));
                    sub_violations.push(
                        Violation::new(error.to_string(), path).with_value(Value::clone(&error.instance)),
                    );
                }
            }
        }
        sub_violations
    }
}

/// Convert a JSON pointer (`/a/0/b~1c`) into a dotted path (`a.0.b/c`)
pub fn pointer_to_dotted(pointer: &str) -> String {
    pointer
        .split('/')
        .skip(1)
        .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
        .collect::<Vec<_>>()
        .join(".")
}

fn join_path(base: &str, rest: &str) -> String {
    match (base.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (false, true) => base.to_string(),
        (false, false) => format!("{}.{}", base, rest),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator(contract: Value) -> Box<dyn DocumentValidator> {
        Draft7Engine.compile(&Contract::new(contract)).unwrap()
    }

    #[test]
    fn test_conforming_document() {
        let v = validator(json!({
            "type": "object",
            "properties": {"a": {"type": "integer"}},
            "required": ["a"]
        }));
        assert!(v.validate(&json!({"a": 1, "b": true})).unwrap().is_empty());
    }

    #[test]
    fn test_type_mismatch_reports_path_and_value() {
        let v = validator(json!({
            "type": "object",
            "properties": {"page": {"type": "object", "properties": {"id": {"type": "integer"}}}}
        }));
        let violations = v.validate(&json!({"page": {"id": "12"}})).unwrap();

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field_path, "page.id");
        assert_eq!(violations[0].value, Some(json!("12")));
        assert!(violations[0].message.contains("integer"));
    }

    #[test]
    fn test_missing_required_at_root() {
        let v = validator(json!({"type": "object", "required": ["title"]}));
        let violations = v.validate(&json!({})).unwrap();

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field_path, "");
        assert!(violations[0].message.contains("title"));
    }

    #[test]
    fn test_any_of_expands_sub_violations() {
        let v = validator(json!({
            "type": "object",
            "properties": {"value": {"anyOf": [{"type": "integer"}, {"type": "string"}]}}
        }));
        let violations = v.validate(&json!({"value": true})).unwrap();

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field_path, "value");
        assert_eq!(violations[0].sub_violations.len(), 2);
        assert!(violations[0].sub_violations.iter().all(|s| s.field_path == "value"));
    }

    #[test]
    fn test_invalid_contract_fails_to_compile() {
        let result = Draft7Engine.compile(&Contract::new(json!({"type": 12})));
        assert!(matches!(result, Err(RegistryError::ValidatorCompile(_))));
    }

    #[test]
    fn test_pointer_to_dotted() {
        assert_eq!(pointer_to_dotted(""), "");
        assert_eq!(pointer_to_dotted("/a/0/b~1c"), "a.0.b/c");
        assert_eq!(pointer_to_dotted("/t~0x"), "t~x");
    }
}
