//! Fallback validation used while no contract has been promoted
//!
//! The default rules are a fixed list of required, non-empty fields plus an
//! optional minimum length for a designated text field. Callers with their own
//! notion of a minimal record can plug in any [`FallbackValidator`].

use serde_json::Value;

use crate::config::FallbackSettings;
use crate::diagnostics::Violation;

/// Minimal checks applied before a contract exists
pub trait FallbackValidator: Send + Sync {
    fn check(&self, document: &Value) -> Vec<Violation>;
}

/// Adapts a closure into a [`FallbackValidator`]
pub struct FnFallback<F>(pub F);

impl<F> FallbackValidator for FnFallback<F>
where
    F: Fn(&Value) -> Vec<Violation> + Send + Sync,
{
    fn check(&self, document: &Value) -> Vec<Violation> {
        (self.0)(document)
    }
}

/// Required non-empty fields and a minimum content length
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicRequirements {
    pub required_fields: Vec<String>,
    pub content_field: Option<String>,
    pub min_content_length: usize,
}

impl BasicRequirements {
    pub fn new(required_fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            required_fields: required_fields.into_iter().map(Into::into).collect(),
            content_field: None,
            min_content_length: 0,
        }
    }

    pub fn with_content_field(mut self, field: impl Into<String>, min_length: usize) -> Self {
        self.content_field = Some(field.into());
        self.min_content_length = min_length;
        self
    }
}

impl From<&FallbackSettings> for BasicRequirements {
    fn from(settings: &FallbackSettings) -> Self {
        Self {
            required_fields: settings.required_fields.clone(),
            content_field: settings.content_field.clone(),
            min_content_length: settings.min_content_length,
        }
    }
}

impl FallbackValidator for BasicRequirements {
    fn check(&self, document: &Value) -> Vec<Violation> {
        let mut violations = Vec::new();

        for field in &self.required_fields {
            match document.get(field) {
                None => violations.push(Violation::new(format!("Missing required field: {}", field), field.as_str())),
                Some(value) if is_empty(value) => violations.push(
                    Violation::new(format!("Empty required field: {}", field), field.as_str()).with_value(value.clone()),
                ),
                Some(_) => {}
            }
        }

        if let Some(field) = &self.content_field {
            match document.get(field) {
                Some(Value::String(content)) => {
                    if content.trim().chars().count() < self.min_content_length {
                        violations.push(
                            Violation::new(
                                format!("Content too short: {} char", content.chars().count()),
                                field.as_str(),
                            )
                            .with_value(Value::String(content.clone())),
                        );
                    }
                }
                Some(Value::Null) | None => {}
                Some(other) => violations.push(
                    Violation::new(format!("Content field is not text: {}", field), field.as_str())
                        .with_value(other.clone()),
                ),
            }
        }

        violations
    }
}

/// Empty in the sense of a collected record: null, `false`, zero, or an empty
/// string, array or object.
fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cleaner_rules() -> BasicRequirements {
        BasicRequirements::new(["cleaned_content", "cleaned_title", "language", "page_id"])
            .with_content_field("cleaned_content", 10)
    }

    #[test]
    fn test_complete_document_passes() {
        let doc = json!({
            "cleaned_content": "A long enough article body.",
            "cleaned_title": "Election",
            "language": "en",
            "page_id": 42
        });
        assert!(cleaner_rules().check(&doc).is_empty());
    }

    #[test]
    fn test_missing_and_empty_fields_are_named() {
        let doc = json!({"cleaned_content": "A long enough article body.", "cleaned_title": "", "page_id": 42});
        let violations = cleaner_rules().check(&doc);

        let paths: Vec<&str> = violations.iter().map(|v| v.field_path.as_str()).collect();
        assert_eq!(paths, vec!["cleaned_title", "language"]);
        assert_eq!(violations[0].message, "Empty required field: cleaned_title");
        assert_eq!(violations[1].message, "Missing required field: language");
    }

    #[test]
    fn test_short_content() {
        let doc = json!({"cleaned_content": "  short  ", "cleaned_title": "t", "language": "en", "page_id": 1});
        let violations = cleaner_rules().check(&doc);

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field_path, "cleaned_content");
        assert_eq!(violations[0].message, "Content too short: 9 char");
    }

    #[test]
    fn test_non_text_content() {
        let rules = BasicRequirements::new(Vec::<String>::new()).with_content_field("body", 1);
        let violations = rules.check(&json!({"body": 5}));
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.starts_with("Content field is not text"));
    }

    #[test]
    fn test_closure_fallback() {
        let fallback = FnFallback(|doc: &Value| {
            if doc.get("url").is_some() {
                Vec::new()
            } else {
                vec![Violation::new("Missing url", "url")]
            }
        });
        assert!(fallback.check(&json!({"url": "https://en.wikipedia.org"})).is_empty());
        assert_eq!(fallback.check(&json!({})).len(), 1);
    }
}
