//! Structural schema inference
//!
//! Walks one sample document and describes its shape as a Draft-7 JSON Schema:
//! the observed type of every field and, for nested objects and arrays, a
//! recursively inferred sub-schema.
//!
//! Outside arrays nothing is marked `required`; that is decided when a
//! consistency window is promoted (see [`crate::promotion`]). Objects inside an
//! array are compared element by element instead: a key is required only if
//! every element of that array carries it.
//!
//! Inference is a pure function of the sample and never fails. Missing or empty
//! documents infer to an empty-object schema.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::schema::{Contract, SchemaEnvelope, SchemaIdentity};

/// Draft URI stamped on every inferred root schema
pub const DRAFT7_URI: &str = "http://json-schema.org/draft-07/schema#";

/// Nesting depth past which sub-trees are left unconstrained
const MAX_DEPTH: usize = 64;

/// JSON type names as emitted in `"type"`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    Null,
    Boolean,
    Integer,
    Number,
    String,
    Array,
    Object,
}

/// Subset of JSON Schema that inference can produce
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct InferredSchema {
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema_uri: Option<String>,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<JsonType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, InferredSchema>>,

    /// Set only on objects inferred from array elements
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<InferredSchema>>,

    /// Heterogeneous array elements
    #[serde(rename = "anyOf", skip_serializing_if = "Option::is_none")]
    pub any_of: Option<Vec<InferredSchema>>,
}

impl InferredSchema {
    pub fn typed(t: JsonType) -> Self {
        Self {
            schema_type: Some(t),
            ..Default::default()
        }
    }

    fn into_variants(self) -> Vec<InferredSchema> {
        match self.any_of {
            Some(variants) => variants,
            None => vec![self],
        }
    }

    fn from_variants(mut variants: Vec<InferredSchema>) -> Self {
        if variants.len() == 1 {
            variants.remove(0)
        } else {
            Self {
                any_of: Some(variants),
                ..Default::default()
            }
        }
    }
}

/// Infer the contract describing a single sample
pub fn infer_contract(sample: &Value) -> Contract {
    let mut root = match sample {
        Value::Null => InferredSchema::typed(JsonType::Object),
        other => infer_value(other, 0, false),
    };
    root.schema_uri = Some(DRAFT7_URI.to_string());

    // Serializing a plain struct of strings and maps cannot fail.
    let value = serde_json::to_value(&root).unwrap_or_else(|_| Contract::empty_object().into_value());
    Contract::new(value)
}

/// Infer a contract and wrap it with identity metadata
pub fn infer_envelope(identity: &SchemaIdentity, sample: &Value) -> SchemaEnvelope {
    SchemaEnvelope::new(identity.clone(), infer_contract(sample))
}

fn infer_value(value: &Value, depth: usize, in_array: bool) -> InferredSchema {
    if depth > MAX_DEPTH {
        return InferredSchema::default();
    }

    match value {
        Value::Null => InferredSchema::typed(JsonType::Null),
        Value::Bool(_) => InferredSchema::typed(JsonType::Boolean),
        Value::Number(n) if n.is_i64() || n.is_u64() => InferredSchema::typed(JsonType::Integer),
        Value::Number(_) => InferredSchema::typed(JsonType::Number),
        Value::String(_) => InferredSchema::typed(JsonType::String),
        Value::Array(elements) => {
            let mut schema = InferredSchema::typed(JsonType::Array);
            schema.items = elements
                .iter()
                .map(|element| infer_value(element, depth + 1, true))
                .reduce(merge)
                .map(Box::new);
            schema
        }
        Value::Object(map) => {
            let mut schema = InferredSchema::typed(JsonType::Object);
            if !map.is_empty() {
                let properties = map
                    .iter()
                    .map(|(key, field)| (key.clone(), infer_value(field, depth + 1, in_array)))
                    .collect();
                schema.properties = Some(properties);
                if in_array {
                    schema.required = Some(map.keys().cloned().collect());
                }
            }
            schema
        }
    }
}

/// Merge two element schemas observed in the same array.
///
/// Objects merge property-wise, keeping as required only the keys both sides
/// require, and arrays merge their items; anything else that differs becomes an
/// `anyOf` alternative.
fn merge(left: InferredSchema, right: InferredSchema) -> InferredSchema {
    if left == right {
        return left;
    }

    let mut variants = left.into_variants();
    for incoming in right.into_variants() {
        let slot = variants
            .iter()
            .position(|existing| existing.schema_type == incoming.schema_type && is_container(existing));

        match slot {
            Some(index) => {
                let existing = std::mem::take(&mut variants[index]);
                variants[index] = merge_container(existing, incoming);
            }
            None if !variants.contains(&incoming) => variants.push(incoming),
            None => {}
        }
    }

    InferredSchema::from_variants(variants)
}

fn is_container(schema: &InferredSchema) -> bool {
    matches!(schema.schema_type, Some(JsonType::Object) | Some(JsonType::Array))
}

fn merge_container(mut left: InferredSchema, right: InferredSchema) -> InferredSchema {
    match left.schema_type {
        Some(JsonType::Object) => {
            let mut properties = left.properties.take().unwrap_or_default();
            for (key, incoming) in right.properties.unwrap_or_default() {
                let merged = match properties.remove(&key) {
                    Some(existing) => merge(existing, incoming),
                    None => incoming,
                };
                properties.insert(key, merged);
            }
            left.properties = (!properties.is_empty()).then_some(properties);

            let theirs = right.required.unwrap_or_default();
            let required: Vec<String> = left
                .required
                .take()
                .unwrap_or_default()
                .into_iter()
                .filter(|key| theirs.contains(key))
                .collect();
            left.required = (!required.is_empty()).then_some(required);
        }
        Some(JsonType::Array) => {
            left.items = match (left.items.take(), right.items) {
                (Some(a), Some(b)) => Some(Box::new(merge(*a, *b))),
                (a, b) => a.or(b),
            };
        }
        _ => {}
    }
    left
}
