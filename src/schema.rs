//! Schema types and the payload boundary
//!
//! Store rows hold opaque JSON payloads. Everything above the store works with
//! the typed [`SchemaEnvelope`] / [`SchemaDocument`] pair, converted at
//! [`SchemaEnvelope::to_payload`] and [`SchemaDocument::from_stored`].

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::checksum::Checksum;
use crate::error::{RegistryError, Result};

/// Payload key holding the contract body
pub const CONTRACT_KEY: &str = "schema";

/// Payload key holding the inference timestamp
pub const GENERATED_AT_KEY: &str = "generated_at";

/// Store-assigned row identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreId(pub u64);

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which metadata-schema table a row belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
    /// Metadata of raw collected records (collectors)
    RawData,
    /// Metadata of cleaned records (cleaners)
    #[default]
    CleanedData,
}

impl SchemaKind {
    /// Identity field names used by this kind's writers
    pub fn default_identity_fields(&self) -> IdentityFields {
        match self {
            SchemaKind::RawData => IdentityFields::new("collector_name", "current_schema_version"),
            SchemaKind::CleanedData => IdentityFields::new("cleaner_name", "cleaner_version"),
        }
    }

    /// Directory name for file-backed stores
    pub fn dir_name(&self) -> &'static str {
        match self {
            SchemaKind::RawData => "raw_data_metadata_schemas",
            SchemaKind::CleanedData => "cleaned_data_metadata_schemas",
        }
    }
}

/// Names of the payload fields that carry the identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityFields {
    pub name_field: String,
    pub version_field: String,
}

impl IdentityFields {
    pub fn new(name_field: impl Into<String>, version_field: impl Into<String>) -> Self {
        Self {
            name_field: name_field.into(),
            version_field: version_field.into(),
        }
    }
}

impl Default for IdentityFields {
    fn default() -> Self {
        SchemaKind::default().default_identity_fields()
    }
}

/// The (name, version) pair a contract belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaIdentity {
    pub name: String,
    pub version: String,
}

impl SchemaIdentity {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Check whether a raw payload embeds this identity
    pub fn matches_payload(&self, payload: &Value, fields: &IdentityFields) -> bool {
        payload.get(&fields.name_field).and_then(Value::as_str) == Some(self.name.as_str())
            && payload.get(&fields.version_field).and_then(Value::as_str) == Some(self.version.as_str())
    }
}

impl fmt::Display for SchemaIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}", self.name, self.version)
    }
}

/// Structural schema body (JSON-Schema shaped)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Contract(Value);

impl Contract {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Contract for an object with no known properties
    pub fn empty_object() -> Self {
        Self(serde_json::json!({ "type": "object" }))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Content hash used for de-duplication
    pub fn checksum(&self) -> Checksum {
        Checksum::from_json(&self.0)
    }
}

impl From<Value> for Contract {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// An inferred contract wrapped with its identity, before persistence
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaEnvelope {
    pub identity: SchemaIdentity,
    pub generated_at: DateTime<Utc>,
    pub contract: Contract,
}

impl SchemaEnvelope {
    pub fn new(identity: SchemaIdentity, contract: Contract) -> Self {
        Self {
            identity,
            generated_at: Utc::now(),
            contract,
        }
    }

    /// Structural equality, ignoring `generated_at`
    pub fn same_shape(&self, other: &SchemaEnvelope) -> bool {
        self.contract == other.contract
    }

    /// Serialize into the opaque payload stored in a row
    pub fn to_payload(&self, fields: &IdentityFields) -> Value {
        let mut payload = Map::new();
        payload.insert(fields.name_field.clone(), Value::String(self.identity.name.clone()));
        payload.insert(fields.version_field.clone(), Value::String(self.identity.version.clone()));
        payload.insert(GENERATED_AT_KEY.to_string(), Value::String(self.generated_at.to_rfc3339()));
        payload.insert(CONTRACT_KEY.to_string(), self.contract.as_value().clone());
        Value::Object(payload)
    }
}

/// A row as held by a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSchema {
    pub id: StoreId,
    pub kind: SchemaKind,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl StoredSchema {
    /// The contract sub-tree, if the payload has one
    pub fn contract_value(&self) -> Option<&Value> {
        self.payload.get(CONTRACT_KEY)
    }
}

/// A persisted, parsed schema document
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDocument {
    pub store_id: StoreId,
    pub kind: SchemaKind,
    pub identity: SchemaIdentity,
    pub generated_at: Option<DateTime<Utc>>,
    pub contract: Contract,
}

impl SchemaDocument {
    /// Parse a stored row using the given identity field names
    pub fn from_stored(stored: &StoredSchema, fields: &IdentityFields) -> Result<Self> {
        let payload = stored
            .payload
            .as_object()
            .ok_or_else(|| RegistryError::InvalidPayload(format!("row {} is not an object", stored.id)))?;

        let text_field = |key: &str| -> Result<String> {
            payload
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| RegistryError::InvalidPayload(format!("row {} has no string '{}'", stored.id, key)))
        };

        let identity = SchemaIdentity::new(text_field(&fields.name_field)?, text_field(&fields.version_field)?);

        let contract = match payload.get(CONTRACT_KEY) {
            Some(value) if value.as_object().is_some_and(|map| !map.is_empty()) => Contract::new(value.clone()),
            _ => {
                return Err(RegistryError::MalformedContract {
                    store_id: stored.id,
                    reason: format!("missing '{}' section", CONTRACT_KEY),
                })
            }
        };

        let generated_at = payload
            .get(GENERATED_AT_KEY)
            .and_then(Value::as_str)
            .and_then(parse_timestamp);

        Ok(Self {
            store_id: stored.id,
            kind: stored.kind,
            identity,
            generated_at,
            contract,
        })
    }
}

/// RFC 3339, or a naive ISO timestamp taken as UTC
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stored(payload: Value) -> StoredSchema {
        StoredSchema {
            id: StoreId(7),
            kind: SchemaKind::CleanedData,
            payload,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_payload_roundtrip_keeps_identity_and_contract() {
        let fields = IdentityFields::new("cleaner_name", "cleaner_version");
        let envelope = SchemaEnvelope::new(
            SchemaIdentity::new("wikipedia_cleaner", "1.2.0"),
            Contract::new(json!({"type": "object", "properties": {"a": {"type": "integer"}}})),
        );

        let payload = envelope.to_payload(&fields);
        assert_eq!(payload["cleaner_name"], "wikipedia_cleaner");
        assert_eq!(payload["cleaner_version"], "1.2.0");

        let doc = SchemaDocument::from_stored(&stored(payload), &fields).unwrap();
        assert_eq!(doc.store_id, StoreId(7));
        assert_eq!(doc.identity, envelope.identity);
        assert_eq!(doc.contract, envelope.contract);
        assert!(doc.generated_at.is_some());
    }

    #[test]
    fn test_missing_contract_is_malformed() {
        let fields = IdentityFields::default();
        let row = stored(json!({"cleaner_name": "x", "cleaner_version": "1"}));
        match SchemaDocument::from_stored(&row, &fields) {
            Err(RegistryError::MalformedContract { store_id, .. }) => assert_eq!(store_id, StoreId(7)),
            other => panic!("Expected MalformedContract, got {:?}", other),
        }
    }

    #[test]
    fn test_cleaned_data_rows_use_cleaner_version() {
        let fields = SchemaKind::CleanedData.default_identity_fields();
        let row = stored(json!({
            "cleaner_name": "wikipedia_cleaner",
            "cleaner_version": "1.2.0",
            "generated_at": "2025-03-01T12:00:00.123456",
            "schema": {"type": "object"}
        }));

        let doc = SchemaDocument::from_stored(&row, &fields).unwrap();
        assert_eq!(doc.identity, SchemaIdentity::new("wikipedia_cleaner", "1.2.0"));
        assert_eq!(doc.generated_at.unwrap().to_rfc3339(), "2025-03-01T12:00:00.123456+00:00");
    }

    #[test]
    fn test_identity_matching_uses_configured_fields() {
        let identity = SchemaIdentity::new("wikipedia", "0.3.0");
        let payload = json!({"collector_name": "wikipedia", "current_schema_version": "0.3.0"});
        assert!(identity.matches_payload(&payload, &SchemaKind::RawData.default_identity_fields()));
        assert!(!identity.matches_payload(&payload, &SchemaKind::CleanedData.default_identity_fields()));
    }

    #[test]
    fn test_same_shape_ignores_timestamp() {
        let identity = SchemaIdentity::new("n", "1");
        let a = SchemaEnvelope::new(identity.clone(), Contract::empty_object());
        let mut b = SchemaEnvelope::new(identity, Contract::empty_object());
        b.generated_at = a.generated_at - chrono::Duration::seconds(30);
        assert!(a.same_shape(&b));
    }
}
