//! Schema Registry
//!
//! Owns the validation contract for one identity (name + version) inside one
//! pipeline process.
//!
//! ```text
//!                 load finds row
//!      open ──────────────────────────────────► Active ◄──┐
//!        │                                        ▲       │ periodic check finds
//!        │ no row                                 │       │ a newer row (hot swap)
//!        ▼                 stable window promoted │       │
//!   Discovering ──────────────────────────────────┘───────┘
//! ```
//!
//! The uninitialized state only exists inside [`RegistryBuilder::open`]; a
//! registry handed to callers is always discovering or active.
//!
//! While discovering, every processed document is inferred into a candidate
//! contract and fed to a [`ConsistencyWindow`]; documents are validated with the
//! fallback rules until the window is promoted. Every `schema_check_interval`
//! processed documents the store is scanned again and a newer row for the same
//! identity is swapped in. The registry never goes back to discovering.
//!
//! All store failures are logged and absorbed: the registry keeps its
//! last-known state and callers see `None`/`false`, never an error.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::{DiscoveryMode, PipelineConfig, RegistrySettings};
use crate::diagnostics::{outcome, Diagnostic, ValidationMode, ValidationOutcome};
use crate::error::{RegistryError, Result};
use crate::fallback::{BasicRequirements, FallbackValidator};
use crate::infer::infer_envelope;
use crate::promotion::ConsistencyWindow;
use crate::schema::{IdentityFields, SchemaDocument, SchemaEnvelope, SchemaIdentity, StoreId};
use crate::store::SchemaStore;
use crate::validator::{Draft7Engine, DocumentValidator, ValidatorEngine};

/// Lifecycle phase of a registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryPhase {
    Discovering,
    Active,
}

/// Operator-facing snapshot of a registry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistryStateInfo {
    pub phase: RegistryPhase,
    pub has_active_schema: bool,
    pub active_schema_id: Option<StoreId>,
    pub validator_compiled: bool,
    pub using_json_schema_validation: bool,
    pub pending_sample_count: usize,
    pub cache_window: usize,
    pub identity_name: String,
    pub identity_version: String,
    pub discovery: DiscoveryMode,
    pub records_processed: u64,
    /// Documents processed since the last periodic check
    pub last_check_progress: u64,
    pub schema_check_interval: u64,
    pub next_schema_check_at: u64,
}

/// The active document and its compiled validator, always replaced together
struct ActiveSchema {
    document: SchemaDocument,
    validator: Box<dyn DocumentValidator>,
}

/// Builder for [`SchemaRegistry`]
pub struct RegistryBuilder<S> {
    identity: SchemaIdentity,
    store: S,
    settings: RegistrySettings,
    fields: Option<IdentityFields>,
    engine: Box<dyn ValidatorEngine>,
    fallback: Box<dyn FallbackValidator>,
}

impl<S: SchemaStore> RegistryBuilder<S> {
    pub fn settings(mut self, settings: RegistrySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Payload field names carrying the identity (default: the store kind's)
    pub fn identity_fields(mut self, fields: IdentityFields) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn engine(mut self, engine: impl ValidatorEngine + 'static) -> Self {
        self.engine = Box::new(engine);
        self
    }

    pub fn fallback(mut self, fallback: impl FallbackValidator + 'static) -> Self {
        self.fallback = Box::new(fallback);
        self
    }

    /// Validate settings and load the active schema from the store.
    ///
    /// With discovery disabled, a missing schema (or an unreachable store) is an
    /// error; otherwise the registry starts discovering.
    pub fn open(self) -> Result<SchemaRegistry<S>> {
        self.settings.validate()?;

        let fields = self.fields.unwrap_or_else(|| self.store.kind().default_identity_fields());
        let mut registry = SchemaRegistry {
            window: ConsistencyWindow::new(self.settings.cache_window),
            identity: self.identity,
            fields,
            settings: self.settings,
            store: self.store,
            engine: self.engine,
            fallback: self.fallback,
            phase: RegistryPhase::Discovering,
            active: None,
            processed_count: 0,
        };

        match registry.find_canonical() {
            Ok(Some(candidate)) => {
                info!(
                    identity = %registry.identity,
                    store_id = %candidate.document.store_id,
                    "using schema from store"
                );
                registry.activate(candidate);
            }
            Ok(None) if registry.discovery_enabled() => {
                info!(identity = %registry.identity, "no schema found in store, discovering");
            }
            Ok(None) => {
                return Err(RegistryError::NotFound {
                    name: registry.identity.name.clone(),
                    version: registry.identity.version.clone(),
                });
            }
            Err(e) if registry.discovery_enabled() => {
                error!(identity = %registry.identity, error = %e, "failed to load schema from store");
            }
            Err(e) => return Err(e),
        }

        debug!(identity = %registry.identity, phase = ?registry.phase, "schema registry initialized");
        Ok(registry)
    }
}

/// Schema inference and validation registry for one identity
pub struct SchemaRegistry<S> {
    identity: SchemaIdentity,
    fields: IdentityFields,
    settings: RegistrySettings,
    store: S,
    engine: Box<dyn ValidatorEngine>,
    fallback: Box<dyn FallbackValidator>,
    phase: RegistryPhase,
    active: Option<ActiveSchema>,
    window: ConsistencyWindow,
    processed_count: u64,
}

impl<S: SchemaStore> SchemaRegistry<S> {
    /// Start building a registry with default settings, the Draft 7 engine and
    /// the default fallback rules
    pub fn builder(identity: SchemaIdentity, store: S) -> RegistryBuilder<S> {
        RegistryBuilder {
            identity,
            store,
            settings: RegistrySettings::default(),
            fields: None,
            engine: Box::new(Draft7Engine),
            fallback: Box::new(BasicRequirements::from(&crate::config::FallbackSettings::default())),
        }
    }

    /// Open a registry with the given settings and default collaborators
    pub fn open(identity: SchemaIdentity, store: S, settings: RegistrySettings) -> Result<Self> {
        Self::builder(identity, store).settings(settings).open()
    }

    /// Open a registry configured from a [`PipelineConfig`]
    pub fn from_config(identity: SchemaIdentity, store: S, config: &PipelineConfig) -> Result<Self> {
        Self::builder(identity, store)
            .settings(config.registry.clone())
            .identity_fields(config.identity_fields())
            .fallback(BasicRequirements::from(&config.fallback))
            .open()
    }

    pub fn identity(&self) -> &SchemaIdentity {
        &self.identity
    }

    pub fn phase(&self) -> RegistryPhase {
        self.phase
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Id of the schema governing validation; `None` while fallback
    /// validation is in effect
    pub fn active_schema_id(&self) -> Option<StoreId> {
        let id = self.active.as_ref().map(|a| a.document.store_id);
        if id.is_none() {
            debug!(identity = %self.identity, "no active schema yet");
        }
        id
    }

    pub fn active_schema(&self) -> Option<&SchemaDocument> {
        self.active.as_ref().map(|a| &a.document)
    }

    /// Validate a document against the active contract, or the fallback rules
    /// while none is active
    pub fn validate(&self, document: &Value) -> ValidationOutcome {
        if let Some(active) = &self.active {
            return match active.validator.validate(document) {
                Ok(violations) => outcome(ValidationMode::Schema, violations),
                Err(e) => {
                    warn!(identity = %self.identity, error = %e, "validator failed");
                    (false, Some(Diagnostic::system_error(ValidationMode::Schema, e)))
                }
            };
        }

        if self.discovery_enabled() {
            debug!(identity = %self.identity, "falling back to basic requirement validation");
            outcome(ValidationMode::Fallback, self.fallback.check(document))
        } else {
            (
                false,
                Some(Diagnostic::system_error(
                    ValidationMode::Schema,
                    "No JSON schema validator available",
                )),
            )
        }
    }

    /// Record one processed document: runs the periodic store check when due
    /// and, while discovering, infers the document's shape and promotes a
    /// stable window.
    pub fn notify_processed(&mut self, document: &Value) {
        self.processed_count += 1;
        if self.processed_count % self.settings.schema_check_interval == 0 {
            info!(
                identity = %self.identity,
                processed = self.processed_count,
                "checking store for schema updates"
            );
            self.check_for_updates();
        }

        if self.active.is_some() || !self.discovery_enabled() {
            return;
        }

        let envelope = infer_envelope(&self.identity, document);
        if self.window.should_promote(envelope) {
            self.promote();
        } else {
            info!(
                identity = %self.identity,
                pending = self.window.len(),
                window = self.window.capacity(),
                "schema generation in progress"
            );
        }
    }

    /// [`notify_processed`](Self::notify_processed) followed by
    /// [`validate`](Self::validate)
    pub fn process(&mut self, document: &Value) -> ValidationOutcome {
        self.notify_processed(document);
        self.validate(document)
    }

    /// Re-read the store on demand. Returns whether the active schema changed.
    ///
    /// A store without a matching row leaves the current schema in place.
    pub fn reload_from_store(&mut self) -> bool {
        let previous = self.active.as_ref().map(|a| a.document.store_id);

        match self.find_canonical() {
            Ok(Some(candidate)) => {
                let next = candidate.document.store_id;
                if previous == Some(next) {
                    debug!(identity = %self.identity, store_id = %next, "reload found current schema");
                    return false;
                }
                info!(
                    identity = %self.identity,
                    old = ?previous,
                    new = %next,
                    "schema reloaded"
                );
                self.activate(candidate);
                self.processed_count = 0;
                true
            }
            Ok(None) => {
                warn!(identity = %self.identity, "reload found no schema in store");
                false
            }
            Err(e) => {
                error!(identity = %self.identity, error = %e, "error reloading schema");
                false
            }
        }
    }

    pub fn describe_state(&self) -> RegistryStateInfo {
        let interval = self.settings.schema_check_interval;
        let progress = self.processed_count % interval;
        let active_id = self.active.as_ref().map(|a| a.document.store_id);

        RegistryStateInfo {
            phase: self.phase,
            has_active_schema: active_id.is_some(),
            active_schema_id: active_id,
            validator_compiled: self.active.is_some(),
            using_json_schema_validation: self.active.is_some(),
            pending_sample_count: self.window.len(),
            cache_window: self.window.capacity(),
            identity_name: self.identity.name.clone(),
            identity_version: self.identity.version.clone(),
            discovery: self.settings.discovery,
            records_processed: self.processed_count,
            last_check_progress: progress,
            schema_check_interval: interval,
            next_schema_check_at: interval - progress,
        }
    }

    fn discovery_enabled(&self) -> bool {
        self.settings.discovery == DiscoveryMode::Enabled
    }

    fn activate(&mut self, active: ActiveSchema) {
        if !self.window.is_empty() {
            debug!(identity = %self.identity, discarded = self.window.len(), "dropping pending samples");
        }
        self.active = Some(active);
        self.window.clear();
        self.phase = RegistryPhase::Active;
    }

    /// The newest row for this identity that parses and compiles.
    ///
    /// Picking the greatest id makes every process converge on the same row
    /// when a promotion race leaves duplicates behind.
    fn find_canonical(&self) -> Result<Option<ActiveSchema>> {
        let rows = self.store.find_by_identity(&self.identity, &self.fields)?;

        for row in rows.iter().rev() {
            let document = match SchemaDocument::from_stored(row, &self.fields) {
                Ok(document) => document,
                Err(e) => {
                    warn!(identity = %self.identity, store_id = %row.id, error = %e, "skipping malformed schema row");
                    continue;
                }
            };
            match self.engine.compile(&document.contract) {
                Ok(validator) => return Ok(Some(ActiveSchema { document, validator })),
                Err(e) => {
                    warn!(identity = %self.identity, store_id = %row.id, error = %e, "skipping uncompilable schema row");
                }
            }
        }

        Ok(None)
    }

    fn check_for_updates(&mut self) {
        let current = self.active.as_ref().map(|a| a.document.store_id);

        match self.find_canonical() {
            Ok(Some(candidate)) if Some(candidate.document.store_id) != current => {
                let next = candidate.document.store_id;
                info!(identity = %self.identity, old = ?current, new = %next, "found updated schema, swapping");
                self.activate(candidate);
                self.processed_count = 0;
            }
            Ok(_) => debug!(identity = %self.identity, "schema unchanged in store"),
            Err(e) => warn!(identity = %self.identity, error = %e, "periodic schema check failed"),
        }
    }

    /// Persist the stable window's candidate and switch to schema validation.
    ///
    /// On any failure the samples stay buffered and the next stable window
    /// retries.
    fn promote(&mut self) {
        let Some(candidate) = self.window.candidate() else {
            return;
        };

        let validator = match self.engine.compile(&candidate.contract) {
            Ok(validator) => validator,
            Err(e) => {
                error!(identity = %self.identity, error = %e, "inferred contract does not compile");
                return;
            }
        };

        let document = match self.persist(&candidate) {
            Ok(document) => document,
            Err(e) => {
                error!(identity = %self.identity, error = %e, "failed to cache schema to store");
                return;
            }
        };

        self.activate(ActiveSchema { document, validator });
    }

    fn persist(&self, candidate: &SchemaEnvelope) -> Result<SchemaDocument> {
        if let Some(existing) = self.store.find_by_exact_content(&candidate.contract)? {
            if self.identity.matches_payload(&existing.payload, &self.fields) {
                info!(identity = %self.identity, store_id = %existing.id, "schema already exists in store");
                return SchemaDocument::from_stored(&existing, &self.fields);
            }
        }

        let store_id = self.store.create(&candidate.to_payload(&self.fields))?;
        info!(
            identity = %self.identity,
            store_id = %store_id,
            checksum = %candidate.contract.checksum().short(),
            "cached new schema to store"
        );

        Ok(SchemaDocument {
            store_id,
            kind: self.store.kind(),
            identity: candidate.identity.clone(),
            generated_at: Some(candidate.generated_at),
            contract: candidate.contract.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaKind;
    use crate::store::InMemorySchemaStore;
    use serde_json::json;
    use std::sync::Arc;

    fn identity() -> SchemaIdentity {
        SchemaIdentity::new("wikipedia_cleaner", "1.2.0")
    }

    #[test]
    fn test_empty_store_starts_discovering() {
        let registry = SchemaRegistry::open(identity(), InMemorySchemaStore::default(), RegistrySettings::new(3, 50)).unwrap();

        assert_eq!(registry.phase(), RegistryPhase::Discovering);
        assert!(registry.active_schema_id().is_none());
        let state = registry.describe_state();
        assert!(!state.validator_compiled);
        assert_eq!(state.next_schema_check_at, 50);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let result = SchemaRegistry::open(identity(), InMemorySchemaStore::default(), RegistrySettings::new(3, 0));
        assert!(matches!(result, Err(RegistryError::InvalidConfig(_))));
    }

    #[test]
    fn test_strict_registry_requires_schema() {
        let result = SchemaRegistry::open(identity(), InMemorySchemaStore::default(), RegistrySettings::strict(50));
        assert!(matches!(result, Err(RegistryError::NotFound { .. })));
    }

    #[test]
    fn test_strict_registry_adopts_existing_schema() {
        let store = Arc::new(InMemorySchemaStore::new(SchemaKind::CleanedData));
        let envelope = SchemaEnvelope::new(
            identity(),
            crate::schema::Contract::new(json!({"type": "object", "required": ["title"]})),
        );
        let id = store
            .create(&envelope.to_payload(&SchemaKind::CleanedData.default_identity_fields()))
            .unwrap();

        let mut registry = SchemaRegistry::open(identity(), store, RegistrySettings::strict(50)).unwrap();
        assert_eq!(registry.active_schema_id(), Some(id));

        let (valid, diagnostic) = registry.process(&json!({}));
        assert!(!valid);
        assert!(diagnostic.unwrap().validation_errors[0].contains("title"));
        assert_eq!(registry.describe_state().pending_sample_count, 0);
    }

    #[test]
    fn test_adopts_row_written_by_cleaner_pipeline() {
        let store = InMemorySchemaStore::new(SchemaKind::CleanedData);
        let id = store
            .create(&json!({
                "cleaner_name": "wikipedia_cleaner",
                "cleaner_version": "1.2.0",
                "generated_at": "2025-03-01T12:00:00",
                "schema": {"type": "object", "properties": {"page_id": {"type": "integer"}}}
            }))
            .unwrap();

        let registry = SchemaRegistry::open(identity(), store, RegistrySettings::new(3, 50)).unwrap();
        assert_eq!(registry.active_schema_id(), Some(id));
        assert_eq!(registry.phase(), RegistryPhase::Active);
        assert!(registry.active_schema().unwrap().generated_at.is_some());
    }

    #[test]
    fn test_fallback_mode_until_promotion() {
        let mut registry = SchemaRegistry::builder(identity(), InMemorySchemaStore::default())
            .settings(RegistrySettings::new(2, 50))
            .fallback(BasicRequirements::new(["title"]))
            .open()
            .unwrap();

        let (valid, diagnostic) = registry.process(&json!({"body": "x"}));
        assert!(!valid);
        let diagnostic = diagnostic.unwrap();
        assert_eq!(diagnostic.mode, ValidationMode::Fallback);
        assert!(diagnostic.names_field("title"));

        let (valid, _) = registry.process(&json!({"body": "y"}));
        // promoted contract requires "body" only
        assert!(valid);
        assert_eq!(registry.phase(), RegistryPhase::Active);
    }
}
