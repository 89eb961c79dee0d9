//! Schema Inference & Validation Registry
//!
//! Decides, for every record a collector or cleaner produces, whether the record
//! is acceptable and under which versioned contract it was stored.
//!
//! ## Features
//!
//! - **Structural inference**: derives a JSON Schema from a single sample
//! - **Consistency-gated promotion**: persists a contract only after a run of
//!   samples share one shape
//! - **Dual-mode validation**: fallback field checks during warm-up, compiled
//!   JSON Schema once a contract is active, one diagnostic shape for both
//! - **Hot reload**: periodically adopts newer contracts written by other
//!   processes
//!
//! ## Usage
//!
//! ```no_run
//! use schema_registry::{FileSchemaStore, RegistrySettings, SchemaIdentity, SchemaKind, SchemaRegistry};
//!
//! let store = FileSchemaStore::open("./schema-store", SchemaKind::CleanedData)?;
//! let mut registry = SchemaRegistry::open(
//!     SchemaIdentity::new("wikipedia_cleaner", "1.2.0"),
//!     store,
//!     RegistrySettings::new(3, 50),
//! )?;
//!
//! let record = serde_json::json!({"cleaned_title": "Election", "page_id": 42});
//! let (is_valid, diagnostic) = registry.process(&record);
//! # Ok::<(), schema_registry::RegistryError>(())
//! ```

pub mod checksum;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod fallback;
pub mod infer;
pub mod promotion;
pub mod registry;
pub mod schema;
pub mod store;
pub mod validator;

pub use checksum::Checksum;
pub use config::{DiscoveryMode, FallbackSettings, PipelineConfig, RegistrySettings, StoreSettings};
pub use diagnostics::{Diagnostic, ValidationMode, ValidationOutcome, Violation};
pub use error::{RegistryError, Result};
pub use fallback::{BasicRequirements, FallbackValidator, FnFallback};
pub use infer::{infer_contract, infer_envelope};
pub use promotion::ConsistencyWindow;
pub use registry::{RegistryBuilder, RegistryPhase, RegistryStateInfo, SchemaRegistry};
pub use schema::{
    Contract, IdentityFields, SchemaDocument, SchemaEnvelope, SchemaIdentity, SchemaKind, StoreId, StoredSchema,
};
pub use store::{FileSchemaStore, InMemorySchemaStore, SchemaStore};
pub use validator::{Draft7Engine, DocumentValidator, ValidatorEngine};
