//! Configuration for schema registries
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (schema_registry.toml)
//! - Environment variables (SCHEMA_REGISTRY__*)
//!
//! ## Example config file (schema_registry.toml):
//! ```toml
//! [registry]
//! cache_window = 3
//! schema_check_interval = 50
//! discovery = "enabled"
//!
//! [fallback]
//! required_fields = ["cleaned_content", "cleaned_title", "language", "page_id"]
//! content_field = "cleaned_content"
//! min_content_length = 10
//!
//! [store]
//! path = "./schema-store"
//! kind = "cleaned_data"
//!
//! [identity]
//! name_field = "cleaner_name"
//! version_field = "cleaner_version"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{RegistryError, Result};
use crate::schema::{IdentityFields, SchemaKind};

/// Main configuration for a pipeline's schema registry
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PipelineConfig {
    /// Promotion and re-check settings
    #[serde(default)]
    pub registry: RegistrySettings,

    /// Validation rules used before a contract exists
    #[serde(default)]
    pub fallback: FallbackSettings,

    /// Store location
    #[serde(default)]
    pub store: StoreSettings,

    /// Payload field names carrying the identity; per-kind default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityFields>,
}

/// Whether a registry may infer and promote contracts itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMode {
    /// Infer from samples until a contract is promoted
    #[default]
    Enabled,
    /// The contract must already be in the store
    Disabled,
}

/// Promotion and re-check settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Consecutive identical shapes required before promotion
    #[serde(default = "default_cache_window")]
    pub cache_window: usize,

    /// Processed documents between store re-checks
    #[serde(default = "default_schema_check_interval")]
    pub schema_check_interval: u64,

    #[serde(default)]
    pub discovery: DiscoveryMode,
}

/// Fallback validation rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackSettings {
    /// Fields that must be present and non-empty
    #[serde(default = "default_required_fields")]
    pub required_fields: Vec<String>,

    /// Text field subject to the minimum length check
    #[serde(default = "default_content_field")]
    pub content_field: Option<String>,

    #[serde(default = "default_min_content_length")]
    pub min_content_length: usize,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Root directory of the file-backed store
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    #[serde(default)]
    pub kind: SchemaKind,
}

// Default value functions
fn default_cache_window() -> usize {
    3
}

fn default_schema_check_interval() -> u64 {
    50
}

fn default_required_fields() -> Vec<String> {
    ["cleaned_content", "cleaned_title", "language", "page_id"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_content_field() -> Option<String> {
    Some("cleaned_content".to_string())
}

fn default_min_content_length() -> usize {
    10
}

fn default_store_path() -> PathBuf {
    PathBuf::from("schema-store")
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            cache_window: default_cache_window(),
            schema_check_interval: default_schema_check_interval(),
            discovery: DiscoveryMode::default(),
        }
    }
}

impl RegistrySettings {
    pub fn new(cache_window: usize, schema_check_interval: u64) -> Self {
        Self {
            cache_window,
            schema_check_interval,
            discovery: DiscoveryMode::Enabled,
        }
    }

    /// Settings for identities whose contract is managed out of band
    pub fn strict(schema_check_interval: u64) -> Self {
        Self {
            cache_window: default_cache_window(),
            schema_check_interval,
            discovery: DiscoveryMode::Disabled,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_window == 0 {
            return Err(RegistryError::InvalidConfig("cache_window must be at least 1".to_string()));
        }
        if self.schema_check_interval == 0 {
            return Err(RegistryError::InvalidConfig(
                "schema_check_interval must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            required_fields: default_required_fields(),
            content_field: default_content_field(),
            min_content_length: default_min_content_length(),
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            kind: SchemaKind::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from default locations
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, adding a specific file on top of the defaults
    pub fn load_from(config_path: Option<&str>) -> std::result::Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "schema_registry.toml",
            ".schema_registry.toml",
            "config/schema_registry.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(config_dir) = directories::ProjectDirs::from("dev", "pipeline", "schema-registry") {
            let xdg_config = config_dir.config_dir().join("schema_registry.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("SCHEMA_REGISTRY")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Identity field names, falling back to the store kind's defaults
    pub fn identity_fields(&self) -> IdentityFields {
        self.identity
            .clone()
            .unwrap_or_else(|| self.store.kind.default_identity_fields())
    }

    /// Store root (resolves relative paths)
    pub fn store_path(&self) -> PathBuf {
        if self.store.path.is_absolute() {
            self.store.path.clone()
        } else {
            std::env::current_dir().unwrap_or_default().join(&self.store.path)
        }
    }
}
