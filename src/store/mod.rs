//! Schema store adapters
//!
//! A store is an append-mostly table of schema rows: opaque JSON payloads with
//! a store-assigned id. The registry never updates or deletes rows.

mod file;
mod memory;

pub use file::FileSchemaStore;
pub use memory::InMemorySchemaStore;

use serde_json::Value;
use std::sync::Arc;

use crate::error::{RegistryError, Result};
use crate::schema::{Contract, IdentityFields, SchemaIdentity, SchemaKind, StoreId, StoredSchema, CONTRACT_KEY};

/// What the registry needs from a metadata-schema table
pub trait SchemaStore: Send + Sync {
    /// Which table this store holds
    fn kind(&self) -> SchemaKind;

    /// Insert a new row and return its id
    fn create(&self, payload: &Value) -> Result<StoreId>;

    fn get_by_id(&self, id: StoreId) -> Result<Option<StoredSchema>>;

    /// All rows, ordered by id
    fn get_all(&self) -> Result<Vec<StoredSchema>>;

    /// Newest row whose contract is byte-identical to `contract`
    fn find_by_exact_content(&self, contract: &Contract) -> Result<Option<StoredSchema>> {
        let wanted = contract.checksum();
        Ok(self
            .get_all()?
            .into_iter()
            .filter(|row| row.contract_value().is_some_and(|v| wanted.verify_json(v)))
            .max_by_key(|row| row.id))
    }

    /// Existing row with the payload's contract, or a newly created one
    fn get_or_create(&self, payload: &Value) -> Result<Option<StoredSchema>> {
        let contract = payload
            .get(CONTRACT_KEY)
            .cloned()
            .map(Contract::new)
            .ok_or_else(|| RegistryError::InvalidPayload(format!("payload has no '{}' section", CONTRACT_KEY)))?;

        if let Some(existing) = self.find_by_exact_content(&contract)? {
            return Ok(Some(existing));
        }
        let id = self.create(payload)?;
        self.get_by_id(id)
    }

    /// Rows embedding `identity`, ordered by id.
    ///
    /// The default is a linear scan; adapters with an index may override it.
    fn find_by_identity(&self, identity: &SchemaIdentity, fields: &IdentityFields) -> Result<Vec<StoredSchema>> {
        Ok(self
            .get_all()?
            .into_iter()
            .filter(|row| identity.matches_payload(&row.payload, fields))
            .collect())
    }
}

impl<T: SchemaStore + ?Sized> SchemaStore for Arc<T> {
    fn kind(&self) -> SchemaKind {
        (**self).kind()
    }

    fn create(&self, payload: &Value) -> Result<StoreId> {
        (**self).create(payload)
    }

    fn get_by_id(&self, id: StoreId) -> Result<Option<StoredSchema>> {
        (**self).get_by_id(id)
    }

    fn get_all(&self) -> Result<Vec<StoredSchema>> {
        (**self).get_all()
    }

    fn find_by_exact_content(&self, contract: &Contract) -> Result<Option<StoredSchema>> {
        (**self).find_by_exact_content(contract)
    }

    fn get_or_create(&self, payload: &Value) -> Result<Option<StoredSchema>> {
        (**self).get_or_create(payload)
    }

    fn find_by_identity(&self, identity: &SchemaIdentity, fields: &IdentityFields) -> Result<Vec<StoredSchema>> {
        (**self).find_by_identity(identity, fields)
    }
}

fn require_object(payload: &Value) -> Result<()> {
    if payload.is_object() {
        Ok(())
    } else {
        Err(RegistryError::InvalidPayload("schema payload must be a JSON object".to_string()))
    }
}
