use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{require_object, SchemaStore};
use crate::checksum::Checksum;
use crate::error::{RegistryError, Result};
use crate::schema::{Contract, SchemaKind, StoreId, StoredSchema};

#[derive(Debug, Default)]
struct Tables {
    rows: BTreeMap<StoreId, StoredSchema>,
    by_content: HashMap<Checksum, Vec<StoreId>>,
    next_id: u64,
}

/// Process-local store, shared between registries through `Arc`
#[derive(Debug)]
pub struct InMemorySchemaStore {
    kind: SchemaKind,
    inner: RwLock<Tables>,
}

impl Default for InMemorySchemaStore {
    fn default() -> Self {
        Self::new(SchemaKind::default())
    }
}

impl InMemorySchemaStore {
    pub fn new(kind: SchemaKind) -> Self {
        Self {
            kind,
            inner: RwLock::new(Tables::default()),
        }
    }

    /// Number of rows held
    pub fn len(&self) -> usize {
        self.read().map(|t| t.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.inner
            .read()
            .map_err(|_| RegistryError::Store("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.inner
            .write()
            .map_err(|_| RegistryError::Store("in-memory store lock poisoned".to_string()))
    }
}

impl SchemaStore for InMemorySchemaStore {
    fn kind(&self) -> SchemaKind {
        self.kind
    }

    fn create(&self, payload: &Value) -> Result<StoreId> {
        require_object(payload)?;
        let mut tables = self.write()?;

        tables.next_id += 1;
        let id = StoreId(tables.next_id);
        let row = StoredSchema {
            id,
            kind: self.kind,
            payload: payload.clone(),
            created_at: Utc::now(),
        };

        if let Some(contract) = row.contract_value() {
            let checksum = Checksum::from_json(contract);
            tables.by_content.entry(checksum).or_default().push(id);
        }
        tables.rows.insert(id, row);
        Ok(id)
    }

    fn get_by_id(&self, id: StoreId) -> Result<Option<StoredSchema>> {
        Ok(self.read()?.rows.get(&id).cloned())
    }

    fn get_all(&self) -> Result<Vec<StoredSchema>> {
        Ok(self.read()?.rows.values().cloned().collect())
    }

    fn find_by_exact_content(&self, contract: &Contract) -> Result<Option<StoredSchema>> {
        let tables = self.read()?;
        let newest = tables
            .by_content
            .get(&contract.checksum())
            .and_then(|ids| ids.iter().max())
            .and_then(|id| tables.rows.get(id))
            .cloned();
        Ok(newest)
    }
}
