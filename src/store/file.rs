use chrono::Utc;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use super::{require_object, SchemaStore};
use crate::error::{RegistryError, Result};
use crate::schema::{SchemaKind, StoreId, StoredSchema};

/// Attempts at claiming a fresh id before giving up
const MAX_CREATE_ATTEMPTS: usize = 16;

/// Distinguishes staging files of concurrent writers within one process
static STAGE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Directory-backed store: one pretty-printed JSON file per row.
///
/// ```text
/// <root>/
/// ├── raw_data_metadata_schemas/
/// │   ├── 0000000001.json
/// │   └── 0000000002.json
/// └── cleaned_data_metadata_schemas/
///     └── 0000000001.json
/// ```
///
/// A row is written and synced to a hidden staging file first, then claimed by
/// hard-linking it under its id. Linking fails if the id is taken, so several
/// processes can append to the same directory without overwriting each other's
/// rows, and a row file is never visible half-written.
#[derive(Debug, Clone)]
pub struct FileSchemaStore {
    dir: PathBuf,
    kind: SchemaKind,
}

impl FileSchemaStore {
    /// Open (creating if needed) the table for `kind` under `root`
    pub fn open(root: impl AsRef<Path>, kind: SchemaKind) -> Result<Self> {
        let dir = root.as_ref().join(kind.dir_name());
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, kind })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn row_path(&self, id: StoreId) -> PathBuf {
        self.dir.join(format!("{:010}.json", id.0))
    }

    fn max_id(&self) -> Result<u64> {
        let mut max = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if let Some(id) = parse_row_id(&path) {
                max = max.max(id);
            }
        }
        Ok(max)
    }

    fn read_row(&self, path: &Path) -> Result<StoredSchema> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write `row` to a fresh staging file; nothing is left behind on failure
    fn stage(&self, row: &StoredSchema) -> Result<PathBuf> {
        let path = self.dir.join(format!(
            ".{:010}-{}-{}.tmp",
            row.id.0,
            process::id(),
            STAGE_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;

        let written = serde_json::to_string_pretty(row)
            .map_err(RegistryError::from)
            .and_then(|json| {
                file.write_all(json.as_bytes())?;
                file.sync_all()?;
                Ok(())
            });
        drop(file);

        match written {
            Ok(()) => Ok(path),
            Err(e) => {
                remove_staged(&path);
                Err(e)
            }
        }
    }
}

fn remove_staged(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!(path = %path.display(), error = %e, "could not remove staging file");
    }
}

fn parse_row_id(path: &Path) -> Option<u64> {
    if path.extension()? != "json" {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

impl SchemaStore for FileSchemaStore {
    fn kind(&self) -> SchemaKind {
        self.kind
    }

    fn create(&self, payload: &Value) -> Result<StoreId> {
        require_object(payload)?;

        let mut next = self.max_id()? + 1;
        for _ in 0..MAX_CREATE_ATTEMPTS {
            let id = StoreId(next);
            let row = StoredSchema {
                id,
                kind: self.kind,
                payload: payload.clone(),
                created_at: Utc::now(),
            };

            let staged = self.stage(&row)?;
            let claimed = fs::hard_link(&staged, self.row_path(id));
            remove_staged(&staged);

            match claimed {
                Ok(()) => return Ok(id),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(id = %id, "row id taken by another writer, retrying");
                    next += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(RegistryError::Store(format!(
            "could not claim a row id in {} after {} attempts",
            self.dir.display(),
            MAX_CREATE_ATTEMPTS
        )))
    }

    fn get_by_id(&self, id: StoreId) -> Result<Option<StoredSchema>> {
        let path = self.row_path(id);
        if !path.exists() {
            return Ok(None);
        }
        self.read_row(&path).map(Some)
    }

    fn get_all(&self) -> Result<Vec<StoredSchema>> {
        let mut rows = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if parse_row_id(&path).is_none() {
                continue;
            }
            match self.read_row(&path) {
                Ok(row) => rows.push(row),
                // hand-edited or corrupted rows
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable schema row"),
            }
        }
        rows.sort_by_key(|row| row.id);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Contract;
    use serde_json::json;
    use tempfile::tempdir;

    fn payload(contract: Value) -> Value {
        json!({"collector_name": "wikipedia", "current_schema_version": "0.1.0", "schema": contract})
    }

    #[test]
    fn test_create_and_reopen() {
        let dir = tempdir().unwrap();
        let id = {
            let store = FileSchemaStore::open(dir.path(), SchemaKind::RawData).unwrap();
            store.create(&payload(json!({"type": "object"}))).unwrap()
        };

        let store = FileSchemaStore::open(dir.path(), SchemaKind::RawData).unwrap();
        let row = store.get_by_id(id).unwrap().unwrap();
        assert_eq!(row.kind, SchemaKind::RawData);
        assert_eq!(row.payload["collector_name"], "wikipedia");
        assert!(store.dir().ends_with("raw_data_metadata_schemas"));
    }

    #[test]
    fn test_two_handles_do_not_collide() {
        let dir = tempdir().unwrap();
        let a = FileSchemaStore::open(dir.path(), SchemaKind::CleanedData).unwrap();
        let b = FileSchemaStore::open(dir.path(), SchemaKind::CleanedData).unwrap();

        let first = a.create(&payload(json!({"type": "object"}))).unwrap();
        let second = b.create(&payload(json!({"type": "object"}))).unwrap();

        assert_ne!(first, second);
        assert_eq!(a.get_all().unwrap().len(), 2);
    }

    #[test]
    fn test_kinds_are_separate_tables() {
        let dir = tempdir().unwrap();
        let raw = FileSchemaStore::open(dir.path(), SchemaKind::RawData).unwrap();
        let cleaned = FileSchemaStore::open(dir.path(), SchemaKind::CleanedData).unwrap();

        raw.create(&payload(json!({"type": "object"}))).unwrap();
        assert!(cleaned.get_all().unwrap().is_empty());
    }

    #[test]
    fn test_unreadable_rows_are_skipped() {
        let dir = tempdir().unwrap();
        let store = FileSchemaStore::open(dir.path(), SchemaKind::CleanedData).unwrap();
        store.create(&payload(json!({"type": "object"}))).unwrap();
        fs::write(store.dir().join("0000000009.json"), "{ not json").unwrap();
        fs::write(store.dir().join("README.txt"), "ignored").unwrap();

        assert_eq!(store.get_all().unwrap().len(), 1);
    }

    #[test]
    fn test_create_leaves_only_the_row_file() {
        let dir = tempdir().unwrap();
        let store = FileSchemaStore::open(dir.path(), SchemaKind::CleanedData).unwrap();
        let id = store.create(&payload(json!({"type": "object"}))).unwrap();

        let names: Vec<String> = fs::read_dir(store.dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![format!("{:010}.json", id.0)]);
    }

    #[test]
    fn test_abandoned_staging_file_is_ignored() {
        let dir = tempdir().unwrap();
        let store = FileSchemaStore::open(dir.path(), SchemaKind::CleanedData).unwrap();
        // a writer that died mid-write leaves a truncated staging file
        fs::write(store.dir().join(".0000000001-4242-0.tmp"), "{\"id\": 1, \"ki").unwrap();

        assert!(store.get_all().unwrap().is_empty());
        assert_eq!(store.get_by_id(StoreId(1)).unwrap(), None);

        let id = store.create(&payload(json!({"type": "object"}))).unwrap();
        assert_eq!(id, StoreId(1));
        assert_eq!(store.get_all().unwrap().len(), 1);
    }

    #[test]
    fn test_find_by_exact_content_scans_rows() {
        let dir = tempdir().unwrap();
        let store = FileSchemaStore::open(dir.path(), SchemaKind::CleanedData).unwrap();
        let contract = json!({"type": "object", "properties": {"a": {"type": "integer"}}});
        let id = store.create(&payload(contract.clone())).unwrap();

        let found = store.find_by_exact_content(&Contract::new(contract)).unwrap().unwrap();
        assert_eq!(found.id, id);
    }
}
