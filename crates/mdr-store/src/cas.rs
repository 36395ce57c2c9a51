//! Content-addressed, non-versioned store.
//!
//! Each document is a small pointer file `refs/{slot dirs}/{id}.ref` naming
//! the pool object that holds its current content. Identical documents share
//! one blob. Deleting rewrites the pointer as a tombstone.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use mdr_types::{Identifier, MetadataRecord, Namespace, ObjectId, Revision, RevisionToken};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::durable::write_atomic;
use crate::error::{StoreError, StoreResult};
use crate::layout::{scan, SlotLayout};
use crate::pool::ObjectPool;
use crate::traits::{ensure_namespace, MetadataStore, StoreCapabilities};

const REF_EXTENSION: &str = "ref";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct Pointer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    object: Option<ObjectId>,
    modified: DateTime<Utc>,
    deleted: bool,
}

/// Current content only, stored by hash in an [`ObjectPool`].
pub struct ContentAddressedStore {
    namespace: Namespace,
    root: PathBuf,
    layout: SlotLayout,
    pool: ObjectPool,
    write_lock: Mutex<()>,
}

impl ContentAddressedStore {
    /// Open a store rooted at `root`. Does not touch the filesystem.
    pub fn open(namespace: Namespace, root: impl Into<PathBuf>, layout: SlotLayout) -> Self {
        let root = root.into();
        let pool = ObjectPool::new(root.join("objects"));
        Self {
            namespace,
            root,
            layout,
            pool,
            write_lock: Mutex::new(()),
        }
    }

    /// Create the pointer and object directories if missing.
    pub fn provision(&self) -> StoreResult<()> {
        fs::create_dir_all(self.refs_dir())?;
        self.pool.provision()?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The pool holding document content.
    pub fn pool(&self) -> &ObjectPool {
        &self.pool
    }

    fn refs_dir(&self) -> PathBuf {
        self.root.join("refs")
    }

    fn pointer_path(&self, id: &Identifier) -> PathBuf {
        self.layout.file_path(&self.refs_dir(), id, REF_EXTENSION)
    }

    fn read_pointer(&self, path: &Path) -> StoreResult<Option<Pointer>> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let pointer: Pointer = serde_json::from_slice(&data).map_err(|e| StoreError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if !pointer.deleted && pointer.object.is_none() {
            return Err(StoreError::Corrupt {
                path: path.to_path_buf(),
                reason: "active pointer without object".into(),
            });
        }
        Ok(Some(pointer))
    }

    fn write_pointer(&self, path: &Path, pointer: &Pointer) -> StoreResult<()> {
        let data =
            serde_json::to_vec(pointer).map_err(|e| StoreError::Serialization(e.to_string()))?;
        write_atomic(path, &data, None)?;
        Ok(())
    }

    fn active_pointer(&self, id: &Identifier) -> StoreResult<Option<Pointer>> {
        Ok(self
            .read_pointer(&self.pointer_path(id))?
            .filter(|p| !p.deleted))
    }
}

impl MetadataStore for ContentAddressedStore {
    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            versioned: false,
            content_addressed: true,
            persistent: true,
        }
    }

    fn create(&self, id: &Identifier, content: &[u8], modified: DateTime<Utc>) -> StoreResult<()> {
        ensure_namespace(&self.namespace, id)?;
        let _guard = self.write_lock.lock();
        let path = self.pointer_path(id);
        if self.read_pointer(&path)?.is_some() {
            return Err(StoreError::AlreadyExists(id.clone()));
        }
        let object = self.pool.put(content)?;
        self.write_pointer(
            &path,
            &Pointer {
                object: Some(object),
                modified,
                deleted: false,
            },
        )?;
        debug!(%id, object = %object.short_hex(), "cas store create");
        Ok(())
    }

    fn update(&self, id: &Identifier, content: &[u8], modified: DateTime<Utc>) -> StoreResult<()> {
        ensure_namespace(&self.namespace, id)?;
        let _guard = self.write_lock.lock();
        if self.active_pointer(id)?.is_none() {
            return Err(StoreError::NotFound(id.clone()));
        }
        let object = self.pool.put(content)?;
        self.write_pointer(
            &self.pointer_path(id),
            &Pointer {
                object: Some(object),
                modified,
                deleted: false,
            },
        )?;
        debug!(%id, object = %object.short_hex(), "cas store update");
        Ok(())
    }

    fn delete(&self, id: &Identifier) -> StoreResult<()> {
        ensure_namespace(&self.namespace, id)?;
        let _guard = self.write_lock.lock();
        if self.active_pointer(id)?.is_none() {
            return Err(StoreError::NotFound(id.clone()));
        }
        self.write_pointer(
            &self.pointer_path(id),
            &Pointer {
                object: None,
                modified: Utc::now(),
                deleted: true,
            },
        )?;
        debug!(%id, "cas store delete");
        Ok(())
    }

    fn retrieve_current(&self, id: &Identifier) -> StoreResult<Option<Vec<u8>>> {
        ensure_namespace(&self.namespace, id)?;
        match self.active_pointer(id)?.and_then(|p| p.object) {
            Some(object) => self.pool.get_referenced(&object).map(Some),
            None => Ok(None),
        }
    }

    fn retrieve_revision(
        &self,
        id: &Identifier,
        _token: RevisionToken,
    ) -> StoreResult<Option<Vec<u8>>> {
        ensure_namespace(&self.namespace, id)?;
        Ok(None)
    }

    fn list_revisions(&self, id: &Identifier) -> StoreResult<Vec<Revision>> {
        ensure_namespace(&self.namespace, id)?;
        Ok(Vec::new())
    }

    fn record(&self, id: &Identifier) -> StoreResult<Option<MetadataRecord>> {
        ensure_namespace(&self.namespace, id)?;
        let Some(pointer) = self.read_pointer(&self.pointer_path(id))? else {
            return Ok(None);
        };
        match pointer.object {
            Some(object) if !pointer.deleted => Ok(Some(MetadataRecord::active(
                id.clone(),
                self.pool.get_referenced(&object)?,
                pointer.modified,
            ))),
            _ => Ok(Some(MetadataRecord::tombstone(id.clone(), pointer.modified))),
        }
    }

    fn exists(&self, id: &Identifier) -> StoreResult<bool> {
        ensure_namespace(&self.namespace, id)?;
        Ok(self.active_pointer(id)?.is_some())
    }

    fn list_ids(&self) -> StoreResult<Vec<Identifier>> {
        let mut ids = Vec::new();
        for (id, path) in scan(&self.refs_dir(), &self.namespace, REF_EXTENSION)? {
            if self.read_pointer(&path)?.is_some_and(|p| !p.deleted) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn highest_stored_number(&self) -> StoreResult<u32> {
        Ok(scan(&self.refs_dir(), &self.namespace, REF_EXTENSION)?
            .iter()
            .map(|(id, _)| id.number())
            .max()
            .unwrap_or(0))
    }
}

impl std::fmt::Debug for ContentAddressedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentAddressedStore")
            .field("namespace", &self.namespace)
            .field("root", &self.root)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::RepairOutcome;

    fn ns() -> Namespace {
        Namespace::new("DocPortal", "document").unwrap()
    }

    fn id(number: u32) -> Identifier {
        ns().identifier(number).unwrap()
    }

    fn stamp() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn store(dir: &Path) -> ContentAddressedStore {
        let store = ContentAddressedStore::open(ns(), dir, "4-4".parse().unwrap());
        store.provision().unwrap();
        store
    }

    #[test]
    fn lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.create(&id(1), b"A", stamp()).unwrap();
        store.update(&id(1), b"B", stamp()).unwrap();
        assert_eq!(store.retrieve_current(&id(1)).unwrap().unwrap(), b"B");
        store.delete(&id(1)).unwrap();
        assert!(store.retrieve_current(&id(1)).unwrap().is_none());
        assert!(matches!(
            store.create(&id(1), b"C", stamp()),
            Err(StoreError::AlreadyExists(_))
        ));
        assert!(store.list_revisions(&id(1)).unwrap().is_empty());
    }

    #[test]
    fn identical_documents_share_storage() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.create(&id(1), b"<same/>", stamp()).unwrap();
        store.create(&id(2), b"<same/>", stamp()).unwrap();
        assert!(store.pool().contains(&ObjectPool::id_of(b"<same/>")));
        let blobs: usize = fs::read_dir(store.pool().root())
            .unwrap()
            .map(|d| fs::read_dir(d.unwrap().path()).unwrap().count())
            .sum();
        assert_eq!(blobs, 1);
    }

    #[test]
    fn highest_counts_tombstones() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.create(&id(4), b"A", stamp()).unwrap();
        store.create(&id(11), b"B", stamp()).unwrap();
        store.delete(&id(11)).unwrap();
        assert_eq!(store.list_ids().unwrap(), vec![id(4)]);
        assert_eq!(store.highest_stored_number().unwrap(), 11);
    }

    #[test]
    fn repair_and_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.create(&id(1), b"A", stamp()).unwrap();
        assert_eq!(
            store.repair(&id(1), b"A", stamp()).unwrap(),
            RepairOutcome::Unchanged
        );
        let record = store.record(&id(1)).unwrap().unwrap();
        assert_eq!(record.content, b"A");
        assert_eq!(record.last_modified, stamp());
    }

    #[test]
    fn garbage_pointer_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let path = store.pointer_path(&id(1));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"not json").unwrap();
        assert!(matches!(
            store.exists(&id(1)),
            Err(StoreError::Corrupt { .. })
        ));
    }
}
