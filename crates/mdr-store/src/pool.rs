use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use mdr_types::ObjectId;
use tracing::debug;

use crate::durable::write_atomic;
use crate::error::{StoreError, StoreResult};

/// Domain tag for document content blobs.
const CONTENT_DOMAIN: &str = "mdr-content-v1";

/// Content-addressed blob directory.
///
/// Blobs are immutable and named by the BLAKE3 hash of their bytes, laid out
/// as `{root}/{first 2 hex}/{remaining 62 hex}`. Writing the same bytes
/// twice stores them once.
#[derive(Clone, Debug)]
pub struct ObjectPool {
    root: PathBuf,
}

impl ObjectPool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The pool directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the pool directory if missing.
    pub fn provision(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root)
    }

    /// The id `data` would be stored under.
    pub fn id_of(data: &[u8]) -> ObjectId {
        ObjectId::digest(CONTENT_DOMAIN, data)
    }

    /// Store `data` and return its id. A no-op if already present.
    pub fn put(&self, data: &[u8]) -> StoreResult<ObjectId> {
        let id = Self::id_of(data);
        let path = self.path_of(&id);
        if !path.exists() {
            write_atomic(&path, data, None)?;
            debug!(object = %id.short_hex(), len = data.len(), "pool write");
        }
        Ok(id)
    }

    /// Read a blob, verifying its hash.
    pub fn get(&self, id: &ObjectId) -> StoreResult<Option<Vec<u8>>> {
        let path = self.path_of(id);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let computed = Self::id_of(&data);
        if computed != *id {
            return Err(StoreError::Corrupt {
                path,
                reason: format!("hash mismatch: expected {id}, computed {computed}"),
            });
        }
        Ok(Some(data))
    }

    /// Read a blob that a record refers to; a missing blob is corruption.
    pub(crate) fn get_referenced(&self, id: &ObjectId) -> StoreResult<Vec<u8>> {
        self.get(id)?.ok_or_else(|| StoreError::Corrupt {
            path: self.path_of(id),
            reason: "referenced object is missing".into(),
        })
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.path_of(id).exists()
    }

    fn path_of(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.root.join(&hex[..2]).join(&hex[2..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ObjectPool::new(dir.path());
        let id = pool.put(b"<mods/>").unwrap();
        assert!(pool.contains(&id));
        assert_eq!(pool.get(&id).unwrap().unwrap(), b"<mods/>");
    }

    #[test]
    fn identical_content_is_stored_once() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ObjectPool::new(dir.path());
        let a = pool.put(b"same").unwrap();
        let b = pool.put(b"same").unwrap();
        assert_eq!(a, b);
        let hex = a.to_hex();
        assert_eq!(fs::read_dir(dir.path().join(&hex[..2])).unwrap().count(), 1);
    }

    #[test]
    fn missing_blob_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ObjectPool::new(dir.path());
        assert!(pool.get(&ObjectPool::id_of(b"never")).unwrap().is_none());
        assert!(matches!(
            pool.get_referenced(&ObjectPool::id_of(b"never")),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn tampered_blob_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ObjectPool::new(dir.path());
        let id = pool.put(b"original").unwrap();
        fs::write(pool.path_of(&id), b"tampered").unwrap();
        assert!(matches!(pool.get(&id), Err(StoreError::Corrupt { .. })));
    }
}
