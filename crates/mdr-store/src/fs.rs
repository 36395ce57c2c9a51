//! Non-versioned filesystem store.
//!
//! Each active document is one file `{root}/{slot dirs}/{id}.{suffix}`
//! whose mtime is the document's `last_modified`, kept to whole seconds so
//! filesystems with coarse timestamps round-trip it. Deleting a document
//! removes that file and leaves an empty `{id}.deleted` marker beside it, so
//! the number still counts as used.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, SubsecRound, Utc};
use mdr_types::{Identifier, MetadataRecord, Namespace, Revision, RevisionToken};
use parking_lot::Mutex;
use tracing::debug;

use crate::durable::write_atomic;
use crate::error::{StoreError, StoreResult};
use crate::layout::{scan, SlotLayout};
use crate::traits::{ensure_namespace, MetadataStore, RepairOutcome, StoreCapabilities};

/// Extension of tombstone marker files.
const TOMBSTONE_EXTENSION: &str = "deleted";

/// One file per document, no history.
pub struct FileStore {
    namespace: Namespace,
    root: PathBuf,
    layout: SlotLayout,
    suffix: String,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open a store rooted at `root`. Does not touch the filesystem.
    pub fn open(
        namespace: Namespace,
        root: impl Into<PathBuf>,
        layout: SlotLayout,
        suffix: impl Into<String>,
    ) -> StoreResult<Self> {
        let suffix = suffix.into();
        if suffix.is_empty() || suffix == TOMBSTONE_EXTENSION || suffix.contains(['/', '.']) {
            return Err(StoreError::Configuration(format!(
                "unusable file suffix {suffix:?}"
            )));
        }
        Ok(Self {
            namespace,
            root: root.into(),
            layout,
            suffix,
            write_lock: Mutex::new(()),
        })
    }

    /// Create the root directory if missing.
    pub fn provision(&self) -> StoreResult<()> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn content_path(&self, id: &Identifier) -> PathBuf {
        self.layout.file_path(&self.root, id, &self.suffix)
    }

    fn tombstone_path(&self, id: &Identifier) -> PathBuf {
        self.layout.file_path(&self.root, id, TOMBSTONE_EXTENSION)
    }

    fn is_active(&self, id: &Identifier) -> bool {
        self.content_path(id).exists() && !self.tombstone_path(id).exists()
    }
}

/// `modified` at the precision file mtimes are written with.
fn file_time(modified: DateTime<Utc>) -> DateTime<Utc> {
    modified.trunc_subsecs(0)
}

fn modified_of(path: &Path) -> StoreResult<DateTime<Utc>> {
    let mtime = fs::metadata(path)?.modified()?;
    Ok(DateTime::<Utc>::from(mtime))
}

fn read_optional(path: &Path) -> StoreResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl MetadataStore for FileStore {
    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            versioned: false,
            content_addressed: false,
            persistent: true,
        }
    }

    fn create(&self, id: &Identifier, content: &[u8], modified: DateTime<Utc>) -> StoreResult<()> {
        ensure_namespace(&self.namespace, id)?;
        let _guard = self.write_lock.lock();
        let path = self.content_path(id);
        if path.exists() || self.tombstone_path(id).exists() {
            return Err(StoreError::AlreadyExists(id.clone()));
        }
        write_atomic(&path, content, Some(SystemTime::from(file_time(modified))))?;
        debug!(%id, path = %path.display(), "file store create");
        Ok(())
    }

    fn update(&self, id: &Identifier, content: &[u8], modified: DateTime<Utc>) -> StoreResult<()> {
        ensure_namespace(&self.namespace, id)?;
        let _guard = self.write_lock.lock();
        if !self.is_active(id) {
            return Err(StoreError::NotFound(id.clone()));
        }
        write_atomic(&self.content_path(id), content, Some(SystemTime::from(file_time(modified))))?;
        debug!(%id, "file store update");
        Ok(())
    }

    fn delete(&self, id: &Identifier) -> StoreResult<()> {
        ensure_namespace(&self.namespace, id)?;
        let _guard = self.write_lock.lock();
        if !self.is_active(id) {
            return Err(StoreError::NotFound(id.clone()));
        }
        // Marker first: a crash between the two steps leaves a tombstone.
        write_atomic(&self.tombstone_path(id), &[], Some(SystemTime::now()))?;
        fs::remove_file(self.content_path(id))?;
        debug!(%id, "file store delete");
        Ok(())
    }

    fn retrieve_current(&self, id: &Identifier) -> StoreResult<Option<Vec<u8>>> {
        ensure_namespace(&self.namespace, id)?;
        if self.tombstone_path(id).exists() {
            return Ok(None);
        }
        read_optional(&self.content_path(id))
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
        let tombstone = self.tombstone_path(id);
        if tombstone.exists() {
            return Ok(Some(MetadataRecord::tombstone(
                id.clone(),
                modified_of(&tombstone)?,
            )));
        }
        let path = self.content_path(id);
        match read_optional(&path)? {
            Some(content) => Ok(Some(MetadataRecord::active(
                id.clone(),
                content,
                modified_of(&path)?,
            ))),
            None => Ok(None),
        }
    }

    fn exists(&self, id: &Identifier) -> StoreResult<bool> {
        ensure_namespace(&self.namespace, id)?;
        Ok(self.is_active(id))
    }

    fn list_ids(&self) -> StoreResult<Vec<Identifier>> {
        let mut ids: Vec<Identifier> = scan(&self.root, &self.namespace, &self.suffix)?
            .into_iter()
            .map(|(id, _)| id)
            .filter(|id| !self.tombstone_path(id).exists())
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn repair(
        &self,
        id: &Identifier,
        content: &[u8],
        modified: DateTime<Utc>,
    ) -> StoreResult<RepairOutcome> {
        match self.record(id)? {
            Some(record) if !record.deleted => {
                if record.is_up_to_date(content, file_time(modified)) {
                    Ok(RepairOutcome::Unchanged)
                } else {
                    self.update(id, content, modified)?;
                    Ok(RepairOutcome::Updated)
                }
            }
            _ => Err(StoreError::NotFound(id.clone())),
        }
    }

    fn highest_stored_number(&self) -> StoreResult<u32> {
        let active = scan(&self.root, &self.namespace, &self.suffix)?;
        let deleted = scan(&self.root, &self.namespace, TOMBSTONE_EXTENSION)?;
        Ok(active
            .iter()
            .chain(deleted.iter())
            .map(|(id, _)| id.number())
            .max()
            .unwrap_or(0))
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("namespace", &self.namespace)
            .field("root", &self.root)
            .field("layout", &self.layout.to_string())
            .finish()
    }
}
