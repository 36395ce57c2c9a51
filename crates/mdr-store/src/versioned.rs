//! Versioned filesystem store.
//!
//! Layout under the store root:
//!
//! ```text
//! records/{slot dirs}/{id}.log    append-only revision log (JSON lines)
//! objects/{2 hex}/{62 hex}        content blobs (see ObjectPool)
//! ```
//!
//! The last entry of a log is the document's current state. A trailing line
//! without a newline is a torn append from a crash: it is ignored on read and
//! cut off before the next append.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mdr_types::{
    Identifier, MetadataRecord, Namespace, ObjectId, Revision, RevisionKind, RevisionToken,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::author::AuthorProvider;
use crate::durable::{append_synced, truncate_to};
use crate::error::{StoreError, StoreResult};
use crate::layout::{scan, SlotLayout};
use crate::pool::ObjectPool;
use crate::traits::{ensure_namespace, MetadataStore, StoreCapabilities};

const LOG_EXTENSION: &str = "log";

/// One line of a revision log.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct LogEntry {
    token: RevisionToken,
    kind: RevisionKind,
    author: String,
    timestamp: DateTime<Utc>,
    modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    object: Option<ObjectId>,
}

impl LogEntry {
    fn to_revision(&self, id: &Identifier) -> Revision {
        Revision {
            id: id.clone(),
            token: self.token,
            kind: self.kind,
            author: self.author.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// Parsed log plus the byte length covered by complete lines.
struct Log {
    entries: Vec<LogEntry>,
    valid_len: u64,
    file_len: u64,
}

impl Log {
    fn head(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    fn is_active(&self) -> bool {
        self.head().is_some_and(|e| e.kind != RevisionKind::Deleted)
    }
}

/// Append-only revision history per document, content deduplicated in an
/// [`ObjectPool`].
pub struct VersionedStore {
    namespace: Namespace,
    root: PathBuf,
    layout: SlotLayout,
    pool: ObjectPool,
    author: Arc<dyn AuthorProvider>,
    write_lock: Mutex<()>,
}

impl VersionedStore {
    /// Open a store rooted at `root`. Does not touch the filesystem.
    pub fn open(
        namespace: Namespace,
        root: impl Into<PathBuf>,
        layout: SlotLayout,
        author: Arc<dyn AuthorProvider>,
    ) -> Self {
        let root = root.into();
        let pool = ObjectPool::new(root.join("objects"));
        Self {
            namespace,
            root,
            layout,
            pool,
            author,
            write_lock: Mutex::new(()),
        }
    }

    /// Create the record and object directories if missing.
    pub fn provision(&self) -> StoreResult<()> {
        fs::create_dir_all(self.records_dir())?;
        self.pool.provision()?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn records_dir(&self) -> PathBuf {
        self.root.join("records")
    }

    fn log_path(&self, id: &Identifier) -> PathBuf {
        self.layout.file_path(&self.records_dir(), id, LOG_EXTENSION)
    }

    fn read_log(&self, path: &Path) -> StoreResult<Log> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Log {
                    entries: Vec::new(),
                    valid_len: 0,
                    file_len: 0,
                })
            }
            Err(e) => return Err(e.into()),
        };

        let valid_len = data
            .iter()
            .rposition(|b| *b == b'\n')
            .map(|pos| pos + 1)
            .unwrap_or(0);
        if valid_len < data.len() {
            warn!(
                path = %path.display(),
                torn_bytes = data.len() - valid_len,
                "ignoring torn revision log tail"
            );
        }

        let mut entries: Vec<LogEntry> = Vec::new();
        for (line_no, line) in data[..valid_len].split(|b| *b == b'\n').enumerate() {
            if line.is_empty() {
                continue;
            }
            let entry: LogEntry =
                serde_json::from_slice(line).map_err(|e| StoreError::Corrupt {
                    path: path.to_path_buf(),
                    reason: format!("line {}: {e}", line_no + 1),
                })?;
            if let Some(prev) = entries.last() {
                if entry.token <= prev.token {
                    return Err(StoreError::Corrupt {
                        path: path.to_path_buf(),
                        reason: format!(
                            "line {}: token {} does not follow {}",
                            line_no + 1,
                            entry.token,
                            prev.token
                        ),
                    });
                }
            }
            entries.push(entry);
        }

        Ok(Log {
            entries,
            valid_len: valid_len as u64,
            file_len: data.len() as u64,
        })
    }

    fn append(&self, path: &Path, log: &Log, entry: &LogEntry) -> StoreResult<()> {
        if log.valid_len < log.file_len {
            truncate_to(path, log.valid_len)?;
        }
        let line =
            serde_json::to_vec(entry).map_err(|e| StoreError::Serialization(e.to_string()))?;
        append_synced(path, &line)?;
        Ok(())
    }

    fn entry(
        &self,
        token: RevisionToken,
        kind: RevisionKind,
        modified: DateTime<Utc>,
        object: Option<ObjectId>,
    ) -> LogEntry {
        LogEntry {
            token,
            kind,
            author: self.author.current_author(),
            timestamp: Utc::now(),
            modified,
            object,
        }
    }

    fn content_of(&self, entry: &LogEntry) -> StoreResult<Option<Vec<u8>>> {
        match (entry.kind, entry.object) {
            (RevisionKind::Deleted, _) | (_, None) => Ok(None),
            (_, Some(object)) => self.pool.get_referenced(&object).map(Some),
        }
    }
}

impl MetadataStore for VersionedStore {
    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            versioned: true,
            content_addressed: true,
            persistent: true,
        }
    }

    fn create(&self, id: &Identifier, content: &[u8], modified: DateTime<Utc>) -> StoreResult<()> {
        ensure_namespace(&self.namespace, id)?;
        let _guard = self.write_lock.lock();
        let path = self.log_path(id);
        let log = self.read_log(&path)?;
        if !log.entries.is_empty() {
            return Err(StoreError::AlreadyExists(id.clone()));
        }
        let object = self.pool.put(content)?;
        let entry = self.entry(RevisionToken::FIRST, RevisionKind::Created, modified, Some(object));
        self.append(&path, &log, &entry)?;
        debug!(%id, token = %entry.token, "versioned store create");
        Ok(())
    }

    fn update(&self, id: &Identifier, content: &[u8], modified: DateTime<Utc>) -> StoreResult<()> {
        ensure_namespace(&self.namespace, id)?;
        let _guard = self.write_lock.lock();
        let path = self.log_path(id);
        let log = self.read_log(&path)?;
        let head = match log.head() {
            Some(head) if log.is_active() => head,
            _ => return Err(StoreError::NotFound(id.clone())),
        };
        let object = self.pool.put(content)?;
        let entry = self.entry(head.token.next(), RevisionKind::Modified, modified, Some(object));
        self.append(&path, &log, &entry)?;
        debug!(%id, token = %entry.token, "versioned store update");
        Ok(())
    }

    fn delete(&self, id: &Identifier) -> StoreResult<()> {
        ensure_namespace(&self.namespace, id)?;
        let _guard = self.write_lock.lock();
        let path = self.log_path(id);
        let log = self.read_log(&path)?;
        let head = match log.head() {
            Some(head) if log.is_active() => head,
            _ => return Err(StoreError::NotFound(id.clone())),
        };
        let entry = self.entry(head.token.next(), RevisionKind::Deleted, Utc::now(), None);
        self.append(&path, &log, &entry)?;
        debug!(%id, token = %entry.token, "versioned store delete");
        Ok(())
    }

    fn retrieve_current(&self, id: &Identifier) -> StoreResult<Option<Vec<u8>>> {
        ensure_namespace(&self.namespace, id)?;
        let log = self.read_log(&self.log_path(id))?;
        match log.head() {
            Some(head) => self.content_of(head),
            None => Ok(None),
        }
    }

    fn retrieve_revision(
        &self,
        id: &Identifier,
        token: RevisionToken,
    ) -> StoreResult<Option<Vec<u8>>> {
        ensure_namespace(&self.namespace, id)?;
        let log = self.read_log(&self.log_path(id))?;
        match log.entries.iter().find(|e| e.token == token) {
            Some(entry) => self.content_of(entry),
            None => Ok(None),
        }
    }

    fn list_revisions(&self, id: &Identifier) -> StoreResult<Vec<Revision>> {
        ensure_namespace(&self.namespace, id)?;
        let log = self.read_log(&self.log_path(id))?;
        Ok(log.entries.iter().map(|e| e.to_revision(id)).collect())
    }

    fn record(&self, id: &Identifier) -> StoreResult<Option<MetadataRecord>> {
        ensure_namespace(&self.namespace, id)?;
        let log = self.read_log(&self.log_path(id))?;
        let Some(head) = log.head() else {
            return Ok(None);
        };
        match self.content_of(head)? {
            Some(content) => Ok(Some(MetadataRecord::active(
                id.clone(),
                content,
                head.modified,
            ))),
            None => Ok(Some(MetadataRecord::tombstone(id.clone(), head.modified))),
        }
    }

    fn exists(&self, id: &Identifier) -> StoreResult<bool> {
        ensure_namespace(&self.namespace, id)?;
        Ok(self.read_log(&self.log_path(id))?.is_active())
    }

    fn list_ids(&self) -> StoreResult<Vec<Identifier>> {
        let mut ids = Vec::new();
        for (id, path) in scan(&self.records_dir(), &self.namespace, LOG_EXTENSION)? {
            if self.read_log(&path)?.is_active() {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn highest_stored_number(&self) -> StoreResult<u32> {
        Ok(scan(&self.records_dir(), &self.namespace, LOG_EXTENSION)?
            .iter()
            .map(|(id, _)| id.number())
            .max()
            .unwrap_or(0))
    }
}

impl std::fmt::Debug for VersionedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedStore")
            .field("namespace", &self.namespace)
            .field("root", &self.root)
            .field("layout", &self.layout.to_string())
            .finish()
    }
}
