use chrono::{DateTime, Utc};
use mdr_types::{Identifier, MetadataRecord, Namespace, Revision, RevisionToken};

use crate::error::{StoreError, StoreResult};

/// Optional features a backend offers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreCapabilities {
    /// Keeps an append-only revision history and can serve old revisions.
    pub versioned: bool,
    /// Stores content by hash, so identical documents share one blob.
    pub content_addressed: bool,
    /// Survives process restart.
    pub persistent: bool,
}

/// What [`MetadataStore::repair`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepairOutcome {
    /// Stored content was already identical and at least as fresh.
    Unchanged,
    /// Stored content was replaced.
    Updated,
}

/// Persistence contract for metadata documents of one namespace.
///
/// All implementations must satisfy these invariants:
/// - `create` fails with [`StoreError::AlreadyExists`] for any identifier
///   that was ever created, including tombstoned ones.
/// - `update`, `delete` and `repair` fail with [`StoreError::NotFound`]
///   unless the record is active.
/// - `highest_stored_number` counts tombstoned identifiers.
/// - For versioned stores, the last revision is `Deleted` iff the record is
///   tombstoned, and tokens increase with every mutation.
/// - Identifiers from another namespace are rejected with
///   [`StoreError::WrongNamespace`].
pub trait MetadataStore: Send + Sync {
    /// Namespace served by this store.
    fn namespace(&self) -> &Namespace;

    /// Features offered by this backend.
    fn capabilities(&self) -> StoreCapabilities;

    /// Store a new document.
    fn create(&self, id: &Identifier, content: &[u8], modified: DateTime<Utc>) -> StoreResult<()>;

    /// Replace the content of an active document.
    fn update(&self, id: &Identifier, content: &[u8], modified: DateTime<Utc>) -> StoreResult<()>;

    /// Tombstone an active document.
    fn delete(&self, id: &Identifier) -> StoreResult<()>;

    /// Current content, `None` if absent or tombstoned.
    fn retrieve_current(&self, id: &Identifier) -> StoreResult<Option<Vec<u8>>>;

    /// Content as of `token`.
    ///
    /// Returns `Ok(None)` for unknown tokens, for `Deleted` revisions, and
    /// always for non-versioned stores.
    fn retrieve_revision(
        &self,
        id: &Identifier,
        token: RevisionToken,
    ) -> StoreResult<Option<Vec<u8>>>;

    /// History of `id`, oldest first. Empty for non-versioned stores.
    fn list_revisions(&self, id: &Identifier) -> StoreResult<Vec<Revision>>;

    /// Current record including tombstones, `None` if never created.
    fn record(&self, id: &Identifier) -> StoreResult<Option<MetadataRecord>>;

    /// Returns `true` if an active record exists.
    fn exists(&self, id: &Identifier) -> StoreResult<bool> {
        Ok(self.record(id)?.is_some_and(|r| !r.deleted))
    }

    /// Active identifiers, ascending by number.
    fn list_ids(&self) -> StoreResult<Vec<Identifier>>;

    /// Highest number ever stored (active or tombstoned), 0 if none.
    fn highest_stored_number(&self) -> StoreResult<u32>;

    /// Update `id` unless the stored content is byte-identical and the stored
    /// timestamp is not older than `modified`, in which case nothing is
    /// written and no revision is appended.
    fn repair(
        &self,
        id: &Identifier,
        content: &[u8],
        modified: DateTime<Utc>,
    ) -> StoreResult<RepairOutcome> {
        match self.record(id)? {
            Some(record) if !record.deleted => {
                if record.is_up_to_date(content, modified) {
                    Ok(RepairOutcome::Unchanged)
                } else {
                    self.update(id, content, modified)?;
                    Ok(RepairOutcome::Updated)
                }
            }
            _ => Err(StoreError::NotFound(id.clone())),
        }
    }
}

/// Reject identifiers that do not belong to `namespace`.
pub(crate) fn ensure_namespace(namespace: &Namespace, id: &Identifier) -> StoreResult<()> {
    if id.namespace() == namespace {
        Ok(())
    } else {
        Err(StoreError::WrongNamespace {
            expected: namespace.clone(),
            actual: id.clone(),
        })
    }
}
