use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mdr_types::{
    Identifier, MetadataRecord, Namespace, Revision, RevisionKind, RevisionToken,
};
use parking_lot::RwLock;
use tracing::debug;

use crate::author::{AuthorProvider, StaticAuthor};
use crate::error::{StoreError, StoreResult};
use crate::traits::{ensure_namespace, MetadataStore, StoreCapabilities};

/// In-memory, versioned metadata store.
///
/// Intended for tests and embedding. Every document keeps its full revision
/// history; content snapshots are cloned on read and write. Data is lost when
/// the store is dropped.
pub struct InMemoryStore {
    namespace: Namespace,
    author: Arc<dyn AuthorProvider>,
    documents: RwLock<BTreeMap<u32, Document>>,
}

struct Document {
    id: Identifier,
    last_modified: DateTime<Utc>,
    history: Vec<(Revision, Option<Vec<u8>>)>,
}

impl Document {
    fn head(&self) -> Option<&(Revision, Option<Vec<u8>>)> {
        self.history.last()
    }

    fn is_deleted(&self) -> bool {
        self.head()
            .is_some_and(|(rev, _)| rev.kind == RevisionKind::Deleted)
    }

    fn next_token(&self) -> RevisionToken {
        self.head()
            .map(|(rev, _)| rev.token.next())
            .unwrap_or(RevisionToken::FIRST)
    }
}

impl InMemoryStore {
    /// Create an empty store whose revisions are authored by `"system"`.
    pub fn new(namespace: Namespace) -> Self {
        Self::with_author(namespace, Arc::new(StaticAuthor::default()))
    }

    pub fn with_author(namespace: Namespace, author: Arc<dyn AuthorProvider>) -> Self {
        Self {
            namespace,
            author,
            documents: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of documents ever created, tombstones included.
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// Returns `true` if nothing was ever created.
    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    fn revision(&self, id: &Identifier, token: RevisionToken, kind: RevisionKind) -> Revision {
        Revision {
            id: id.clone(),
            token,
            kind,
            author: self.author.current_author(),
            timestamp: Utc::now(),
        }
    }

    fn append(
        &self,
        id: &Identifier,
        kind: RevisionKind,
        content: Option<&[u8]>,
        modified: DateTime<Utc>,
    ) -> StoreResult<()> {
        ensure_namespace(&self.namespace, id)?;
        let mut documents = self.documents.write();
        match kind {
            RevisionKind::Created => {
                if documents.contains_key(&id.number()) {
                    return Err(StoreError::AlreadyExists(id.clone()));
                }
                let rev = self.revision(id, RevisionToken::FIRST, kind);
                documents.insert(
                    id.number(),
                    Document {
                        id: id.clone(),
                        last_modified: modified,
                        history: vec![(rev, content.map(<[u8]>::to_vec))],
                    },
                );
            }
            RevisionKind::Modified | RevisionKind::Deleted => {
                let doc = documents
                    .get_mut(&id.number())
                    .filter(|doc| !doc.is_deleted())
                    .ok_or_else(|| StoreError::NotFound(id.clone()))?;
                let rev = self.revision(id, doc.next_token(), kind);
                doc.history.push((rev, content.map(<[u8]>::to_vec)));
                doc.last_modified = modified;
            }
        }
        debug!(%id, %kind, "memory store mutation");
        Ok(())
    }
}

impl MetadataStore for InMemoryStore {
    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            versioned: true,
            content_addressed: false,
            persistent: false,
        }
    }

    fn create(&self, id: &Identifier, content: &[u8], modified: DateTime<Utc>) -> StoreResult<()> {
        self.append(id, RevisionKind::Created, Some(content), modified)
    }

    fn update(&self, id: &Identifier, content: &[u8], modified: DateTime<Utc>) -> StoreResult<()> {
        self.append(id, RevisionKind::Modified, Some(content), modified)
    }

    fn delete(&self, id: &Identifier) -> StoreResult<()> {
        self.append(id, RevisionKind::Deleted, None, Utc::now())
    }

    fn retrieve_current(&self, id: &Identifier) -> StoreResult<Option<Vec<u8>>> {
        ensure_namespace(&self.namespace, id)?;
        let documents = self.documents.read();
        Ok(documents
            .get(&id.number())
            .and_then(Document::head)
            .and_then(|(_, content)| content.clone()))
    }

    fn retrieve_revision(
        &self,
        id: &Identifier,
        token: RevisionToken,
    ) -> StoreResult<Option<Vec<u8>>> {
        ensure_namespace(&self.namespace, id)?;
        let documents = self.documents.read();
        Ok(documents.get(&id.number()).and_then(|doc| {
            doc.history
                .iter()
                .find(|(rev, _)| rev.token == token)
                .and_then(|(_, content)| content.clone())
        }))
    }

    fn list_revisions(&self, id: &Identifier) -> StoreResult<Vec<Revision>> {
        ensure_namespace(&self.namespace, id)?;
        let documents = self.documents.read();
        Ok(documents
            .get(&id.number())
            .map(|doc| doc.history.iter().map(|(rev, _)| rev.clone()).collect())
            .unwrap_or_default())
    }

    fn record(&self, id: &Identifier) -> StoreResult<Option<MetadataRecord>> {
        ensure_namespace(&self.namespace, id)?;
        let documents = self.documents.read();
        Ok(documents.get(&id.number()).map(|doc| {
            match doc.head().and_then(|(_, content)| content.clone()) {
                Some(content) if !doc.is_deleted() => {
                    MetadataRecord::active(doc.id.clone(), content, doc.last_modified)
                }
                _ => MetadataRecord::tombstone(doc.id.clone(), doc.last_modified),
            }
        }))
    }

    fn list_ids(&self) -> StoreResult<Vec<Identifier>> {
        let documents = self.documents.read();
        Ok(documents
            .values()
            .filter(|doc| !doc.is_deleted())
            .map(|doc| doc.id.clone())
            .collect())
    }

    fn highest_stored_number(&self) -> StoreResult<u32> {
        let documents = self.documents.read();
        Ok(documents.keys().next_back().copied().unwrap_or(0))
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("namespace", &self.namespace)
            .field("document_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::RepairOutcome;
    use chrono::Duration;

    fn ns() -> Namespace {
        Namespace::new("DocPortal", "document").unwrap()
    }

    fn id(number: u32) -> Identifier {
        ns().identifier(number).unwrap()
    }

    fn stamp() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    #[test]
    fn create_update_delete() {
        let store = InMemoryStore::new(ns());
        store.create(&id(1), b"A", stamp()).unwrap();
        assert_eq!(store.retrieve_current(&id(1)).unwrap().unwrap(), b"A");
        store.update(&id(1), b"B", stamp()).unwrap();
        assert_eq!(store.retrieve_current(&id(1)).unwrap().unwrap(), b"B");
        store.delete(&id(1)).unwrap();
        assert!(store.retrieve_current(&id(1)).unwrap().is_none());
        assert!(!store.exists(&id(1)).unwrap());
    }

    #[test]
    fn create_twice_fails() {
        let store = InMemoryStore::new(ns());
        store.create(&id(1), b"A", stamp()).unwrap();
        assert!(matches!(
            store.create(&id(1), b"A", stamp()),
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn create_after_delete_fails() {
        let store = InMemoryStore::new(ns());
        store.create(&id(1), b"A", stamp()).unwrap();
        store.delete(&id(1)).unwrap();
        assert!(matches!(
            store.create(&id(1), b"A", stamp()),
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn update_and_delete_missing_fail() {
        let store = InMemoryStore::new(ns());
        assert!(matches!(
            store.update(&id(9), b"B", stamp()),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(store.delete(&id(9)), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn tombstone_blocks_update_and_second_delete() {
        let store = InMemoryStore::new(ns());
        store.create(&id(1), b"A", stamp()).unwrap();
        store.delete(&id(1)).unwrap();
        assert!(matches!(
            store.update(&id(1), b"B", stamp()),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(store.delete(&id(1)), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn wrong_namespace_is_rejected() {
        let store = InMemoryStore::new(ns());
        let other = Namespace::new("DocPortal", "derivate")
            .unwrap()
            .identifier(1)
            .unwrap();
        assert!(matches!(
            store.create(&other, b"A", stamp()),
            Err(StoreError::WrongNamespace { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    #[test]
    fn revisions_follow_mutations() {
        let store = InMemoryStore::with_author(ns(), Arc::new(StaticAuthor::new("editor")));
        store.create(&id(1), b"A", stamp()).unwrap();
        store.update(&id(1), b"B", stamp()).unwrap();
        store.delete(&id(1)).unwrap();

        let revs = store.list_revisions(&id(1)).unwrap();
        let kinds: Vec<_> = revs.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                RevisionKind::Created,
                RevisionKind::Modified,
                RevisionKind::Deleted
            ]
        );
        assert!(revs.windows(2).all(|w| w[0].token < w[1].token));
        assert!(revs.iter().all(|r| r.author == "editor"));
    }

    #[test]
    fn old_revisions_remain_readable() {
        let store = InMemoryStore::new(ns());
        store.create(&id(1), b"A", stamp()).unwrap();
        store.update(&id(1), b"B", stamp()).unwrap();
        store.delete(&id(1)).unwrap();
        let revs = store.list_revisions(&id(1)).unwrap();
        assert_eq!(store.retrieve_revision(&id(1), revs[0].token).unwrap().unwrap(), b"A");
        assert_eq!(store.retrieve_revision(&id(1), revs[1].token).unwrap().unwrap(), b"B");
        assert!(store.retrieve_revision(&id(1), revs[2].token).unwrap().is_none());
        assert!(store
            .retrieve_revision(&id(1), RevisionToken::new(99))
            .unwrap()
            .is_none());
    }

    // -----------------------------------------------------------------------
    // Listing and numbering
    // -----------------------------------------------------------------------

    #[test]
    fn list_ids_excludes_tombstones_and_is_sorted() {
        let store = InMemoryStore::new(ns());
        for n in [5, 2, 9] {
            store.create(&id(n), b"x", stamp()).unwrap();
        }
        store.delete(&id(9)).unwrap();
        assert_eq!(store.list_ids().unwrap(), vec![id(2), id(5)]);
    }

    #[test]
    fn highest_counts_tombstones() {
        let store = InMemoryStore::new(ns());
        assert_eq!(store.highest_stored_number().unwrap(), 0);
        store.create(&id(3), b"x", stamp()).unwrap();
        store.create(&id(7), b"x", stamp()).unwrap();
        store.delete(&id(7)).unwrap();
        assert_eq!(store.highest_stored_number().unwrap(), 7);
    }

    // -----------------------------------------------------------------------
    // Repair
    // -----------------------------------------------------------------------

    #[test]
    fn repair_identical_is_noop() {
        let store = InMemoryStore::new(ns());
        store.create(&id(1), b"A", stamp()).unwrap();
        let outcome = store.repair(&id(1), b"A", stamp()).unwrap();
        assert_eq!(outcome, RepairOutcome::Unchanged);
        assert_eq!(store.list_revisions(&id(1)).unwrap().len(), 1);
    }

    #[test]
    fn repair_newer_or_different_updates() {
        let store = InMemoryStore::new(ns());
        store.create(&id(1), b"A", stamp()).unwrap();
        assert_eq!(
            store
                .repair(&id(1), b"A", stamp() + Duration::seconds(1))
                .unwrap(),
            RepairOutcome::Updated
        );
        assert_eq!(
            store.repair(&id(1), b"B", stamp()).unwrap(),
            RepairOutcome::Updated
        );
        assert_eq!(store.list_revisions(&id(1)).unwrap().len(), 3);
    }

    #[test]
    fn repair_missing_is_not_found() {
        let store = InMemoryStore::new(ns());
        assert!(matches!(
            store.repair(&id(1), b"A", stamp()),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn record_reports_tombstone() {
        let store = InMemoryStore::new(ns());
        assert!(store.record(&id(1)).unwrap().is_none());
        store.create(&id(1), b"A", stamp()).unwrap();
        let record = store.record(&id(1)).unwrap().unwrap();
        assert!(!record.deleted);
        assert_eq!(record.last_modified, stamp());
        store.delete(&id(1)).unwrap();
        assert!(store.record(&id(1)).unwrap().unwrap().deleted);
    }

    // -----------------------------------------------------------------------
    // Concurrency
    // -----------------------------------------------------------------------

    #[test]
    fn concurrent_creates_of_distinct_ids() {
        use std::thread;

        let store = Arc::new(InMemoryStore::new(ns()));
        let handles: Vec<_> = (1..=8)
            .map(|n| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.create(&id(n), b"x", stamp()).unwrap())
            })
            .collect();
        for h in handles {
            h.join().expect("thread should not panic");
        }
        assert_eq!(store.list_ids().unwrap().len(), 8);
        assert_eq!(store.highest_stored_number().unwrap(), 8);
    }

    #[test]
    fn debug_format() {
        let store = InMemoryStore::new(ns());
        let debug = format!("{store:?}");
        assert!(debug.contains("InMemoryStore"));
        assert!(debug.contains("document_count"));
    }
}
