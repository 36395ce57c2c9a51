use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mdr_counter::{Distance, FileCounter, IdAllocator, IdCounter, InMemoryCounter};
use mdr_registry::{AllocationStrategy, RegistryError, RepositoryConfig, StoreRegistry};
use mdr_store::{MetadataStore, RepairOutcome, StoreCapabilities};
use mdr_types::{
    Identifier, MetadataRecord, Namespace, Revision, RevisionKind, RevisionToken,
};
use tracing::{debug, warn};

use crate::error::{MdrError, MdrResult};
use crate::notify::{MetadataEvent, MetadataEventSink, NoOpSink};

/// High-level metadata repository API.
///
/// Every document operation is routed to the store serving the identifier's
/// namespace. Reads treat a namespace without storage as empty; only
/// [`create`](Self::create) and [`next_free_id`](Self::next_free_id)
/// provision storage.
pub struct MetadataManager {
    registry: StoreRegistry,
    allocator: IdAllocator,
    sink: Arc<dyn MetadataEventSink>,
}

impl MetadataManager {
    /// Manager over `registry`, with the counter strategy its configuration
    /// names.
    pub fn new(registry: StoreRegistry) -> Self {
        let config = registry.config();
        let counter: Arc<dyn IdCounter> = match config.allocation.strategy {
            AllocationStrategy::File => Arc::new(FileCounter::new(config.counter_dir())),
            AllocationStrategy::Memory => Arc::new(InMemoryCounter::new()),
        };
        Self::with_counter(registry, counter)
    }

    /// Manager over `registry` allocating through `counter`.
    pub fn with_counter(registry: StoreRegistry, counter: Arc<dyn IdCounter>) -> Self {
        Self {
            registry,
            allocator: IdAllocator::new(counter),
            sink: Arc::new(NoOpSink),
        }
    }

    /// Manager over an in-code configuration.
    pub fn from_config(config: RepositoryConfig) -> MdrResult<Self> {
        Ok(Self::new(StoreRegistry::new(config)?))
    }

    /// Manager over the `mdr.toml` at `path`.
    pub fn open(path: impl AsRef<Path>) -> MdrResult<Self> {
        Ok(Self::new(StoreRegistry::open(path)?))
    }

    /// Builder-style event sink.
    pub fn with_sink(mut self, sink: Arc<dyn MetadataEventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn registry(&self) -> &StoreRegistry {
        &self.registry
    }

    // ---- Store routing ----

    /// The store of `namespace`, or `None` if it has no storage yet.
    fn reader(&self, namespace: &Namespace) -> MdrResult<Option<Arc<dyn MetadataStore>>> {
        match self.registry.resolve(namespace, true) {
            Ok(store) => Ok(Some(store)),
            Err(RegistryError::NamespaceNotProvisioned(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// The store holding `id`; a namespace without storage cannot hold it.
    fn holder(&self, id: &Identifier) -> MdrResult<Arc<dyn MetadataStore>> {
        self.reader(id.namespace())?
            .ok_or_else(|| MdrError::NotFound(id.clone()))
    }

    fn emit(&self, event: MetadataEvent) {
        if let Err(e) = self.sink.notify(&event) {
            warn!(id = %event.id(), kind = %event.kind(), error = %e, "event sink failed");
        }
    }

    // ---- Mutations ----

    /// Store a new document. Fails if `id` was ever used.
    pub fn create(&self, id: &Identifier, content: &[u8], modified: DateTime<Utc>) -> MdrResult<()> {
        let store = self.registry.resolve(id.namespace(), false)?;
        store.create(id, content, modified)?;
        debug!(%id, len = content.len(), "created");
        self.emit(MetadataEvent::Created(id.clone()));
        Ok(())
    }

    /// Replace the content of an active document.
    pub fn update(&self, id: &Identifier, content: &[u8], modified: DateTime<Utc>) -> MdrResult<()> {
        self.holder(id)?.update(id, content, modified)?;
        debug!(%id, len = content.len(), "updated");
        self.emit(MetadataEvent::Updated(id.clone()));
        Ok(())
    }

    /// Tombstone an active document. Its number is never reissued.
    pub fn delete(&self, id: &Identifier) -> MdrResult<()> {
        self.holder(id)?.delete(id)?;
        debug!(%id, "deleted");
        self.emit(MetadataEvent::Deleted(id.clone()));
        Ok(())
    }

    /// Update `id` if it is active, create it otherwise.
    ///
    /// Not atomic: a concurrent delete between the existence check and the
    /// update surfaces as [`MdrError::NotFound`]. Returns what was recorded.
    pub fn create_or_update(
        &self,
        id: &Identifier,
        content: &[u8],
        modified: DateTime<Utc>,
    ) -> MdrResult<RevisionKind> {
        if self.exists(id)? {
            self.update(id, content, modified)?;
            Ok(RevisionKind::Modified)
        } else {
            self.create(id, content, modified)?;
            Ok(RevisionKind::Created)
        }
    }

    /// Update unless the stored content is byte-identical and at least as
    /// new as `modified`.
    pub fn repair(
        &self,
        id: &Identifier,
        content: &[u8],
        modified: DateTime<Utc>,
    ) -> MdrResult<RepairOutcome> {
        let outcome = self.holder(id)?.repair(id, content, modified)?;
        debug!(%id, ?outcome, "repaired");
        if outcome == RepairOutcome::Updated {
            self.emit(MetadataEvent::Updated(id.clone()));
        }
        Ok(outcome)
    }

    // ---- Reads ----

    pub fn retrieve_current(&self, id: &Identifier) -> MdrResult<Option<Vec<u8>>> {
        match self.reader(id.namespace())? {
            Some(store) => Ok(store.retrieve_current(id)?),
            None => Ok(None),
        }
    }

    /// Content as of `token`. Always `None` for non-versioned backends.
    pub fn retrieve_revision(
        &self,
        id: &Identifier,
        token: RevisionToken,
    ) -> MdrResult<Option<Vec<u8>>> {
        match self.reader(id.namespace())? {
            Some(store) => Ok(store.retrieve_revision(id, token)?),
            None => Ok(None),
        }
    }

    /// Revisions of `id`, oldest first.
    pub fn list_revisions(&self, id: &Identifier) -> MdrResult<Vec<Revision>> {
        match self.reader(id.namespace())? {
            Some(store) => Ok(store.list_revisions(id)?),
            None => Ok(Vec::new()),
        }
    }

    pub fn exists(&self, id: &Identifier) -> MdrResult<bool> {
        match self.reader(id.namespace())? {
            Some(store) => Ok(store.exists(id)?),
            None => Ok(false),
        }
    }

    /// The stored record of `id`, tombstones included.
    pub fn record(&self, id: &Identifier) -> MdrResult<Option<MetadataRecord>> {
        match self.reader(id.namespace())? {
            Some(store) => Ok(store.record(id)?),
            None => Ok(None),
        }
    }

    /// `last_modified` of an active document.
    pub fn last_modified(&self, id: &Identifier) -> MdrResult<Option<DateTime<Utc>>> {
        Ok(self
            .record(id)?
            .filter(|r| !r.deleted)
            .map(|r| r.last_modified))
    }

    /// Active identifiers of `namespace`, ascending.
    pub fn list_ids(&self, namespace: &Namespace) -> MdrResult<Vec<Identifier>> {
        match self.reader(namespace)? {
            Some(store) => Ok(store.list_ids()?),
            None => Ok(Vec::new()),
        }
    }

    /// Highest number ever stored in `namespace`, deleted documents included.
    pub fn highest_stored_number(&self, namespace: &Namespace) -> MdrResult<u32> {
        match self.reader(namespace)? {
            Some(store) => Ok(store.highest_stored_number()?),
            None => Ok(0),
        }
    }

    /// Capabilities of the backend serving `namespace`, if provisioned.
    pub fn capabilities(&self, namespace: &Namespace) -> MdrResult<Option<StoreCapabilities>> {
        Ok(self.reader(namespace)?.map(|store| store.capabilities()))
    }

    /// Every namespace with storage.
    pub fn namespaces(&self) -> MdrResult<Vec<Namespace>> {
        Ok(self.registry.namespaces()?)
    }

    // ---- Identifiers ----

    /// Text form of `id`, the number padded to the configured `id_width`.
    ///
    /// Matches the names the on-disk backends give the document's files.
    pub fn render(&self, id: &Identifier) -> String {
        id.render(self.registry.config().id_width)
    }

    /// Allocate a fresh identifier in `namespace` greater than `floor`,
    /// spaced by the namespace's configured distances.
    pub fn next_free_id(&self, namespace: &Namespace, floor: u32) -> MdrResult<Identifier> {
        let settings = self.registry.settings(namespace);
        let distance = Distance::new(settings.initial_distance, settings.distance)?;
        let store = self.registry.resolve(namespace, false)?;
        Ok(self
            .allocator
            .next_free_id(namespace, floor, distance, store.as_ref())?)
    }

    /// The highest identifier issued or stored in `namespace`.
    pub fn last_id(&self, namespace: &Namespace) -> MdrResult<Option<Identifier>> {
        let store = self.reader(namespace)?;
        Ok(self.allocator.last_id(namespace, store.as_deref())?)
    }

    /// Drop cached stores, re-reading the config file if there is one.
    ///
    /// The allocation strategy chosen at construction stays in effect.
    pub fn reload(&self) -> MdrResult<()> {
        Ok(self.registry.reload()?)
    }
}

impl std::fmt::Debug for MetadataManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataManager")
            .field("registry", &self.registry)
            .field("allocator", &self.allocator)
            .finish()
    }
}
