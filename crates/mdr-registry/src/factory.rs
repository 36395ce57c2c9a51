//! Backend factories.
//!
//! The registry never constructs stores itself: it looks up the
//! [`StoreFactory`] registered for a namespace's [`BackendKind`] and asks it
//! for a store. Disk-backed factories treat the namespace location as the
//! provisioning marker.

use std::fs;
use std::sync::Arc;

use dashmap::DashMap;
use mdr_store::{
    AuthorProvider, ContentAddressedStore, FileStore, InMemoryStore, MetadataStore,
    StaticAuthor, VersionedStore,
};
use mdr_types::Namespace;
use tracing::info;

use crate::config::NamespaceSettings;
use crate::error::{RegistryError, RegistryResult};

/// Builds stores of one backend kind.
pub trait StoreFactory: Send + Sync {
    /// Whether storage for the namespace already exists.
    fn is_provisioned(&self, settings: &NamespaceSettings) -> bool;

    /// Open the store for `settings`.
    ///
    /// With `provision` set, missing storage is created first. Without it,
    /// missing storage fails with
    /// [`RegistryError::NamespaceNotProvisioned`].
    fn open(
        &self,
        settings: &NamespaceSettings,
        provision: bool,
    ) -> RegistryResult<Arc<dyn MetadataStore>>;

    /// Namespaces this factory holds outside the filesystem.
    fn known_namespaces(&self) -> Vec<Namespace> {
        Vec::new()
    }
}

/// Fail unless the location exists, or create it when `provision` is set.
fn prepare_location(settings: &NamespaceSettings, provision: bool) -> RegistryResult<()> {
    let location = &settings.location;
    if location.exists() {
        if !location.is_dir() {
            return Err(RegistryError::Configuration(format!(
                "location {} of {} is not a directory",
                location.display(),
                settings.namespace
            )));
        }
        return Ok(());
    }
    if !provision {
        return Err(RegistryError::NamespaceNotProvisioned(
            settings.namespace.clone(),
        ));
    }
    fs::create_dir_all(location)?;
    info!(
        namespace = %settings.namespace,
        backend = %settings.backend,
        location = %location.display(),
        "provisioned namespace storage"
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

/// Keeps in-memory stores alive across registry reloads.
pub struct MemoryFactory {
    author: Arc<dyn AuthorProvider>,
    stores: DashMap<Namespace, Arc<InMemoryStore>>,
}

impl MemoryFactory {
    pub fn new(author: Arc<dyn AuthorProvider>) -> Self {
        Self {
            author,
            stores: DashMap::new(),
        }
    }
}

impl Default for MemoryFactory {
    fn default() -> Self {
        Self::new(Arc::new(StaticAuthor::default()))
    }
}

impl StoreFactory for MemoryFactory {
    fn is_provisioned(&self, settings: &NamespaceSettings) -> bool {
        self.stores.contains_key(&settings.namespace)
    }

    fn open(
        &self,
        settings: &NamespaceSettings,
        provision: bool,
    ) -> RegistryResult<Arc<dyn MetadataStore>> {
        if let Some(store) = self.stores.get(&settings.namespace) {
            let store: Arc<dyn MetadataStore> = store.value().clone();
            return Ok(store);
        }
        if !provision {
            return Err(RegistryError::NamespaceNotProvisioned(
                settings.namespace.clone(),
            ));
        }
        let store: Arc<dyn MetadataStore> = self
            .stores
            .entry(settings.namespace.clone())
            .or_insert_with(|| {
                info!(namespace = %settings.namespace, "provisioned memory store");
                Arc::new(InMemoryStore::with_author(
                    settings.namespace.clone(),
                    Arc::clone(&self.author),
                ))
            })
            .value()
            .clone();
        Ok(store)
    }

    fn known_namespaces(&self) -> Vec<Namespace> {
        self.stores.iter().map(|e| e.key().clone()).collect()
    }
}

// ---------------------------------------------------------------------------
// Filesystem
// ---------------------------------------------------------------------------

/// Builds [`FileStore`]s.
#[derive(Debug, Default)]
pub struct FilesystemFactory;

impl StoreFactory for FilesystemFactory {
    fn is_provisioned(&self, settings: &NamespaceSettings) -> bool {
        settings.location.is_dir()
    }

    fn open(
        &self,
        settings: &NamespaceSettings,
        provision: bool,
    ) -> RegistryResult<Arc<dyn MetadataStore>> {
        prepare_location(settings, provision)?;
        let store = FileStore::open(
            settings.namespace.clone(),
            &settings.location,
            settings.layout.clone(),
            settings.file_suffix.clone(),
        )?;
        if provision {
            store.provision()?;
        }
        Ok(Arc::new(store))
    }
}

// ---------------------------------------------------------------------------
// Versioned
// ---------------------------------------------------------------------------

/// Builds [`VersionedStore`]s.
pub struct VersionedFactory {
    author: Arc<dyn AuthorProvider>,
}

impl VersionedFactory {
    pub fn new(author: Arc<dyn AuthorProvider>) -> Self {
        Self { author }
    }
}

impl Default for VersionedFactory {
    fn default() -> Self {
        Self::new(Arc::new(StaticAuthor::default()))
    }
}

impl StoreFactory for VersionedFactory {
    fn is_provisioned(&self, settings: &NamespaceSettings) -> bool {
        settings.location.is_dir()
    }

    fn open(
        &self,
        settings: &NamespaceSettings,
        provision: bool,
    ) -> RegistryResult<Arc<dyn MetadataStore>> {
        prepare_location(settings, provision)?;
        let store = VersionedStore::open(
            settings.namespace.clone(),
            &settings.location,
            settings.layout.clone(),
            Arc::clone(&self.author),
        );
        if provision {
            store.provision()?;
        }
        Ok(Arc::new(store))
    }
}

// ---------------------------------------------------------------------------
// Content-addressed
// ---------------------------------------------------------------------------

/// Builds [`ContentAddressedStore`]s.
#[derive(Debug, Default)]
pub struct ContentAddressedFactory;

impl StoreFactory for ContentAddressedFactory {
    fn is_provisioned(&self, settings: &NamespaceSettings) -> bool {
        settings.location.is_dir()
    }

    fn open(
        &self,
        settings: &NamespaceSettings,
        provision: bool,
    ) -> RegistryResult<Arc<dyn MetadataStore>> {
        prepare_location(settings, provision)?;
        let store = ContentAddressedStore::open(
            settings.namespace.clone(),
            &settings.location,
            settings.layout.clone(),
        );
        if provision {
            store.provision()?;
        }
        Ok(Arc::new(store))
    }
}
