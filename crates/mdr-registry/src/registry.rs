//! Per-namespace store resolution.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use mdr_store::{AuthorProvider, MetadataStore, StaticAuthor};
use mdr_types::Namespace;
use parking_lot::RwLock;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::{BackendKind, NamespaceSettings, RepositoryConfig};
use crate::error::{RegistryError, RegistryResult};
use crate::factory::{
    ContentAddressedFactory, FilesystemFactory, MemoryFactory, StoreFactory, VersionedFactory,
};

/// Resolves namespaces to stores, constructing each store at most once
/// until the next reload.
///
/// The registry is owned by the application and shared by reference or
/// `Arc`; there is no process-wide instance.
pub struct StoreRegistry {
    config: RwLock<Arc<RepositoryConfig>>,
    source: Option<PathBuf>,
    factories: RwLock<HashMap<BackendKind, Arc<dyn StoreFactory>>>,
    stores: DashMap<Namespace, Arc<dyn MetadataStore>>,
}

impl StoreRegistry {
    /// Registry over `config` with the built-in factories and the
    /// `"system"` author.
    pub fn new(config: RepositoryConfig) -> RegistryResult<Self> {
        Self::with_author(config, Arc::new(StaticAuthor::default()))
    }

    /// Registry whose versioned and memory stores record `author`.
    pub fn with_author(
        config: RepositoryConfig,
        author: Arc<dyn AuthorProvider>,
    ) -> RegistryResult<Self> {
        config.validate()?;
        Ok(Self::build(config, None, author))
    }

    /// Registry over the config file at `path`. [`reload`](Self::reload)
    /// re-reads the file.
    pub fn open(path: impl AsRef<Path>) -> RegistryResult<Self> {
        let path = path.as_ref();
        let config = RepositoryConfig::from_file(path)?;
        info!(path = %path.display(), base_dir = %config.base_dir.display(), "opened repository");
        Ok(Self::build(
            config,
            Some(path.to_path_buf()),
            Arc::new(StaticAuthor::default()),
        ))
    }

    fn build(
        config: RepositoryConfig,
        source: Option<PathBuf>,
        author: Arc<dyn AuthorProvider>,
    ) -> Self {
        let mut factories: HashMap<BackendKind, Arc<dyn StoreFactory>> = HashMap::new();
        factories.insert(
            BackendKind::Memory,
            Arc::new(MemoryFactory::new(Arc::clone(&author))),
        );
        factories.insert(BackendKind::Filesystem, Arc::new(FilesystemFactory));
        factories.insert(
            BackendKind::Versioned,
            Arc::new(VersionedFactory::new(author)),
        );
        factories.insert(BackendKind::ContentAddressed, Arc::new(ContentAddressedFactory));
        Self {
            config: RwLock::new(Arc::new(config)),
            source,
            factories: RwLock::new(factories),
            stores: DashMap::new(),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> Arc<RepositoryConfig> {
        Arc::clone(&self.config.read())
    }

    /// Effective settings of `namespace` under the active configuration.
    pub fn settings(&self, namespace: &Namespace) -> NamespaceSettings {
        self.config.read().settings(namespace)
    }

    /// Replace the factory for `kind`. Applies to namespaces resolved after
    /// the next [`reload`](Self::reload) or first resolution.
    pub fn register_factory(&self, kind: BackendKind, factory: Arc<dyn StoreFactory>) {
        self.factories.write().insert(kind, factory);
        debug!(backend = %kind, "factory registered");
    }

    fn factory(&self, kind: BackendKind) -> RegistryResult<Arc<dyn StoreFactory>> {
        self.factories
            .read()
            .get(&kind)
            .cloned()
            .ok_or_else(|| RegistryError::Configuration(format!("no factory for backend {kind}")))
    }

    /// The store serving `namespace`.
    ///
    /// With `read_only` set, a namespace without storage fails with
    /// [`RegistryError::NamespaceNotProvisioned`] and nothing is created.
    /// Otherwise missing storage is provisioned. Concurrent first
    /// resolutions construct the store once.
    pub fn resolve(
        &self,
        namespace: &Namespace,
        read_only: bool,
    ) -> RegistryResult<Arc<dyn MetadataStore>> {
        if let Some(store) = self.stores.get(namespace) {
            return Ok(Arc::clone(store.value()));
        }
        match self.stores.entry(namespace.clone()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let settings = self.settings(namespace);
                let factory = self.factory(settings.backend)?;
                let store = factory.open(&settings, !read_only)?;
                debug!(
                    %namespace,
                    backend = %settings.backend,
                    location = %settings.location.display(),
                    "store resolved"
                );
                entry.insert(Arc::clone(&store));
                Ok(store)
            }
        }
    }

    /// Whether `namespace` has storage, without resolving it.
    pub fn is_provisioned(&self, namespace: &Namespace) -> RegistryResult<bool> {
        if self.stores.contains_key(namespace) {
            return Ok(true);
        }
        let settings = self.settings(namespace);
        Ok(self.factory(settings.backend)?.is_provisioned(&settings))
    }

    /// Drop every cached store. A registry opened from a file re-reads it
    /// first; on a read error the old configuration stays active.
    pub fn reload(&self) -> RegistryResult<()> {
        if let Some(path) = &self.source {
            let config = RepositoryConfig::from_file(path)?;
            *self.config.write() = Arc::new(config);
        }
        self.clear();
        Ok(())
    }

    /// Switch to `config` and drop every cached store.
    pub fn reload_with(&self, config: RepositoryConfig) -> RegistryResult<()> {
        config.validate()?;
        *self.config.write() = Arc::new(config);
        self.clear();
        Ok(())
    }

    fn clear(&self) {
        let dropped = self.stores.len();
        self.stores.clear();
        info!(dropped, "registry reloaded");
    }

    /// Every namespace with storage.
    ///
    /// Scans `{base_dir}/{project}/{type}` directories, configured
    /// locations and the memory backend. Hidden directories are skipped.
    pub fn namespaces(&self) -> RegistryResult<Vec<Namespace>> {
        let config = self.config();
        let mut found = BTreeSet::new();

        if config.base_dir.is_dir() {
            let walker = WalkDir::new(&config.base_dir)
                .min_depth(1)
                .max_depth(2)
                .into_iter()
                .filter_entry(|e| !is_hidden(e.file_name()));
            for entry in walker {
                let entry = entry.map_err(|e| {
                    RegistryError::Persistence(e.into_io_error().unwrap_or_else(|| {
                        std::io::Error::other("directory walk failed")
                    }))
                })?;
                if entry.depth() != 2 || !entry.file_type().is_dir() {
                    continue;
                }
                let (Some(kind), Some(project)) = (
                    entry.file_name().to_str(),
                    entry
                        .path()
                        .parent()
                        .and_then(Path::file_name)
                        .and_then(|n| n.to_str()),
                ) else {
                    continue;
                };
                if let Ok(namespace) = Namespace::new(project, kind) {
                    found.insert(namespace);
                }
            }
        }

        for key in config.namespaces.keys() {
            let Ok(namespace) = key.parse::<Namespace>() else {
                continue;
            };
            if self.is_provisioned(&namespace)? {
                found.insert(namespace);
            }
        }

        let factories: Vec<Arc<dyn StoreFactory>> =
            self.factories.read().values().cloned().collect();
        for factory in factories {
            found.extend(factory.known_namespaces());
        }
        found.extend(self.stores.iter().map(|e| e.key().clone()));

        Ok(found.into_iter().collect())
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|n| n.starts_with('.'))
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("base_dir", &self.config.read().base_dir)
            .field("source", &self.source)
            .field("cached", &self.stores.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CONFIG_FILE_NAME, NamespaceConfig};
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn ns(kind: &str) -> Namespace {
        Namespace::new("DocPortal", kind).unwrap()
    }

    fn stamp() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    /// Counts how often stores are constructed.
    struct CountingFactory {
        inner: MemoryFactory,
        opened: AtomicUsize,
    }

    impl StoreFactory for CountingFactory {
        fn is_provisioned(&self, settings: &NamespaceSettings) -> bool {
            self.inner.is_provisioned(settings)
        }

        fn open(
            &self,
            settings: &NamespaceSettings,
            provision: bool,
        ) -> RegistryResult<Arc<dyn MetadataStore>> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            self.inner.open(settings, provision)
        }
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    #[test]
    fn read_only_resolution_does_not_provision() {
        let dir = tempfile::tempdir().unwrap();
        let registry = StoreRegistry::new(RepositoryConfig::new(dir.path())).unwrap();
        assert!(matches!(
            registry.resolve(&ns("document"), true),
            Err(RegistryError::NamespaceNotProvisioned(_))
        ));
        assert!(!dir.path().join("DocPortal/document").exists());
        assert!(!registry.is_provisioned(&ns("document")).unwrap());
    }

    #[test]
    fn read_only_resolution_after_backend_switch_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let registry = StoreRegistry::new(
            RepositoryConfig::new(dir.path()).with_backend(BackendKind::Filesystem),
        )
        .unwrap();
        registry.resolve(&ns("document"), false).unwrap();
        let location = dir.path().join("DocPortal/document");
        assert_eq!(std::fs::read_dir(&location).unwrap().count(), 0);

        registry
            .reload_with(RepositoryConfig::new(dir.path()).with_backend(BackendKind::Versioned))
            .unwrap();
        let store = registry.resolve(&ns("document"), true).unwrap();
        assert!(store.list_ids().unwrap().is_empty());
        assert_eq!(std::fs::read_dir(&location).unwrap().count(), 0);
    }

    #[test]
    fn write_resolution_provisions_default_location() {
        let dir = tempfile::tempdir().unwrap();
        let registry = StoreRegistry::new(RepositoryConfig::new(dir.path())).unwrap();
        let store = registry.resolve(&ns("document"), false).unwrap();
        assert!(dir.path().join("DocPortal/document").is_dir());
        assert!(store.capabilities().versioned);
        assert!(registry.resolve(&ns("document"), true).is_ok());
    }

    #[test]
    fn resolution_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let registry = StoreRegistry::new(RepositoryConfig::new(dir.path())).unwrap();
        let a = registry.resolve(&ns("document"), false).unwrap();
        let b = registry.resolve(&ns("document"), true).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn concurrent_first_resolution_constructs_once() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(
            StoreRegistry::new(
                RepositoryConfig::new(dir.path()).with_backend(BackendKind::Memory),
            )
            .unwrap(),
        );
        let factory = Arc::new(CountingFactory {
            inner: MemoryFactory::default(),
            opened: AtomicUsize::new(0),
        });
        registry.register_factory(BackendKind::Memory, factory.clone());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.resolve(&ns("document"), false).unwrap())
            })
            .collect();
        let stores: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(factory.opened.load(Ordering::SeqCst), 1);
        assert!(stores.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn per_namespace_backend_and_location() {
        let dir = tempfile::tempdir().unwrap();
        let custom = dir.path().join("elsewhere");
        let config = RepositoryConfig::new(dir.path()).with_namespace(
            &ns("person"),
            NamespaceConfig {
                backend: Some(BackendKind::Filesystem),
                location: Some(custom.clone()),
                ..NamespaceConfig::default()
            },
        );
        let registry = StoreRegistry::new(config).unwrap();
        let person = registry.resolve(&ns("person"), false).unwrap();
        assert!(!person.capabilities().versioned);
        person
            .create(&ns("person").identifier(7).unwrap(), b"<p/>", stamp())
            .unwrap();
        assert!(custom
            .join("0000/00/DocPortal_person_00000007.xml")
            .exists());
    }

    // -----------------------------------------------------------------------
    // Reload
    // -----------------------------------------------------------------------

    #[test]
    fn reload_drops_cache_but_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let registry = StoreRegistry::new(RepositoryConfig::new(dir.path())).unwrap();
        let id = ns("document").identifier(1).unwrap();
        let before = registry.resolve(&ns("document"), false).unwrap();
        before.create(&id, b"<a/>", stamp()).unwrap();

        registry.reload().unwrap();
        let after = registry.resolve(&ns("document"), true).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.retrieve_current(&id).unwrap().unwrap(), b"<a/>");
    }

    #[test]
    fn memory_stores_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let registry = StoreRegistry::new(
            RepositoryConfig::new(dir.path()).with_backend(BackendKind::Memory),
        )
        .unwrap();
        let id = ns("document").identifier(1).unwrap();
        registry
            .resolve(&ns("document"), false)
            .unwrap()
            .create(&id, b"x", stamp())
            .unwrap();
        registry.reload().unwrap();
        assert!(registry
            .resolve(&ns("document"), true)
            .unwrap()
            .exists(&id)
            .unwrap());
    }

    #[test]
    fn reload_with_switches_backend() {
        let dir = tempfile::tempdir().unwrap();
        let registry = StoreRegistry::new(RepositoryConfig::new(dir.path())).unwrap();
        assert!(registry
            .resolve(&ns("document"), false)
            .unwrap()
            .capabilities()
            .versioned);
        registry
            .reload_with(
                RepositoryConfig::new(dir.path().join("cas"))
                    .with_backend(BackendKind::ContentAddressed),
            )
            .unwrap();
        let caps = registry
            .resolve(&ns("document"), false)
            .unwrap()
            .capabilities();
        assert!(caps.content_addressed && !caps.versioned);
    }

    #[test]
    fn reload_rereads_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "backend = \"versioned\"\n").unwrap();
        let registry = StoreRegistry::open(&path).unwrap();
        assert_eq!(registry.config().base_dir, dir.path());
        assert_eq!(registry.settings(&ns("document")).backend, BackendKind::Versioned);

        std::fs::write(&path, "backend = \"filesystem\"\n").unwrap();
        registry.reload().unwrap();
        assert_eq!(
            registry.settings(&ns("document")).backend,
            BackendKind::Filesystem
        );

        std::fs::write(&path, "backend = \"nonsense\"\n").unwrap();
        assert!(registry.reload().is_err());
        assert_eq!(
            registry.settings(&ns("document")).backend,
            BackendKind::Filesystem
        );
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let config = RepositoryConfig {
            id_width: 6,
            ..RepositoryConfig::default()
        };
        assert!(matches!(
            StoreRegistry::new(config),
            Err(RegistryError::Configuration(_))
        ));
    }

    // -----------------------------------------------------------------------
    // Discovery
    // -----------------------------------------------------------------------

    #[test]
    fn namespaces_lists_provisioned_storage() {
        let dir = tempfile::tempdir().unwrap();
        let config = RepositoryConfig::new(dir.path()).with_namespace(
            &ns("note"),
            NamespaceConfig {
                backend: Some(BackendKind::Memory),
                ..NamespaceConfig::default()
            },
        );
        let registry = StoreRegistry::new(config).unwrap();
        registry.resolve(&ns("document"), false).unwrap();
        registry.resolve(&ns("person"), false).unwrap();
        registry.resolve(&ns("note"), false).unwrap();
        std::fs::create_dir_all(dir.path().join(".counters")).unwrap();
        std::fs::create_dir_all(dir.path().join("Bad_Project/x")).unwrap();

        registry.reload().unwrap();
        assert_eq!(
            registry.namespaces().unwrap(),
            vec![ns("document"), ns("note"), ns("person")]
        );
    }

    #[test]
    fn namespaces_of_missing_base_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry =
            StoreRegistry::new(RepositoryConfig::new(dir.path().join("absent"))).unwrap();
        assert!(registry.namespaces().unwrap().is_empty());
    }
}
