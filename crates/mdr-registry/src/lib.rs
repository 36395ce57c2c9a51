//! Store registry for the metadata repository.
//!
//! Maps each [`Namespace`](mdr_types::Namespace) to the
//! [`MetadataStore`](mdr_store::MetadataStore) that holds its documents,
//! as described by an `mdr.toml` [`RepositoryConfig`].
//!
//! - [`config`]: `mdr.toml` parsing, defaults and per-namespace settings
//! - [`factory`]: [`StoreFactory`] and one built-in factory per
//!   [`BackendKind`]
//! - [`registry`]: [`StoreRegistry`], compute-once resolution and reload

pub mod config;
pub mod error;
pub mod factory;
pub mod registry;

pub use config::{
    AllocationConfig, AllocationStrategy, BackendKind, NamespaceConfig, NamespaceSettings,
    RepositoryConfig, CONFIG_FILE_NAME,
};
pub use error::{RegistryError, RegistryResult};
pub use factory::{
    ContentAddressedFactory, FilesystemFactory, MemoryFactory, StoreFactory, VersionedFactory,
};
pub use registry::StoreRegistry;
