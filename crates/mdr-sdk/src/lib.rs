//! High-level SDK for the metadata repository.
//!
//! [`MetadataManager`] is the main entry point for applications: it routes
//! every document operation to the store of the identifier's namespace and
//! allocates new identifiers.

pub mod error;
pub mod manager;
pub mod notify;

pub use error::{MdrError, MdrResult, SinkError};
pub use manager::MetadataManager;
pub use notify::{MetadataEvent, MetadataEventSink, NoOpSink};

// Re-export key types
pub use mdr_counter::{Distance, FileCounter, IdCounter, InMemoryCounter};
pub use mdr_registry::{BackendKind, NamespaceConfig, RepositoryConfig, StoreRegistry};
pub use mdr_store::{AuthorProvider, MetadataStore, RepairOutcome, StaticAuthor, StoreCapabilities};
pub use mdr_types::{Identifier, MetadataRecord, Namespace, Revision, RevisionKind, RevisionToken};
