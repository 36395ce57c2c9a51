//! Metadata document storage for the metadata repository.
//!
//! Every document is filed under an [`Identifier`](mdr_types::Identifier) and
//! moves through a three-state lifecycle: non-existent, active, tombstoned.
//! Tombstones are terminal and keep their number "used" so the allocator
//! never hands it out again.
//!
//! # Storage Backends
//!
//! All backends implement the [`MetadataStore`] trait:
//!
//! - [`InMemoryStore`] -- versioned, `BTreeMap`-backed store for tests and embedding
//! - [`FileStore`] -- one file per document, no history
//! - [`VersionedStore`] -- append-only revision log per document, content in an [`ObjectPool`]
//! - [`ContentAddressedStore`] -- current content only, deduplicated in an [`ObjectPool`]
//!
//! On-disk backends spread documents over nested directories according to
//! a [`SlotLayout`].
//!
//! # Design Rules
//!
//! 1. A store is bound to exactly one namespace.
//! 2. `create` never succeeds twice for the same identifier, tombstoned or not.
//! 3. Every write reaches durable storage before the call returns.
//! 4. Revision history is an optional capability, advertised by
//!    [`StoreCapabilities::versioned`].
//! 5. All I/O errors are propagated, never silently ignored.

pub mod author;
pub mod cas;
mod durable;
pub mod error;
pub mod fs;
pub mod layout;
pub mod memory;
pub mod pool;
pub mod traits;
pub mod versioned;

pub use author::{AuthorProvider, StaticAuthor};
pub use cas::ContentAddressedStore;
pub use error::{StoreError, StoreResult};
pub use fs::FileStore;
pub use layout::SlotLayout;
pub use memory::InMemoryStore;
pub use pool::ObjectPool;
pub use traits::{MetadataStore, RepairOutcome, StoreCapabilities};
pub use versioned::VersionedStore;
