//! Foundation types for the metadata repository (MDR).
//!
//! This crate provides the identity and history types shared by every other
//! MDR crate.
//!
//! # Key Types
//!
//! - [`Namespace`]: `(project, type)` pair scoping identifiers and documents
//! - [`Identifier`]: namespace-scoped, never-reused document number
//! - [`Revision`]: append-only descriptor of one document mutation
//! - [`RevisionKind`]: created / modified / deleted, with a one-character code
//! - [`MetadataRecord`]: current state of a stored document
//! - [`ObjectId`]: BLAKE3 content address of a stored blob

pub mod error;
pub mod identifier;
pub mod object;
pub mod record;
pub mod revision;

pub use error::TypeError;
pub use identifier::{Identifier, Namespace, DEFAULT_ID_WIDTH};
pub use object::ObjectId;
pub use record::MetadataRecord;
pub use revision::{Revision, RevisionKind, RevisionToken};
