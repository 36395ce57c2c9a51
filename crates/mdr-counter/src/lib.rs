//! Identifier allocation for the metadata repository.
//!
//! Hands out monotonically increasing, never-reused document numbers per
//! [`Namespace`](mdr_types::Namespace), under concurrent access from threads
//! and from independent processes sharing the same storage.
//!
//! # Modules
//!
//! - [`traits`]: the [`IdCounter`] trait, a per-namespace last-issued number
//!   with locked read-modify-write
//! - [`memory`]: [`InMemoryCounter`], process-local; recovers from the store
//!   after restart
//! - [`file`]: [`FileCounter`], one 4-byte big-endian file per namespace
//!   under an exclusive OS file lock
//! - [`allocator`]: [`IdAllocator`], the next-free-id algorithm on top of a
//!   counter and a store

pub mod allocator;
pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use allocator::{Distance, IdAllocator, MAX_NUMBER};
pub use error::{CounterError, CounterResult};
pub use file::FileCounter;
pub use memory::InMemoryCounter;
pub use traits::IdCounter;
