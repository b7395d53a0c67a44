//! # Entangle Storage
//!
//! Durable storage for the replicated editor core: the append-only
//! operation log, the per-character document snapshot, and the persisted
//! clock vector.
//!
//! The [`DurableStore`] trait is the capability set the engine relies on;
//! it has two implementations:
//!
//! - [`InMemoryStore`]: for tests and simulation
//! - [`RedbStore`]: redb databases on disk, one file per store kind per
//!   peer (`ops<site>.redb`, `doc<site>.redb`, `seqv<site>.redb`)
//!
//! The operation log records only operations the local peer emitted; it is
//! the source of truth the sync protocol reads ranges from. The snapshot
//! store exists for fast restart and is keyed by the document's monotonic
//! local ids.

pub mod backend;
pub mod error;
pub mod memory;
pub mod redb_store;

pub use backend::DurableStore;
pub use error::StorageError;
pub use memory::InMemoryStore;
pub use redb_store::RedbStore;
