//! The storage capability set
//!
//! The engine is polymorphic over its persistence backend; everything it
//! needs is this one object-safe trait. Implementations serialize their
//! own writes; the engine guarantees a single logical writer per peer
//! (the persistence worker), which keeps snapshot ids monotonic.

use entangle_core::{Operation, PeerId, SnapshotRow};

use crate::error::StorageError;

/// Capabilities the engine requires from a persistence backend
pub trait DurableStore: Send + Sync {
    /// Append one emitted operation to the log, keyed by its clock.
    fn append_op(&self, op: &Operation) -> Result<(), StorageError>;

    /// Operations with `lo <= clock <= hi`, ascending by clock.
    fn ops_range(&self, lo: u64, hi: u64) -> Result<Vec<Operation>, StorageError>;

    /// Write one snapshot row (insert path).
    fn insert_snapshot_row(&self, row: &SnapshotRow) -> Result<(), StorageError>;

    /// Remove one snapshot row (delete path).
    fn delete_snapshot_row(&self, id: u64) -> Result<(), StorageError>;

    /// All snapshot rows in id order, for restart.
    fn load_snapshot(&self) -> Result<Vec<SnapshotRow>, StorageError>;

    /// Persist clock vector entries (upsert per peer).
    fn store_clocks(&self, entries: &[(PeerId, u64)]) -> Result<(), StorageError>;

    /// All persisted clock entries.
    fn load_clocks(&self) -> Result<Vec<(PeerId, u64)>, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_object_safe(_: &dyn DurableStore) {}
}
