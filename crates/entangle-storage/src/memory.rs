//! In-memory backend for tests and simulation

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use entangle_core::{Operation, PeerId, SnapshotRow};

use crate::backend::DurableStore;
use crate::error::StorageError;

/// A [`DurableStore`] held entirely in memory.
///
/// Mirrors the on-disk layout (clock-keyed log, id-keyed snapshot,
/// peer-keyed clocks) so engine tests exercise the same access patterns
/// the redb backend sees.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    ops: RwLock<BTreeMap<u64, Operation>>,
    snapshot: RwLock<BTreeMap<u64, SnapshotRow>>,
    clocks: RwLock<BTreeMap<PeerId, u64>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of logged operations (test helper)
    pub fn op_count(&self) -> usize {
        self.ops.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Number of live snapshot rows (test helper)
    pub fn snapshot_count(&self) -> usize {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl DurableStore for InMemoryStore {
    fn append_op(&self, op: &Operation) -> Result<(), StorageError> {
        self.ops
            .write()
            .map_err(|e| StorageError::Io(e.to_string()))?
            .insert(op.clock, op.clone());
        Ok(())
    }

    fn ops_range(&self, lo: u64, hi: u64) -> Result<Vec<Operation>, StorageError> {
        Ok(self
            .ops
            .read()
            .map_err(|e| StorageError::Io(e.to_string()))?
            .range(lo..=hi)
            .map(|(_, op)| op.clone())
            .collect())
    }

    fn insert_snapshot_row(&self, row: &SnapshotRow) -> Result<(), StorageError> {
        self.snapshot
            .write()
            .map_err(|e| StorageError::Io(e.to_string()))?
            .insert(row.id, row.clone());
        Ok(())
    }

    fn delete_snapshot_row(&self, id: u64) -> Result<(), StorageError> {
        self.snapshot
            .write()
            .map_err(|e| StorageError::Io(e.to_string()))?
            .remove(&id);
        Ok(())
    }

    fn load_snapshot(&self) -> Result<Vec<SnapshotRow>, StorageError> {
        Ok(self
            .snapshot
            .read()
            .map_err(|e| StorageError::Io(e.to_string()))?
            .values()
            .cloned()
            .collect())
    }

    fn store_clocks(&self, entries: &[(PeerId, u64)]) -> Result<(), StorageError> {
        let mut clocks = self
            .clocks
            .write()
            .map_err(|e| StorageError::Io(e.to_string()))?;
        for (peer, clock) in entries {
            clocks.insert(peer.clone(), *clock);
        }
        Ok(())
    }

    fn load_clocks(&self) -> Result<Vec<(PeerId, u64)>, StorageError> {
        Ok(self
            .clocks
            .read()
            .map_err(|e| StorageError::Io(e.to_string()))?
            .iter()
            .map(|(p, c)| (p.clone(), *c))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entangle_core::{Position, SiteId};

    fn op(clock: u64) -> Operation {
        let pos = Position::generate(&Position::start(), &Position::end(), SiteId(1)).unwrap();
        Operation::insert("x", pos, clock)
    }

    #[test]
    fn test_ops_range_is_ascending_and_inclusive() {
        let store = InMemoryStore::new();
        for clock in [3, 1, 5, 2, 4] {
            store.append_op(&op(clock)).unwrap();
        }
        let ops = store.ops_range(2, 4).unwrap();
        let clocks: Vec<u64> = ops.iter().map(|o| o.clock).collect();
        assert_eq!(clocks, vec![2, 3, 4]);
    }

    #[test]
    fn test_snapshot_rows() {
        let store = InMemoryStore::new();
        let pos = Position::generate(&Position::start(), &Position::end(), SiteId(1)).unwrap();
        let row = SnapshotRow {
            id: 2,
            atom: "a".to_string(),
            position: pos,
        };
        store.insert_snapshot_row(&row).unwrap();
        assert_eq!(store.load_snapshot().unwrap(), vec![row]);
        store.delete_snapshot_row(2).unwrap();
        assert!(store.load_snapshot().unwrap().is_empty());
    }

    #[test]
    fn test_clock_upsert() {
        let store = InMemoryStore::new();
        let peer = PeerId::new("127.0.0.1:7001");
        store.store_clocks(&[(peer.clone(), 3)]).unwrap();
        store.store_clocks(&[(peer.clone(), 8)]).unwrap();
        assert_eq!(store.load_clocks().unwrap(), vec![(peer, 8)]);
    }
}
