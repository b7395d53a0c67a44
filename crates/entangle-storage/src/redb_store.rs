//! redb-backed durable store
//!
//! One database file per store kind per peer, suffixed by the site id:
//!
//! - `ops<site>.redb`, table `ops`: clock -> serialized operation record
//! - `doc<site>.redb`, table `doc`: local id -> serialized snapshot record
//! - `seqv<site>.redb`, table `seqv`: peer id -> clock
//!
//! Records are postcard-encoded; position identifiers are stored in their
//! wire byte format. Op records carry a local timestamp for forensics; it
//! never crosses the wire.

use std::path::{Path, PathBuf};

use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use entangle_core::{OpKind, Operation, PeerId, Position, SiteId, SnapshotRow};

use crate::backend::DurableStore;
use crate::error::StorageError;

// Key: operation clock, Value: serialized OpRecord
const OPS: TableDefinition<u64, &[u8]> = TableDefinition::new("ops");

// Key: snapshot local id, Value: serialized SnapRecord
const DOC: TableDefinition<u64, &[u8]> = TableDefinition::new("doc");

// Key: peer id string, Value: clock
const SEQV: TableDefinition<&str, u64> = TableDefinition::new("seqv");

/// Stored form of one logged operation
#[derive(Debug, Serialize, Deserialize)]
struct OpRecord {
    atom: String,
    kind: u8,
    position: Vec<u8>,
    logged_at_millis: i64,
}

/// Stored form of one snapshot row
#[derive(Debug, Serialize, Deserialize)]
struct SnapRecord {
    atom: String,
    position: Vec<u8>,
}

/// The on-disk [`DurableStore`]
pub struct RedbStore {
    ops: Database,
    doc: Database,
    seqv: Database,
}

impl RedbStore {
    /// Open (or create) the three databases for a site under `base_dir`.
    pub fn open(base_dir: impl AsRef<Path>, site: SiteId) -> Result<Self, StorageError> {
        let base_dir = base_dir.as_ref();
        std::fs::create_dir_all(base_dir).map_err(|e| StorageError::Io(e.to_string()))?;

        let store = Self {
            ops: open_db(&db_path(base_dir, "ops", site))?,
            doc: open_db(&db_path(base_dir, "doc", site))?,
            seqv: open_db(&db_path(base_dir, "seqv", site))?,
        };
        store.init_tables()?;

        info!(dir = %base_dir.display(), site = %site, "Opened entangle stores");
        Ok(store)
    }

    fn init_tables(&self) -> Result<(), StorageError> {
        let txn = self
            .ops
            .begin_write()
            .map_err(|e| StorageError::Io(e.to_string()))?;
        txn.open_table(OPS)
            .map_err(|e| StorageError::Io(e.to_string()))?;
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        let txn = self
            .doc
            .begin_write()
            .map_err(|e| StorageError::Io(e.to_string()))?;
        txn.open_table(DOC)
            .map_err(|e| StorageError::Io(e.to_string()))?;
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        let txn = self
            .seqv
            .begin_write()
            .map_err(|e| StorageError::Io(e.to_string()))?;
        txn.open_table(SEQV)
            .map_err(|e| StorageError::Io(e.to_string()))?;
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        debug!("Initialized store tables");
        Ok(())
    }
}

fn db_path(base_dir: &Path, kind: &str, site: SiteId) -> PathBuf {
    base_dir.join(format!("{kind}{site}.redb"))
}

fn open_db(path: &Path) -> Result<Database, StorageError> {
    Database::create(path).map_err(|e| StorageError::Io(e.to_string()))
}

fn decode_op(clock: u64, bytes: &[u8]) -> Result<Operation, StorageError> {
    let record: OpRecord =
        postcard::from_bytes(bytes).map_err(|e| StorageError::Deserialization(e.to_string()))?;
    let kind = OpKind::from_u8(record.kind).ok_or_else(|| StorageError::Corrupt {
        key: clock,
        reason: format!("unknown op kind {}", record.kind),
    })?;
    let position = Position::from_bytes(&record.position).map_err(|e| StorageError::Corrupt {
        key: clock,
        reason: e.to_string(),
    })?;
    Ok(Operation {
        atom: record.atom,
        kind,
        position,
        clock,
    })
}

impl DurableStore for RedbStore {
    fn append_op(&self, op: &Operation) -> Result<(), StorageError> {
        let record = OpRecord {
            atom: op.atom.clone(),
            kind: op.kind.as_u8(),
            position: op.position.to_bytes(),
            logged_at_millis: chrono::Utc::now().timestamp_millis(),
        };
        let bytes = postcard::to_allocvec(&record)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let txn = self
            .ops
            .begin_write()
            .map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let mut table = txn
                .open_table(OPS)
                .map_err(|e| StorageError::Io(e.to_string()))?;
            table
                .insert(op.clock, bytes.as_slice())
                .map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(())
    }

    fn ops_range(&self, lo: u64, hi: u64) -> Result<Vec<Operation>, StorageError> {
        let txn = self
            .ops
            .begin_read()
            .map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn
            .open_table(OPS)
            .map_err(|e| StorageError::Io(e.to_string()))?;

        let mut ops = Vec::new();
        let range = table
            .range(lo..=hi)
            .map_err(|e| StorageError::Io(e.to_string()))?;
        for entry in range {
            let (key, value) = entry.map_err(|e| StorageError::Io(e.to_string()))?;
            ops.push(decode_op(key.value(), value.value())?);
        }
        Ok(ops)
    }

    fn insert_snapshot_row(&self, row: &SnapshotRow) -> Result<(), StorageError> {
        let record = SnapRecord {
            atom: row.atom.clone(),
            position: row.position.to_bytes(),
        };
        let bytes = postcard::to_allocvec(&record)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let txn = self
            .doc
            .begin_write()
            .map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let mut table = txn
                .open_table(DOC)
                .map_err(|e| StorageError::Io(e.to_string()))?;
            table
                .insert(row.id, bytes.as_slice())
                .map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(())
    }

    fn delete_snapshot_row(&self, id: u64) -> Result<(), StorageError> {
        let txn = self
            .doc
            .begin_write()
            .map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let mut table = txn
                .open_table(DOC)
                .map_err(|e| StorageError::Io(e.to_string()))?;
            table
                .remove(id)
                .map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(())
    }

    fn load_snapshot(&self) -> Result<Vec<SnapshotRow>, StorageError> {
        let txn = self
            .doc
            .begin_read()
            .map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn
            .open_table(DOC)
            .map_err(|e| StorageError::Io(e.to_string()))?;

        let mut rows = Vec::new();
        let range = table
            .range::<u64>(..)
            .map_err(|e| StorageError::Io(e.to_string()))?;
        for entry in range {
            let (key, value) = entry.map_err(|e| StorageError::Io(e.to_string()))?;
            let id = key.value();
            let record: SnapRecord = postcard::from_bytes(value.value())
                .map_err(|e| StorageError::Deserialization(e.to_string()))?;
            let position =
                Position::from_bytes(&record.position).map_err(|e| StorageError::Corrupt {
                    key: id,
                    reason: e.to_string(),
                })?;
            rows.push(SnapshotRow {
                id,
                atom: record.atom,
                position,
            });
        }
        Ok(rows)
    }

    fn store_clocks(&self, entries: &[(PeerId, u64)]) -> Result<(), StorageError> {
        let txn = self
            .seqv
            .begin_write()
            .map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let mut table = txn
                .open_table(SEQV)
                .map_err(|e| StorageError::Io(e.to_string()))?;
            for (peer, clock) in entries {
                table
                    .insert(peer.as_str(), *clock)
                    .map_err(|e| StorageError::Io(e.to_string()))?;
            }
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(())
    }

    fn load_clocks(&self) -> Result<Vec<(PeerId, u64)>, StorageError> {
        let txn = self
            .seqv
            .begin_read()
            .map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn
            .open_table(SEQV)
            .map_err(|e| StorageError::Io(e.to_string()))?;

        let mut clocks = Vec::new();
        let range = table
            .range::<&str>(..)
            .map_err(|e| StorageError::Io(e.to_string()))?;
        for entry in range {
            let (key, value) = entry.map_err(|e| StorageError::Io(e.to_string()))?;
            clocks.push((PeerId::new(key.value()), value.value()));
        }
        Ok(clocks)
    }
}
