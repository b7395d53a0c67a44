//! Persistence and fan-out worker pool
//!
//! One producer (the editor) enqueues jobs; one consumer owns each
//! backend. The persistence worker appends an emitted operation to the
//! log and only then offers it to the fan-out registry, so an operation
//! is durably logged before any peer hears about it. Per-peer fan-out
//! channels carry operations in order; a full or broken channel drops the
//! operation and the sync protocol recovers the gap.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use entangle_core::{OpKind, Operation, PeerId, SnapshotRow};
use entangle_net::{EditArgs, PeerMessage, Reply, Transport};
use entangle_storage::DurableStore;

/// Jobs the persistence worker consumes in order
pub(crate) enum PersistJob {
    /// Append an emitted operation to the log, then fan it out
    AppendOp(Operation),
    InsertRow(SnapshotRow),
    DeleteRow(u64),
    /// Ack once every job enqueued before this one has completed
    Barrier(oneshot::Sender<()>),
    Shutdown,
}

/// Per-peer outbound operation channels
#[derive(Default)]
pub(crate) struct FanOut {
    channels: DashMap<PeerId, mpsc::Sender<Operation>>,
}

impl FanOut {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn register(&self, peer: PeerId, tx: mpsc::Sender<Operation>) {
        self.channels.insert(peer, tx);
    }

    /// Offer an operation to every peer channel, dropping on backpressure.
    pub(crate) fn dispatch(&self, op: &Operation) {
        for entry in self.channels.iter() {
            if let Err(e) = entry.value().try_send(op.clone()) {
                warn!(peer = %entry.key(), error = %e, "Dropped fan-out operation");
            }
        }
    }
}

/// Consume [`PersistJob`]s; log appends gate the fan-out.
pub(crate) fn spawn_persist_worker(
    store: Arc<dyn DurableStore>,
    mut rx: mpsc::Receiver<PersistJob>,
    fanout: Arc<FanOut>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            match job {
                PersistJob::AppendOp(op) => match store.append_op(&op) {
                    Ok(()) => fanout.dispatch(&op),
                    Err(e) => {
                        // the edit stays live in memory; peers will not
                        // hear about an operation the log never took
                        warn!(clock = op.clock, error = %e, "Op log append failed");
                    }
                },
                PersistJob::InsertRow(row) => {
                    if let Err(e) = store.insert_snapshot_row(&row) {
                        warn!(id = row.id, error = %e, "Snapshot insert failed");
                    }
                }
                PersistJob::DeleteRow(id) => {
                    if let Err(e) = store.delete_snapshot_row(id) {
                        warn!(id, error = %e, "Snapshot delete failed");
                    }
                }
                PersistJob::Barrier(ack) => {
                    let _ = ack.send(());
                }
                PersistJob::Shutdown => break,
            }
        }
        debug!("Persistence worker stopped");
    })
}

/// Forward queued operations to one peer, in order.
///
/// A disconnected peer or a failed call drops the operation; the peer is
/// marked disconnected and the next sync closes the gap.
pub(crate) fn spawn_peer_sender(
    transport: Arc<dyn Transport>,
    local: PeerId,
    peer: PeerId,
    mut rx: mpsc::Receiver<Operation>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(op) = rx.recv().await {
            if !transport.is_connected(&peer) {
                continue;
            }
            let args = EditArgs {
                sender: local.clone(),
                clock: op.clock,
                position: op.position.clone(),
                atom: op.atom.clone(),
            };
            let msg = match op.kind {
                OpKind::Insert => PeerMessage::Insert(args),
                OpKind::Delete => PeerMessage::Delete(args),
            };
            match transport.call(&peer, msg).await {
                Ok(Reply::Ok) => {}
                Ok(other) => {
                    warn!(%peer, ?other, "Unexpected fan-out reply");
                }
                Err(e) => {
                    warn!(%peer, error = %e, "Fan-out call failed, dropping peer");
                    transport.disconnect(&peer).await;
                }
            }
        }
        debug!(%peer, "Fan-out sender stopped");
    })
}
