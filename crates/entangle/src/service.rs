//! The peer RPC service
//!
//! Handlers for the six remote-callable methods. Every handler is
//! idempotent: a redelivered insert or delete leaves the document
//! unchanged, and the sender's clock entry only ever rises. Document and
//! line index mutate together under the document lock; the snapshot store
//! write completes before the reply goes out.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use entangle_core::SnapshotRow;
use entangle_net::{
    ConnectArgs, DisconnectArgs, EditArgs, MessageHandler, PeerMessage, Reply,
    SyncPhaseOneArgs, SyncPhaseTwoArgs,
};

use crate::engine::EngineInner;
use crate::sync;

/// [`MessageHandler`] over the shared engine state
pub struct EngineService {
    inner: Arc<EngineInner>,
}

impl EngineService {
    pub(crate) fn new(inner: Arc<EngineInner>) -> Self {
        Self { inner }
    }

    async fn handle_insert(&self, args: EditArgs) -> Reply {
        // the original tolerated empty payloads; keep doing so
        if args.atom.is_empty() {
            return Reply::Ok;
        }
        let inserted = {
            let mut st = self.inner.state();
            let result = st.buffer.apply_insert(&args.position, &args.atom);
            st.clocks.observe(&args.sender, args.clock);
            result
        };
        if let Some(id) = inserted {
            // durable before the reply; a failure costs durability, not
            // the in-memory edit
            if let Err(e) = self.inner.store.insert_snapshot_row(&SnapshotRow {
                id,
                atom: args.atom.clone(),
                position: args.position.clone(),
            }) {
                warn!(id, error = %e, "Snapshot write for remote insert failed");
            }
        } else {
            debug!(sender = %args.sender, clock = args.clock, "Duplicate insert ignored");
        }
        Reply::Ok
    }

    async fn handle_delete(&self, args: EditArgs) -> Reply {
        let deleted = {
            let mut st = self.inner.state();
            let result = st.buffer.apply_delete(&args.position);
            st.clocks.observe(&args.sender, args.clock);
            result
        };
        match deleted {
            Some(gone) => {
                if let Err(e) = self.inner.store.delete_snapshot_row(gone.local_id) {
                    warn!(id = gone.local_id, error = %e, "Snapshot delete failed");
                }
            }
            // a delete can outrun its insert under pairwise sync;
            // ignoring it is the protocol's answer
            None => {
                debug!(sender = %args.sender, clock = args.clock, "Delete for absent position ignored");
            }
        }
        Reply::Ok
    }

    async fn handle_connect(&self, args: ConnectArgs) -> Reply {
        // open the reverse channel; never initiate sync from this side
        match self.inner.transport.connect(&args.sender).await {
            Ok(()) => {
                debug!(peer = %args.sender, "Reverse channel open");
                Reply::Ok
            }
            Err(e) => Reply::Error(format!("ConnectFailed: {e}")),
        }
    }

    async fn handle_sync_phase_one(&self, args: SyncPhaseOneArgs) -> Reply {
        match sync::respond_phase_one(&self.inner, &args) {
            Ok(reply) => Reply::SyncPhaseOne(reply),
            Err(e) => {
                warn!(peer = %args.sender, error = %e, "Sync phase one aborted");
                Reply::Error(e.to_string())
            }
        }
    }

    async fn handle_sync_phase_two(&self, args: SyncPhaseTwoArgs) -> Reply {
        let applied = sync::apply_patch(&self.inner, &args.sender, &args.patch);
        debug!(peer = %args.sender, ops = args.patch.len(), applied, "Sync phase two applied");
        self.inner.flush_clocks();
        Reply::Ok
    }

    async fn handle_disconnect(&self, args: DisconnectArgs) -> Reply {
        self.inner.transport.disconnect(&args.sender).await;
        debug!(peer = %args.sender, "Peer disconnected");
        Reply::Ok
    }
}

#[async_trait]
impl MessageHandler for EngineService {
    async fn handle(&self, msg: PeerMessage) -> Reply {
        match msg {
            PeerMessage::Insert(args) => self.handle_insert(args).await,
            PeerMessage::Delete(args) => self.handle_delete(args).await,
            PeerMessage::Connect(args) => self.handle_connect(args).await,
            PeerMessage::SyncPhaseOne(args) => self.handle_sync_phase_one(args).await,
            PeerMessage::SyncPhaseTwo(args) => self.handle_sync_phase_two(args).await,
            PeerMessage::Disconnect(args) => self.handle_disconnect(args).await,
        }
    }
}
