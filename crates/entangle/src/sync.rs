//! Two-phase pairwise anti-entropy
//!
//! Phase one: the initiator sends its own clock and its view of the
//! responder's clock. The responder answers with whatever the initiator
//! is missing (the patch) and whether it needs the initiator's missing
//! range in return (phase two). Either side advertising a clock below
//! what the other has recorded means its storage regressed; that aborts
//! the exchange and nothing else.
//!
//! Patches are read from the log in ascending clock order, so within one
//! origin an insert always precedes its delete. Application is
//! idempotent, which makes duplicate or re-ordered patches safe.

use tracing::{debug, info, instrument, warn};

use entangle_core::{OpKind, Operation, PeerId, SnapshotRow};
use entangle_net::{
    PeerMessage, Reply, SyncPhaseOneArgs, SyncPhaseOneReply, SyncPhaseTwoArgs,
};

use crate::engine::EngineInner;
use crate::error::SyncError;

/// Initiate the catch-up exchange with a connected peer.
#[instrument(skip(inner), fields(local = %inner.local, peer = %peer))]
pub(crate) async fn run_pairwise_sync(inner: &EngineInner, peer: &PeerId) -> Result<(), SyncError> {
    let (local_clock, peer_view) = {
        let st = inner.state();
        (st.clocks.local_clock(), st.clocks.get(peer))
    };

    let reply = inner
        .transport
        .call(
            peer,
            PeerMessage::SyncPhaseOne(SyncPhaseOneArgs {
                sender: inner.local.clone(),
                sender_clock: local_clock,
                receiver_clock: peer_view,
            }),
        )
        .await?;

    let reply = match reply {
        Reply::SyncPhaseOne(r) => r,
        Reply::Error(e) => return Err(SyncError::Remote(e)),
        other => return Err(SyncError::UnexpectedReply(format!("{other:?}"))),
    };

    if !reply.patch.is_empty() {
        let applied = apply_patch(inner, peer, &reply.patch);
        info!(ops = reply.patch.len(), applied, "Applied sync patch");
    }

    if reply.phase_two {
        // the responder is missing our (requester_clock, local_clock] range
        let patch = inner
            .store
            .ops_range(reply.requester_clock + 1, local_clock)?;
        if patch.is_empty() {
            debug!("Phase two requested but log range is empty");
        } else {
            let reply = inner
                .transport
                .call(
                    peer,
                    PeerMessage::SyncPhaseTwo(SyncPhaseTwoArgs {
                        sender: inner.local.clone(),
                        patch,
                    }),
                )
                .await?;
            if let Reply::Error(e) = reply {
                return Err(SyncError::Remote(e));
            }
        }
    }

    inner.flush_clocks();
    Ok(())
}

/// Responder side of phase one.
pub(crate) fn respond_phase_one(
    inner: &EngineInner,
    args: &SyncPhaseOneArgs,
) -> Result<SyncPhaseOneReply, SyncError> {
    let (view_of_sender, local_clock) = {
        let st = inner.state();
        (st.clocks.get(&args.sender), st.clocks.local_clock())
    };

    if view_of_sender > args.sender_clock {
        return Err(SyncError::SenderRegressed {
            peer: args.sender.clone(),
            advertised: args.sender_clock,
            recorded: view_of_sender,
        });
    }
    if local_clock < args.receiver_clock {
        return Err(SyncError::ReceiverRegressed {
            peer: args.sender.clone(),
            advertised: args.receiver_clock,
            actual: local_clock,
        });
    }

    let patch = if local_clock > args.receiver_clock {
        inner.store.ops_range(args.receiver_clock + 1, local_clock)?
    } else {
        Vec::new()
    };

    Ok(SyncPhaseOneReply {
        phase_two: view_of_sender < args.sender_clock,
        requester_clock: view_of_sender,
        patch,
    })
}

/// Apply a patch in order and record the sender's clock at its last op.
///
/// Inserts for present positions and deletes for absent ones are ignored;
/// the snapshot store mutation for each applied op completes before the
/// caller replies. Returns how many operations actually changed the
/// document.
pub(crate) fn apply_patch(inner: &EngineInner, sender: &PeerId, patch: &[Operation]) -> usize {
    let Some(last) = patch.last() else {
        return 0;
    };

    enum RowJob {
        Insert(SnapshotRow),
        Delete(u64),
    }

    let mut jobs = Vec::new();
    {
        let mut st = inner.state();
        for op in patch {
            match op.kind {
                OpKind::Insert => {
                    if let Some(id) = st.buffer.apply_insert(&op.position, &op.atom) {
                        jobs.push(RowJob::Insert(SnapshotRow {
                            id,
                            atom: op.atom.clone(),
                            position: op.position.clone(),
                        }));
                    }
                }
                OpKind::Delete => {
                    if let Some(deleted) = st.buffer.apply_delete(&op.position) {
                        jobs.push(RowJob::Delete(deleted.local_id));
                    }
                }
            }
        }
        st.clocks.observe(sender, last.clock);
    }

    let applied = jobs.len();
    for job in jobs {
        let result = match job {
            RowJob::Insert(row) => inner.store.insert_snapshot_row(&row),
            RowJob::Delete(id) => inner.store.delete_snapshot_row(id),
        };
        if let Err(e) = result {
            warn!(error = %e, "Snapshot write for patch op failed");
        }
    }
    applied
}
