//! The engine record
//!
//! Packages what the original spread over process-wide globals: the
//! configuration, the text buffer and clock vector under one lock, the
//! durable store, the transport, and the worker pool. Tests instantiate
//! as many independent engines as they need.
//!
//! Locking: `EditorState` (buffer plus clocks) sits behind one mutex, the
//! document lock. Every critical section is short and never spans an
//! await; network and disk work happen outside it.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use entangle_core::{
    ClockVector, LineCol, Operation, PeerId, Position, SiteId, SnapshotRow, TextBuffer,
};
use entangle_net::{ConnectArgs, DisconnectArgs, PeerConfig, PeerMessage, Reply, Transport};
use entangle_storage::{DurableStore, StorageError};

use crate::error::{EngineError, SyncError};
use crate::service::EngineService;
use crate::sync;
use crate::workers::{spawn_peer_sender, spawn_persist_worker, FanOut, PersistJob};

/// Buffer and clock vector, guarded together by the document lock
pub(crate) struct EditorState {
    pub(crate) buffer: TextBuffer,
    pub(crate) clocks: ClockVector,
}

pub(crate) struct EngineInner {
    pub(crate) config: PeerConfig,
    pub(crate) site: SiteId,
    pub(crate) local: PeerId,
    state: Mutex<EditorState>,
    pub(crate) store: Arc<dyn DurableStore>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) persist_tx: mpsc::Sender<PersistJob>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EngineInner {
    /// Acquire the document lock.
    pub(crate) fn state(&self) -> MutexGuard<'_, EditorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Persist dirty clock entries and clear their flags.
    pub(crate) fn flush_clocks(&self) {
        let mut st = self.state();
        let dirty = st.clocks.dirty_entries();
        if dirty.is_empty() {
            return;
        }
        match self.store.store_clocks(&dirty) {
            Ok(()) => st.clocks.mark_clean(),
            Err(e) => warn!(error = %e, "Clock flush failed"),
        }
    }
}

/// The replicated editor engine
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Wire up an engine over a store and a transport.
    ///
    /// Spawns the persistence worker and one fan-out sender per share
    /// peer. The document starts empty; [`open_document`](Self::open_document)
    /// loads or seeds the stores.
    pub fn new(
        config: PeerConfig,
        store: Arc<dyn DurableStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let site = config.local_site();
        let local = config.local_peer().clone();

        let state = EditorState {
            buffer: TextBuffer::new(site),
            clocks: ClockVector::new(
                local.clone(),
                config.entries().iter().map(|e| e.peer.clone()),
            ),
        };

        let fanout = FanOut::new();
        for entry in config.share_peers() {
            let (tx, rx) = mpsc::channel(256);
            fanout.register(entry.peer.clone(), tx);
            spawn_peer_sender(
                Arc::clone(&transport),
                local.clone(),
                entry.peer.clone(),
                rx,
            );
        }

        let (persist_tx, persist_rx) = mpsc::channel(1024);
        let worker = spawn_persist_worker(Arc::clone(&store), persist_rx, fanout);

        Self {
            inner: Arc::new(EngineInner {
                config,
                site,
                local,
                state: Mutex::new(state),
                store,
                transport,
                persist_tx,
                worker: Mutex::new(Some(worker)),
            }),
        }
    }

    /// The RPC service to register with the serving transport
    pub fn service(&self) -> Arc<EngineService> {
        Arc::new(EngineService::new(Arc::clone(&self.inner)))
    }

    pub fn local_peer(&self) -> &PeerId {
        &self.inner.local
    }

    pub fn site(&self) -> SiteId {
        self.inner.site
    }

    pub fn config(&self) -> &PeerConfig {
        &self.inner.config
    }

    /// Load the document from the snapshot store, or seed fresh stores.
    ///
    /// With existing snapshot rows the buffer and clock vector are
    /// restored from disk and `path` is ignored. Otherwise the sentinel
    /// rows are written and, when `path` names an existing file, its
    /// contents are ingested as initial local operations.
    #[instrument(skip(self, path))]
    pub async fn open_document(&self, path: Option<&Path>) -> Result<(), EngineError> {
        let rows = self.inner.store.load_snapshot()?;
        if !rows.is_empty() {
            let buffer = TextBuffer::from_snapshot(self.inner.site, rows)?;
            let stored_clocks = self.inner.store.load_clocks()?;
            let mut st = self.inner.state();
            st.buffer = buffer;
            st.clocks.restore(stored_clocks);
            info!(
                chars = st.buffer.document().atom_count(),
                next_id = st.buffer.document().next_local_id(),
                "Document restored from snapshot"
            );
            return Ok(());
        }

        self.inner.store.insert_snapshot_row(&SnapshotRow {
            id: 0,
            atom: String::new(),
            position: Position::start(),
        })?;
        self.inner.store.insert_snapshot_row(&SnapshotRow {
            id: 1,
            atom: String::new(),
            position: Position::end(),
        })?;

        if let Some(path) = path {
            match std::fs::read_to_string(path) {
                Ok(text) if !text.is_empty() => {
                    self.insert_at(LineCol::new(0, 0), &text).await?;
                    info!(path = %path.display(), "Ingested file contents");
                }
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::Io(e.to_string()).into()),
            }
        }
        Ok(())
    }

    /// Insert text at a (line, column) location.
    ///
    /// One operation per rune: each gets a fresh position, its own clock
    /// tick, a log append, a snapshot row, and a slot in the fan-out.
    pub async fn insert_at(&self, loc: LineCol, text: &str) -> Result<(), EngineError> {
        if text.is_empty() {
            return Ok(());
        }
        let mut jobs = Vec::with_capacity(text.len() * 2);
        {
            let mut st = self.inner.state();
            let inserted = st.buffer.insert_at(loc, text)?;
            for ins in inserted {
                let clock = st.clocks.local_tick();
                jobs.push(PersistJob::AppendOp(Operation::insert(
                    ins.atom.clone(),
                    ins.position.clone(),
                    clock,
                )));
                jobs.push(PersistJob::InsertRow(SnapshotRow {
                    id: ins.local_id,
                    atom: ins.atom,
                    position: ins.position,
                }));
            }
        }
        self.enqueue(jobs).await;
        Ok(())
    }

    /// Delete `[start, end)` and return the removed text.
    ///
    /// Every removed atom becomes its own delete operation, so peers and
    /// the log see the full range, not just its first character.
    pub async fn delete_range(
        &self,
        start: LineCol,
        end: LineCol,
    ) -> Result<String, EngineError> {
        let (removed, jobs) = {
            let mut st = self.inner.state();
            let (removed, deleted) = st.buffer.remove_range(start, end)?;
            let mut jobs = Vec::with_capacity(deleted.len() * 2);
            for gone in deleted {
                let clock = st.clocks.local_tick();
                jobs.push(PersistJob::AppendOp(Operation::delete(
                    gone.atom,
                    gone.position,
                    clock,
                )));
                jobs.push(PersistJob::DeleteRow(gone.local_id));
            }
            (removed, jobs)
        };
        self.enqueue(jobs).await;
        Ok(removed)
    }

    pub fn content(&self) -> String {
        self.inner.state().buffer.content()
    }

    pub fn line(&self, n: usize) -> Option<String> {
        self.inner.state().buffer.line(n)
    }

    pub fn line_count(&self) -> usize {
        self.inner.state().buffer.line_count()
    }

    /// The local peer's own clock
    pub fn local_clock(&self) -> u64 {
        self.inner.state().clocks.local_clock()
    }

    /// Highest clock observed from a peer
    pub fn observed_clock(&self, peer: &PeerId) -> u64 {
        self.inner.state().clocks.get(peer)
    }

    /// Dial a peer, request the reverse channel, and run the catch-up
    /// protocol (the dialer always initiates sync).
    #[instrument(skip(self), fields(peer = %peer))]
    pub async fn connect(&self, peer: &PeerId) -> Result<(), EngineError> {
        self.inner.transport.connect(peer).await?;
        let reply = self
            .inner
            .transport
            .call(
                peer,
                PeerMessage::Connect(ConnectArgs {
                    sender: self.inner.local.clone(),
                }),
            )
            .await?;
        match reply {
            Reply::Ok => {
                sync::run_pairwise_sync(&self.inner, peer).await?;
                info!("Peer connected and synced");
                Ok(())
            }
            Reply::Error(e) => {
                self.inner.transport.disconnect(peer).await;
                Err(EngineError::ConnectRefused(peer.clone(), e))
            }
            other => Err(SyncError::UnexpectedReply(format!("{other:?}")).into()),
        }
    }

    /// Tell a peer we are going away and drop the channel. The clock
    /// vector entry survives.
    pub async fn disconnect(&self, peer: &PeerId) {
        let _ = self
            .inner
            .transport
            .call(
                peer,
                PeerMessage::Disconnect(DisconnectArgs {
                    sender: self.inner.local.clone(),
                }),
            )
            .await;
        self.inner.transport.disconnect(peer).await;
    }

    /// True when no peer is connected
    pub fn is_offline(&self) -> bool {
        self.inner.transport.connected_peers().is_empty()
    }

    /// Wait until every persistence job enqueued so far has completed.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .inner
            .persist_tx
            .send(PersistJob::Barrier(tx))
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    /// Flush clocks, drain the persistence queue, and close peer
    /// channels.
    pub async fn shutdown(&self) {
        self.flush().await;
        self.inner.flush_clocks();

        let _ = self.inner.persist_tx.send(PersistJob::Shutdown).await;
        let worker = self
            .inner
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = worker {
            let _ = handle.await;
        }

        for peer in self.inner.transport.connected_peers() {
            let _ = self
                .inner
                .transport
                .call(
                    &peer,
                    PeerMessage::Disconnect(DisconnectArgs {
                        sender: self.inner.local.clone(),
                    }),
                )
                .await;
            self.inner.transport.disconnect(&peer).await;
        }
        info!("Engine shut down");
    }

    async fn enqueue(&self, jobs: Vec<PersistJob>) {
        for job in jobs {
            if self.inner.persist_tx.send(job).await.is_err() {
                warn!("Persistence worker gone, dropping job");
                return;
            }
        }
    }
}
