//! Engine and sync error types

use thiserror::Error;

use entangle_core::{DocumentError, PeerId};
use entangle_net::{ConfigError, TransportError};
use entangle_storage::StorageError;

/// Top-level error type for the engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("document error: {0}")]
    Document(#[from] DocumentError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("peer {0} refused the connection: {1}")]
    ConnectRefused(PeerId, String),
}

/// Errors from the pairwise sync protocol
#[derive(Debug, Error)]
pub enum SyncError {
    /// The initiator advertised a clock below what we already recorded
    /// for it; its log storage has regressed.
    #[error("peer {peer} advertised clock {advertised} below recorded {recorded}")]
    SenderRegressed {
        peer: PeerId,
        advertised: u64,
        recorded: u64,
    },

    /// The responder's own clock is below what the initiator recorded for
    /// it; our log storage has regressed.
    #[error("local clock {actual} below peer {peer}'s view {advertised}")]
    ReceiverRegressed {
        peer: PeerId,
        advertised: u64,
        actual: u64,
    },

    #[error("peer replied with the wrong shape: {0}")]
    UnexpectedReply(String),

    #[error("peer reported: {0}")]
    Remote(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
