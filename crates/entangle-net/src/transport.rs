//! Transport abstraction
//!
//! The engine talks to peers through [`Transport`] and receives inbound
//! calls through [`MessageHandler`]; neither side knows whether the bytes
//! cross a TCP socket or an in-memory channel.

use async_trait::async_trait;

use entangle_core::PeerId;

use crate::error::TransportError;
use crate::protocol::{PeerMessage, Reply};

/// Outbound side: issue RPCs to peers
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one message and wait for its reply, bounded by the per-RPC
    /// timeout.
    async fn call(&self, peer: &PeerId, msg: PeerMessage) -> Result<Reply, TransportError>;

    /// Open (or reuse) a channel to a peer.
    async fn connect(&self, peer: &PeerId) -> Result<(), TransportError>;

    /// Drop the channel to a peer. The peer stays known.
    async fn disconnect(&self, peer: &PeerId);

    fn is_connected(&self, peer: &PeerId) -> bool;

    fn connected_peers(&self) -> Vec<PeerId>;
}

/// Inbound side: the engine's dispatch point for remote calls
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle one inbound call and produce its reply. Handlers are
    /// idempotent and re-entrant.
    async fn handle(&self, msg: PeerMessage) -> Reply;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_object_safe(_: &dyn Transport, _: &dyn MessageHandler) {}
}
