//! In-memory transport for tests
//!
//! A [`MockHub`] routes calls directly to registered handlers, so several
//! engines can talk inside one process without sockets. Unregistering a
//! peer simulates it going dark: calls fail the way a dead TCP peer's
//! would, and the caller marks it disconnected.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use entangle_core::PeerId;

use crate::error::TransportError;
use crate::protocol::{PeerMessage, Reply};
use crate::transport::{MessageHandler, Transport};

/// Shared routing table for in-process peers
#[derive(Default)]
pub struct MockHub {
    handlers: DashMap<PeerId, Arc<dyn MessageHandler>>,
}

impl MockHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attach a peer's handler (its RPC service)
    pub fn register(&self, peer: PeerId, handler: Arc<dyn MessageHandler>) {
        self.handlers.insert(peer, handler);
    }

    /// Detach a peer, simulating a crash or network loss
    pub fn unregister(&self, peer: &PeerId) {
        self.handlers.remove(peer);
    }

    pub fn is_registered(&self, peer: &PeerId) -> bool {
        self.handlers.contains_key(peer)
    }

    /// Build a transport for one peer on this hub
    pub fn transport(self: &Arc<Self>, local: PeerId) -> Arc<MockTransport> {
        Arc::new(MockTransport {
            local,
            hub: Arc::clone(self),
            connected: DashMap::new(),
        })
    }
}

/// In-memory implementation of [`Transport`]
pub struct MockTransport {
    local: PeerId,
    hub: Arc<MockHub>,
    connected: DashMap<PeerId, ()>,
}

impl MockTransport {
    pub fn local_peer(&self) -> &PeerId {
        &self.local
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn call(&self, peer: &PeerId, msg: PeerMessage) -> Result<Reply, TransportError> {
        if !self.connected.contains_key(peer) {
            return Err(TransportError::NotConnected(peer.to_string()));
        }
        let handler = match self.hub.handlers.get(peer) {
            Some(entry) => Arc::clone(entry.value()),
            None => {
                // the peer went away underneath us
                self.connected.remove(peer);
                return Err(TransportError::ConnectionClosed);
            }
        };
        Ok(handler.handle(msg).await)
    }

    async fn connect(&self, peer: &PeerId) -> Result<(), TransportError> {
        if !self.hub.is_registered(peer) {
            return Err(TransportError::ConnectFailed {
                peer: peer.to_string(),
                reason: "peer not on hub".to_string(),
            });
        }
        self.connected.insert(peer.clone(), ());
        Ok(())
    }

    async fn disconnect(&self, peer: &PeerId) {
        self.connected.remove(peer);
    }

    fn is_connected(&self, peer: &PeerId) -> bool {
        self.connected.contains_key(peer)
    }

    fn connected_peers(&self) -> Vec<PeerId> {
        self.connected.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ConnectArgs;

    struct EchoSender;

    #[async_trait]
    impl MessageHandler for EchoSender {
        async fn handle(&self, msg: PeerMessage) -> Reply {
            Reply::Error(msg.sender().to_string())
        }
    }

    fn peer(n: u16) -> PeerId {
        PeerId::new(format!("127.0.0.1:{n}"))
    }

    #[tokio::test]
    async fn test_call_reaches_registered_handler() {
        let hub = MockHub::new();
        hub.register(peer(2), Arc::new(EchoSender));

        let transport = hub.transport(peer(1));
        transport.connect(&peer(2)).await.unwrap();

        let reply = transport
            .call(&peer(2), PeerMessage::Connect(ConnectArgs { sender: peer(1) }))
            .await
            .unwrap();
        assert_eq!(reply, Reply::Error(peer(1).to_string()));
    }

    #[tokio::test]
    async fn test_connect_to_unknown_peer_fails() {
        let hub = MockHub::new();
        let transport = hub.transport(peer(1));
        assert!(matches!(
            transport.connect(&peer(9)).await,
            Err(TransportError::ConnectFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_unregister_breaks_calls() {
        let hub = MockHub::new();
        hub.register(peer(2), Arc::new(EchoSender));

        let transport = hub.transport(peer(1));
        transport.connect(&peer(2)).await.unwrap();
        hub.unregister(&peer(2));

        let err = transport
            .call(&peer(2), PeerMessage::Connect(ConnectArgs { sender: peer(1) }))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed));
        // the failed call dropped the connection
        assert!(!transport.is_connected(&peer(2)));
    }
}
