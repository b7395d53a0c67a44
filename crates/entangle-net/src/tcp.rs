//! TCP transport
//!
//! One pooled connection per peer, used for one in-flight call at a time
//! (request frame out, reply frame back). The accept side serves each
//! inbound connection on its own task, dispatching frames to the
//! [`MessageHandler`]. Any call error or timeout drops the pooled
//! connection; the peer counts as disconnected until the next `connect`.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use entangle_core::PeerId;

use crate::error::TransportError;
use crate::protocol::{
    frame_message, frame_reply, parse_framed_message, parse_framed_reply, read_frame,
    write_frame, PeerMessage, Reply, RPC_TIMEOUT,
};
use crate::transport::{MessageHandler, Transport};

/// TCP implementation of [`Transport`]
pub struct TcpTransport {
    local: PeerId,
    pool: DashMap<PeerId, Arc<Mutex<TcpStream>>>,
}

impl TcpTransport {
    pub fn new(local: PeerId) -> Self {
        Self {
            local,
            pool: DashMap::new(),
        }
    }

    pub fn local_peer(&self) -> &PeerId {
        &self.local
    }

    /// Bind the local listen socket. Failure here is fatal for the node.
    pub async fn bind(local: &PeerId) -> Result<TcpListener, TransportError> {
        TcpListener::bind(local.as_str())
            .await
            .map_err(|e| TransportError::ConnectFailed {
                peer: local.to_string(),
                reason: e.to_string(),
            })
    }

    /// Serve inbound connections, dispatching each frame to `handler`.
    pub fn serve(
        listener: TcpListener,
        handler: Arc<dyn MessageHandler>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let (stream, addr) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "Accept failed");
                        continue;
                    }
                };
                debug!(%addr, "Inbound connection");
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(stream, handler).await {
                        debug!(%addr, error = %e, "Connection closed");
                    }
                });
            }
        })
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    handler: Arc<dyn MessageHandler>,
) -> Result<(), TransportError> {
    loop {
        let frame = read_frame(&mut stream).await?;
        let msg = parse_framed_message(&frame)?;
        debug!(method = msg.method(), sender = %msg.sender(), "Inbound call");
        let reply = handler.handle(msg).await;
        let framed = frame_reply(&reply)?;
        write_frame(&mut stream, &framed).await?;
    }
}

#[async_trait]
impl Transport for TcpTransport {
    #[instrument(skip(self, msg), fields(method = msg.method(), peer = %peer))]
    async fn call(&self, peer: &PeerId, msg: PeerMessage) -> Result<Reply, TransportError> {
        let conn = self
            .pool
            .get(peer)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| TransportError::NotConnected(peer.to_string()))?;

        let framed = frame_message(&msg)?;
        let result = timeout(RPC_TIMEOUT, async {
            let mut stream = conn.lock().await;
            write_frame(&mut *stream, &framed).await?;
            let reply = read_frame(&mut *stream).await?;
            Ok::<Reply, TransportError>(parse_framed_reply(&reply)?)
        })
        .await;

        match result {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => {
                // drop the broken connection, sync recovers the gap later
                self.pool.remove(peer);
                Err(e)
            }
            Err(_) => {
                self.pool.remove(peer);
                Err(TransportError::Timeout(peer.to_string()))
            }
        }
    }

    #[instrument(skip(self), fields(peer = %peer))]
    async fn connect(&self, peer: &PeerId) -> Result<(), TransportError> {
        if self.pool.contains_key(peer) {
            return Ok(());
        }
        let stream = timeout(RPC_TIMEOUT, TcpStream::connect(peer.as_str()))
            .await
            .map_err(|_| TransportError::Timeout(peer.to_string()))?
            .map_err(|e| TransportError::ConnectFailed {
                peer: peer.to_string(),
                reason: e.to_string(),
            })?;
        stream.set_nodelay(true).ok();
        self.pool.insert(peer.clone(), Arc::new(Mutex::new(stream)));
        debug!("Connected");
        Ok(())
    }

    async fn disconnect(&self, peer: &PeerId) {
        self.pool.remove(peer);
    }

    fn is_connected(&self, peer: &PeerId) -> bool {
        self.pool.contains_key(peer)
    }

    fn connected_peers(&self) -> Vec<PeerId> {
        self.pool.iter().map(|entry| entry.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ConnectArgs;

    struct OkHandler;

    #[async_trait]
    impl MessageHandler for OkHandler {
        async fn handle(&self, msg: PeerMessage) -> Reply {
            match msg {
                PeerMessage::Connect(_) => Reply::Ok,
                other => Reply::Error(format!("unexpected {}", other.method())),
            }
        }
    }

    #[tokio::test]
    async fn test_call_roundtrip() {
        let listener = TcpTransport::bind(&PeerId::new("127.0.0.1:0")).await.unwrap();
        let server_addr = PeerId::new(listener.local_addr().unwrap().to_string());
        TcpTransport::serve(listener, Arc::new(OkHandler));

        let client = TcpTransport::new(PeerId::new("127.0.0.1:7001"));
        client.connect(&server_addr).await.unwrap();
        assert!(client.is_connected(&server_addr));

        let reply = client
            .call(
                &server_addr,
                PeerMessage::Connect(ConnectArgs {
                    sender: client.local_peer().clone(),
                }),
            )
            .await
            .unwrap();
        assert_eq!(reply, Reply::Ok);

        // several calls reuse the pooled connection
        for _ in 0..3 {
            let reply = client
                .call(
                    &server_addr,
                    PeerMessage::Connect(ConnectArgs {
                        sender: client.local_peer().clone(),
                    }),
                )
                .await
                .unwrap();
            assert_eq!(reply, Reply::Ok);
        }
    }

    #[tokio::test]
    async fn test_call_without_connect_fails() {
        let client = TcpTransport::new(PeerId::new("127.0.0.1:7001"));
        let err = client
            .call(
                &PeerId::new("127.0.0.1:7999"),
                PeerMessage::Connect(ConnectArgs {
                    sender: client.local_peer().clone(),
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NotConnected(_)));
    }

    #[tokio::test]
    async fn test_connect_to_dead_peer_fails() {
        let client = TcpTransport::new(PeerId::new("127.0.0.1:7001"));
        // a port nothing listens on
        let err = client.connect(&PeerId::new("127.0.0.1:1")).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::ConnectFailed { .. } | TransportError::Timeout(_)
        ));
    }

    #[tokio::test]
    async fn test_disconnect_forgets_peer() {
        let listener = TcpTransport::bind(&PeerId::new("127.0.0.1:0")).await.unwrap();
        let server_addr = PeerId::new(listener.local_addr().unwrap().to_string());
        TcpTransport::serve(listener, Arc::new(OkHandler));

        let client = TcpTransport::new(PeerId::new("127.0.0.1:7001"));
        client.connect(&server_addr).await.unwrap();
        client.disconnect(&server_addr).await;
        assert!(!client.is_connected(&server_addr));
        assert!(client.connected_peers().is_empty());
    }
}
