//! # Entangle Net
//!
//! Networking for the replicated editor: the peer configuration file, the
//! length-prefixed wire protocol, and the transport abstraction with its
//! two implementations (TCP for deployment, an in-memory hub for tests).
//!
//! The crate knows nothing about documents or stores; it moves
//! [`PeerMessage`]s between peers and hands inbound ones to a
//! [`MessageHandler`].

pub mod config;
pub mod error;
pub mod mock;
pub mod protocol;
pub mod tcp;
pub mod transport;

pub use config::{PeerConfig, PeerEntry, PeerRole};
pub use error::{ConfigError, FramingError, TransportError};
pub use mock::{MockHub, MockTransport};
pub use protocol::{
    frame_message, frame_reply, parse_framed_message, parse_framed_reply, ConnectArgs,
    DisconnectArgs, EditArgs, PeerMessage, Reply, SyncPhaseOneArgs, SyncPhaseOneReply,
    SyncPhaseTwoArgs, MAX_MESSAGE_SIZE, RPC_TIMEOUT,
};
pub use tcp::TcpTransport;
pub use transport::{MessageHandler, Transport};
