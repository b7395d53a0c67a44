//! Wire protocol between peers
//!
//! Every RPC is one framed [`PeerMessage`] answered by one framed
//! [`Reply`]. Frames are a 4-byte big-endian length prefix followed by a
//! postcard-encoded payload; a maximum frame size bounds allocation.
//! Position identifiers travel in their dedicated byte format (the
//! `Position` serde impl), atoms are UTF-8 strings, clocks are unsigned
//! 64-bit.

use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use entangle_core::{Operation, PeerId, Position};

use crate::error::FramingError;

/// Maximum frame size (1 MB)
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Per-RPC timeout
pub const RPC_TIMEOUT: Duration = Duration::from_secs(5);

/// Arguments of an `Insert` or `Delete` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditArgs {
    pub sender: PeerId,
    /// The sender's logical clock at emission
    pub clock: u64,
    pub position: Position,
    pub atom: String,
}

/// Arguments of a `Connect` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectArgs {
    pub sender: PeerId,
}

/// Arguments of a `SyncPhaseOne` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPhaseOneArgs {
    pub sender: PeerId,
    /// The sender's own clock
    pub sender_clock: u64,
    /// The sender's view of the receiver's clock
    pub receiver_clock: u64,
}

/// Reply to a `SyncPhaseOne` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPhaseOneReply {
    /// True when the sender must follow up with its missing range
    pub phase_two: bool,
    /// The receiver's view of the sender's clock (phase-two lower bound)
    pub requester_clock: u64,
    /// Operations the sender is missing, ascending by clock
    pub patch: Vec<Operation>,
}

/// Arguments of a `SyncPhaseTwo` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPhaseTwoArgs {
    pub sender: PeerId,
    /// Operations the receiver is missing, ascending by clock
    pub patch: Vec<Operation>,
}

/// Arguments of a `Disconnect` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectArgs {
    pub sender: PeerId,
}

/// The remote-callable methods
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerMessage {
    Insert(EditArgs),
    Delete(EditArgs),
    Connect(ConnectArgs),
    SyncPhaseOne(SyncPhaseOneArgs),
    SyncPhaseTwo(SyncPhaseTwoArgs),
    Disconnect(DisconnectArgs),
}

impl PeerMessage {
    /// Method name, for logs
    pub fn method(&self) -> &'static str {
        match self {
            PeerMessage::Insert(_) => "Insert",
            PeerMessage::Delete(_) => "Delete",
            PeerMessage::Connect(_) => "Connect",
            PeerMessage::SyncPhaseOne(_) => "SyncPhaseOne",
            PeerMessage::SyncPhaseTwo(_) => "SyncPhaseTwo",
            PeerMessage::Disconnect(_) => "Disconnect",
        }
    }

    /// The peer that sent this message
    pub fn sender(&self) -> &PeerId {
        match self {
            PeerMessage::Insert(a) | PeerMessage::Delete(a) => &a.sender,
            PeerMessage::Connect(a) => &a.sender,
            PeerMessage::SyncPhaseOne(a) => &a.sender,
            PeerMessage::SyncPhaseTwo(a) => &a.sender,
            PeerMessage::Disconnect(a) => &a.sender,
        }
    }
}

/// Replies to remote calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    Ok,
    SyncPhaseOne(SyncPhaseOneReply),
    /// The handler refused the call; the message is for logs only
    Error(String),
}

fn frame(payload: &[u8]) -> Result<Bytes, FramingError> {
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(FramingError::MessageTooLarge {
            size: payload.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    let mut framed = Vec::with_capacity(4 + payload.len());
    framed.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    framed.extend_from_slice(payload);
    Ok(Bytes::from(framed))
}

fn unframe(data: &[u8]) -> Result<&[u8], FramingError> {
    if data.len() < 4 {
        return Err(FramingError::InsufficientData {
            needed: 4,
            available: data.len(),
        });
    }
    let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(FramingError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }
    if data.len() < 4 + len {
        return Err(FramingError::InsufficientData {
            needed: 4 + len,
            available: data.len(),
        });
    }
    Ok(&data[4..4 + len])
}

/// Frame a message for wire transmission (length-prefixed)
pub fn frame_message(msg: &PeerMessage) -> Result<Bytes, FramingError> {
    let payload =
        postcard::to_allocvec(msg).map_err(|e| FramingError::Serialization(e.to_string()))?;
    frame(&payload)
}

/// Parse a framed message from bytes
pub fn parse_framed_message(data: &[u8]) -> Result<PeerMessage, FramingError> {
    postcard::from_bytes(unframe(data)?)
        .map_err(|e| FramingError::Deserialization(e.to_string()))
}

/// Frame a reply for wire transmission
pub fn frame_reply(reply: &Reply) -> Result<Bytes, FramingError> {
    let payload =
        postcard::to_allocvec(reply).map_err(|e| FramingError::Serialization(e.to_string()))?;
    frame(&payload)
}

/// Parse a framed reply from bytes
pub fn parse_framed_reply(data: &[u8]) -> Result<Reply, FramingError> {
    postcard::from_bytes(unframe(data)?)
        .map_err(|e| FramingError::Deserialization(e.to_string()))
}

/// Read one frame (prefix plus payload) from a stream
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, FramingError> {
    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| FramingError::Deserialization(e.to_string()))?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(FramingError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }
    let mut buf = vec![0u8; 4 + len];
    buf[..4].copy_from_slice(&len_buf);
    reader
        .read_exact(&mut buf[4..])
        .await
        .map_err(|e| FramingError::Deserialization(e.to_string()))?;
    Ok(buf)
}

/// Write one already-framed buffer to a stream
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    framed: &[u8],
) -> Result<(), FramingError> {
    writer
        .write_all(framed)
        .await
        .map_err(|e| FramingError::Serialization(e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| FramingError::Serialization(e.to_string()))?;
    Ok(())
}
