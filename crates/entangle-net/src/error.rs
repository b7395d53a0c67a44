//! Networking error types

use thiserror::Error;

/// Errors from the peer configuration file
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("configuration file missing or unreadable: {0}")]
    Missing(String),

    #[error("malformed peer line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("configuration names no peers")]
    Empty,

    #[error("too many peers for 8-bit site ids ({0})")]
    TooManyPeers(usize),
}

/// Errors from transports
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("connect to {peer} failed: {reason}")]
    ConnectFailed { peer: String, reason: String },

    #[error("call to {0} timed out")]
    Timeout(String),

    #[error("peer not connected: {0}")]
    NotConnected(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    #[error(transparent)]
    Framing(#[from] FramingError),
}

/// Errors from message framing
#[derive(Debug, Clone, Error)]
pub enum FramingError {
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("insufficient data: need {needed} bytes, have {available}")]
    InsufficientData { needed: usize, available: usize },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),
}
