//! Storage error types

use thiserror::Error;

/// Errors from the durable stores
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("corrupt record at key {key}: {reason}")]
    Corrupt { key: u64, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = StorageError::Io("disk full".to_string());
        assert!(format!("{}", err).contains("disk full"));

        let err = StorageError::Corrupt {
            key: 12,
            reason: "bad kind byte".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("12"));
        assert!(msg.contains("bad kind byte"));
    }
}
