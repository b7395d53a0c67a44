//! Error types for the replicated document core

use thiserror::Error;

/// Errors from the position identifier algebra
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("left position is not strictly less than right")]
    InvalidRange,

    #[error("malformed position bytes: {0}")]
    BadPosition(String),
}

/// Errors from document mutation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("no neighbour to anchor the insert")]
    NoNeighbour,

    #[error("position already present in the document")]
    DuplicatePosition,

    #[error("range would remove a sentinel pair")]
    SentinelEdit,

    #[error("rank {rank} out of bounds (len {len})")]
    RankOutOfBounds { rank: usize, len: usize },

    #[error("location outside the document")]
    BadLocation,

    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    #[error(transparent)]
    Position(#[from] PositionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_error_display() {
        assert!(format!("{}", PositionError::InvalidRange).contains("strictly less"));

        let err = PositionError::BadPosition("truncated".to_string());
        assert!(format!("{}", err).contains("truncated"));
    }

    #[test]
    fn test_document_error_display() {
        assert!(format!("{}", DocumentError::NoNeighbour).contains("neighbour"));
        assert!(format!("{}", DocumentError::DuplicatePosition).contains("already present"));
        assert!(format!("{}", DocumentError::SentinelEdit).contains("sentinel"));

        let err = DocumentError::RankOutOfBounds { rank: 9, len: 3 };
        let msg = format!("{}", err);
        assert!(msg.contains('9'));
        assert!(msg.contains('3'));
    }

    #[test]
    fn test_position_error_conversion() {
        let err: DocumentError = PositionError::InvalidRange.into();
        assert!(matches!(err, DocumentError::Position(_)));
    }
}
