//! Replicated operations
//!
//! An operation is the unit the log stores and peers exchange: one atom,
//! insert or delete, the position it applies to, and the emitting peer's
//! logical clock at emission. (site, clock) is unique across the system;
//! the clock alone is unique within one peer's log.

use serde::{Deserialize, Serialize};

use crate::position::Position;

/// Whether an operation inserts or deletes its atom
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    Delete = 0,
    Insert = 1,
}

impl OpKind {
    /// Stored representation (1 = insert, 0 = delete)
    pub fn as_u8(&self) -> u8 {
        match self {
            OpKind::Delete => 0,
            OpKind::Insert => 1,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(OpKind::Delete),
            1 => Some(OpKind::Insert),
            _ => None,
        }
    }
}

/// One replicated edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// The atom inserted or deleted (a single user-perceived character)
    pub atom: String,
    pub kind: OpKind,
    pub position: Position,
    /// The emitting peer's logical clock at emission
    pub clock: u64,
}

impl Operation {
    pub fn insert(atom: impl Into<String>, position: Position, clock: u64) -> Self {
        Self {
            atom: atom.into(),
            kind: OpKind::Insert,
            position,
            clock,
        }
    }

    pub fn delete(atom: impl Into<String>, position: Position, clock: u64) -> Self {
        Self {
            atom: atom.into(),
            kind: OpKind::Delete,
            position,
            clock,
        }
    }

    pub fn is_insert(&self) -> bool {
        self.kind == OpKind::Insert
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::SiteId;

    #[test]
    fn test_kind_codes() {
        assert_eq!(OpKind::Insert.as_u8(), 1);
        assert_eq!(OpKind::Delete.as_u8(), 0);
        assert_eq!(OpKind::from_u8(1), Some(OpKind::Insert));
        assert_eq!(OpKind::from_u8(0), Some(OpKind::Delete));
        assert_eq!(OpKind::from_u8(7), None);
    }

    #[test]
    fn test_operation_roundtrip_via_postcard() {
        let pos =
            Position::generate(&Position::start(), &Position::end(), SiteId(2)).unwrap();
        let op = Operation::insert("x", pos.clone(), 41);
        let bytes = postcard::to_allocvec(&op).unwrap();
        let back: Operation = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(back, op);
        assert_eq!(back.position, pos);
    }
}
