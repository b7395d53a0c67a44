//! # Entangle Core
//!
//! Foundational types for the Entangle replicated text editor:
//!
//! - [`Position`]: dense, totally ordered position identifiers allocated
//!   between neighbours
//! - [`Document`]: the ordered (position, atom) sequence with local and
//!   remote mutation
//! - [`LineIndex`]: the (line, column) <-> flat offset view used by editor
//!   frontends
//! - [`TextBuffer`]: document and line index coupled behind one mutating API
//! - [`ClockVector`]: per-peer logical clocks with dirty tracking
//!
//! This crate is purely in-memory; durability lives in `entangle-storage`
//! and networking in `entangle-net`.

pub mod buffer;
pub mod clock;
pub mod document;
pub mod error;
pub mod line_index;
pub mod operation;
pub mod peer;
pub mod position;

pub use buffer::TextBuffer;
pub use clock::{ClockEntry, ClockVector};
pub use document::{DeletedAtom, Document, LocalInsert, Pair, SnapshotRow};
pub use error::{DocumentError, PositionError};
pub use line_index::{LineCol, LineIndex};
pub use operation::{OpKind, Operation};
pub use peer::{PeerId, SiteId};
pub use position::{Entry, Position};
