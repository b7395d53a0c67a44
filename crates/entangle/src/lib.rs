//! # Entangle
//!
//! The engine of a peer-to-peer collaborative plain-text editor. Each
//! peer holds a Logoot-style replicated document; concurrent inserts and
//! deletes commute, so every peer converges to the same content without a
//! central server. Edits are durably logged per peer, fanned out to
//! connected peers, and recovered after disconnection by a two-phase
//! pairwise catch-up protocol driven by per-peer logical clocks.
//!
//! The editor shell talks to [`Engine`]:
//!
//! ```rust,ignore
//! use entangle::{Engine, LineCol};
//!
//! let engine = Engine::new(config, store, transport);
//! engine.open_document(Some(path)).await?;
//! engine.insert_at(LineCol::new(0, 0), "hello").await?;
//! let removed = engine.delete_range(LineCol::new(0, 0), LineCol::new(0, 1)).await?;
//! engine.connect(&peer).await?;
//! println!("{}", engine.content());
//! engine.shutdown().await;
//! ```
//!
//! Rendering, key dispatch, highlighting, and undo live in the shell, not
//! here.

pub mod engine;
pub mod error;
pub mod service;
mod sync;
mod workers;

pub use engine::Engine;
pub use error::{EngineError, SyncError};
pub use service::EngineService;

// the types embedders need alongside the engine
pub use entangle_core::{LineCol, Operation, PeerId, Position, SiteId};
pub use entangle_net::{
    MockHub, PeerConfig, PeerEntry, PeerRole, TcpTransport, Transport,
};
pub use entangle_storage::{DurableStore, InMemoryStore, RedbStore};
