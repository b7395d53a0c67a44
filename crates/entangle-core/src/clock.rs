//! Per-peer logical clocks
//!
//! The clock vector maps every known peer (the local one included) to the
//! highest operation clock seen from it. The local slot counts operations
//! this peer has emitted; remote slots only ever rise, whatever order
//! deliveries arrive in. Dirty flags mark entries changed since the last
//! flush to the clock store.

use std::collections::HashMap;

use crate::peer::PeerId;

/// One slot of the clock vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockEntry {
    pub clock: u64,
    pub dirty: bool,
}

/// Per-peer last-seen clocks with dirty tracking
#[derive(Debug, Clone)]
pub struct ClockVector {
    local: PeerId,
    entries: HashMap<PeerId, ClockEntry>,
}

impl ClockVector {
    /// A vector with every listed peer (and the local one) at zero
    pub fn new(local: PeerId, peers: impl IntoIterator<Item = PeerId>) -> Self {
        let mut entries = HashMap::new();
        entries.insert(local.clone(), ClockEntry::default());
        for peer in peers {
            entries.entry(peer).or_default();
        }
        Self { local, entries }
    }

    pub fn local_peer(&self) -> &PeerId {
        &self.local
    }

    /// Advance the local clock by one and return the new value.
    ///
    /// Only called while emitting a local operation, serialized by the
    /// document lock.
    pub fn local_tick(&mut self) -> u64 {
        let entry = self.entries.entry(self.local.clone()).or_default();
        entry.clock += 1;
        entry.dirty = true;
        entry.clock
    }

    /// The local peer's own clock
    pub fn local_clock(&self) -> u64 {
        self.get(&self.local)
    }

    /// Record an observed clock from a peer; the stored value only rises.
    pub fn observe(&mut self, peer: &PeerId, clock: u64) {
        let entry = self.entries.entry(peer.clone()).or_default();
        if clock > entry.clock {
            entry.clock = clock;
            entry.dirty = true;
        }
    }

    /// Highest clock observed from a peer (zero when never seen)
    pub fn get(&self, peer: &PeerId) -> u64 {
        self.entries.get(peer).map(|e| e.clock).unwrap_or(0)
    }

    /// Seed entries from the clock store at startup
    pub fn restore(&mut self, stored: impl IntoIterator<Item = (PeerId, u64)>) {
        for (peer, clock) in stored {
            let entry = self.entries.entry(peer).or_default();
            entry.clock = entry.clock.max(clock);
            entry.dirty = false;
        }
    }

    /// Entries changed since the last flush
    pub fn dirty_entries(&self) -> Vec<(PeerId, u64)> {
        self.entries
            .iter()
            .filter(|(_, e)| e.dirty)
            .map(|(p, e)| (p.clone(), e.clock))
            .collect()
    }

    /// Clear dirty flags after a successful flush
    pub fn mark_clean(&mut self) {
        for entry in self.entries.values_mut() {
            entry.dirty = false;
        }
    }

    /// All known peers and their clocks
    pub fn snapshot(&self) -> Vec<(PeerId, u64)> {
        self.entries
            .iter()
            .map(|(p, e)| (p.clone(), e.clock))
            .collect()
    }
}
