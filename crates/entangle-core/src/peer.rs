//! Peer and site identifiers
//!
//! A peer is addressed by its `ip:port` string; the site id is the small
//! integer used as the tie-breaker inside position identifiers. Sites are
//! assigned from the shared peer configuration (a peer's line index), so
//! collision-free assignment is a deployment assumption, not something this
//! type enforces.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Replica identifier used inside position entries
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct SiteId(pub u8);

impl SiteId {
    /// The site reserved for the document sentinels
    pub const SENTINEL: SiteId = SiteId(0);

    pub fn as_u8(&self) -> u8 {
        self.0
    }
}

impl Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for SiteId {
    fn from(v: u8) -> Self {
        Self(v)
    }
}

/// Network identity of a peer (`ip:port`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short display form (for logging)
    pub fn short_id(&self) -> String {
        // keep the port, the interesting part on a shared host
        match self.0.rsplit_once(':') {
            Some((_, port)) => format!(":{port}"),
            None => self.0.clone(),
        }
    }
}

impl Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_display() {
        let id = PeerId::new("127.0.0.1:7001");
        assert_eq!(id.to_string(), "127.0.0.1:7001");
        assert_eq!(id.short_id(), ":7001");
    }

    #[test]
    fn test_site_id_ordering() {
        assert!(SiteId(1) < SiteId(2));
        assert_eq!(SiteId::SENTINEL, SiteId(0));
    }
}
