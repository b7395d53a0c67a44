//! Peer configuration file
//!
//! One peer per line, `<ip:port> <S|N>`: S peers are dialed and kept
//! connected, N peers are known but passive. The first line names the
//! local peer. Site ids are assigned from the sorted address order, so
//! every peer derives the same collision-free assignment from its own
//! copy of the file (each lists itself first).

use std::path::Path;

use entangle_core::{PeerId, SiteId};

use crate::error::ConfigError;

/// Whether we actively maintain a connection to a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    /// Dial and keep connected
    Share,
    /// Known but offline until it dials us
    Passive,
}

/// One configured peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEntry {
    pub peer: PeerId,
    pub role: PeerRole,
    pub site: SiteId,
}

/// The parsed peer configuration
#[derive(Debug, Clone)]
pub struct PeerConfig {
    entries: Vec<PeerEntry>,
}

impl PeerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Missing(e.to_string()))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut parsed: Vec<(PeerId, PeerRole)> = Vec::new();
        for (i, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split_whitespace();
            let addr = parts.next().ok_or_else(|| ConfigError::Malformed {
                line: i + 1,
                reason: "missing address".to_string(),
            })?;
            if !addr.contains(':') {
                return Err(ConfigError::Malformed {
                    line: i + 1,
                    reason: format!("address {addr} is not ip:port"),
                });
            }
            let role = match parts.next() {
                Some("S") => PeerRole::Share,
                Some("N") => PeerRole::Passive,
                Some(other) => {
                    return Err(ConfigError::Malformed {
                        line: i + 1,
                        reason: format!("role must be S or N, got {other}"),
                    })
                }
                None => {
                    return Err(ConfigError::Malformed {
                        line: i + 1,
                        reason: "missing role".to_string(),
                    })
                }
            };
            let peer = PeerId::new(addr);
            if parsed.iter().any(|(p, _)| p == &peer) {
                return Err(ConfigError::Malformed {
                    line: i + 1,
                    reason: format!("duplicate peer {addr}"),
                });
            }
            parsed.push((peer, role));
        }
        if parsed.is_empty() {
            return Err(ConfigError::Empty);
        }
        if parsed.len() > u8::MAX as usize + 1 {
            return Err(ConfigError::TooManyPeers(parsed.len()));
        }

        // canonical site assignment: rank in sorted address order
        let mut sorted: Vec<PeerId> = parsed.iter().map(|(p, _)| p.clone()).collect();
        sorted.sort();

        let entries = parsed
            .into_iter()
            .map(|(peer, role)| {
                let rank = sorted
                    .iter()
                    .position(|p| p == &peer)
                    .unwrap_or(0);
                PeerEntry {
                    peer,
                    role,
                    site: SiteId(rank as u8),
                }
            })
            .collect();
        Ok(Self { entries })
    }

    /// The local peer (first line)
    pub fn local(&self) -> &PeerEntry {
        &self.entries[0]
    }

    pub fn local_peer(&self) -> &PeerId {
        &self.entries[0].peer
    }

    pub fn local_site(&self) -> SiteId {
        self.entries[0].site
    }

    /// Every configured peer, the local one included
    pub fn entries(&self) -> &[PeerEntry] {
        &self.entries
    }

    /// Remote peers only
    pub fn remotes(&self) -> impl Iterator<Item = &PeerEntry> {
        self.entries.iter().skip(1)
    }

    /// Remote peers we actively dial
    pub fn share_peers(&self) -> impl Iterator<Item = &PeerEntry> {
        self.remotes().filter(|e| e.role == PeerRole::Share)
    }

    pub fn site_of(&self, peer: &PeerId) -> Option<SiteId> {
        self.entries.iter().find(|e| &e.peer == peer).map(|e| e.site)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "127.0.0.1:7001 S\n127.0.0.1:7002 S\n127.0.0.1:7003 N\n";

    #[test]
    fn test_parse_sample() {
        let config = PeerConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.entries().len(), 3);
        assert_eq!(config.local_peer().as_str(), "127.0.0.1:7001");
        assert_eq!(config.local_site(), SiteId(0));

        let shares: Vec<&str> = config.share_peers().map(|e| e.peer.as_str()).collect();
        assert_eq!(shares, vec!["127.0.0.1:7002"]);
        assert_eq!(
            config.site_of(&PeerId::new("127.0.0.1:7003")),
            Some(SiteId(2))
        );
    }

    #[test]
    fn test_sites_agree_across_local_orderings() {
        // the same peer set in each peer's own file order yields the same
        // site per address
        let at_a = PeerConfig::parse("127.0.0.1:7001 S\n127.0.0.1:7002 S\n").unwrap();
        let at_b = PeerConfig::parse("127.0.0.1:7002 S\n127.0.0.1:7001 S\n").unwrap();
        assert_eq!(at_a.local_site(), SiteId(0));
        assert_eq!(at_b.local_site(), SiteId(1));
        assert_eq!(
            at_a.site_of(&PeerId::new("127.0.0.1:7002")),
            Some(at_b.local_site())
        );
        assert_ne!(at_a.local_site(), at_b.local_site());
    }

    #[test]
    fn test_parse_skips_blank_lines() {
        let config = PeerConfig::parse("127.0.0.1:7001 S\n\n127.0.0.1:7002 N\n").unwrap();
        assert_eq!(config.entries().len(), 2);
    }

    #[test]
    fn test_parse_rejects_bad_role() {
        let err = PeerConfig::parse("127.0.0.1:7001 X\n").unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { line: 1, .. }));
    }

    #[test]
    fn test_parse_rejects_missing_role() {
        let err = PeerConfig::parse("127.0.0.1:7001\n").unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { .. }));
    }

    #[test]
    fn test_parse_rejects_bad_address() {
        let err = PeerConfig::parse("localhost S\n").unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { .. }));
    }

    #[test]
    fn test_parse_rejects_duplicates() {
        let err = PeerConfig::parse("127.0.0.1:7001 S\n127.0.0.1:7001 N\n").unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { line: 2, .. }));
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert_eq!(PeerConfig::parse("\n\n").unwrap_err(), ConfigError::Empty);
    }

    #[test]
    fn test_load_missing_file() {
        let err = PeerConfig::load("/nonexistent/peers.conf").unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }
}
