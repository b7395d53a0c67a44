//! Position identifier algebra
//!
//! A position identifier is a non-empty sequence of (ident, site) entries.
//! Identifiers are totally ordered (ident then site, level by level, with a
//! shorter prefix ordering below its extensions) and dense: between any two
//! distinct identifiers a new one can be allocated by picking a free ident
//! in a gap or adding a level. Ties at a full level are broken by the
//! allocating site, which keeps concurrent allocations at the same gap
//! convergent.
//!
//! The wire format is one length byte followed by three bytes per entry
//! (ident big-endian, then site). Serde goes through the same bytes so the
//! format is identical on the wire and in stored blobs.

use std::cmp::Ordering;
use std::fmt::{self, Display};

use rand::Rng;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::PositionError;
use crate::peer::SiteId;

/// Largest ident value; reserved for the end sentinel's first level.
pub const MAX_IDENT: u16 = u16::MAX;

/// One level of a position identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Entry {
    pub ident: u16,
    pub site: u8,
}

impl Entry {
    pub fn new(ident: u16, site: u8) -> Self {
        Self { ident, site }
    }
}

/// A dense, totally ordered position identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position(Vec<Entry>);

impl Position {
    /// The sentinel below every user-visible position
    pub fn start() -> Self {
        Self(vec![Entry::new(0, 0)])
    }

    /// The sentinel above every user-visible position
    pub fn end() -> Self {
        Self(vec![Entry::new(MAX_IDENT, 0)])
    }

    pub fn from_entries(entries: Vec<Entry>) -> Self {
        debug_assert!(!entries.is_empty());
        Self(entries)
    }

    pub fn entries(&self) -> &[Entry] {
        &self.0
    }

    pub fn level_count(&self) -> usize {
        self.0.len()
    }

    pub fn is_start(&self) -> bool {
        *self == Self::start()
    }

    pub fn is_end(&self) -> bool {
        *self == Self::end()
    }

    /// Three-way comparison, level by level.
    ///
    /// Equivalent to the derived `Ord` (idents then sites, with a shorter
    /// prefix less than its extensions); kept as a named operation because
    /// callers of the algebra read better with it.
    pub fn compare(&self, other: &Position) -> Ordering {
        self.cmp(other)
    }

    /// Allocate a fresh position strictly between `left` and `right`.
    ///
    /// Fails with [`PositionError::InvalidRange`] when `left >= right`.
    /// Walks the levels of both neighbours: equal levels are copied, a gap
    /// of more than one ident is filled with a random pick, a gap of
    /// exactly one is claimed by the site when the site can order itself
    /// against the neighbours' sites, and otherwise allocation descends a
    /// level below the left neighbour.
    pub fn generate(
        left: &Position,
        right: &Position,
        site: SiteId,
    ) -> Result<Position, PositionError> {
        if left >= right {
            return Err(PositionError::InvalidRange);
        }
        let site = site.as_u8();
        let mut rng = rand::rng();
        let mut out: Vec<Entry> = Vec::with_capacity(left.0.len() + 1);

        for i in 0..left.0.len() {
            let l = left.0[i];
            // left < right guarantees right has a level wherever left does
            // while all earlier levels are equal
            let r = right.0[i];
            if l == r {
                out.push(l);
                continue;
            }
            let gap = r.ident - l.ident;
            if gap > 1 {
                let ident = rng.random_range(l.ident + 1..r.ident);
                out.push(Entry::new(ident, site));
            } else if gap == 1 {
                if site > l.site {
                    out.push(Entry::new(l.ident, site));
                } else if site < r.site {
                    out.push(Entry::new(r.ident, site));
                } else {
                    descend(&mut out, &left.0[i..], site, &mut rng);
                }
            } else if l.site < site && site < r.site {
                // same ident, the site fits between the neighbour sites
                out.push(Entry::new(l.ident, site));
            } else {
                descend(&mut out, &left.0[i..], site, &mut rng);
            }
            return Ok(Position(out));
        }

        // left is a strict prefix of right: allocate below right's next level
        let bound = right.0[left.0.len()];
        if bound.ident > 1 {
            let ident = rng.random_range(1..bound.ident);
            out.push(Entry::new(ident, site));
        } else if bound.ident == 1 || site < bound.site {
            out.push(Entry::new(0, site));
        } else if bound.site > 0 {
            // wedge under the minimal level; uniqueness comes from the
            // fresh sited level below it
            out.push(Entry::new(0, 0));
            out.push(Entry::new(rng.random_range(1..MAX_IDENT), site));
        } else {
            // right extends left by the absolute minimum entry; nothing
            // fits between (allocation never produces this neighbourhood)
            return Err(PositionError::InvalidRange);
        }
        Ok(Position(out))
    }

    /// Wire encoding: length byte, then ident (big-endian) and site per level.
    pub fn to_bytes(&self) -> Vec<u8> {
        debug_assert!(self.0.len() <= u8::MAX as usize);
        let mut bytes = Vec::with_capacity(1 + self.0.len() * 3);
        bytes.push(self.0.len() as u8);
        for entry in &self.0 {
            bytes.extend_from_slice(&entry.ident.to_be_bytes());
            bytes.push(entry.site);
        }
        bytes
    }

    /// Bit-exact inverse of [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Position, PositionError> {
        let Some((&len, rest)) = bytes.split_first() else {
            return Err(PositionError::BadPosition("empty buffer".to_string()));
        };
        if len == 0 {
            return Err(PositionError::BadPosition(
                "zero-length position".to_string(),
            ));
        }
        let expected = len as usize * 3;
        if rest.len() != expected {
            return Err(PositionError::BadPosition(format!(
                "expected {} payload bytes, got {}",
                expected,
                rest.len()
            )));
        }
        let entries = rest
            .chunks_exact(3)
            .map(|c| Entry::new(u16::from_be_bytes([c[0], c[1]]), c[2]))
            .collect();
        Ok(Position(entries))
    }
}

/// Copy the current left level and add a fresh level below the ceiling.
///
/// The random ident stays above the left neighbour's next level so the new
/// position orders strictly after it. When that level leaves no room below
/// the ceiling, the whole left tail is carried down and the fresh level is
/// unconstrained.
fn descend(out: &mut Vec<Entry>, left_tail: &[Entry], site: u8, rng: &mut impl Rng) {
    let anchor = left_tail[0];
    let min = left_tail.get(1).map(|e| e.ident).unwrap_or(0);
    out.push(anchor);
    if min >= MAX_IDENT - 1 {
        out.extend_from_slice(&left_tail[1..]);
        out.push(Entry::new(rng.random_range(1..MAX_IDENT), site));
    } else {
        out.push(Entry::new(rng.random_range(min + 1..MAX_IDENT), site));
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{}.{}", entry.ident, entry.site)?;
        }
        Ok(())
    }
}

impl Serialize for Position {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.to_bytes())
    }
}

impl<'de> Deserialize<'de> for Position {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PositionVisitor;

        impl<'de> Visitor<'de> for PositionVisitor {
            type Value = Position;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("position identifier bytes")
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Position, E> {
                Position::from_bytes(v).map_err(E::custom)
            }

            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Position, A::Error> {
                let mut buf = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(byte) = seq.next_element::<u8>()? {
                    buf.push(byte);
                }
                Position::from_bytes(&buf).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_bytes(PositionVisitor)
    }
}
