//! The replicated document sequence
//!
//! An ordered array of (position, atom, local-id) pairs bracketed by the
//! start and end sentinels. Lookup is a binary search over positions;
//! local edits allocate fresh positions between neighbours, remote edits
//! apply idempotently at the rank their position implies.
//!
//! Local ids are a per-peer monotonic counter identifying snapshot-store
//! rows; they never cross the wire.

use serde::{Deserialize, Serialize};

use crate::error::DocumentError;
use crate::peer::SiteId;
use crate::position::Position;

/// A position identifier and its atom
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub position: Position,
    pub atom: String,
    pub local_id: u64,
}

/// One row of the document snapshot store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub id: u64,
    pub atom: String,
    pub position: Position,
}

/// Result of a local insert, carried to the log and the fan-out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInsert {
    pub position: Position,
    pub atom: String,
    pub local_id: u64,
}

/// Result of a local or remote delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedAtom {
    pub position: Position,
    pub atom: String,
    pub local_id: u64,
}

/// The replicated sequence of pairs
#[derive(Debug, Clone)]
pub struct Document {
    site: SiteId,
    pairs: Vec<Pair>,
    next_local_id: u64,
}

impl Document {
    /// A fresh document holding only the sentinels
    pub fn new(site: SiteId) -> Self {
        Self {
            site,
            pairs: vec![
                Pair {
                    position: Position::start(),
                    atom: String::new(),
                    local_id: 0,
                },
                Pair {
                    position: Position::end(),
                    atom: String::new(),
                    local_id: 1,
                },
            ],
            next_local_id: 2,
        }
    }

    /// Rebuild a document from snapshot rows.
    ///
    /// Rows arrive in id order but land at the rank their position implies.
    /// The local-id counter is re-seeded above the largest stored id.
    pub fn from_rows(site: SiteId, rows: Vec<SnapshotRow>) -> Result<Self, DocumentError> {
        let mut pairs: Vec<Pair> = Vec::with_capacity(rows.len());
        let mut max_id = 1;
        for row in rows {
            let (rank, found) = search(&pairs, &row.position);
            if found {
                return Err(DocumentError::CorruptSnapshot(format!(
                    "duplicate position {} at id {}",
                    row.position, row.id
                )));
            }
            max_id = max_id.max(row.id);
            pairs.insert(
                rank,
                Pair {
                    position: row.position,
                    atom: row.atom,
                    local_id: row.id,
                },
            );
        }
        let sentinels_ok = pairs
            .first()
            .is_some_and(|p| p.position.is_start() && p.atom.is_empty())
            && pairs
                .last()
                .is_some_and(|p| p.position.is_end() && p.atom.is_empty());
        if !sentinels_ok {
            return Err(DocumentError::CorruptSnapshot(
                "sentinel rows missing".to_string(),
            ));
        }
        Ok(Self {
            site,
            pairs,
            next_local_id: max_id + 1,
        })
    }

    pub fn site(&self) -> SiteId {
        self.site
    }

    /// Number of pairs including the two sentinels
    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    /// Number of user-visible atoms
    pub fn atom_count(&self) -> usize {
        self.pairs.len() - 2
    }

    /// The next local id the document would assign
    pub fn next_local_id(&self) -> u64 {
        self.next_local_id
    }

    /// Rank of a position, or the rank it would insert at.
    ///
    /// The second value tells whether the position is present. O(log n).
    pub fn index_of(&self, position: &Position) -> (usize, bool) {
        search(&self.pairs, position)
    }

    pub fn position_at(&self, rank: usize) -> Option<&Position> {
        self.pairs.get(rank).map(|p| &p.position)
    }

    pub fn content_at(&self, rank: usize) -> Option<&str> {
        self.pairs.get(rank).map(|p| p.atom.as_str())
    }

    /// Position immediately left of `position`; `None` at the start
    /// sentinel or when `position` is absent.
    pub fn left_of(&self, position: &Position) -> Option<&Position> {
        let (rank, found) = self.index_of(position);
        if !found || rank == 0 {
            return None;
        }
        Some(&self.pairs[rank - 1].position)
    }

    /// Position immediately right of `position`; `None` at the end
    /// sentinel or when `position` is absent.
    pub fn right_of(&self, position: &Position) -> Option<&Position> {
        let (rank, found) = self.index_of(position);
        if !found || rank + 1 >= self.pairs.len() {
            return None;
        }
        Some(&self.pairs[rank + 1].position)
    }

    /// Insert one atom immediately right of `left`.
    ///
    /// Allocates a fresh position between `left` and its successor and a
    /// fresh local id. Fails with [`DocumentError::NoNeighbour`] when
    /// `left` is absent or is the end sentinel.
    pub fn local_insert(
        &mut self,
        left: &Position,
        atom: &str,
    ) -> Result<LocalInsert, DocumentError> {
        let (rank, found) = self.index_of(left);
        if !found || rank + 1 >= self.pairs.len() {
            return Err(DocumentError::NoNeighbour);
        }
        let right = self.pairs[rank + 1].position.clone();
        let position = Position::generate(left, &right, self.site)?;
        let local_id = self.alloc_id();
        // the fresh position lands right after its left neighbour
        self.pairs.insert(
            rank + 1,
            Pair {
                position: position.clone(),
                atom: atom.to_string(),
                local_id,
            },
        );
        Ok(LocalInsert {
            position,
            atom: atom.to_string(),
            local_id,
        })
    }

    /// Insert a run of atoms right of `left`, chaining each freshly
    /// allocated position as the next left neighbour.
    pub fn local_insert_run(
        &mut self,
        left: &Position,
        text: &str,
    ) -> Result<Vec<LocalInsert>, DocumentError> {
        let mut inserted = Vec::new();
        let mut anchor = left.clone();
        for ch in text.chars() {
            let one = self.local_insert(&anchor, &ch.to_string())?;
            anchor = one.position.clone();
            inserted.push(one);
        }
        Ok(inserted)
    }

    /// Remove the half-open rank range `[start, end)`.
    ///
    /// Sentinel ranks are rejected; the removed pairs come back in order
    /// so each can be emitted as its own delete operation.
    pub fn local_delete_range(
        &mut self,
        start: usize,
        end: usize,
    ) -> Result<Vec<DeletedAtom>, DocumentError> {
        if start == 0 || end > self.pairs.len() - 1 {
            return Err(DocumentError::SentinelEdit);
        }
        if start >= end {
            return Err(DocumentError::RankOutOfBounds {
                rank: start,
                len: self.pairs.len(),
            });
        }
        Ok(self
            .pairs
            .drain(start..end)
            .map(|p| DeletedAtom {
                position: p.position,
                atom: p.atom,
                local_id: p.local_id,
            })
            .collect())
    }

    /// Apply a remote insert. Returns the rank and fresh local id, or
    /// `None` when the position is already present (idempotent).
    pub fn insert_remote(&mut self, position: &Position, atom: &str) -> Option<(usize, u64)> {
        let (rank, found) = self.index_of(position);
        if found {
            return None;
        }
        let local_id = self.alloc_id();
        self.pairs.insert(
            rank,
            Pair {
                position: position.clone(),
                atom: atom.to_string(),
                local_id,
            },
        );
        Some((rank, local_id))
    }

    /// Apply a remote delete. Returns the rank the pair held and the
    /// removed pair, or `None` when the position is absent or names a
    /// sentinel (idempotent).
    pub fn delete_remote(&mut self, position: &Position) -> Option<(usize, DeletedAtom)> {
        let (rank, found) = self.index_of(position);
        if !found || rank == 0 || rank == self.pairs.len() - 1 {
            return None;
        }
        let pair = self.pairs.remove(rank);
        Some((
            rank,
            DeletedAtom {
                position: pair.position,
                atom: pair.atom,
                local_id: pair.local_id,
            },
        ))
    }

    /// Concatenation of all non-sentinel atoms in order
    pub fn content(&self) -> String {
        let mut out = String::new();
        for pair in &self.pairs[1..self.pairs.len() - 1] {
            out.push_str(&pair.atom);
        }
        out
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_local_id;
        self.next_local_id += 1;
        id
    }
}

fn search(pairs: &[Pair], position: &Position) -> (usize, bool) {
    match pairs.binary_search_by(|p| p.position.cmp(position)) {
        Ok(rank) => (rank, true),
        Err(rank) => (rank, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Document {
        Document::new(SiteId(1))
    }

    #[test]
    fn test_new_holds_only_sentinels() {
        let d = doc();
        assert_eq!(d.pair_count(), 2);
        assert_eq!(d.atom_count(), 0);
        assert!(d.position_at(0).unwrap().is_start());
        assert!(d.position_at(1).unwrap().is_end());
        assert_eq!(d.content(), "");
    }

    #[test]
    fn test_local_insert_chain() {
        let mut d = doc();
        let start = Position::start();
        let a = d.local_insert(&start, "a").unwrap();
        let b = d.local_insert(&a.position, "b").unwrap();
        assert_eq!(d.content(), "ab");
        assert!(a.position < b.position);
        assert_eq!(a.local_id, 2);
        assert_eq!(b.local_id, 3);
    }

    #[test]
    fn test_local_insert_between() {
        let mut d = doc();
        let run = d.local_insert_run(&Position::start(), "ab").unwrap();
        d.local_insert(&run[0].position, "X").unwrap();
        assert_eq!(d.content(), "aXb");
    }

    #[test]
    fn test_local_insert_rejects_end_anchor() {
        let mut d = doc();
        let end = Position::end();
        assert_eq!(
            d.local_insert(&end, "a"),
            Err(DocumentError::NoNeighbour)
        );
    }

    #[test]
    fn test_local_insert_rejects_unknown_anchor() {
        let mut d = doc();
        let ghost = Position::generate(&Position::start(), &Position::end(), SiteId(9)).unwrap();
        assert_eq!(
            d.local_insert(&ghost, "a"),
            Err(DocumentError::NoNeighbour)
        );
    }

    #[test]
    fn test_insert_run_returns_ascending_positions() {
        let mut d = doc();
        let run = d.local_insert_run(&Position::start(), "hello").unwrap();
        assert_eq!(d.content(), "hello");
        for w in run.windows(2) {
            assert!(w[0].position < w[1].position);
        }
    }

    #[test]
    fn test_delete_range() {
        let mut d = doc();
        d.local_insert_run(&Position::start(), "hello").unwrap();
        // ranks 1..=5 are the atoms
        let removed = d.local_delete_range(2, 4).unwrap();
        assert_eq!(d.content(), "hlo");
        let atoms: Vec<&str> = removed.iter().map(|r| r.atom.as_str()).collect();
        assert_eq!(atoms, vec!["e", "l"]);
    }

    #[test]
    fn test_delete_range_protects_sentinels() {
        let mut d = doc();
        d.local_insert_run(&Position::start(), "ab").unwrap();
        assert_eq!(d.local_delete_range(0, 1), Err(DocumentError::SentinelEdit));
        assert_eq!(d.local_delete_range(1, 4), Err(DocumentError::SentinelEdit));
        assert!(matches!(
            d.local_delete_range(2, 2),
            Err(DocumentError::RankOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_remote_insert_is_idempotent() {
        let mut d = doc();
        let pos = Position::generate(&Position::start(), &Position::end(), SiteId(2)).unwrap();
        let first = d.insert_remote(&pos, "z");
        assert!(first.is_some());
        assert_eq!(d.insert_remote(&pos, "z"), None);
        assert_eq!(d.content(), "z");
        assert_eq!(d.pair_count(), 3);
    }

    #[test]
    fn test_remote_delete_is_idempotent() {
        let mut d = doc();
        let pos = Position::generate(&Position::start(), &Position::end(), SiteId(2)).unwrap();
        d.insert_remote(&pos, "z");
        assert!(d.delete_remote(&pos).is_some());
        assert_eq!(d.delete_remote(&pos), None);
        assert_eq!(d.content(), "");
    }

    #[test]
    fn test_remote_delete_ignores_unknown_position() {
        let mut d = doc();
        let ghost = Position::generate(&Position::start(), &Position::end(), SiteId(5)).unwrap();
        assert_eq!(d.delete_remote(&ghost), None);
    }

    #[test]
    fn test_remote_delete_ignores_sentinels() {
        let mut d = doc();
        assert_eq!(d.delete_remote(&Position::start()), None);
        assert_eq!(d.delete_remote(&Position::end()), None);
        assert_eq!(d.pair_count(), 2);
    }

    #[test]
    fn test_index_of_reports_insertion_rank() {
        let mut d = doc();
        let run = d.local_insert_run(&Position::start(), "ac").unwrap();
        let between =
            Position::generate(&run[0].position, &run[1].position, SiteId(3)).unwrap();
        let (rank, found) = d.index_of(&between);
        assert!(!found);
        assert_eq!(rank, 2);
    }

    #[test]
    fn test_left_right_neighbours() {
        let mut d = doc();
        let run = d.local_insert_run(&Position::start(), "ab").unwrap();
        assert!(d.left_of(&run[0].position).unwrap().is_start());
        assert_eq!(d.right_of(&run[0].position), Some(&run[1].position));
        assert!(d.right_of(&run[1].position).unwrap().is_end());
        assert_eq!(d.left_of(&Position::start()), None);
        assert_eq!(d.right_of(&Position::end()), None);
    }

    #[test]
    fn test_from_rows_roundtrip() {
        let mut d = doc();
        d.local_insert_run(&Position::start(), "hey").unwrap();
        let rows: Vec<SnapshotRow> = (0..d.pair_count())
            .map(|rank| SnapshotRow {
                id: rank as u64, // not the real ids, but valid and unique
                atom: d.content_at(rank).unwrap().to_string(),
                position: d.position_at(rank).unwrap().clone(),
            })
            .collect();
        let rebuilt = Document::from_rows(SiteId(1), rows).unwrap();
        assert_eq!(rebuilt.content(), "hey");
        assert_eq!(rebuilt.pair_count(), d.pair_count());
        assert!(rebuilt.next_local_id() > 4);
    }

    #[test]
    fn test_from_rows_rejects_missing_sentinels() {
        let rows = vec![SnapshotRow {
            id: 5,
            atom: "a".to_string(),
            position: Position::generate(&Position::start(), &Position::end(), SiteId(1))
                .unwrap(),
        }];
        assert!(matches!(
            Document::from_rows(SiteId(1), rows),
            Err(DocumentError::CorruptSnapshot(_))
        ));
    }
}
