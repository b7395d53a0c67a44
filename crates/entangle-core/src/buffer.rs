//! Document and line index behind one mutating API
//!
//! The original design kept the replicated sequence and its line-oriented
//! view synchronized by hand at every call site. Here the two live inside
//! [`TextBuffer`] and every mutation goes through it, so they cannot
//! drift. The engine holds the buffer (plus the clock vector) under the
//! document lock.
//!
//! Rank bookkeeping: the start sentinel occupies rank 0, so the atom at
//! flat character index `i` lives at rank `i + 1`, and the left neighbour
//! of an insertion at flat index `i` is the pair at rank `i`.

use crate::document::{DeletedAtom, Document, LocalInsert, SnapshotRow};
use crate::error::DocumentError;
use crate::line_index::{LineCol, LineIndex};
use crate::peer::SiteId;
use crate::position::Position;

/// The locally materialized replicated text
#[derive(Debug, Clone)]
pub struct TextBuffer {
    doc: Document,
    lines: LineIndex,
}

impl TextBuffer {
    pub fn new(site: SiteId) -> Self {
        Self {
            doc: Document::new(site),
            lines: LineIndex::new(),
        }
    }

    /// Rebuild from snapshot rows; the line index is derived from the
    /// reconstructed content.
    pub fn from_snapshot(site: SiteId, rows: Vec<SnapshotRow>) -> Result<Self, DocumentError> {
        let doc = Document::from_rows(site, rows)?;
        let lines = LineIndex::from_content(&doc.content());
        Ok(Self { doc, lines })
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn content(&self) -> String {
        self.doc.content()
    }

    pub fn line(&self, n: usize) -> Option<String> {
        self.lines.line(n)
    }

    pub fn line_bytes(&self, n: usize) -> Option<&[u8]> {
        self.lines.line_bytes(n)
    }

    pub fn line_count(&self) -> usize {
        self.lines.line_count()
    }

    pub fn rune_at(&self, loc: LineCol) -> char {
        self.lines.rune_at(loc)
    }

    pub fn to_offset(&self, loc: LineCol) -> Option<usize> {
        self.lines.to_offset(loc)
    }

    pub fn from_offset(&self, offset: usize) -> LineCol {
        self.lines.from_offset(offset)
    }

    /// Insert text at a location, one freshly positioned atom per rune.
    ///
    /// Returns the inserted atoms in order for logging and fan-out.
    pub fn insert_at(
        &mut self,
        loc: LineCol,
        text: &str,
    ) -> Result<Vec<LocalInsert>, DocumentError> {
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let flat = self.lines.to_offset(loc).ok_or(DocumentError::BadLocation)?;
        let left = self
            .doc
            .position_at(flat)
            .ok_or(DocumentError::NoNeighbour)?
            .clone();
        let inserted = self.doc.local_insert_run(&left, text)?;
        self.lines.insert_at(loc, text.as_bytes());
        Ok(inserted)
    }

    /// Remove `[start, end)` and return the removed text plus the deleted
    /// atoms in order, each to be emitted as its own delete operation.
    pub fn remove_range(
        &mut self,
        start: LineCol,
        end: LineCol,
    ) -> Result<(String, Vec<DeletedAtom>), DocumentError> {
        let s = self
            .lines
            .to_offset(start)
            .ok_or(DocumentError::BadLocation)?;
        let e = self.lines.to_offset(end).ok_or(DocumentError::BadLocation)?;
        if s >= e {
            return Ok((String::new(), Vec::new()));
        }
        let deleted = self.doc.local_delete_range(s + 1, e + 1)?;
        let removed = self.lines.remove_range(start, end);
        Ok((removed, deleted))
    }

    /// Apply a remote insert to both structures. `None` when the position
    /// is already present.
    pub fn apply_insert(&mut self, position: &Position, atom: &str) -> Option<u64> {
        let (rank, local_id) = self.doc.insert_remote(position, atom)?;
        let loc = self.lines.from_offset(rank - 1);
        self.lines.insert_at(loc, atom.as_bytes());
        Some(local_id)
    }

    /// Apply a remote delete to both structures. `None` when the position
    /// is absent.
    pub fn apply_delete(&mut self, position: &Position) -> Option<DeletedAtom> {
        let (rank, deleted) = self.doc.delete_remote(position)?;
        let start = self.lines.from_offset(rank - 1);
        let end = self.lines.from_offset(rank);
        self.lines.remove_range(start, end);
        Some(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf() -> TextBuffer {
        TextBuffer::new(SiteId(1))
    }

    fn mirror_holds(b: &TextBuffer) {
        assert_eq!(b.content(), {
            let mut joined = String::new();
            for n in 0..b.line_count() {
                if n > 0 {
                    joined.push('\n');
                }
                joined.push_str(&b.line(n).unwrap());
            }
            joined
        });
    }

    #[test]
    fn test_insert_keeps_structures_in_step() {
        let mut b = buf();
        b.insert_at(LineCol::new(0, 0), "hello").unwrap();
        assert_eq!(b.content(), "hello");
        assert_eq!(b.line(0).unwrap(), "hello");
        mirror_holds(&b);
    }

    #[test]
    fn test_insert_with_newlines() {
        let mut b = buf();
        b.insert_at(LineCol::new(0, 0), "ab\ncd").unwrap();
        assert_eq!(b.line_count(), 2);
        assert_eq!(b.line(1).unwrap(), "cd");
        b.insert_at(LineCol::new(1, 1), "X").unwrap();
        assert_eq!(b.content(), "ab\ncXd");
        mirror_holds(&b);
    }

    #[test]
    fn test_insert_at_bad_location() {
        let mut b = buf();
        assert_eq!(
            b.insert_at(LineCol::new(3, 0), "x"),
            Err(DocumentError::BadLocation)
        );
    }

    #[test]
    fn test_remove_range_emits_per_atom_deletes() {
        let mut b = buf();
        b.insert_at(LineCol::new(0, 0), "ab\ncd").unwrap();
        let (removed, deleted) = b
            .remove_range(LineCol::new(0, 1), LineCol::new(1, 1))
            .unwrap();
        assert_eq!(removed, "b\nc");
        assert_eq!(deleted.len(), 3);
        assert_eq!(b.content(), "ad");
        mirror_holds(&b);
    }

    #[test]
    fn test_remove_empty_range_is_noop() {
        let mut b = buf();
        b.insert_at(LineCol::new(0, 0), "ab").unwrap();
        let (removed, deleted) = b
            .remove_range(LineCol::new(0, 1), LineCol::new(0, 1))
            .unwrap();
        assert!(removed.is_empty());
        assert!(deleted.is_empty());
        assert_eq!(b.content(), "ab");
    }

    #[test]
    fn test_apply_insert_and_delete_roundtrip() {
        let mut b = buf();
        let ops = b.insert_at(LineCol::new(0, 0), "ab").unwrap();

        let mut other = TextBuffer::new(SiteId(2));
        for op in &ops {
            assert!(other.apply_insert(&op.position, &op.atom).is_some());
        }
        assert_eq!(other.content(), "ab");
        mirror_holds(&other);

        // duplicate delivery is ignored
        assert!(other.apply_insert(&ops[0].position, "a").is_none());
        assert_eq!(other.content(), "ab");

        assert!(other.apply_delete(&ops[0].position).is_some());
        assert!(other.apply_delete(&ops[0].position).is_none());
        assert_eq!(other.content(), "b");
        mirror_holds(&other);
    }

    #[test]
    fn test_apply_insert_newline_atom() {
        let mut b = buf();
        let ops = b.insert_at(LineCol::new(0, 0), "a\nb").unwrap();

        let mut other = TextBuffer::new(SiteId(2));
        // deliver out of order; positions decide placement
        for op in ops.iter().rev() {
            other.apply_insert(&op.position, &op.atom);
        }
        assert_eq!(other.content(), "a\nb");
        assert_eq!(other.line_count(), 2);
        mirror_holds(&other);
    }

    #[test]
    fn test_content_mirror_after_edit_storm() {
        let mut b = buf();
        b.insert_at(LineCol::new(0, 0), "one\ntwo\nthree").unwrap();
        b.remove_range(LineCol::new(0, 1), LineCol::new(1, 2)).unwrap();
        b.insert_at(LineCol::new(0, 1), "X\nY").unwrap();
        b.remove_range(LineCol::new(0, 0), LineCol::new(1, 0)).unwrap();
        mirror_holds(&b);
        assert_eq!(b.content(), b.document().content());
    }
}
