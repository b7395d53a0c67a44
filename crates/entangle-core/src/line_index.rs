//! Line index over the document content
//!
//! A derived view splitting the document's bytes at newline atoms so editor
//! frontends can work in (line, column) coordinates. Columns are rune
//! based; byte offsets are recovered by UTF-8 decoding. The index is
//! regenerable from the document content and must only be mutated through
//! [`crate::buffer::TextBuffer`], which keeps it in lockstep with the
//! document.

use serde::{Deserialize, Serialize};

/// A (line, column) location; the column counts runes, not bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineCol {
    pub line: usize,
    pub column: usize,
}

impl LineCol {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// Byte offset of the n-th rune in a line
fn rune_to_byte_index(n: usize, line: &[u8]) -> usize {
    match std::str::from_utf8(line) {
        Ok(s) => s
            .char_indices()
            .nth(n)
            .map(|(i, _)| i)
            .unwrap_or(line.len()),
        Err(_) => n.min(line.len()),
    }
}

fn rune_count(line: &[u8]) -> usize {
    match std::str::from_utf8(line) {
        Ok(s) => s.chars().count(),
        Err(_) => line.len(),
    }
}

/// An ordered sequence of lines, conceptually separated by newline atoms
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    lines: Vec<Vec<u8>>,
}

impl Default for LineIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl LineIndex {
    /// An index with a single empty line (the empty document)
    pub fn new() -> Self {
        Self {
            lines: vec![Vec::new()],
        }
    }

    pub fn from_content(content: &str) -> Self {
        Self {
            lines: content.split('\n').map(|l| l.as_bytes().to_vec()).collect(),
        }
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn line_bytes(&self, n: usize) -> Option<&[u8]> {
        self.lines.get(n).map(|l| l.as_slice())
    }

    pub fn line(&self, n: usize) -> Option<String> {
        self.lines
            .get(n)
            .map(|l| String::from_utf8_lossy(l).into_owned())
    }

    /// The rune at a location; positions past the end of a line read as
    /// the separating newline.
    pub fn rune_at(&self, loc: LineCol) -> char {
        let Some(line) = self.lines.get(loc.line) else {
            return '\n';
        };
        match std::str::from_utf8(line) {
            Ok(s) => s.chars().nth(loc.column).unwrap_or('\n'),
            Err(_) => '\n',
        }
    }

    /// Total rune count including the separating newlines
    pub fn total_chars(&self) -> usize {
        let newlines = self.lines.len() - 1;
        self.lines.iter().map(|l| rune_count(l)).sum::<usize>() + newlines
    }

    /// Flat character index of a location, or `None` when the location is
    /// outside the current content.
    pub fn to_offset(&self, loc: LineCol) -> Option<usize> {
        if loc.line >= self.lines.len() {
            return None;
        }
        let chars_here = rune_count(&self.lines[loc.line]);
        if loc.column > chars_here {
            return None;
        }
        let before: usize = self.lines[..loc.line]
            .iter()
            .map(|l| rune_count(l) + 1)
            .sum();
        Some(before + loc.column)
    }

    /// Location of a flat character index, clamped to the end of content.
    pub fn from_offset(&self, mut offset: usize) -> LineCol {
        for (line, data) in self.lines.iter().enumerate() {
            let chars_here = rune_count(data);
            if offset <= chars_here {
                return LineCol::new(line, offset);
            }
            offset -= chars_here + 1;
        }
        let last = self.lines.len() - 1;
        LineCol::new(last, rune_count(&self.lines[last]))
    }

    /// Splice bytes in at a location, splitting the line at embedded
    /// newlines.
    pub fn insert_at(&mut self, loc: LineCol, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let y = loc.line.min(self.lines.len() - 1);
        let split = rune_to_byte_index(loc.column, &self.lines[y]);
        let tail = self.lines[y].split_off(split);

        let mut segments = bytes.split(|&b| b == b'\n');
        // split always yields at least one segment
        let first = segments.next().unwrap_or(&[]);
        self.lines[y].extend_from_slice(first);

        let mut rest: Vec<Vec<u8>> = segments.map(|s| s.to_vec()).collect();
        if rest.is_empty() {
            self.lines[y].extend_from_slice(&tail);
        } else {
            if let Some(last) = rest.last_mut() {
                last.extend_from_slice(&tail);
            }
            self.lines.splice(y + 1..y + 1, rest);
        }
    }

    /// Remove the half-open range `[start, end)` and return the removed
    /// text, newlines included. A range spanning lines deletes the
    /// intermediate lines and joins the two end lines.
    pub fn remove_range(&mut self, start: LineCol, end: LineCol) -> String {
        if start >= end || start.line >= self.lines.len() {
            return String::new();
        }
        let end = LineCol::new(
            end.line.min(self.lines.len() - 1),
            if end.line >= self.lines.len() {
                rune_count(&self.lines[self.lines.len() - 1])
            } else {
                end.column
            },
        );

        if start.line == end.line {
            let line = &mut self.lines[start.line];
            let b1 = rune_to_byte_index(start.column, line);
            let b2 = rune_to_byte_index(end.column, line);
            let removed: Vec<u8> = line.drain(b1..b2).collect();
            return String::from_utf8_lossy(&removed).into_owned();
        }

        let b1 = rune_to_byte_index(start.column, &self.lines[start.line]);
        let b2 = rune_to_byte_index(end.column, &self.lines[end.line]);

        let mut removed: Vec<u8> = self.lines[start.line][b1..].to_vec();
        for mid in &self.lines[start.line + 1..end.line] {
            removed.push(b'\n');
            removed.extend_from_slice(mid);
        }
        removed.push(b'\n');
        removed.extend_from_slice(&self.lines[end.line][..b2]);

        let tail: Vec<u8> = self.lines[end.line][b2..].to_vec();
        self.lines[start.line].truncate(b1);
        self.lines[start.line].extend_from_slice(&tail);
        self.lines.drain(start.line + 1..=end.line);

        String::from_utf8_lossy(&removed).into_owned()
    }

    /// All lines joined by newlines
    pub fn content(&self) -> String {
        let mut out = String::new();
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&String::from_utf8_lossy(line));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_index() {
        let idx = LineIndex::new();
        assert_eq!(idx.line_count(), 1);
        assert_eq!(idx.content(), "");
        assert_eq!(idx.total_chars(), 0);
    }

    #[test]
    fn test_from_content_splits_lines() {
        let idx = LineIndex::from_content("ab\ncd\n");
        assert_eq!(idx.line_count(), 3);
        assert_eq!(idx.line(0).unwrap(), "ab");
        assert_eq!(idx.line(1).unwrap(), "cd");
        assert_eq!(idx.line(2).unwrap(), "");
        assert_eq!(idx.content(), "ab\ncd\n");
    }

    #[test]
    fn test_offset_roundtrip() {
        let idx = LineIndex::from_content("ab\ncd");
        assert_eq!(idx.to_offset(LineCol::new(0, 0)), Some(0));
        assert_eq!(idx.to_offset(LineCol::new(0, 2)), Some(2)); // the newline
        assert_eq!(idx.to_offset(LineCol::new(1, 0)), Some(3));
        assert_eq!(idx.to_offset(LineCol::new(1, 2)), Some(5));
        assert_eq!(idx.to_offset(LineCol::new(0, 3)), None);
        assert_eq!(idx.to_offset(LineCol::new(2, 0)), None);

        for offset in 0..=5 {
            let loc = idx.from_offset(offset);
            assert_eq!(idx.to_offset(loc), Some(offset));
        }
    }

    #[test]
    fn test_offset_is_rune_based() {
        let idx = LineIndex::from_content("é水\nb");
        assert_eq!(idx.to_offset(LineCol::new(0, 2)), Some(2));
        assert_eq!(idx.to_offset(LineCol::new(1, 0)), Some(3));
        assert_eq!(idx.rune_at(LineCol::new(0, 1)), '水');
        assert_eq!(idx.rune_at(LineCol::new(0, 2)), '\n');
    }

    #[test]
    fn test_insert_plain() {
        let mut idx = LineIndex::from_content("hlo");
        idx.insert_at(LineCol::new(0, 1), b"el");
        assert_eq!(idx.content(), "hello");
    }

    #[test]
    fn test_insert_splits_on_newline() {
        let mut idx = LineIndex::from_content("ab");
        idx.insert_at(LineCol::new(0, 1), b"x\ny");
        assert_eq!(idx.line_count(), 2);
        assert_eq!(idx.content(), "ax\nyb");
    }

    #[test]
    fn test_insert_multiple_newlines() {
        let mut idx = LineIndex::from_content("ab");
        idx.insert_at(LineCol::new(0, 1), b"\n\n");
        assert_eq!(idx.line_count(), 3);
        assert_eq!(idx.content(), "a\n\nb");
    }

    #[test]
    fn test_remove_within_line() {
        let mut idx = LineIndex::from_content("hello");
        let removed = idx.remove_range(LineCol::new(0, 1), LineCol::new(0, 3));
        assert_eq!(removed, "el");
        assert_eq!(idx.content(), "hlo");
    }

    #[test]
    fn test_remove_across_lines_joins() {
        let mut idx = LineIndex::from_content("abc\ndef\nghi");
        let removed = idx.remove_range(LineCol::new(0, 2), LineCol::new(2, 1));
        assert_eq!(removed, "c\ndef\ng");
        assert_eq!(idx.content(), "abhi");
        assert_eq!(idx.line_count(), 1);
    }

    #[test]
    fn test_remove_newline_joins_lines() {
        let mut idx = LineIndex::from_content("ab\ncd");
        let removed = idx.remove_range(LineCol::new(0, 2), LineCol::new(1, 0));
        assert_eq!(removed, "\n");
        assert_eq!(idx.content(), "abcd");
    }

    #[test]
    fn test_remove_empty_range() {
        let mut idx = LineIndex::from_content("ab");
        assert_eq!(
            idx.remove_range(LineCol::new(0, 1), LineCol::new(0, 1)),
            ""
        );
        assert_eq!(idx.content(), "ab");
    }
}
