//! Text utilities for position conversion.
//!
//! Provides byte offset <-> editor position conversion with proper UTF-16 handling.
//! Used for original documents, synthetic sources and compiler source maps alike.

use std::ops::Range;

use tower_lsp::lsp_types::Position;

/// Pre-computed line index for efficient position lookups.
///
/// Editor positions use line/column where column is in UTF-16 code units.
/// This struct pre-computes line start offsets for O(log n) lookup.
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offset where each line starts.
    line_starts: Vec<usize>,
    /// Source text (needed for UTF-16 column calculation).
    source: String,
}

impl LineIndex {
    /// Build a line index from source text.
    pub fn new(source: String) -> Self {
        let mut line_starts = vec![0];

        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }

        Self {
            line_starts,
            source,
        }
    }

    /// Get the source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Number of lines (a trailing newline opens an empty last line).
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Byte offset of the start of `line`, if it exists.
    pub fn line_start(&self, line: usize) -> Option<usize> {
        self.line_starts.get(line).copied()
    }

    /// Convert a byte offset to an editor position.
    ///
    /// Offsets past the end of the text clamp to the end. Offsets inside a
    /// multi-byte character resolve to the column of that character.
    pub fn offset_to_position(&self, offset: usize) -> Position {
        let offset = offset.min(self.source.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line.saturating_sub(1),
        };

        let line_start = self.line_starts[line];
        let line_end = self
            .line_starts
            .get(line + 1)
            .copied()
            .unwrap_or(self.source.len());

        let mut col = 0u32;
        let line_slice = &self.source[line_start..line_end];

        for (i, c) in line_slice.char_indices() {
            if line_start + i >= offset {
                break;
            }
            col += c.len_utf16() as u32;
        }

        Position::new(line as u32, col)
    }

    /// Convert an editor position to a byte offset.
    ///
    /// Returns None if the line is out of bounds. Columns past the end of the
    /// line clamp to the line end (before its newline).
    pub fn position_to_offset(&self, position: Position) -> Option<usize> {
        let line = position.line as usize;

        if line >= self.line_starts.len() {
            return None;
        }

        let line_start = self.line_starts[line];
        let line_end = self
            .line_starts
            .get(line + 1)
            .map(|&end| end.saturating_sub(1))
            .unwrap_or(self.source.len());

        let line_slice = &self.source[line_start..line_end];

        let mut utf16_col = 0u32;
        for (i, c) in line_slice.char_indices() {
            if utf16_col >= position.character {
                return Some(line_start + i);
            }
            utf16_col += c.len_utf16() as u32;
        }

        Some(line_end.min(self.source.len()))
    }

    /// Convert a zero-based line and UTF-16 column to a byte offset.
    pub fn offset_at(&self, line: u32, character: u32) -> Option<usize> {
        self.position_to_offset(Position::new(line, character))
    }

    /// Convert a one-based line/column pair (the compiler's convention) to a byte offset.
    pub fn offset_at_one_based(&self, line: u32, column: u32) -> Option<usize> {
        self.offset_at(line.checked_sub(1)?, column.saturating_sub(1))
    }

    /// Convert a byte span to an editor range.
    pub fn span_to_range(&self, span: &Range<usize>) -> tower_lsp::lsp_types::Range {
        let start = self.offset_to_position(span.start);
        let end = self.offset_to_position(span.end);
        tower_lsp::lsp_types::Range::new(start, end)
    }

    /// Convert an editor range to a byte span.
    pub fn range_to_span(&self, range: tower_lsp::lsp_types::Range) -> Option<Range<usize>> {
        let start = self.position_to_offset(range.start)?;
        let end = self.position_to_offset(range.end)?;
        Some(start..end.max(start))
    }
}

/// Round `offset` down to the nearest char boundary of `text`.
pub(crate) fn floor_char_boundary(text: &str, offset: usize) -> usize {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}
