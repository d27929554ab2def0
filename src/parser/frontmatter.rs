//! Frontmatter delimiter scanning.
//!
//! The frontmatter is the script preamble of a component, fenced by `---` lines.
//! Scanning is purely structural: the first two delimiter occurrences are taken as
//! the fences, wherever they appear. Whether the fenced code is valid is left to the
//! type checker.

use std::ops::Range;

use tower_lsp::lsp_types::Position;

/// The literal fence marker.
pub const DELIMITER: &str = "---";

/// One delimiter occurrence, with the editor position of both edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiter {
    pub start: usize,
    pub end: usize,
    pub start_position: Position,
    pub end_position: Position,
}

/// Structural state of a document's frontmatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontmatterStatus {
    /// No delimiter in the document.
    Absent,
    /// An opening delimiter without a closing one.
    Open {
        open: Delimiter,
        /// Where a synthetic closing delimiter could be inserted (end of document).
        close_insertion: usize,
    },
    /// Both delimiters present.
    Closed { open: Delimiter, close: Delimiter },
}

impl FrontmatterStatus {
    pub fn is_absent(&self) -> bool {
        matches!(self, FrontmatterStatus::Absent)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, FrontmatterStatus::Closed { .. })
    }

    /// Byte range of the code between the fences.
    ///
    /// For an open frontmatter the body runs to the end of the document.
    pub fn body(&self) -> Option<Range<usize>> {
        match *self {
            FrontmatterStatus::Absent => None,
            FrontmatterStatus::Open {
                open,
                close_insertion,
            } => Some(open.end..close_insertion),
            FrontmatterStatus::Closed { open, close } => Some(open.end..close.start),
        }
    }

    /// Offset where markup begins.
    pub fn markup_start(&self, text_len: usize) -> usize {
        match *self {
            FrontmatterStatus::Absent => 0,
            FrontmatterStatus::Open { .. } => text_len,
            FrontmatterStatus::Closed { close, .. } => close.end,
        }
    }

    /// Whether `offset` lies inside the frontmatter, fences included.
    pub fn contains(&self, offset: usize) -> bool {
        match *self {
            FrontmatterStatus::Absent => false,
            FrontmatterStatus::Open { open, .. } => offset >= open.start,
            FrontmatterStatus::Closed { open, close } => offset >= open.start && offset <= close.end,
        }
    }
}

/// Classify `text` by its frontmatter delimiters. Never fails.
pub fn scan(text: &str) -> FrontmatterStatus {
    let Some(open_start) = text.find(DELIMITER) else {
        return FrontmatterStatus::Absent;
    };
    let open = delimiter_at(text, open_start);

    match text[open.end..].find(DELIMITER) {
        Some(relative) => FrontmatterStatus::Closed {
            open,
            close: delimiter_at(text, open.end + relative),
        },
        None => FrontmatterStatus::Open {
            open,
            close_insertion: text.len(),
        },
    }
}

fn delimiter_at(text: &str, start: usize) -> Delimiter {
    let end = start + DELIMITER.len();
    Delimiter {
        start,
        end,
        start_position: position_of(text, start),
        end_position: position_of(text, end),
    }
}

/// Position of `offset` by a linear scan; delimiters sit near the top of the file.
fn position_of(text: &str, offset: usize) -> Position {
    let before = &text[..offset];
    let line = before.bytes().filter(|&b| b == b'\n').count();
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let character: usize = before[line_start..].chars().map(char::len_utf16).sum();
    Position::new(line as u32, character as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_frontmatter() {
        let status = scan("---\n--- <div>Astro!</div>");
        let FrontmatterStatus::Closed { open, close } = status else {
            panic!("expected closed frontmatter, got {:?}", status);
        };
        assert_eq!(open.start, 0);
        assert_eq!(open.start_position, Position::new(0, 0));
        assert_eq!(close.start, 4);
        assert_eq!(close.end, 7);
        assert_eq!(close.end_position, Position::new(1, 3));
        assert_eq!(status.body(), Some(3..4));
        assert_eq!(status.markup_start(25), 7);
    }

    #[test]
    fn open_frontmatter() {
        let text = "---\n<div>Astro!</div>";
        let status = scan(text);
        assert!(matches!(
            status,
            FrontmatterStatus::Open { close_insertion, .. } if close_insertion == text.len()
        ));
        assert_eq!(status.markup_start(text.len()), text.len());
        assert!(status.contains(10));
    }

    #[test]
    fn absent_frontmatter() {
        let status = scan("<div>Astro!</div>");
        assert!(status.is_absent());
        assert_eq!(status.body(), None);
        assert_eq!(status.markup_start(17), 0);
    }

    #[test]
    fn delimiter_after_content_still_counts() {
        let status = scan("hello ---\nconst a = 1;\n---\n<p/>");
        let FrontmatterStatus::Closed { open, close } = status else {
            panic!("expected closed frontmatter");
        };
        assert_eq!(open.start, 6);
        assert_eq!(close.start_position, Position::new(2, 0));
        assert!(close.end > open.end);
    }

    #[test]
    fn extra_delimiters_use_first_two() {
        let text = "---\na\n---\n<hr>---";
        let FrontmatterStatus::Closed { close, .. } = scan(text) else {
            panic!("expected closed frontmatter");
        };
        assert_eq!(close.start, 6);
    }

    #[test]
    fn scan_is_total() {
        for text in ["", "-", "--", "----", "-----", "---", "\u{1F600}---\u{e9}"] {
            let status = scan(text);
            if let FrontmatterStatus::Closed { open, close } = status {
                assert!(close.start > open.start);
            }
        }
    }
}
