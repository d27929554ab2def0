//! Hover information routed through the synthetic sources.

use tower_lsp::lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind, Position};

use crate::checker::TypeChecker;
use crate::document::DocumentSnapshot;
use crate::virtual_code::Capability;

/// Hover at a document position, answered by the type checker.
///
/// The hovered range is mapped back when both of its ends are mapped; otherwise the
/// hover is shown without a range.
pub fn hover_at_position(
    snapshot: &DocumentSnapshot,
    checker: &dyn TypeChecker,
    position: Position,
) -> Option<Hover> {
    let offset = snapshot.line_index.position_to_offset(position)?;
    let (source, generated) = snapshot.locate(offset, Capability::Semantic)?;
    if !source.kind.is_checked() {
        return None;
    }

    let hover = checker.hover(source, generated)?;
    let range = source
        .mapping
        .range_to_original(hover.span, Capability::Semantic)
        .map(|span| snapshot.line_index.span_to_range(&span));

    Some(Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value: hover.contents,
        }),
        range,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::{CheckerDiagnostic, CheckerHover};
    use crate::virtual_code::{LanguageModule, SyntheticSource};
    use tower_lsp::lsp_types::Range;

    /// Describes the identifier under the cursor.
    struct Identifiers;

    impl TypeChecker for Identifiers {
        fn diagnostics(&self, _source: &SyntheticSource) -> Vec<CheckerDiagnostic> {
            Vec::new()
        }

        fn hover(&self, source: &SyntheticSource, offset: usize) -> Option<CheckerHover> {
            let text = source.text();
            let is_ident = |c: char| c.is_alphanumeric() || c == '_';
            let start = text[..offset]
                .rfind(|c: char| !is_ident(c))
                .map_or(0, |i| i + 1);
            let end = text[offset..]
                .find(|c: char| !is_ident(c))
                .map_or(text.len(), |i| offset + i);
            (start < end).then(|| CheckerHover {
                span: start..end,
                contents: format!("`{}` in {}", &text[start..end], source.file_name),
            })
        }
    }

    fn snapshot(text: &str) -> DocumentSnapshot {
        DocumentSnapshot::derive("/p/x.astro", text.to_string(), 1, 0, &LanguageModule::default())
    }

    fn contents(hover: &Hover) -> &str {
        match &hover.contents {
            HoverContents::Markup(markup) => &markup.value,
            _ => "",
        }
    }

    #[test]
    fn hover_in_frontmatter() {
        let snapshot = snapshot("---\nconst title = 'x';\n---\n<h1>{title}</h1>");
        let hover = hover_at_position(&snapshot, &Identifiers, Position::new(1, 8)).unwrap();
        assert_eq!(contents(&hover), "`title` in /p/x.astro.tsx");
        assert_eq!(
            hover.range,
            Some(Range::new(Position::new(1, 6), Position::new(1, 11)))
        );
    }

    #[test]
    fn hover_in_module_script_uses_satellite() {
        let snapshot = snapshot("<script>\nlet count = 0;\n</script>");
        let hover = hover_at_position(&snapshot, &Identifiers, Position::new(1, 5)).unwrap();
        assert_eq!(contents(&hover), "`count` in /p/x.astro.__script_0.mts");
        assert_eq!(
            hover.range,
            Some(Range::new(Position::new(1, 4), Position::new(1, 9)))
        );
    }

    #[test]
    fn no_hover_in_styles() {
        let snapshot = snapshot("<style>\np { color: red }\n</style>");
        assert!(hover_at_position(&snapshot, &Identifiers, Position::new(1, 5)).is_none());
    }
}
