//! Completion support.
//!
//! Inside script code the type checker answers through the mapping. In markup, right
//! after `<`, components imported in the frontmatter are offered as tag names.

use std::sync::LazyLock;

use regex::Regex;
use tower_lsp::lsp_types::*;

use crate::checker::{CheckerCompletion, CompletionKind, TypeChecker};
use crate::document::DocumentSnapshot;
use crate::virtual_code::{Capability, SyntheticSource};

static COMPONENT_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*import\s+([A-Z][A-Za-z0-9_$]*)\s*(?:,|\s+from\b)").unwrap()
});

fn to_lsp_kind(kind: CompletionKind) -> CompletionItemKind {
    match kind {
        CompletionKind::Variable => CompletionItemKind::VARIABLE,
        CompletionKind::Function => CompletionItemKind::FUNCTION,
        CompletionKind::Property => CompletionItemKind::PROPERTY,
        CompletionKind::Module => CompletionItemKind::MODULE,
        CompletionKind::Keyword => CompletionItemKind::KEYWORD,
        CompletionKind::Class => CompletionItemKind::CLASS,
    }
}

/// Convert checker completions; replace ranges that do not map are dropped so the
/// client falls back to its own word range.
fn checker_items(
    snapshot: &DocumentSnapshot,
    source: &SyntheticSource,
    completions: Vec<CheckerCompletion>,
) -> Vec<CompletionItem> {
    completions
        .into_iter()
        .map(|completion| {
            let text_edit = completion
                .replace
                .and_then(|span| source.mapping.range_to_original(span, Capability::Completion))
                .map(|span| {
                    CompletionTextEdit::Edit(TextEdit {
                        range: snapshot.line_index.span_to_range(&span),
                        new_text: completion.label.clone(),
                    })
                });
            CompletionItem {
                label: completion.label,
                kind: Some(to_lsp_kind(completion.kind)),
                detail: completion.detail,
                text_edit,
                ..Default::default()
            }
        })
        .collect()
}

/// Offset of the `<` when `offset` sits in a tag name being typed.
fn tag_name_start(text: &str, offset: usize) -> Option<usize> {
    let before = text.get(..offset)?;
    let name_len = before
        .bytes()
        .rev()
        .take_while(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-' | b'$'))
        .count();
    let lt = before.len() - name_len;
    (lt > 0 && before.as_bytes()[lt - 1] == b'<').then_some(lt - 1)
}

/// Default imports with capitalised names in the frontmatter.
fn imported_components(snapshot: &DocumentSnapshot) -> Vec<String> {
    let Some(body) = snapshot.frontmatter.body() else {
        return Vec::new();
    };
    let Some(code) = snapshot.text().get(body) else {
        return Vec::new();
    };
    let mut names: Vec<String> = COMPONENT_IMPORT
        .captures_iter(code)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect();
    names.sort();
    names.dedup();
    names
}

fn component_items(snapshot: &DocumentSnapshot, offset: usize) -> Option<Vec<CompletionItem>> {
    let lt = tag_name_start(snapshot.text(), offset)?;
    if !snapshot.markup_completions_allowed(lt) {
        return None;
    }
    let items: Vec<_> = imported_components(snapshot)
        .into_iter()
        .map(|name| CompletionItem {
            detail: Some("Component".to_string()),
            kind: Some(CompletionItemKind::CLASS),
            label: name,
            ..Default::default()
        })
        .collect();
    (!items.is_empty()).then_some(items)
}

/// Completions at a document position.
pub fn completion_at_position(
    snapshot: &DocumentSnapshot,
    checker: &dyn TypeChecker,
    position: Position,
) -> Option<CompletionResponse> {
    let offset = snapshot.line_index.position_to_offset(position)?;

    if let Some((source, generated)) = snapshot.locate(offset, Capability::Completion) {
        if source.kind.is_checked() {
            let completions = checker.completions(source, generated);
            if !completions.is_empty() {
                return Some(CompletionResponse::Array(checker_items(
                    snapshot,
                    source,
                    completions,
                )));
            }
        }
    }

    component_items(snapshot, offset).map(CompletionResponse::Array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::CheckerDiagnostic;
    use crate::virtual_code::LanguageModule;

    /// Offers the globals of the file, replacing the word before the cursor.
    struct Globals;

    impl TypeChecker for Globals {
        fn diagnostics(&self, _source: &SyntheticSource) -> Vec<CheckerDiagnostic> {
            Vec::new()
        }

        fn completions(&self, source: &SyntheticSource, offset: usize) -> Vec<CheckerCompletion> {
            let text = source.text();
            let word = text[..offset]
                .rfind(|c: char| !c.is_alphanumeric())
                .map_or(0, |i| i + 1);
            vec![CheckerCompletion {
                label: "Astro".to_string(),
                kind: CompletionKind::Variable,
                detail: Some(source.file_name.clone()),
                replace: Some(word..offset),
            }]
        }
    }

    fn snapshot(text: &str) -> DocumentSnapshot {
        DocumentSnapshot::derive("/p/x.astro", text.to_string(), 1, 0, &LanguageModule::default())
    }

    fn items(response: Option<CompletionResponse>) -> Vec<CompletionItem> {
        match response {
            Some(CompletionResponse::Array(items)) => items,
            _ => Vec::new(),
        }
    }

    #[test]
    fn checker_completions_in_frontmatter() {
        let snapshot = snapshot("---\nconst a = Ast;\n---\n<p/>");
        let items = items(completion_at_position(&snapshot, &Globals, Position::new(1, 13)));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].detail.as_deref(), Some("/p/x.astro.tsx"));
        let Some(CompletionTextEdit::Edit(edit)) = &items[0].text_edit else {
            panic!("expected a text edit");
        };
        assert_eq!(
            edit.range,
            Range::new(Position::new(1, 10), Position::new(1, 13))
        );
    }

    #[test]
    fn components_after_angle_bracket() {
        let text = "---\nimport Card from './Card.astro';\nimport Nav, { x } from './Nav.astro';\nimport { helper } from './h';\n---\n<div><Ca</div>";
        let snapshot = snapshot(text);
        let offset = text.find("<Ca").unwrap() + 3;
        let position = snapshot.line_index.offset_to_position(offset);
        let labels: Vec<_> = items(completion_at_position(&snapshot, &crate::checker::NullChecker, position))
            .into_iter()
            .map(|i| i.label)
            .collect();
        assert_eq!(labels, vec!["Card", "Nav"]);
    }

    #[test]
    fn no_components_inside_blocks_or_attributes() {
        let text = "---\nimport Card from './Card.astro';\n---\n<style>a<b</style><Card title=\"\" />";
        let snapshot = snapshot(text);
        let in_style = snapshot.line_index.offset_to_position(text.find("<b").unwrap() + 2);
        assert!(completion_at_position(&snapshot, &crate::checker::NullChecker, in_style).is_none());
        let in_attribute = snapshot.line_index.offset_to_position(text.find("title").unwrap());
        assert!(completion_at_position(&snapshot, &crate::checker::NullChecker, in_attribute).is_none());
    }

    #[test]
    fn tag_name_detection() {
        assert_eq!(tag_name_start("<div><Ca", 8), Some(5));
        assert_eq!(tag_name_start("<", 1), Some(0));
        assert_eq!(tag_name_start("a b", 3), None);
        assert_eq!(tag_name_start("x", 5), None);
    }
}
