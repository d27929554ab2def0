//! Embedded `<script>` and `<style>` block extraction.

use std::collections::BTreeMap;
use std::ops::Range;

use super::markup::{MarkupNode, MarkupTree};

/// Attribute that makes a script run as-is in the page's global scope.
pub const INLINE_ATTRIBUTE: &str = "is:inline";

/// Passing server variables to a script implies inline semantics.
const DEFINE_VARS_ATTRIBUTE: &str = "define:vars";

/// `type` values that still denote JavaScript.
const JS_SCRIPT_TYPES: &[&str] = &[
    "",
    "module",
    "text/javascript",
    "application/javascript",
    "text/typescript",
    "application/typescript",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Script,
    Style,
}

/// How a script block is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptMode {
    /// Bundled module: checked in isolation as its own file.
    Module,
    /// Shipped as-is: shares global scope with the frontmatter and other inline scripts.
    Inline,
    /// Not JavaScript at all (JSON-LD, templates); never type-checked.
    Data,
}

/// One script or style region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedBlock {
    pub kind: BlockKind,
    pub content: String,
    /// Content start, just past the opening tag.
    pub content_start: usize,
    /// Content end, at the closing tag (or end of input when unclosed).
    pub content_end: usize,
    /// Attributes with quotes stripped; valueless attributes carry their own name.
    pub attributes: BTreeMap<String, String>,
    /// Span of the whole element, tags included.
    pub container: Range<usize>,
    pub closed: bool,
}

impl EmbeddedBlock {
    pub fn content_span(&self) -> Range<usize> {
        self.content_start..self.content_end
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// The `lang` attribute, if any (`scss`, `ts`, ...).
    pub fn lang(&self) -> Option<&str> {
        self.attribute("lang")
    }

    /// Whether `offset` lies in the content; the end is inclusive so a cursor
    /// right before the closing tag still counts.
    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.content_start && offset <= self.content_end
    }

    /// Classify a script block. `inline_attributes` are the attributes opting out of isolation.
    pub fn script_mode(&self, inline_attributes: &[String]) -> ScriptMode {
        if let Some(ty) = self.attribute("type") {
            if !JS_SCRIPT_TYPES.contains(&ty.trim().to_ascii_lowercase().as_str()) {
                return ScriptMode::Data;
            }
        }
        let inline = self.has_attribute(DEFINE_VARS_ATTRIBUTE)
            || inline_attributes.iter().any(|a| self.has_attribute(a));
        if inline {
            ScriptMode::Inline
        } else {
            ScriptMode::Module
        }
    }
}

/// Collect every script and style element in the tree, depth-first, in document order.
pub fn extract(tree: &MarkupTree, text: &str) -> Vec<EmbeddedBlock> {
    tree.elements()
        .filter_map(|node| {
            let kind = if node.has_tag("script") {
                BlockKind::Script
            } else if node.has_tag("style") {
                BlockKind::Style
            } else {
                return None;
            };
            block_from_node(node, kind, text)
        })
        .collect()
}

fn block_from_node(node: &MarkupNode, kind: BlockKind, text: &str) -> Option<EmbeddedBlock> {
    let span = node.content_span()?;
    let content = text.get(span.clone())?.to_string();
    let attributes = node
        .attributes
        .iter()
        .map(|(name, value)| {
            let value = match value {
                Some(raw) => strip_quotes(raw).to_string(),
                None => name.clone(),
            };
            (name.clone(), value)
        })
        .collect();

    Some(EmbeddedBlock {
        kind,
        content,
        content_start: span.start,
        content_end: span.end,
        attributes,
        container: node.start..node.end,
        closed: node.closed,
    })
}

fn strip_quotes(raw: &str) -> &str {
    for quote in ['"', '\'', '`'] {
        if let Some(inner) = raw.strip_prefix(quote) {
            return inner.strip_suffix(quote).unwrap_or(inner);
        }
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::markup::parse;

    fn blocks(text: &str) -> Vec<EmbeddedBlock> {
        extract(&parse(text, 0), text)
    }

    #[test]
    fn finds_nested_style() {
        let text = "<main><div><style>.a { color: red; }</style></div></main>";
        let found = blocks(text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, BlockKind::Style);
        assert_eq!(found[0].content, ".a { color: red; }");
        assert_eq!(&text[found[0].container.clone()], "<style>.a { color: red; }</style>");
    }

    #[test]
    fn finds_top_level_and_nested_styles() {
        let text = "<style>h1 { color: red; }</style>\n<div><style>p { margin: 0; }</style></div>";
        assert_eq!(blocks(text).len(), 2);
    }

    #[test]
    fn normalizes_attributes() {
        let text = "<script is:inline type='module' data-x=\"1\">let a = 1;</script>";
        let found = blocks(text);
        let attrs = &found[0].attributes;
        assert_eq!(attrs.get("is:inline").map(String::as_str), Some("is:inline"));
        assert_eq!(attrs.get("type").map(String::as_str), Some("module"));
        assert_eq!(attrs.get("data-x").map(String::as_str), Some("1"));
    }

    #[test]
    fn content_offsets_exclude_tags() {
        let text = "<p>x</p><script>\nconsole.log(1)\n</script>";
        let block = &blocks(text)[0];
        assert_eq!(&text[block.content_span()], "\nconsole.log(1)\n");
        assert_eq!(block.content_start, 16);
        assert!(block.closed);
    }

    #[test]
    fn unclosed_block_runs_to_end() {
        let text = "<style>\n.a {";
        let block = &blocks(text)[0];
        assert!(!block.closed);
        assert_eq!(block.content_end, text.len());
        assert!(block.contains(text.len()));
    }

    #[test]
    fn script_modes() {
        let inline = vec![INLINE_ATTRIBUTE.to_string()];
        let text = concat!(
            "<script>a</script>",
            "<script is:inline>b</script>",
            "<script define:vars={{ x }}>c</script>",
            "<script type=\"application/ld+json\">{}</script>",
            "<script type=\"module\">d</script>",
        );
        let modes: Vec<_> = blocks(text).iter().map(|b| b.script_mode(&inline)).collect();
        assert_eq!(
            modes,
            vec![
                ScriptMode::Module,
                ScriptMode::Inline,
                ScriptMode::Inline,
                ScriptMode::Data,
                ScriptMode::Module,
            ]
        );
    }
}
