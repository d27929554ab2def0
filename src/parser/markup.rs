//! Tolerant markup parser.
//!
//! Builds a best-effort element tree over the markup part of a component. The parser
//! never reports errors: unclosed elements are kept with `closed = false`, stray closing
//! tags are ignored, and an unterminated opening tag swallows the rest of the input.
//! Offsets are byte offsets into the whole document, not into the markup region.

use std::collections::BTreeMap;

/// Elements that never have content or a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements whose content is raw text up to the matching closing tag.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Synthetic node spanning the whole markup region.
    Root,
    Element,
    Text,
    /// Comments and `<!...>` declarations.
    Comment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupNode {
    pub kind: NodeKind,
    /// Tag name as written; `None` for everything but elements.
    pub tag: Option<String>,
    /// Attribute name to raw value (quotes and braces kept). Valueless attributes map to `None`.
    pub attributes: BTreeMap<String, Option<String>>,
    pub start: usize,
    pub end: usize,
    /// End of the opening tag (just past `>`).
    pub start_tag_end: Option<usize>,
    /// Start of the closing tag, when one was found.
    pub end_tag_start: Option<usize>,
    pub children: Vec<MarkupNode>,
    pub closed: bool,
    pub self_closing: bool,
}

impl MarkupNode {
    fn new(kind: NodeKind, start: usize, end: usize) -> Self {
        Self {
            kind,
            tag: None,
            attributes: BTreeMap::new(),
            start,
            end,
            start_tag_end: None,
            end_tag_start: None,
            children: Vec::new(),
            closed: true,
            self_closing: false,
        }
    }

    pub fn is_element(&self) -> bool {
        self.kind == NodeKind::Element
    }

    /// Case-insensitive tag check.
    pub fn has_tag(&self, name: &str) -> bool {
        self.tag
            .as_deref()
            .is_some_and(|tag| tag.eq_ignore_ascii_case(name))
    }

    /// Components are capitalised or namespaced (`<Card>`, `<ui.Button>`).
    pub fn is_component(&self) -> bool {
        self.tag.as_deref().is_some_and(|tag| {
            tag.contains('.') || tag.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        })
    }

    /// Elements that never take content or a closing tag (`<br>`, `<img>`).
    pub fn is_void(&self) -> bool {
        self.tag
            .as_deref()
            .is_some_and(|tag| VOID_ELEMENTS.contains(&tag.to_ascii_lowercase().as_str()))
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Span between the opening tag and the closing tag (or the node end if unclosed).
    pub fn content_span(&self) -> Option<std::ops::Range<usize>> {
        let start = self.start_tag_end?;
        let end = self.end_tag_start.unwrap_or(self.end).max(start);
        Some(start..end)
    }

    /// Whether `offset` falls inside this node's opening tag.
    pub fn in_start_tag(&self, offset: usize) -> bool {
        offset > self.start && self.start_tag_end.map_or(offset <= self.end, |end| offset < end)
    }

    /// Depth-first, pre-order traversal including `self`.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }
}

/// Iterator produced by [`MarkupNode::descendants`].
pub struct Descendants<'a> {
    stack: Vec<&'a MarkupNode>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a MarkupNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// The parsed markup of one document version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupTree {
    pub root: MarkupNode,
}

impl MarkupTree {
    /// All elements in document order.
    pub fn elements(&self) -> impl Iterator<Item = &MarkupNode> {
        self.root.descendants().filter(|n| n.is_element())
    }

    /// Innermost element whose span contains `offset`.
    pub fn element_at(&self, offset: usize) -> Option<&MarkupNode> {
        let mut current = &self.root;
        let mut found = None;
        'outer: loop {
            for child in &current.children {
                if child.is_element() && child.start <= offset && offset < child.end.max(child.start + 1) {
                    found = Some(child);
                    current = child;
                    continue 'outer;
                }
            }
            return found;
        }
    }

    /// Count of nodes, root excluded.
    pub fn node_count(&self) -> usize {
        self.root.descendants().count() - 1
    }
}

/// Parse the markup that starts at `start` (the frontmatter boundary) in `text`.
pub fn parse(text: &str, start: usize) -> MarkupTree {
    let start = crate::document::floor_char_boundary(text, start);
    let mut parser = Parser {
        text,
        bytes: text.as_bytes(),
        pos: start,
        stack: vec![MarkupNode::new(NodeKind::Root, start, text.len())],
    };
    parser.run();
    MarkupTree {
        root: parser.finish(),
    }
}

struct Parser<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
    /// Open elements; index 0 is the root.
    stack: Vec<MarkupNode>,
}

impl<'a> Parser<'a> {
    fn run(&mut self) {
        while self.pos < self.bytes.len() {
            if self.bytes[self.pos] == b'<' {
                if self.text[self.pos..].starts_with("<!--") {
                    self.comment();
                    continue;
                }
                if self.text[self.pos..].starts_with("</") && self.peek_is_alpha(2) {
                    self.closing_tag();
                    continue;
                }
                if self.text[self.pos..].starts_with("<!") {
                    self.declaration();
                    continue;
                }
                if self.peek_is_alpha(1) {
                    self.opening_tag();
                    continue;
                }
            }
            self.text_run();
        }
    }

    fn finish(mut self) -> MarkupNode {
        let len = self.bytes.len();
        while self.stack.len() > 1 {
            self.pop_unclosed(len);
        }
        let mut root = self.stack.pop().unwrap_or_else(|| MarkupNode::new(NodeKind::Root, len, len));
        root.end = len;
        root
    }

    fn peek_is_alpha(&self, ahead: usize) -> bool {
        self.bytes
            .get(self.pos + ahead)
            .is_some_and(|b| b.is_ascii_alphabetic())
    }

    fn append(&mut self, node: MarkupNode) {
        if let Some(parent) = self.stack.last_mut() {
            parent.children.push(node);
        }
    }

    /// Pop the innermost open element as unclosed, ending it at `end`.
    fn pop_unclosed(&mut self, end: usize) {
        if let Some(mut node) = self.stack.pop() {
            node.closed = false;
            node.end = end.max(node.start_tag_end.unwrap_or(node.start));
            self.append(node);
        }
    }

    fn find_from(&self, needle: &str) -> Option<usize> {
        self.text[self.pos..].find(needle).map(|i| self.pos + i)
    }

    fn text_run(&mut self) {
        let start = self.pos;
        let end = self.bytes[start + 1..]
            .iter()
            .position(|&b| b == b'<')
            .map(|i| start + 1 + i)
            .unwrap_or(self.bytes.len());
        self.pos = end;
        if !self.text[start..end].trim().is_empty() {
            self.append(MarkupNode::new(NodeKind::Text, start, end));
        }
    }

    fn comment(&mut self) {
        let start = self.pos;
        let (end, closed) = match self.text[start + 4..].find("-->") {
            Some(i) => (start + 4 + i + 3, true),
            None => (self.bytes.len(), false),
        };
        let mut node = MarkupNode::new(NodeKind::Comment, start, end);
        node.closed = closed;
        self.pos = end;
        self.append(node);
    }

    fn declaration(&mut self) {
        let start = self.pos;
        let end = self.find_from(">").map(|i| i + 1).unwrap_or(self.bytes.len());
        self.pos = end;
        self.append(MarkupNode::new(NodeKind::Comment, start, end));
    }

    fn tag_name(&mut self) -> String {
        let start = self.pos;
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            if b.is_ascii_whitespace() || b == b'>' || b == b'/' || b == b'<' {
                break;
            }
            self.pos += 1;
        }
        self.pos = crate::document::floor_char_boundary(self.text, self.pos);
        self.text[start..self.pos].to_string()
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn closing_tag(&mut self) {
        let start = self.pos;
        self.pos += 2;
        let name = self.tag_name();
        let end = self.find_from(">").map(|i| i + 1).unwrap_or(self.bytes.len());
        self.pos = end;

        let Some(index) = self
            .stack
            .iter()
            .rposition(|n| n.kind == NodeKind::Element && n.has_tag(&name))
        else {
            // Stray closing tag
            return;
        };
        while self.stack.len() > index + 1 {
            self.pop_unclosed(start);
        }
        if let Some(mut node) = self.stack.pop() {
            node.end_tag_start = Some(start);
            node.end = end;
            self.append(node);
        }
    }

    fn opening_tag(&mut self) {
        let start = self.pos;
        self.pos += 1;
        let name = self.tag_name();
        let mut node = MarkupNode::new(NodeKind::Element, start, self.bytes.len());

        let terminated = self.attributes(&mut node);
        node.tag = Some(name.clone());

        if !terminated {
            // `<div class="a` at end of input
            node.closed = false;
            node.start_tag_end = None;
            node.end = self.bytes.len();
            self.append(node);
            return;
        }
        node.start_tag_end = Some(self.pos);

        let lower = name.to_ascii_lowercase();
        if node.self_closing || VOID_ELEMENTS.contains(&lower.as_str()) {
            node.end = self.pos;
            self.append(node);
        } else if RAW_TEXT_ELEMENTS.contains(&lower.as_str()) {
            self.raw_text_content(node, &lower);
        } else {
            self.stack.push(node);
        }
    }

    /// Parse attributes up to and including the end of the opening tag.
    /// Returns false when the input ends first.
    fn attributes(&mut self, node: &mut MarkupNode) -> bool {
        loop {
            self.skip_whitespace();
            let Some(&b) = self.bytes.get(self.pos) else {
                return false;
            };
            match b {
                b'>' => {
                    self.pos += 1;
                    return true;
                }
                b'/' if self.bytes.get(self.pos + 1) == Some(&b'>') => {
                    self.pos += 2;
                    node.self_closing = true;
                    return true;
                }
                b'/' => self.pos += 1,
                b'<' => {
                    // A new tag starts before this one was finished; treat it as ended here.
                    return true;
                }
                b'{' => {
                    let start = self.pos;
                    self.pos = balanced_brace_end(self.bytes, start);
                    node.attributes
                        .insert(self.text[start..self.pos].to_string(), None);
                }
                _ => {
                    let name = self.attribute_name();
                    if name.is_empty() {
                        self.pos += 1;
                        continue;
                    }
                    let value = self.attribute_value();
                    node.attributes.insert(name, value);
                }
            }
        }
    }

    fn attribute_name(&mut self) -> String {
        let start = self.pos;
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            if b.is_ascii_whitespace() || matches!(b, b'=' | b'>' | b'/' | b'<' | b'"' | b'\'') {
                break;
            }
            self.pos += 1;
        }
        self.pos = crate::document::floor_char_boundary(self.text, self.pos);
        self.text[start..self.pos].to_string()
    }

    fn attribute_value(&mut self) -> Option<String> {
        let save = self.pos;
        self.skip_whitespace();
        if self.bytes.get(self.pos) != Some(&b'=') {
            self.pos = save;
            return None;
        }
        self.pos += 1;
        self.skip_whitespace();

        let start = self.pos;
        match self.bytes.get(self.pos) {
            Some(&quote @ (b'"' | b'\'' | b'`')) => {
                self.pos = self.bytes[start + 1..]
                    .iter()
                    .position(|&b| b == quote)
                    .map(|i| start + 1 + i + 1)
                    .unwrap_or(self.bytes.len());
            }
            Some(b'{') => self.pos = balanced_brace_end(self.bytes, start),
            Some(_) => {
                while self.pos < self.bytes.len() {
                    let b = self.bytes[self.pos];
                    if b.is_ascii_whitespace() || b == b'>' {
                        break;
                    }
                    self.pos += 1;
                }
            }
            None => return Some(String::new()),
        }
        self.pos = crate::document::floor_char_boundary(self.text, self.pos);
        Some(self.text[start..self.pos].to_string())
    }

    fn raw_text_content(&mut self, mut node: MarkupNode, lower: &str) {
        let content_start = self.pos;
        let closing = format!("</{}", lower);
        let found = find_ascii_case_insensitive(&self.text[content_start..], &closing)
            .map(|i| content_start + i);

        let content_end = found.unwrap_or(self.bytes.len());
        if content_end > content_start {
            node.children
                .push(MarkupNode::new(NodeKind::Text, content_start, content_end));
        }

        match found {
            Some(close_start) => {
                self.pos = close_start;
                let end = self.find_from(">").map(|i| i + 1).unwrap_or(self.bytes.len());
                node.end_tag_start = Some(close_start);
                node.end = end;
                self.pos = end;
            }
            None => {
                node.closed = false;
                node.end = self.bytes.len();
                self.pos = self.bytes.len();
            }
        }
        self.append(node);
    }
}

/// End offset (exclusive) of the `{...}` group starting at `start`, skipping string literals.
/// Unbalanced groups run to the end of input.
fn balanced_brace_end(bytes: &[u8], start: usize) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i + 1;
                }
            }
            quote @ (b'"' | b'\'' | b'`') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

fn find_ascii_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    let needle = needle.as_bytes();
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element_tags(tree: &MarkupTree) -> Vec<&str> {
        tree.elements().filter_map(|n| n.tag.as_deref()).collect()
    }

    #[test]
    fn void_elements_by_tag_not_by_shape() {
        let tree = parse("<BR><div>", 0);
        let nodes: Vec<_> = tree.elements().map(|n| (n.tag.as_deref(), n.is_void())).collect();
        assert_eq!(nodes, vec![(Some("BR"), true), (Some("div"), false)]);
    }

    #[test]
    fn parses_after_frontmatter() {
        let text = "---\n--- <div>Astro!</div>";
        let tree = parse(text, 7);

        assert_eq!(tree.root.kind, NodeKind::Root);
        assert_eq!(tree.root.children.len(), 1);
        let div = &tree.root.children[0];
        assert!(div.has_tag("div"));
        assert!(div.closed);
        assert_eq!(div.children.len(), 1);
        let text_node = &div.children[0];
        assert_eq!(text_node.kind, NodeKind::Text);
        assert_eq!(&text[text_node.start..text_node.end], "Astro!");
    }

    #[test]
    fn records_offsets() {
        let text = "<p class=\"a\">hi</p>";
        let tree = parse(text, 0);
        let p = &tree.root.children[0];
        assert_eq!(p.start, 0);
        assert_eq!(p.start_tag_end, Some(13));
        assert_eq!(p.end_tag_start, Some(15));
        assert_eq!(p.end, text.len());
        assert_eq!(p.attributes.get("class"), Some(&Some("\"a\"".to_string())));
    }

    #[test]
    fn valueless_and_expression_attributes() {
        let tree = parse("<input disabled value={a > b ? '}' : x} {...rest}>", 0);
        let input = &tree.root.children[0];
        assert_eq!(input.attributes.get("disabled"), Some(&None));
        assert_eq!(
            input.attributes.get("value"),
            Some(&Some("{a > b ? '}' : x}".to_string()))
        );
        assert!(input.has_attribute("{...rest}"));
        assert!(input.closed);
    }

    #[test]
    fn unclosed_elements_are_tolerated() {
        let text = "<div><span>typing";
        let tree = parse(text, 0);
        let div = &tree.root.children[0];
        assert!(!div.closed);
        assert_eq!(div.end, text.len());
        let span = &div.children[0];
        assert!(!span.closed);
        assert_eq!(span.end, text.len());
    }

    #[test]
    fn implicitly_closed_child_ends_at_parent_close() {
        let text = "<ul><li>one</ul><p>after</p>";
        let tree = parse(text, 0);
        let ul = &tree.root.children[0];
        assert!(ul.closed);
        let li = &ul.children[0];
        assert!(!li.closed);
        assert_eq!(li.end, 11);
        assert_eq!(element_tags(&tree), vec!["ul", "li", "p"]);
    }

    #[test]
    fn stray_closing_tag_is_ignored() {
        let tree = parse("</div><p>x</p>", 0);
        assert_eq!(element_tags(&tree), vec!["p"]);
    }

    #[test]
    fn raw_text_elements_keep_markup_inside() {
        let text = "<script>if (a < b) { x = '<div>'; }</script><style>a{}</style>";
        let tree = parse(text, 0);
        assert_eq!(element_tags(&tree), vec!["script", "style"]);
        let script = &tree.root.children[0];
        assert_eq!(
            &text[script.content_span().unwrap()],
            "if (a < b) { x = '<div>'; }"
        );
    }

    #[test]
    fn unclosed_raw_text_runs_to_end() {
        let text = "<style>\n.a { color: red; }";
        let tree = parse(text, 0);
        let style = &tree.root.children[0];
        assert!(!style.closed);
        assert_eq!(style.content_span(), Some(7..text.len()));
    }

    #[test]
    fn void_and_self_closing() {
        let tree = parse("<br><Card title=\"x\" /><img src=a.png>", 0);
        assert_eq!(tree.root.children.len(), 3);
        assert!(tree.root.children[1].self_closing);
        assert!(tree.root.children[1].is_component());
        assert!(tree.root.children.iter().all(|n| n.closed));
    }

    #[test]
    fn unterminated_opening_tag() {
        let text = "<div><a href=\"x";
        let tree = parse(text, 0);
        let a = &tree.root.children[0].children[0];
        assert!(!a.closed);
        assert_eq!(a.start_tag_end, None);
        assert!(a.in_start_tag(text.len()));
    }

    #[test]
    fn comments_and_doctype() {
        let tree = parse("<!doctype html><!-- <p>not a tag</p> --><p>x</p>", 0);
        let kinds: Vec<_> = tree.root.children.iter().map(|n| n.kind).collect();
        assert_eq!(
            kinds,
            vec![NodeKind::Comment, NodeKind::Comment, NodeKind::Element]
        );
    }

    #[test]
    fn element_at_finds_innermost() {
        let text = "<div><span>x</span></div>";
        let tree = parse(text, 0);
        assert!(tree.element_at(11).unwrap().has_tag("span"));
        assert!(tree.element_at(2).unwrap().has_tag("div"));
        assert!(tree.element_at(text.len()).is_none());
    }

    #[test]
    fn parsing_is_deterministic() {
        let text = "<div><style>a{}</style><p>x";
        assert_eq!(parse(text, 0), parse(text, 0));
    }
}
